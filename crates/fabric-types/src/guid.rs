//! Port GUID type.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 64-bit fabric port identifier.
///
/// Two values are special: zero ("use the default port") and all-ones
/// ([`PortGuid::UNRESOLVED`], "not chosen yet"). Neither may be bound.
///
/// # Examples
///
/// ```
/// use fabric_types::PortGuid;
///
/// let guid: PortGuid = "0x0002c90300001234".parse().unwrap();
/// assert_eq!(guid.as_u64(), 0x0002_c903_0000_1234);
/// assert!(guid.is_bindable());
///
/// assert!(!PortGuid::UNRESOLVED.is_bindable());
/// assert!(!PortGuid::ZERO.is_bindable());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortGuid(u64);

impl PortGuid {
    /// The "use the default port" value.
    pub const ZERO: PortGuid = PortGuid(0);

    /// The "unresolved" sentinel.
    pub const UNRESOLVED: PortGuid = PortGuid(u64::MAX);

    /// Creates a GUID from its raw value.
    pub const fn new(raw: u64) -> Self {
        PortGuid(raw)
    }

    /// Returns the raw 64-bit value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns true for the all-ones sentinel.
    pub const fn is_unresolved(&self) -> bool {
        self.0 == u64::MAX
    }

    /// Returns true for zero.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if this GUID identifies a concrete port.
    pub const fn is_bindable(&self) -> bool {
        !self.is_zero() && !self.is_unresolved()
    }
}

impl fmt::Display for PortGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl FromStr for PortGuid {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() {
            return Err(ParseError::InvalidGuid(s.to_string()));
        }

        u64::from_str_radix(digits, 16)
            .map(PortGuid)
            .map_err(|_| ParseError::InvalidGuid(s.to_string()))
    }
}

impl TryFrom<String> for PortGuid {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PortGuid> for String {
    fn from(guid: PortGuid) -> String {
        guid.to_string()
    }
}

impl From<u64> for PortGuid {
    fn from(raw: u64) -> Self {
        PortGuid(raw)
    }
}
