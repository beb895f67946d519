//! LID and port number types with validation.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unicast local identifier (1-49151).
///
/// LID 0 is reserved and the range above 0xBFFF is multicast.
///
/// # Examples
///
/// ```
/// use fabric_types::Lid;
///
/// let lid = Lid::new(7).unwrap();
/// assert_eq!(lid.as_u16(), 7);
///
/// assert!(Lid::new(0).is_err());
/// assert!(Lid::new(0xC000).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Lid(u16);

impl Lid {
    /// Minimum valid unicast LID.
    pub const MIN: u16 = 1;

    /// Maximum valid unicast LID.
    pub const MAX: u16 = 0xBFFF;

    /// Creates a new unicast LID.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is outside the unicast range.
    pub const fn new(lid: u16) -> Result<Self, ParseError> {
        if lid >= Self::MIN && lid <= Self::MAX {
            Ok(Lid(lid))
        } else {
            Err(ParseError::InvalidLid(lid))
        }
    }

    /// Returns the LID as a u16.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Lid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Lid {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lid: u16 = s.trim().parse().map_err(|_| ParseError::InvalidLid(0))?;
        Lid::new(lid)
    }
}

impl TryFrom<u16> for Lid {
    type Error = ParseError;

    fn try_from(lid: u16) -> Result<Self, Self::Error> {
        Lid::new(lid)
    }
}

impl From<Lid> for u16 {
    fn from(lid: Lid) -> u16 {
        lid.0
    }
}

/// Physical port number on a fabric node.
///
/// Port 0 is the switch management port; external ports start at 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PortNum(u8);

impl PortNum {
    /// Creates a port number.
    pub const fn new(num: u8) -> Self {
        PortNum(num)
    }

    /// Returns the port number as a u8.
    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for PortNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PortNum {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .map(PortNum)
            .map_err(|_| ParseError::InvalidPortNum(s.to_string()))
    }
}

impl From<u8> for PortNum {
    fn from(num: u8) -> Self {
        PortNum(num)
    }
}
