//! Loader for the path-equalization ignore list.
//!
//! One entry per line: a hexadecimal port GUID and a decimal port number,
//! separated by whitespace. Leading whitespace is skipped and blank lines
//! are ignored. The whole file is parsed before anything is applied, so a
//! malformed line leaves the subnet model untouched.

use std::fs;
use std::path::Path;

use fabric_types::{PortGuid, PortNum};
use sm_common::{SharedLock, SmError, SmResult};
use tracing::{debug, info};

use crate::subnet::{IgnoredPort, SubnetModel};

/// Parses ignore-list text. `path` is only used in error messages.
pub fn parse_ignore_list(path: &Path, text: &str) -> SmResult<Vec<IgnoredPort>> {
    let mut entries = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim_start();
        if line.trim_end().is_empty() {
            continue;
        }

        let mut fields = line.split_whitespace();
        let guid_field = fields.next().unwrap_or_default();
        let guid: PortGuid = guid_field.parse().map_err(|_| {
            SmError::config_parse(path, line_no, format!("Bad GUID '{}'", guid_field))
        })?;

        let port_field = fields.next().ok_or_else(|| {
            SmError::config_parse(path, line_no, format!("Missing port number for {}", guid))
        })?;
        let port: PortNum = port_field.parse().map_err(|_| {
            SmError::config_parse(path, line_no, format!("Bad port number '{}'", port_field))
        })?;

        debug!(guid = %guid, port = %port, "Ignore-list entry");
        entries.push(IgnoredPort { guid, port });
    }

    Ok(entries)
}

/// Reads and parses an ignore-list file.
pub fn load_ignore_list(path: &Path) -> SmResult<Vec<IgnoredPort>> {
    let text = fs::read_to_string(path).map_err(|e| {
        SmError::config_parse(path, 0, format!("Cannot open ignore file: {}", e))
    })?;
    parse_ignore_list(path, &text)
}

/// Loads `path` and applies every entry to the model in one critical
/// section. Returns the number of entries read.
pub fn apply_ignore_list(path: &Path, subnet: &SharedLock<SubnetModel>) -> SmResult<usize> {
    let entries = load_ignore_list(path)?;
    let count = entries.len();
    let added = subnet.with(|model| model.apply_ignored_ports(entries));
    info!(path = %path.display(), count, added, "Ignore list loaded");
    Ok(count)
}
