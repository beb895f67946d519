//! Choosing the local port to bind.

use std::io::{self, BufRead, Write};

use fabric_types::{LinkState, Lid, PortGuid};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// A port on the local host adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPort {
    pub guid: PortGuid,
    #[serde(default)]
    pub lid: Option<Lid>,
    #[serde(default)]
    pub state: LinkState,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortSelectError {
    #[error("No local ports detected")]
    NoLocalPorts,

    #[error("{count} local ports found and no interactive choice possible")]
    Ambiguous { count: usize },

    #[error("Port selection aborted")]
    Aborted,
}

/// Interactive source of a port choice.
pub trait PortChooser {
    /// Returns a 1-based index into `ports`, or `None` to give up.
    fn choose(&mut self, ports: &[LocalPort]) -> Option<usize>;
}

/// Resolves the GUID to bind.
///
/// - a concrete GUID is returned unchanged
/// - a single local port is always used
/// - GUID 0 picks the first connected port, else the first port
/// - the unresolved sentinel asks `chooser`, re-asking on out-of-range
///   answers; without a chooser the choice is ambiguous
pub fn resolve_bind_guid(
    requested: PortGuid,
    ports: &[LocalPort],
    chooser: Option<&mut dyn PortChooser>,
) -> Result<PortGuid, PortSelectError> {
    if requested.is_bindable() {
        return Ok(requested);
    }

    match ports {
        [] => Err(PortSelectError::NoLocalPorts),
        [only] => {
            info!(guid = %only.guid, "Using default GUID");
            Ok(only.guid)
        }
        _ if requested.is_zero() => {
            let port = ports
                .iter()
                .find(|p| p.state.is_connected())
                .unwrap_or(&ports[0]);
            info!(guid = %port.guid, state = %port.state, "Using first usable port");
            Ok(port.guid)
        }
        _ => {
            let Some(chooser) = chooser else {
                return Err(PortSelectError::Ambiguous { count: ports.len() });
            };
            loop {
                match chooser.choose(ports) {
                    Some(choice) if (1..=ports.len()).contains(&choice) => {
                        return Ok(ports[choice - 1].guid);
                    }
                    Some(choice) => warn!(choice, "Lame choice, try again"),
                    None => return Err(PortSelectError::Aborted),
                }
            }
        }
    }
}

/// Prompts on stdout and reads the answer from stdin.
#[derive(Debug, Default)]
pub struct StdinChooser;

impl PortChooser for StdinChooser {
    fn choose(&mut self, ports: &[LocalPort]) -> Option<usize> {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "\nChoose a local port number with which to bind:\n");
        for (i, port) in ports.iter().enumerate() {
            let lid = port
                .lid
                .map(|l| l.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "\t{}: GUID {}, lid {}, state {}",
                i + 1,
                port.guid,
                lid,
                port.state
            );
        }
        let _ = write!(out, "\nEnter choice (1-{}): ", ports.len());
        let _ = out.flush();
        drop(out);

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(answer.trim().parse().unwrap_or(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<Option<usize>>);

    impl PortChooser for Scripted {
        fn choose(&mut self, _ports: &[LocalPort]) -> Option<usize> {
            self.0.pop_front().flatten()
        }
    }

    fn port(guid: u64, state: LinkState) -> LocalPort {
        LocalPort {
            guid: PortGuid::new(guid),
            lid: None,
            state,
        }
    }

    #[test]
    fn test_explicit_guid_passes_through() {
        let guid = PortGuid::new(0x1234);
        assert_eq!(resolve_bind_guid(guid, &[], None), Ok(guid));
    }

    #[test]
    fn test_no_ports() {
        assert_eq!(
            resolve_bind_guid(PortGuid::ZERO, &[], None),
            Err(PortSelectError::NoLocalPorts)
        );
    }

    #[test]
    fn test_single_port_is_default() {
        let ports = [port(7, LinkState::Down)];
        assert_eq!(
            resolve_bind_guid(PortGuid::UNRESOLVED, &ports, None),
            Ok(PortGuid::new(7))
        );
    }

    #[test]
    fn test_zero_picks_first_connected() {
        let ports = [
            port(1, LinkState::Down),
            port(2, LinkState::Init),
            port(3, LinkState::Active),
        ];
        assert_eq!(resolve_bind_guid(PortGuid::ZERO, &ports, None), Ok(PortGuid::new(2)));

        let down = [port(1, LinkState::Down), port(2, LinkState::Down)];
        assert_eq!(resolve_bind_guid(PortGuid::ZERO, &down, None), Ok(PortGuid::new(1)));
    }

    #[test]
    fn test_unresolved_without_chooser_is_ambiguous() {
        let ports = [port(1, LinkState::Active), port(2, LinkState::Active)];
        assert_eq!(
            resolve_bind_guid(PortGuid::UNRESOLVED, &ports, None),
            Err(PortSelectError::Ambiguous { count: 2 })
        );
    }

    #[test]
    fn test_chooser_reprompts_on_bad_choice() {
        let ports = [port(1, LinkState::Active), port(2, LinkState::Active)];
        let mut chooser = Scripted(VecDeque::from([Some(0), Some(9), Some(2)]));
        assert_eq!(
            resolve_bind_guid(PortGuid::UNRESOLVED, &ports, Some(&mut chooser)),
            Ok(PortGuid::new(2))
        );

        let mut gave_up = Scripted(VecDeque::from([None]));
        assert_eq!(
            resolve_bind_guid(PortGuid::UNRESOLVED, &ports, Some(&mut gave_up)),
            Err(PortSelectError::Aborted)
        );
    }
}
