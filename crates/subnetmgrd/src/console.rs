//! Local operator console.
//!
//! Reads commands from stdin on a background task and forwards them to the
//! manager loop over a channel. Only a minimal vocabulary is understood.

use std::future;
use std::str::FromStr;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const HELP: &str = "Commands:\n  resweep [heavy|light]  request a sweep (default light)\n  status                 show manager state\n  help                   show this text";

/// A parsed console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Resweep { heavy: bool },
    Status,
    Help,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let command = words.next().unwrap_or_default();
        let arg = words.next();
        if let Some(extra) = words.next() {
            return Err(format!("unexpected argument '{}'", extra));
        }

        match (command, arg) {
            ("resweep", None | Some("light")) => Ok(ConsoleCommand::Resweep { heavy: false }),
            ("resweep", Some("heavy")) => Ok(ConsoleCommand::Resweep { heavy: true }),
            ("resweep", Some(other)) => Err(format!("resweep: unknown mode '{}'", other)),
            ("status", None) => Ok(ConsoleCommand::Status),
            ("help", None) | ("?", None) => Ok(ConsoleCommand::Help),
            ("", _) => Err("empty command".to_string()),
            (other, _) => Err(format!("unknown command '{}'", other)),
        }
    }
}

/// Receiving end of the console, polled by the manager loop.
#[derive(Debug, Default)]
pub struct Console {
    rx: Option<mpsc::Receiver<ConsoleCommand>>,
}

impl Console {
    /// A console that never yields a command.
    pub fn disabled() -> Self {
        Self { rx: None }
    }

    pub fn from_channel(rx: mpsc::Receiver<ConsoleCommand>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Starts reading stdin on a background task.
    pub fn spawn_local() -> Self {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match line.parse::<ConsoleCommand>() {
                        Ok(command) => {
                            if tx.send(command).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Console: {}. Type 'help'.", e),
                    },
                    Ok(None) => {
                        debug!("Console input closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Console read failed");
                        break;
                    }
                }
            }
        });
        Self::from_channel(rx)
    }

    /// Next command. Pends forever once the console is closed or disabled.
    pub async fn next(&mut self) -> ConsoleCommand {
        if let Some(rx) = &mut self.rx {
            if let Some(command) = rx.recv().await {
                return command;
            }
            self.rx = None;
        }
        future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_commands() {
        assert_eq!("resweep".parse(), Ok(ConsoleCommand::Resweep { heavy: false }));
        assert_eq!("resweep light".parse(), Ok(ConsoleCommand::Resweep { heavy: false }));
        assert_eq!(
            "  resweep   heavy ".parse(),
            Ok(ConsoleCommand::Resweep { heavy: true })
        );
        assert_eq!("status".parse(), Ok(ConsoleCommand::Status));
        assert_eq!("help".parse(), Ok(ConsoleCommand::Help));
        assert!("resweep medium".parse::<ConsoleCommand>().is_err());
        assert!("status now".parse::<ConsoleCommand>().is_err());
        assert!("reboot".parse::<ConsoleCommand>().is_err());
        assert!("".parse::<ConsoleCommand>().is_err());
    }

    #[tokio::test]
    async fn test_channel_console_forwards_then_pends() {
        let (tx, rx) = mpsc::channel(4);
        let mut console = Console::from_channel(rx);
        tx.send(ConsoleCommand::Status).await.unwrap();
        drop(tx);

        assert_eq!(console.next().await, ConsoleCommand::Status);
        let closed = tokio::time::timeout(Duration::from_millis(20), console.next()).await;
        assert!(closed.is_err());
    }

    #[tokio::test]
    async fn test_disabled_console_pends() {
        let mut console = Console::disabled();
        let got = tokio::time::timeout(Duration::from_millis(20), console.next()).await;
        assert!(got.is_err());
    }
}
