//! Operator commands read line by line from stdin.

use crate::config::{PeerSpec, PeerSpecError};
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A command for the running daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Manual refresh on the coordinator
    Refresh,
    /// Add a simulated participant
    Join(PeerSpec),
    /// Remove a participant by ID
    Leave(String),
    /// Print every participant's status as JSON
    Status,
    /// Replace the whitelist URL
    Url(String),
    /// Stop the daemon
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("Missing argument for {0}")]
    MissingArgument(&'static str),
    #[error("Invalid participant: {0}")]
    InvalidPeer(#[from] PeerSpecError),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        let argument = |command: &'static str| {
            if rest.is_empty() {
                Err(CommandError::MissingArgument(command))
            } else {
                Ok(rest.to_string())
            }
        };

        match name {
            "refresh" => Ok(Command::Refresh),
            "join" => Ok(Command::Join(argument("join")?.parse()?)),
            "leave" => Ok(Command::Leave(argument("leave")?)),
            "status" => Ok(Command::Status),
            "url" => Ok(Command::Url(argument("url")?)),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Reads commands in a background task.
pub struct CommandReader {
    /// Receiver for parsed commands
    command_rx: mpsc::UnboundedReceiver<Command>,
    _task: JoinHandle<()>,
}

impl CommandReader {
    /// Read commands from the process's stdin.
    pub fn stdin() -> Self {
        Self::spawn(BufReader::new(tokio::io::stdin()))
    }

    /// Read commands from any line source. Blank lines are skipped and
    /// unparseable ones are logged.
    pub fn spawn<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!("Command input closed");
                        return;
                    }
                    Err(e) => {
                        warn!("Failed to read command: {}", e);
                        return;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                match line.parse::<Command>() {
                    Ok(command) => {
                        if command_tx.send(command).is_err() {
                            // Receiver dropped
                            return;
                        }
                    }
                    Err(e) => warn!("{}", e),
                }
            }
        });

        Self {
            command_rx,
            _task: task,
        }
    }

    /// Get the receiver for commands.
    pub fn command_rx(&mut self) -> &mut mpsc::UnboundedReceiver<Command> {
        &mut self.command_rx
    }
}
