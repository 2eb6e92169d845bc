//! Command-line configuration.

use clap::Parser;
use roster_core::RosterConfig;
use roster_core::config::{DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_REFRESH_INTERVAL_SECS};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Parser, Debug, Clone)]
#[command(name = "roster-daemon")]
#[command(about = "Session whitelist daemon")]
pub struct Args {
    /// URL of the plain-text whitelist
    #[arg(short, long, env = "ROSTER_URL")]
    pub url: String,

    /// Identity of the local participant (unresolved if omitted)
    #[arg(short, long, env = "ROSTER_IDENTITY")]
    pub identity: Option<String>,

    /// Session-scoped ID of the local participant (generated if not provided)
    #[arg(long)]
    pub participant_id: Option<String>,

    /// Simulated remote participant, as `id` or `id=identity` (repeatable)
    #[arg(long = "peer")]
    pub peers: Vec<PeerSpec>,

    /// Seconds between scheduled refreshes
    #[arg(long, default_value_t = DEFAULT_REFRESH_INTERVAL_SECS)]
    pub interval_secs: u64,

    /// Container whose visibility follows the membership decision
    #[arg(short, long)]
    pub target: Option<String>,

    /// Seconds before a fetch is abandoned
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}

impl Args {
    /// Session configuration shared by every hosted participant.
    pub fn roster_config(&self) -> RosterConfig {
        RosterConfig {
            source_url: self.url.clone(),
            target: self.target.clone(),
            refresh_interval_secs: self.interval_secs,
            fetch_timeout_secs: self.timeout_secs,
        }
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn default_filter(&self) -> &'static str {
        if self.verbose {
            "debug,roster_daemon=debug,roster_core=debug"
        } else {
            "info,roster_daemon=info,roster_core=info"
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerSpecError {
    #[error("Participant ID is empty")]
    EmptyId,
    #[error("Identity is empty for participant {0}")]
    EmptyIdentity(String),
}

/// A participant to host in the local session.
///
/// `id` alone uses the ID as identity; `id=identity` sets it explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSpec {
    pub id: String,
    pub identity: String,
}

impl FromStr for PeerSpec {
    type Err = PeerSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, identity) = match s.split_once('=') {
            Some((id, identity)) => (id.trim(), identity.trim()),
            None => (s.trim(), s.trim()),
        };
        if id.is_empty() {
            return Err(PeerSpecError::EmptyId);
        }
        if identity.is_empty() {
            return Err(PeerSpecError::EmptyIdentity(id.to_string()));
        }
        Ok(Self {
            id: id.to_string(),
            identity: identity.to_string(),
        })
    }
}

impl Display for PeerSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.id == self.identity {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{}={}", self.id, self.identity)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_spec_id_only() {
        let peer: PeerSpec = "alice".parse().unwrap();
        assert_eq!(peer.id, "alice");
        assert_eq!(peer.identity, "alice");
        assert_eq!(peer.to_string(), "alice");
    }

    #[test]
    fn test_peer_spec_with_identity() {
        let peer: PeerSpec = "p2 = Bob".parse().unwrap();
        assert_eq!(peer.id, "p2");
        assert_eq!(peer.identity, "Bob");
        assert_eq!(peer.to_string(), "p2=Bob");
    }

    #[test]
    fn test_peer_spec_errors() {
        assert_eq!("".parse::<PeerSpec>(), Err(PeerSpecError::EmptyId));
        assert_eq!("=bob".parse::<PeerSpec>(), Err(PeerSpecError::EmptyId));
        assert_eq!(
            "p2=".parse::<PeerSpec>(),
            Err(PeerSpecError::EmptyIdentity("p2".into()))
        );
    }

    #[test]
    fn test_args_to_config() {
        let args = Args::parse_from([
            "roster-daemon",
            "--url",
            "https://example.com/list.txt",
            "--target",
            "door",
            "--interval-secs",
            "30",
            "--peer",
            "p2=bob",
            "--peer",
            "carol",
        ]);

        let config = args.roster_config();
        assert_eq!(config.source_url, "https://example.com/list.txt");
        assert_eq!(config.target.as_deref(), Some("door"));
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(args.peers.len(), 2);
        assert_eq!(args.peers[1].identity, "carol");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_target_is_allowed_at_parse_time() {
        let args = Args::parse_from(["roster-daemon", "--url", "https://example.com/list.txt"]);
        assert!(args.target.is_none());
        assert!(args.roster_config().validate().is_err());
    }
}
