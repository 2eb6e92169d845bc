//! Participant configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default cooldown between scheduled refreshes.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

/// Default timeout for a single fetch.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Configuration shared by every participant of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RosterConfig {
    /// URL of the plain-text whitelist document
    pub source_url: String,
    /// Scene container whose visibility follows the membership decision
    pub target: Option<String>,
    /// Seconds between scheduled refreshes on the coordinator
    pub refresh_interval_secs: u64,
    /// Seconds before an outbound fetch is abandoned by the fetcher
    pub fetch_timeout_secs: u64,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            source_url: String::new(),
            target: None,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl RosterConfig {
    /// Create a configuration with default timings.
    pub fn new(source_url: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            target: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Check that a refresh cycle can run with this configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err(ConfigError::MissingTarget);
        }
        if self.source_url.trim().is_empty() {
            return Err(ConfigError::EmptySourceUrl);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("No target container configured")]
    MissingTarget,
    #[error("Source URL is empty")]
    EmptySourceUrl,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RosterConfig::default();
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert!(config.target.is_none());
    }

    #[test]
    fn test_validate() {
        assert!(RosterConfig::new("https://example.com/list.txt", "door").validate().is_ok());
        assert_eq!(
            RosterConfig::new("", "door").validate(),
            Err(ConfigError::EmptySourceUrl)
        );
        assert_eq!(
            RosterConfig::new("https://example.com", " ").validate(),
            Err(ConfigError::MissingTarget)
        );
        let mut config = RosterConfig::new("https://example.com", "door");
        config.target = None;
        assert_eq!(config.validate(), Err(ConfigError::MissingTarget));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: RosterConfig =
            serde_json::from_str(r#"{"sourceUrl":"https://example.com/w.txt","target":"vip"}"#)
                .unwrap();
        assert_eq!(config.source_url, "https://example.com/w.txt");
        assert_eq!(config.target.as_deref(), Some("vip"));
        assert_eq!(config.refresh_interval_secs, DEFAULT_REFRESH_INTERVAL_SECS);
    }
}
