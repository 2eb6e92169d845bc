//! Top-level error kinds.
//!
//! Nothing here is fatal. Every failure degrades the local participant to
//! "not a member" and the refresh loop keeps running; errors only surface
//! through logging.

use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::protocol::CodecError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(FetchError),

    /// Completion for a URL that is no longer configured. Discarded silently.
    #[error("Stale completion for {url}")]
    StaleCompletion { url: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl From<FetchError> for RosterError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::EmptyUrl => RosterError::Configuration(ConfigError::EmptySourceUrl),
            other => RosterError::Fetch(other),
        }
    }
}

impl RosterError {
    /// Whether this error should be logged (stale completions are not).
    pub fn is_reportable(&self) -> bool {
        !matches!(self, RosterError::StaleCompletion { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_url_is_configuration_error() {
        let err: RosterError = FetchError::EmptyUrl.into();
        assert!(matches!(
            err,
            RosterError::Configuration(ConfigError::EmptySourceUrl)
        ));
    }

    #[test]
    fn test_transport_is_fetch_error() {
        let err: RosterError = FetchError::Transport("connection refused".into()).into();
        assert!(matches!(err, RosterError::Fetch(_)));
        assert!(err.is_reportable());
    }

    #[test]
    fn test_stale_not_reportable() {
        let err = RosterError::StaleCompletion {
            url: "https://old.example".into(),
        };
        assert!(!err.is_reportable());
    }
}
