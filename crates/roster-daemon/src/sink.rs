//! Visibility sink that reports decisions through tracing.

use roster_core::VisibilitySink;
use std::collections::HashMap;
use tracing::info;

/// Logs every visibility change and remembers the last state per target.
#[derive(Debug, Default)]
pub struct TracingSink {
    /// Participant this sink belongs to, for log context
    owner: String,
    visible: HashMap<String, bool>,
    applied: usize,
}

impl TracingSink {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            ..Self::default()
        }
    }

    /// Last visibility applied to `target`.
    pub fn is_visible(&self, target: &str) -> Option<bool> {
        self.visible.get(target).copied()
    }

    /// Number of times the decision was applied.
    pub fn applied(&self) -> usize {
        self.applied
    }
}

impl VisibilitySink for TracingSink {
    fn apply_visibility(&mut self, target: &str, visible: bool) {
        self.applied += 1;
        let previous = self.visible.insert(target.to_string(), visible);
        if previous != Some(visible) {
            info!(
                "[{}] {} is now {}",
                self.owner,
                target,
                if visible { "visible" } else { "hidden" }
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_last_state() {
        let mut sink = TracingSink::new("p1");
        assert_eq!(sink.is_visible("door"), None);

        sink.apply_visibility("door", false);
        sink.apply_visibility("door", true);
        sink.apply_visibility("door", true);

        assert_eq!(sink.is_visible("door"), Some(true));
        assert_eq!(sink.applied(), 3);
    }
}
