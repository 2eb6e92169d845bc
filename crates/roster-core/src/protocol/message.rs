//! Messages carrying the replicated value between participants.

use serde::{Deserialize, Serialize};

/// One write of the replicated value.
///
/// Writes are ordered by `(epoch, revision, value)`. Each newly promoted
/// coordinator claims a higher epoch, so its writes order after anything a
/// previous coordinator still has in flight. The value breaks ties between
/// writers that claimed the same epoch, so every replica settles on the
/// same write. A replica applies only writes ordered after its own, so
/// redelivered or stale messages have no effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationMessage {
    /// Coordinator term that made this write
    pub epoch: u64,
    /// Revision of this write
    pub revision: u64,
    /// The full replicated text (copied, never referenced)
    pub value: String,
}

impl ReplicationMessage {
    /// A write in the initial epoch.
    pub fn new(revision: u64, value: impl Into<String>) -> Self {
        Self {
            epoch: 0,
            revision,
            value: value.into(),
        }
    }

    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    /// Key that totally orders writes.
    pub fn order_key(&self) -> (u64, u64, &str) {
        (self.epoch, self.revision, &self.value)
    }

    /// Whether this write orders after `other`.
    pub fn supersedes(&self, other: &ReplicationMessage) -> bool {
        self.order_key() > other.order_key()
    }
}

/// Messages delivered by the session platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMessage {
    /// A write made by the coordinator
    Update(ReplicationMessage),

    /// Latest value handed to a participant as part of joining
    Snapshot(ReplicationMessage),
}

impl SessionMessage {
    pub fn replication(&self) -> &ReplicationMessage {
        match self {
            SessionMessage::Update(msg) | SessionMessage::Snapshot(msg) => msg,
        }
    }

    /// Protocol message type name (for logging).
    pub fn kind(&self) -> &'static str {
        match self {
            SessionMessage::Update(_) => "Update",
            SessionMessage::Snapshot(_) => "Snapshot",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_orders_before_revision() {
        let old_term = ReplicationMessage::new(9, "alice");
        let new_term = ReplicationMessage::new(1, "bob").with_epoch(1);
        assert!(new_term.supersedes(&old_term));
        assert!(!old_term.supersedes(&new_term));
    }

    #[test]
    fn test_value_breaks_ties() {
        let a = ReplicationMessage::new(1, "alice").with_epoch(1);
        let b = ReplicationMessage::new(1, "bob").with_epoch(1);
        assert!(b.supersedes(&a));
        assert!(!a.supersedes(&b));
        assert!(!a.supersedes(&a.clone()), "a duplicate never supersedes");
    }
}
