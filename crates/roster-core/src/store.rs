//! Replicated Store: one participant's replica of the session's string field.
//!
//! Only the coordinator writes. A write that does not change the value is
//! dropped before it reaches the transport, except for the first write after
//! claiming a new epoch. Replication is at-least-once, so incoming messages
//! are filtered by write order and duplicate deliveries have no effect.

use crate::events::{ChangeSource, EventBus, StoreEvent, Subscription};
use crate::protocol::ReplicationMessage;
use crate::session::Role;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Only the coordinator may write the replicated value")]
    NotCoordinator,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A participant's copy of the replicated value.
pub struct Replica {
    value: String,
    epoch: u64,
    revision: u64,
    /// Set by `claim_epoch`; the next write replicates even if unchanged
    publish_pending: bool,
    events: Arc<EventBus>,
}

impl Default for Replica {
    fn default() -> Self {
        Self {
            value: String::new(),
            epoch: 0,
            revision: 0,
            publish_pending: false,
            events: Arc::new(EventBus::new()),
        }
    }
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("epoch", &self.epoch)
            .field("revision", &self.revision)
            .field("value_len", &self.value.len())
            .finish()
    }
}

impl Replica {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_value(&self) -> &str {
        &self.value
    }

    /// Revision of the write currently held (0 = nothing replicated yet).
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Coordinator epoch of the write currently held.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Register an `onValueChanged` callback.
    pub fn subscribe(
        &self,
        callback: impl Fn(StoreEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.events.subscribe(callback)
    }

    /// Start a new coordinator epoch above everything seen so far.
    ///
    /// Writes from a previous coordinator that are still in flight order
    /// before this replica's next write. That write is replicated even when
    /// it leaves the value unchanged, so replicas that apply the in-flight
    /// writes are brought back in line.
    pub fn claim_epoch(&mut self) {
        self.epoch += 1;
        self.publish_pending = true;
        debug!("Claimed epoch {} at revision {}", self.epoch, self.revision);
    }

    /// Write a new value as the coordinator.
    ///
    /// Returns the message to replicate, or `None` when `new_value` equals the
    /// current value and no epoch claim is pending. A write that leaves the
    /// value unchanged never emits a change notification.
    pub fn set_value(&mut self, role: Role, new_value: &str) -> Result<Option<ReplicationMessage>> {
        if !role.is_coordinator() {
            return Err(StoreError::NotCoordinator);
        }
        let changed = self.value != new_value;
        if !changed && !self.publish_pending {
            debug!("Replicated value unchanged at revision {}", self.revision);
            return Ok(None);
        }

        self.revision += 1;
        self.publish_pending = false;
        if changed {
            self.value = new_value.to_string();
            self.notify(ChangeSource::LocalEcho);
        }
        Ok(Some(self.snapshot()))
    }

    /// Apply a replication event.
    ///
    /// Returns true if the value transitioned.
    pub fn apply(&mut self, message: &ReplicationMessage) -> bool {
        self.apply_from(message, ChangeSource::Replication)
    }

    /// Apply the late-join snapshot.
    ///
    /// Returns true if the value transitioned. Callers must not rely on a
    /// change event here: a snapshot equal to the local value emits nothing.
    pub fn apply_snapshot(&mut self, message: &ReplicationMessage) -> bool {
        self.apply_from(message, ChangeSource::Snapshot)
    }

    /// The current value as a replication message (late-join delivery).
    pub fn snapshot(&self) -> ReplicationMessage {
        ReplicationMessage::new(self.revision, self.value.clone()).with_epoch(self.epoch)
    }

    /// Drop all replicated state (reconnect). Subscriptions stay registered.
    pub fn reset(&mut self) {
        self.value.clear();
        self.epoch = 0;
        self.revision = 0;
        self.publish_pending = false;
    }

    fn apply_from(&mut self, message: &ReplicationMessage, source: ChangeSource) -> bool {
        let held = (self.epoch, self.revision, self.value.as_str());
        if message.order_key() <= held {
            debug!(
                "Ignoring {:?} at {}.{} (holding {}.{})",
                source, message.epoch, message.revision, self.epoch, self.revision
            );
            return false;
        }

        self.epoch = message.epoch;
        self.revision = message.revision;
        if self.value == message.value {
            return false;
        }

        self.value = message.value.clone();
        self.notify(source);
        true
    }

    fn notify(&self, source: ChangeSource) {
        self.events.emit(StoreEvent::ValueChanged {
            revision: self.revision,
            value: self.value.clone(),
            source,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording(replica: &Replica) -> (Subscription, Arc<Mutex<Vec<StoreEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sub = replica.subscribe(move |event| seen_clone.lock().unwrap().push(event));
        (sub, seen)
    }

    #[test]
    fn test_participant_cannot_write() {
        let mut replica = Replica::new();
        assert_eq!(
            replica.set_value(Role::Participant, "alice"),
            Err(StoreError::NotCoordinator)
        );
        assert_eq!(replica.current_value(), "");
        assert_eq!(replica.revision(), 0);
    }

    #[test]
    fn test_write_emits_local_echo() {
        let mut replica = Replica::new();
        let (_sub, seen) = recording(&replica);

        let msg = replica.set_value(Role::Coordinator, "alice").unwrap().unwrap();
        assert_eq!(msg, ReplicationMessage::new(1, "alice"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            StoreEvent::ValueChanged { source, value, .. } => {
                assert_eq!(*source, ChangeSource::LocalEcho);
                assert_eq!(value, "alice");
            }
        }
    }

    #[test]
    fn test_same_value_write_is_noop() {
        let mut replica = Replica::new();
        let (_sub, seen) = recording(&replica);

        assert!(replica.set_value(Role::Coordinator, "alice").unwrap().is_some());
        assert!(replica.set_value(Role::Coordinator, "alice").unwrap().is_none());

        assert_eq!(replica.revision(), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_delivery_applies_once() {
        let mut replica = Replica::new();
        let (_sub, seen) = recording(&replica);
        let msg = ReplicationMessage::new(1, "alice");

        assert!(replica.apply(&msg));
        assert!(!replica.apply(&msg));

        assert_eq!(replica.current_value(), "alice");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_stale_revision_ignored() {
        let mut replica = Replica::new();
        replica.apply(&ReplicationMessage::new(3, "new"));
        assert!(!replica.apply(&ReplicationMessage::new(2, "old")));
        assert_eq!(replica.current_value(), "new");
    }

    #[test]
    fn test_newer_revision_same_value_no_event() {
        let mut replica = Replica::new();
        let (_sub, seen) = recording(&replica);
        replica.apply(&ReplicationMessage::new(1, "alice"));
        assert!(!replica.apply(&ReplicationMessage::new(2, "alice")));
        assert_eq!(replica.revision(), 2);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_source() {
        let mut replica = Replica::new();
        let (_sub, seen) = recording(&replica);
        assert!(replica.apply_snapshot(&ReplicationMessage::new(5, "alice\nbob")));
        match &seen.lock().unwrap()[0] {
            StoreEvent::ValueChanged { source, revision, .. } => {
                assert_eq!(*source, ChangeSource::Snapshot);
                assert_eq!(*revision, 5);
            }
        }
    }

    #[test]
    fn test_new_coordinator_continues_revisions() {
        // A participant promoted to coordinator writes after the last revision it saw
        let mut replica = Replica::new();
        replica.apply(&ReplicationMessage::new(4, "alice"));
        let msg = replica.set_value(Role::Coordinator, "bob").unwrap().unwrap();
        assert_eq!(msg.revision, 5);
    }

    #[test]
    fn test_claimed_epoch_wins_over_in_flight_write() {
        // Promoted at revision 1 while the old coordinator's revision 2 is in flight
        let mut replica = Replica::new();
        replica.apply(&ReplicationMessage::new(1, "alice"));
        replica.claim_epoch();
        let msg = replica.set_value(Role::Coordinator, "bob").unwrap().unwrap();
        assert_eq!((msg.epoch, msg.revision), (1, 2));

        assert!(!replica.apply(&ReplicationMessage::new(2, "carol")));
        assert_eq!(replica.current_value(), "bob");

        // A replica that saw the in-flight write first still ends on ours
        let mut other = Replica::new();
        other.apply(&ReplicationMessage::new(2, "carol"));
        assert!(other.apply(&msg));
        assert_eq!(other.current_value(), "bob");
    }

    #[test]
    fn test_claimed_epoch_publishes_unchanged_value_once() {
        let mut replica = Replica::new();
        let (_sub, seen) = recording(&replica);
        replica.apply(&ReplicationMessage::new(3, "alice"));
        replica.claim_epoch();

        let msg = replica.set_value(Role::Coordinator, "alice").unwrap();
        assert_eq!(msg, Some(ReplicationMessage::new(4, "alice").with_epoch(1)));
        assert!(replica.set_value(Role::Coordinator, "alice").unwrap().is_none());
        // Only the replicated write changed the value
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_same_order_writes_converge_on_one_value() {
        let a = ReplicationMessage::new(1, "alice").with_epoch(1);
        let b = ReplicationMessage::new(1, "bob").with_epoch(1);

        let mut first = Replica::new();
        first.apply(&a);
        first.apply(&b);
        let mut second = Replica::new();
        second.apply(&b);
        second.apply(&a);

        assert_eq!(first.current_value(), second.current_value());
    }

    #[test]
    fn test_reset() {
        let mut replica = Replica::new();
        replica.apply(&ReplicationMessage::new(4, "alice"));
        replica.claim_epoch();
        replica.reset();
        assert_eq!(replica.current_value(), "");
        assert_eq!(replica.revision(), 0);
        assert_eq!(replica.epoch(), 0);
    }
}
