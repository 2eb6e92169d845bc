//! Collaborator seams: the session platform and the visibility sink.
//!
//! Implementations:
//! - `LocalHandle` - In-process session platform (see [`crate::local`])
//! - `TracingSink` (in roster-daemon) - Logs visibility changes

use crate::protocol::ReplicationMessage;
use serde::Serialize;

/// A participant's role, derived per tick from the session platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    /// Fetches the remote list and writes the replicated value
    Coordinator,
    /// Only reads and reacts to the replicated value
    Participant,
}

impl Role {
    pub fn from_flag(is_coordinator: bool) -> Self {
        if is_coordinator {
            Role::Coordinator
        } else {
            Role::Participant
        }
    }

    pub fn is_coordinator(&self) -> bool {
        matches!(self, Role::Coordinator)
    }
}

/// Session platform as seen by one participant.
///
/// Role arbitration and presence belong to the platform. Role is queried
/// synchronously; acquiring the coordinator role and participant joins are
/// delivered as events on [`crate::Participant`].
pub trait SessionPlatform {
    /// Whether this participant currently holds the coordinator role.
    fn is_coordinator(&self) -> bool;

    /// The local participant's identity, once the platform can resolve it.
    fn local_identity(&self) -> Option<String>;

    /// Hand a coordinator write to the transport for delivery to every
    /// other participant.
    fn replicate(&self, message: ReplicationMessage);
}

/// Applies the membership decision to scene state.
pub trait VisibilitySink {
    fn apply_visibility(&mut self, target: &str, visible: bool);
}

impl<S: VisibilitySink + ?Sized> VisibilitySink for Box<S> {
    fn apply_visibility(&mut self, target: &str, visible: bool) {
        (**self).apply_visibility(target, visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_flag() {
        assert_eq!(Role::from_flag(true), Role::Coordinator);
        assert_eq!(Role::from_flag(false), Role::Participant);
        assert!(Role::Coordinator.is_coordinator());
        assert!(!Role::Participant.is_coordinator());
    }

    #[test]
    fn test_boxed_sink_forwards() {
        struct Recorder(Vec<(String, bool)>);
        impl VisibilitySink for Recorder {
            fn apply_visibility(&mut self, target: &str, visible: bool) {
                self.0.push((target.to_string(), visible));
            }
        }

        let mut sink: Box<Recorder> = Box::new(Recorder(Vec::new()));
        sink.apply_visibility("stage", true);
        assert_eq!(sink.0, vec![("stage".to_string(), true)]);
    }
}
