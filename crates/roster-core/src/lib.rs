//! roster-core: Replicated whitelist refresh protocol.
//!
//! A single coordinator fetches a remote text list and replicates it to every
//! participant of a session. Each participant then derives its own membership
//! decision from the replicated value without further coordination.
//!
//! This crate provides:
//! - Whitelist parsing and the membership decision
//! - The replicated single-string store with change notification
//! - The coordinator-only refresh scheduler
//! - `Fetcher`, `SessionPlatform` and `VisibilitySink` trait seams
//! - An in-process session platform for tests and local runs

pub mod config;
pub mod decision;
pub mod error;
pub mod events;
pub mod fetch;
pub mod local;
pub mod participant;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod whitelist;

pub use config::{ConfigError, RosterConfig};
pub use decision::is_member;
pub use error::RosterError;
pub use events::{ChangeSource, EventBus, StoreEvent, Subscription};
pub use fetch::{FetchCompletion, FetchError, FetchRequest, Fetcher, InMemoryFetcher};
pub use local::{LocalHandle, LocalSession};
pub use participant::{Participant, ParticipantState, ParticipantStatus};
pub use protocol::{ReplicationMessage, SessionMessage};
pub use scheduler::{CycleId, RefreshScheduler, SchedulerPhase, Trigger};
pub use session::{Role, SessionPlatform, VisibilitySink};
pub use store::{Replica, StoreError};
pub use whitelist::Whitelist;
