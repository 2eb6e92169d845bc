//! Replication protocol for the session's single replicated field.
//!
//! - Message types exchanged between replicas
//! - Bincode encoding with a size limit

pub mod encoding;
pub mod message;

pub use encoding::{CodecError, MAX_MESSAGE_SIZE, MAX_VALUE_SIZE, decode, encode};
pub use message::{ReplicationMessage, SessionMessage};
