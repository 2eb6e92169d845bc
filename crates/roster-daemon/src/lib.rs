//! roster-daemon library: Exposes internal modules for testing.
//!
//! This is a thin library layer over the daemon components,
//! allowing integration tests to access internal types.

pub mod command;
pub mod config;
pub mod http;
pub mod sink;

// Re-export key types for convenience
pub use command::{Command, CommandError, CommandReader};
pub use config::{Args, PeerSpec, PeerSpecError};
pub use http::HttpFetcher;
pub use sink::TracingSink;
