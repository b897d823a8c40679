//! collab-server
//!
//! Multi-client async server for collaborative rooms. Speaks JSON
//! envelopes over newline-delimited TCP and over WebSocket on one port.

pub mod config;
pub mod types;
pub mod server;

// these are internal modules, not re-exported
mod client;
mod engine_task;

pub use config::Config;
