//! Core types and configuration for the procwatch process supervisor.
//!
//! Everything here crosses the boundary between the supervisor and whatever
//! embeds it (an HTTP/WebSocket adapter, a CLI), so all types carry serde
//! derives and no tokio machinery.

pub mod config;
pub mod error;
pub mod types;

pub use config::{LogsConfig, RestartConfig, StatsConfig, StopConfig, SupervisorConfig};
pub use error::{Error, Result};
pub use types::*;
