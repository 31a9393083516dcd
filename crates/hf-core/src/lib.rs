//! Shared foundation for the holdfast terminal bridge.
//!
//! Holds the types every other crate speaks (`AgentId`, `Geometry`),
//! configuration loading from `~/.holdfast/config.toml`, and the
//! tracing bootstrap used by binaries and tests.

pub mod config;
pub mod logging;
pub mod types;

pub use config::{Config, ConfigError};
pub use types::{AgentId, Geometry};
