//! # Simulation Errors
//!
//! Worker trouble is mostly *not* an error: stale results are dropped and
//! dead threads trigger the main-thread fallback. What remains is setup
//! failure and bad input.

use starfall_core::{BufferError, CoreError};
use thiserror::Error;

/// Errors raised by the session and its configuration.
#[derive(Error, Debug)]
pub enum SimError {
    /// Pool or archetype error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Projectile buffer error.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// The config file is not valid TOML for [`SimConfig`](crate::SimConfig).
    #[error("failed to parse config: {0}")]
    Config(#[from] toml::de::Error),

    /// The config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The config parsed but holds unusable values.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A worker thread could not be started or died.
    #[error("worker unavailable: {0}")]
    WorkerUnavailable(String),
}

/// Result type for session operations.
pub type SimResult<T> = Result<T, SimError>;
