//! # Core Error Types
//!
//! All errors that can occur in the pools and buffers.
//!
//! Note what is *not* here: unknown entity or projectile ids are not errors.
//! Those operations answer `false` / `None` and the caller moves on.

use thiserror::Error;

/// Errors raised by the archetype registry and the entity pool.
#[derive(Error, Debug)]
pub enum CoreError {
    /// No template is registered under this name or id.
    #[error("unknown archetype: {0}")]
    UnknownArchetype(String),

    /// Two templates share one name.
    #[error("duplicate archetype: {0}")]
    DuplicateArchetype(String),

    /// A template failed validation.
    #[error("invalid archetype {name}: {reason}")]
    InvalidArchetype {
        /// Template name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The archetype table could not be parsed.
    #[error("failed to parse archetype table: {0}")]
    ArchetypeParse(#[from] toml::de::Error),

    /// A pool grew past the addressable slot range.
    #[error("pool for {0} cannot grow further")]
    PoolOverflow(String),

    /// More archetypes than the packed archetype field can address.
    #[error("archetype table full: at most {max} archetypes")]
    TooManyArchetypes {
        /// Maximum number of templates.
        max: usize,
    },
}

/// Result type for pool and registry operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the projectile buffer and its exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Every slot is live. Nothing was written.
    #[error("projectile buffer full: capacity {capacity}")]
    Full {
        /// Fixed buffer capacity.
        capacity: usize,
    },

    /// Another live record already uses this id.
    #[error("projectile id {0} already in use")]
    DuplicateId(u32),

    /// The spare buffer is with a worker; only one lease may be out.
    #[error("projectile buffer already lent to a worker")]
    InTransit,

    /// Ping-pong buffers must be equally sized.
    #[error("buffer capacity mismatch: expected {expected}, got {actual}")]
    CapacityMismatch {
        /// Capacity of the destination.
        expected: usize,
        /// Capacity of the source.
        actual: usize,
    },
}

/// Result type for buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;
