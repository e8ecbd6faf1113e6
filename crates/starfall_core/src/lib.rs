//! # STARFALL Core
//!
//! Pooled entities and packed projectile storage for the simulation loop.
//!
//! ## Architecture Rules
//!
//! 1. **Pre-warmed pools** - Entities are acquired and released, never freed
//! 2. **Packed projectiles** - Fixed-stride records in one contiguous buffer
//! 3. **Move, don't share** - Buffers cross threads by transfer, never by lock
//!
//! ## Example
//!
//! ```rust,ignore
//! use starfall_core::{ArchetypeRegistry, EntityPool, SpawnOverrides};
//!
//! let mut pool = EntityPool::new(ArchetypeRegistry::builtin());
//! let scout = pool.registry().require("scout")?;
//! let id = pool.acquire(scout, SpawnOverrides::default())?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archetype;
pub mod error;
pub mod memory;
pub mod sync;

pub use archetype::{ArchetypeId, ArchetypeRegistry, ArchetypeTemplate, Loadout};
pub use error::{BufferError, BufferResult, CoreError, CoreResult};
pub use memory::{
    hash_projectile_name, DamageOutcome, Entity, EntityId, EntityPool, PoolStats, Projectile,
    ProjectileBuffer, ProjectileKey, SpawnOverrides,
};
pub use sync::{BufferLease, PingPongBuffers};
