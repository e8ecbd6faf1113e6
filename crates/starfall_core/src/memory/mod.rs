//! # Memory Management
//!
//! Pre-warmed entity pools and the fixed-capacity projectile buffer.
//!
//! ## Design Philosophy
//!
//! Storage is sized once at startup. During play:
//! - Entities are recycled through per-archetype free stacks
//! - Projectiles live in packed records with a free-slot list
//! - Growth past the configured size is possible for entities, and logged

mod entity;
mod pool;
mod projectile_buffer;

pub use entity::{Entity, EntityId, SpawnOverrides};
pub use pool::{DamageOutcome, EntityPool, PoolStats};
pub use projectile_buffer::{hash_projectile_name, Projectile, ProjectileBuffer, ProjectileKey};
