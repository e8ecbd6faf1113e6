//! # STARFALL Shared
//!
//! Plain data shared by the main simulation loop and the worker threads.
//!
//! ## CRITICAL RULE
//!
//! Everything in this crate must be `Send` and free of interior mutability.
//! If a type needs a lock to be shared, it does not belong here: the
//! simulation core moves data between threads, it never shares it.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod events;
pub mod math;
pub mod protocol;

pub use constants::{
    CACHE_REBUILD_INTERVAL_MS, DEFAULT_DRAG, DEFAULT_FIRE_CONE_DEGREES, SNAPSHOT_RATE,
    STALENESS_TOLERANCE_MS, TICK_RATE,
};
pub use events::{EventType, ExpiryReason, SimEvent};
pub use math::{wrap_angle, Vec3};
pub use protocol::{
    Color, EntitySnapshot, FireRequest, MissileType, ProjectileFlags, ProjectileRecord,
    WeaponType, SNAPSHOT_AGENT_DRIVEN,
};
