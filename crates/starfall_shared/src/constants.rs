//! # Simulation Constants
//!
//! Defaults baked into the binary. Every one of these can be overridden by
//! the session configuration; they exist so that a bare `Default` session
//! behaves like the shipped game.

// =============================================================================
// LOOP CADENCE
// =============================================================================

/// Main simulation tick rate (updates per second).
pub const TICK_RATE: u32 = 60;

/// Outbound worker snapshot rate (snapshots per second).
///
/// Deliberately lower than [`TICK_RATE`] so expensive computation is
/// decoupled from frame pacing.
pub const SNAPSHOT_RATE: u32 = 30;

/// Maximum age of a worker result that may still be applied (ms).
pub const STALENESS_TOLERANCE_MS: u64 = 100;

/// Minimum interval between active-entity cache rebuilds (ms).
pub const CACHE_REBUILD_INTERVAL_MS: u64 = 16;

// =============================================================================
// MOVEMENT
// =============================================================================

/// Per-tick velocity damping applied to every agent.
pub const DEFAULT_DRAG: f32 = 0.95;

/// Half-angle of the head-on firing cone (degrees).
pub const DEFAULT_FIRE_CONE_DEGREES: f32 = 15.0;

/// Default agent turn rate (radians per second).
pub const DEFAULT_TURN_RATE: f32 = std::f32::consts::PI;

/// Default grace period after spawning during which an agent cannot fire (ms).
pub const DEFAULT_SPAWN_GRACE_MS: u64 = 1_000;

// =============================================================================
// PROJECTILES
// =============================================================================

/// Default projectile buffer capacity (records).
pub const DEFAULT_PROJECTILE_CAPACITY: usize = 2_048;

/// Lateral spacing of a multi-shot spread (world units).
pub const MULTI_SHOT_SPACING: f32 = 15.0;

/// Blast radius published when a powerful missile explodes (world units).
pub const EXPLOSION_RADIUS: f32 = 60.0;

/// Homing projectile turn rate (radians per second).
pub const HOMING_TURN_RATE: f32 = 2.5;

/// Homing acquisition range (world units).
pub const HOMING_RANGE: f32 = 400.0;
