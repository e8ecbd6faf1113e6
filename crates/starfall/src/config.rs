//! # Simulation Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file is a valid config:
//!
//! ```toml
//! tick_rate_hz = 60
//! snapshot_rate_hz = 30
//! staleness_tolerance_ms = 100
//! use_workers = true
//!
//! [bounds]
//! min = { x = -600.0, y = -100.0, z = -200.0 }
//! max = { x = 600.0, y = 100.0, z = 1000.0 }
//!
//! [[archetype]]
//! name = "scout"
//! # ...
//! ```
//!
//! With no `[[archetype]]` entries the built-in table is used.

use std::path::Path;

use serde::{Deserialize, Serialize};
use starfall_core::{ArchetypeRegistry, ArchetypeTemplate};
use starfall_shared::constants::DEFAULT_PROJECTILE_CAPACITY;
use starfall_shared::{Vec3, DEFAULT_FIRE_CONE_DEGREES, SNAPSHOT_RATE, STALENESS_TOLERANCE_MS, TICK_RATE};
use tracing::info;

use crate::error::{SimError, SimResult};

/// Axis-aligned play volume. Projectiles leaving it expire.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayBounds {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl PlayBounds {
    /// Returns true if `point` is inside (inclusive).
    #[must_use]
    pub fn contains(&self, point: Vec3) -> bool {
        (self.min.x..=self.max.x).contains(&point.x)
            && (self.min.y..=self.max.y).contains(&point.y)
            && (self.min.z..=self.max.z).contains(&point.z)
    }

    fn is_valid(&self) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.min.x < self.max.x
            && self.min.y < self.max.y
            && self.min.z < self.max.z
    }
}

impl Default for PlayBounds {
    fn default() -> Self {
        Self {
            min: Vec3::new(-600.0, -100.0, -200.0),
            max: Vec3::new(600.0, 100.0, 1000.0),
        }
    }
}

/// Simulation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Main loop rate.
    pub tick_rate_hz: u32,
    /// Worker snapshot rate (hard cap on outbound messages).
    pub snapshot_rate_hz: u32,
    /// Worker results older than this are dropped.
    pub staleness_tolerance_ms: u64,
    /// Projectile buffer capacity (both ping-pong halves).
    pub projectile_capacity: usize,
    /// Event bus capacity.
    pub event_capacity: usize,
    /// Run kernels on worker threads. `false` runs them on the main thread.
    pub use_workers: bool,
    /// Worker results drained per tick; the rest wait for the next tick.
    pub max_inbound_per_tick: usize,
    /// Play volume.
    pub bounds: PlayBounds,
    /// Player collision radius for hostile projectiles.
    pub player_radius: f32,
    /// Agent firing cone half-angle.
    pub fire_cone_degrees: f32,
    /// Archetype table. Empty means the built-in table.
    #[serde(rename = "archetype")]
    pub archetypes: Vec<ArchetypeTemplate>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: TICK_RATE,
            snapshot_rate_hz: SNAPSHOT_RATE,
            staleness_tolerance_ms: STALENESS_TOLERANCE_MS,
            projectile_capacity: DEFAULT_PROJECTILE_CAPACITY,
            event_capacity: 1024,
            use_workers: true,
            max_inbound_per_tick: 64,
            bounds: PlayBounds::default(),
            player_radius: 20.0,
            fire_cone_degrees: DEFAULT_FIRE_CONE_DEGREES,
            archetypes: Vec::new(),
        }
    }
}

impl SimConfig {
    /// Parses and validates a TOML config.
    ///
    /// # Errors
    ///
    /// [`SimError::Config`] for malformed TOML, [`SimError::InvalidConfig`]
    /// for unusable values.
    pub fn from_toml_str(source: &str) -> SimResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// As [`from_toml_str`](Self::from_toml_str), plus [`SimError::Io`].
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        info!(path = %path.display(), archetypes = config.archetypes.len(), "config loaded");
        Ok(config)
    }

    /// Rejects values the simulation cannot run with.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> SimResult<()> {
        let fail = |msg: &str| Err(SimError::InvalidConfig(msg.to_owned()));

        if self.tick_rate_hz == 0 {
            return fail("tick_rate_hz must be positive");
        }
        if self.snapshot_rate_hz == 0 {
            return fail("snapshot_rate_hz must be positive");
        }
        if self.staleness_tolerance_ms == 0 {
            return fail("staleness_tolerance_ms must be positive");
        }
        // Thread results are applied one tick after they were requested
        if self.use_workers && self.staleness_tolerance_ms <= self.tick_interval_ms() {
            return fail("staleness_tolerance_ms must exceed one tick when use_workers is set");
        }
        if self.projectile_capacity == 0 {
            return fail("projectile_capacity must be positive");
        }
        if self.event_capacity == 0 {
            return fail("event_capacity must be positive");
        }
        if self.max_inbound_per_tick == 0 {
            return fail("max_inbound_per_tick must be positive");
        }
        if !self.bounds.is_valid() {
            return fail("bounds.min must be below bounds.max on every axis");
        }
        if !(self.player_radius.is_finite() && self.player_radius > 0.0) {
            return fail("player_radius must be positive");
        }
        if !(self.fire_cone_degrees > 0.0 && self.fire_cone_degrees <= 180.0) {
            return fail("fire_cone_degrees must be in (0, 180]");
        }
        Ok(())
    }

    /// Builds the archetype registry.
    ///
    /// # Errors
    ///
    /// Fails if a configured template is invalid or duplicated.
    pub fn registry(&self) -> SimResult<ArchetypeRegistry> {
        if self.archetypes.is_empty() {
            return Ok(ArchetypeRegistry::builtin());
        }
        Ok(ArchetypeRegistry::from_templates(self.archetypes.iter().cloned())?)
    }

    /// Seconds per tick.
    #[must_use]
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate_hz.max(1) as f32
    }

    /// Whole milliseconds per tick.
    #[must_use]
    pub fn tick_interval_ms(&self) -> u64 {
        1_000 / u64::from(self.tick_rate_hz.max(1))
    }

    /// Microseconds between worker snapshots.
    #[must_use]
    pub fn snapshot_interval_us(&self) -> u64 {
        1_000_000 / u64::from(self.snapshot_rate_hz.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SimConfig::from_toml_str("").unwrap();
        assert_eq!(config, SimConfig::default());
        assert_eq!(config.registry().unwrap().len(), 6);
        assert_eq!(config.snapshot_interval_us(), 33_333);
    }

    #[test]
    fn test_partial_config() {
        let config = SimConfig::from_toml_str(
            r#"
            snapshot_rate_hz = 20
            use_workers = false

            [bounds]
            min = { x = -10.0, y = -10.0, z = -10.0 }
            max = { x = 10.0, y = 10.0, z = 10.0 }
            "#,
        )
        .unwrap();
        assert_eq!(config.snapshot_rate_hz, 20);
        assert!(!config.use_workers);
        assert_eq!(config.tick_rate_hz, 60);
        assert!(config.bounds.contains(Vec3::new(10.0, 0.0, -10.0)));
        assert!(!config.bounds.contains(Vec3::new(10.5, 0.0, 0.0)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            SimConfig::from_toml_str("tick_rate_hz = 0"),
            Err(SimError::InvalidConfig(_))
        ));
        assert!(matches!(
            SimConfig::from_toml_str("fire_cone_degrees = 270.0"),
            Err(SimError::InvalidConfig(_))
        ));
        assert!(matches!(
            SimConfig::from_toml_str("[bounds]\nmin = { x = 1.0, y = 0.0, z = 0.0 }\nmax = { x = 0.0, y = 1.0, z = 1.0 }"),
            Err(SimError::InvalidConfig(_))
        ));
        assert!(matches!(
            SimConfig::from_toml_str("tick_rate = 60"),
            Err(SimError::Config(_))
        ));
    }

    #[test]
    fn test_slow_ticks_need_a_wider_tolerance_with_workers() {
        let slow = "tick_rate_hz = 10\nstaleness_tolerance_ms = 100";
        assert!(matches!(
            SimConfig::from_toml_str(slow),
            Err(SimError::InvalidConfig(_))
        ));

        // Main-thread results are applied the tick they are computed
        let inline = SimConfig::from_toml_str(&format!("{slow}\nuse_workers = false")).unwrap();
        assert_eq!(inline.tick_interval_ms(), 100);

        let widened = SimConfig::from_toml_str("tick_rate_hz = 10\nstaleness_tolerance_ms = 250").unwrap();
        assert!(widened.use_workers);
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = SimConfig::from_toml_str(include_str!("../../../config/starfall.toml")).unwrap();
        let registry = config.registry().unwrap();
        for name in ["scout", "armored", "elite", "bomber", "fast", "asteroid"] {
            assert!(registry.id(name).is_some(), "missing archetype {name}");
        }
        assert!(config.use_workers);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            SimConfig::load("/nonexistent/starfall.toml"),
            Err(SimError::Io(_))
        ));
    }
}
