//! Simulation events published by the core.
//!
//! The core never calls into the presentation layer. It publishes these
//! events; the presentation layer subscribes to whichever it cares about
//! (particles on `Explosion`, HUD on `ScoreAwarded`, and so on).

use crate::math::Vec3;
use crate::protocol::WeaponType;
use serde::{Deserialize, Serialize};

/// Event type discriminator
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Entity acquired from a pool
    EntitySpawned = 0,
    /// Entity took non-lethal damage
    EntityDamaged = 1,
    /// Entity destroyed and released
    EntityDestroyed = 2,
    /// Projectile entered the buffer
    ProjectileSpawned = 3,
    /// Projectile left the buffer
    ProjectileExpired = 4,
    /// Points awarded for a kill
    ScoreAwarded = 5,
    /// Powerful missile detonated
    Explosion = 6,
    /// Hostile projectile reached the player
    PlayerHit = 7,
    /// Worker threads unavailable, simulation degraded
    WorkerDegraded = 8,
    /// Session cleared
    SessionReset = 9,
}

impl EventType {
    /// Number of event types.
    pub const COUNT: usize = 10;

    /// Dense index for table lookups.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Why a projectile left the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpiryReason {
    /// Hit something
    Impact,
    /// Left the play volume
    OutOfBounds,
    /// Session cleared
    Cleared,
}

/// Events published by the simulation core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    /// Entity acquired from a pool.
    EntitySpawned {
        /// Entity id
        entity_id: u64,
        /// Archetype name
        archetype: String,
        /// Spawn position
        position: Vec3,
    },

    /// Entity took non-lethal damage.
    EntityDamaged {
        /// Entity id
        entity_id: u64,
        /// Damage applied
        amount: f32,
        /// Health after the hit
        health_remaining: f32,
    },

    /// Entity destroyed and returned to its pool.
    EntityDestroyed {
        /// Entity id
        entity_id: u64,
        /// Archetype name
        archetype: String,
        /// Where it died
        position: Vec3,
    },

    /// Projectile entered the buffer.
    ProjectileSpawned {
        /// Projectile id
        projectile_id: u32,
        /// Weapon that fired it
        weapon: WeaponType,
        /// Spawn position
        position: Vec3,
    },

    /// Projectile left the buffer.
    ProjectileExpired {
        /// Projectile id
        projectile_id: u32,
        /// Why it left
        reason: ExpiryReason,
    },

    /// Points awarded for destroying an entity.
    ScoreAwarded {
        /// Entity destroyed
        entity_id: u64,
        /// Archetype point value
        points: u32,
    },

    /// Powerful missile detonated.
    Explosion {
        /// Blast center
        position: Vec3,
        /// Blast radius
        radius: f32,
    },

    /// Hostile projectile reached the player.
    PlayerHit {
        /// Projectile id
        projectile_id: u32,
        /// Damage carried
        damage: f32,
        /// Impact point
        position: Vec3,
    },

    /// Worker threads are unavailable; simulation runs on the main thread.
    WorkerDegraded {
        /// Human-readable cause
        reason: String,
    },

    /// Session cleared (reset or return to menu).
    SessionReset,
}

impl SimEvent {
    /// Returns the event type
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::EntitySpawned { .. } => EventType::EntitySpawned,
            Self::EntityDamaged { .. } => EventType::EntityDamaged,
            Self::EntityDestroyed { .. } => EventType::EntityDestroyed,
            Self::ProjectileSpawned { .. } => EventType::ProjectileSpawned,
            Self::ProjectileExpired { .. } => EventType::ProjectileExpired,
            Self::ScoreAwarded { .. } => EventType::ScoreAwarded,
            Self::Explosion { .. } => EventType::Explosion,
            Self::PlayerHit { .. } => EventType::PlayerHit,
            Self::WorkerDegraded { .. } => EventType::WorkerDegraded,
            Self::SessionReset => EventType::SessionReset,
        }
    }

    /// Returns the position where this event occurred (if applicable)
    #[must_use]
    pub fn position(&self) -> Option<Vec3> {
        match self {
            Self::EntitySpawned { position, .. }
            | Self::EntityDestroyed { position, .. }
            | Self::ProjectileSpawned { position, .. }
            | Self::Explosion { position, .. }
            | Self::PlayerHit { position, .. } => Some(*position),
            Self::EntityDamaged { .. }
            | Self::ProjectileExpired { .. }
            | Self::ScoreAwarded { .. }
            | Self::WorkerDegraded { .. }
            | Self::SessionReset => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let event = SimEvent::ScoreAwarded {
            entity_id: 7,
            points: 25,
        };
        assert_eq!(event.event_type(), EventType::ScoreAwarded);
        assert_eq!(SimEvent::SessionReset.event_type().index(), EventType::COUNT - 1);
    }

    #[test]
    fn test_event_position() {
        let event = SimEvent::Explosion {
            position: Vec3::new(10.0, 20.0, 30.0),
            radius: 60.0,
        };
        assert_eq!(event.position(), Some(Vec3::new(10.0, 20.0, 30.0)));
        assert_eq!(SimEvent::SessionReset.position(), None);
    }
}
