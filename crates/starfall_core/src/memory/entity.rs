//! # Pooled Entities
//!
//! An entity is a slot in its archetype's pool plus a session-unique id.
//! Ids are never reused within a session; slots are.

use starfall_shared::{EntitySnapshot, Vec3, SNAPSHOT_AGENT_DRIVEN};

use crate::archetype::{ArchetypeId, ArchetypeTemplate};

/// Session-unique identifier for an entity.
///
/// Ids are handed out by a monotonic counter, so a stale id held after
/// release can never resolve to the slot's next occupant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Null/invalid entity ID.
    pub const NULL: Self = Self(u64::MAX);

    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id, as carried in snapshots and events.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-spawn values that replace template defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SpawnOverrides {
    /// Spawn position.
    pub position: Option<Vec3>,
    /// Initial velocity.
    pub velocity: Option<Vec3>,
    /// Initial Euler rotation.
    pub rotation: Option<Vec3>,
    /// Angular velocity.
    pub spin: Option<Vec3>,
    /// Starting (and maximum) health.
    pub max_health: Option<f32>,
    /// Spawn shield duration.
    pub invulnerable_for_ms: Option<u64>,
}

impl SpawnOverrides {
    /// Spawn at `position`.
    #[must_use]
    pub fn at(position: Vec3) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    /// Sets the initial velocity.
    #[must_use]
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = Some(velocity);
        self
    }

    /// Sets the initial yaw.
    #[must_use]
    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.rotation = Some(Vec3::new(0.0, yaw, 0.0));
        self
    }

    /// Sets the angular velocity.
    #[must_use]
    pub fn with_spin(mut self, spin: Vec3) -> Self {
        self.spin = Some(spin);
        self
    }

    /// Sets starting health.
    #[must_use]
    pub fn with_max_health(mut self, max_health: f32) -> Self {
        self.max_health = Some(max_health);
        self
    }

    /// Sets the spawn shield duration.
    #[must_use]
    pub fn with_invulnerability(mut self, duration_ms: u64) -> Self {
        self.invulnerable_for_ms = Some(duration_ms);
        self
    }
}

/// One pooled entity.
///
/// Motion fields are public; identity and health are only changed through
/// the pool so the index and the free stacks stay consistent.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    id: EntityId,
    archetype: ArchetypeId,
    slot: u32,
    active: bool,
    destroyed: bool,
    health: f32,
    max_health: f32,
    size: f32,
    speed: f32,
    spawned_at_ms: u64,
    invulnerable_until_ms: u64,

    /// World position.
    pub position: Vec3,
    /// Velocity (units per second).
    pub velocity: Vec3,
    /// Euler rotation (radians, `y` is yaw).
    pub rotation: Vec3,
    /// Angular velocity (radians per second).
    pub spin: Vec3,
}

impl Entity {
    /// A dormant slot holding nothing but template defaults.
    pub(crate) fn pristine(archetype: ArchetypeId, slot: u32, template: &ArchetypeTemplate) -> Self {
        Self {
            id: EntityId::NULL,
            archetype,
            slot,
            active: false,
            destroyed: false,
            health: template.max_health,
            max_health: template.max_health,
            size: template.size,
            speed: template.speed,
            spawned_at_ms: 0,
            invulnerable_until_ms: 0,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            rotation: Vec3::ZERO,
            spin: template.spin,
        }
    }

    /// Brings a pristine slot to life under `id`.
    pub(crate) fn activate(
        &mut self,
        id: EntityId,
        template: &ArchetypeTemplate,
        overrides: &SpawnOverrides,
        now_ms: u64,
    ) {
        let max_health = overrides
            .max_health
            .filter(|h| h.is_finite() && *h > 0.0)
            .unwrap_or(template.max_health);

        self.id = id;
        self.active = true;
        self.destroyed = false;
        self.max_health = max_health;
        self.health = max_health;
        self.spawned_at_ms = now_ms;
        self.invulnerable_until_ms = now_ms
            .saturating_add(overrides.invulnerable_for_ms.unwrap_or(template.spawn_invulnerable_ms));
        self.position = overrides.position.unwrap_or(Vec3::ZERO);
        self.velocity = overrides.velocity.unwrap_or(Vec3::ZERO);
        self.rotation = overrides.rotation.unwrap_or(Vec3::ZERO);
        self.spin = overrides.spin.unwrap_or(template.spin);
    }

    /// Applies damage. Returns true if this hit destroyed the entity.
    pub(crate) fn apply_damage(&mut self, amount: f32) -> bool {
        self.health = (self.health - amount).max(0.0);
        if self.health <= 0.0 {
            self.destroyed = true;
        }
        self.destroyed
    }

    /// Entity id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Archetype this slot belongs to.
    #[inline]
    #[must_use]
    pub const fn archetype(&self) -> ArchetypeId {
        self.archetype
    }

    /// Slot index within the archetype pool.
    #[inline]
    #[must_use]
    pub const fn slot(&self) -> u32 {
        self.slot
    }

    /// Returns true while the entity is acquired.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Returns true once health has reached zero.
    #[inline]
    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Current health.
    #[inline]
    #[must_use]
    pub const fn health(&self) -> f32 {
        self.health
    }

    /// Health at spawn.
    #[inline]
    #[must_use]
    pub const fn max_health(&self) -> f32 {
        self.max_health
    }

    /// Collision radius.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> f32 {
        self.size
    }

    /// Top speed.
    #[inline]
    #[must_use]
    pub const fn speed(&self) -> f32 {
        self.speed
    }

    /// When the entity was acquired.
    #[inline]
    #[must_use]
    pub const fn spawned_at_ms(&self) -> u64 {
        self.spawned_at_ms
    }

    /// Returns true while the spawn shield is up.
    #[inline]
    #[must_use]
    pub const fn is_invulnerable(&self, now_ms: u64) -> bool {
        now_ms < self.invulnerable_until_ms
    }

    /// Unit facing direction on the XZ plane.
    #[inline]
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        Vec3::from_yaw(self.rotation.y)
    }

    /// Packed copy for the worker threads.
    #[must_use]
    pub fn snapshot(&self, agent_driven: bool) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id.raw(),
            position: self.position.to_array(),
            velocity: self.velocity.to_array(),
            rotation: self.rotation.to_array(),
            spin: self.spin.to_array(),
            size: self.size,
            archetype: self.archetype.raw(),
            flags: if agent_driven { SNAPSHOT_AGENT_DRIVEN } else { 0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::ArchetypeRegistry;

    fn scout() -> (ArchetypeId, ArchetypeTemplate) {
        let registry = ArchetypeRegistry::builtin();
        let id = registry.require("scout").unwrap();
        (id, registry.get(id).unwrap().clone())
    }

    #[test]
    fn test_entity_id_null() {
        assert!(EntityId::default().is_null());
        assert!(!EntityId::from_raw(0).is_null());
        assert_eq!(EntityId::from_raw(42).to_string(), "#42");
    }

    #[test]
    fn test_activate_applies_overrides() {
        let (archetype, template) = scout();
        let mut entity = Entity::pristine(archetype, 3, &template);
        assert!(!entity.is_active());

        let overrides = SpawnOverrides::at(Vec3::new(5.0, 0.0, 5.0))
            .with_max_health(7.0)
            .with_invulnerability(250);
        entity.activate(EntityId::from_raw(9), &template, &overrides, 1_000);

        assert!(entity.is_active());
        assert_eq!(entity.slot(), 3);
        assert_eq!(entity.position, Vec3::new(5.0, 0.0, 5.0));
        assert_eq!(entity.health(), 7.0);
        assert!(entity.is_invulnerable(1_249));
        assert!(!entity.is_invulnerable(1_250));
    }

    #[test]
    fn test_damage_clamps_at_zero() {
        let (archetype, template) = scout();
        let mut entity = Entity::pristine(archetype, 0, &template);
        entity.activate(EntityId::from_raw(1), &template, &SpawnOverrides::default(), 0);

        assert!(entity.apply_damage(5.0));
        assert_eq!(entity.health(), 0.0);
        assert!(entity.is_destroyed());
    }

    #[test]
    fn test_snapshot_flags() {
        let (archetype, template) = scout();
        let entity = Entity::pristine(archetype, 0, &template);
        assert!(entity.snapshot(true).is_agent_driven());
        assert!(!entity.snapshot(false).is_agent_driven());
        assert_eq!(entity.snapshot(false).archetype, archetype.raw());
    }
}
