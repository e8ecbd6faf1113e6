//! # Entity Pool
//!
//! Per-archetype pools of pre-warmed entities.
//!
//! Each archetype gets its own slot array, a stack of available slots and
//! an id→slot map of the active ones. A global index maps every active id to
//! its archetype so `release` and `damage` never search.
//!
//! ## Enumeration cache
//!
//! `active_entities` / `all_active_entities` are called many times per tick
//! by targeting and collision code. They read from a slot-list cache that is
//! rebuilt at most once per tick, and only if an acquire or release bumped
//! the version counter since the last build. The cache stores slot indices,
//! not copies, so motion written during the tick is always visible. An
//! entity released mid-tick drops out immediately; one acquired mid-tick is
//! only guaranteed to show up from the next tick on.

use std::cell::RefCell;
use std::collections::HashMap;

use starfall_shared::{EntitySnapshot, Vec3};
use tracing::{debug, warn};

use super::entity::{Entity, EntityId, SpawnOverrides};
use crate::archetype::{ArchetypeId, ArchetypeRegistry};
use crate::error::{CoreError, CoreResult};

/// Result of [`EntityPool::damage`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DamageOutcome {
    /// The entity survived.
    Alive {
        /// Health after the hit.
        health_remaining: f32,
    },
    /// Health reached zero. The caller must `release` the entity.
    Destroyed {
        /// Points awarded for the kill.
        point_value: u32,
        /// Where it died.
        position: Vec3,
    },
    /// Unknown id, or the entity was already destroyed.
    NotFound,
}

/// Occupancy counters for one archetype pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Live entities.
    pub active: usize,
    /// Slots ready for reuse.
    pub available: usize,
    /// Slots ever created, warm-up included.
    pub total_created: usize,
    /// Warm-up size from the template.
    pub configured_size: usize,
}

impl PoolStats {
    /// Returns true if the pool has grown past its configured size.
    #[must_use]
    pub const fn has_grown(&self) -> bool {
        self.total_created > self.configured_size
    }
}

struct ArchetypePool {
    slots: Vec<Entity>,
    available: Vec<u32>,
    active: HashMap<EntityId, u32>,
    configured_size: usize,
}

#[derive(Default)]
struct EnumerationCache {
    built: bool,
    tick: u64,
    version: u64,
    slots: Vec<Vec<u32>>,
    rebuilds: u64,
}

/// Pre-warmed entity pools, one per registered archetype.
///
/// Not thread-safe. The pool lives on the main loop; workers only ever see
/// [`EntitySnapshot`] copies.
pub struct EntityPool {
    registry: ArchetypeRegistry,
    pools: Vec<ArchetypePool>,
    index: HashMap<EntityId, ArchetypeId>,
    next_id: u64,
    version: u64,
    tick: u64,
    now_ms: u64,
    cache: RefCell<EnumerationCache>,
}

impl EntityPool {
    /// Creates one pool per archetype, each warmed to its template's
    /// `pool_size`.
    #[must_use]
    pub fn new(registry: ArchetypeRegistry) -> Self {
        let mut pools = Vec::with_capacity(registry.len());
        for (archetype, template) in registry.iter() {
            let slots: Vec<Entity> = (0..template.pool_size)
                .filter_map(|i| u32::try_from(i).ok())
                .map(|slot| Entity::pristine(archetype, slot, template))
                .collect();
            let available = (0..slots.len())
                .rev()
                .filter_map(|i| u32::try_from(i).ok())
                .collect();
            debug!(archetype = %template.name, size = slots.len(), "pool warmed");
            pools.push(ArchetypePool {
                slots,
                available,
                active: HashMap::with_capacity(template.pool_size),
                configured_size: template.pool_size,
            });
        }

        Self {
            registry,
            pools,
            index: HashMap::new(),
            next_id: 0,
            version: 0,
            tick: 0,
            now_ms: 0,
            cache: RefCell::new(EnumerationCache::default()),
        }
    }

    /// The archetype table the pools were built from.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &ArchetypeRegistry {
        &self.registry
    }

    /// Marks the start of a simulation tick.
    ///
    /// Spawn timestamps use `now_ms`, and the enumeration cache may rebuild
    /// once after each call.
    pub fn begin_tick(&mut self, now_ms: u64) {
        self.tick = self.tick.wrapping_add(1);
        self.now_ms = now_ms;
    }

    /// Current time as of the last [`begin_tick`](Self::begin_tick).
    #[inline]
    #[must_use]
    pub const fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Bumped on every acquire and release.
    #[inline]
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Takes an entity from the archetype's pool, growing it if empty.
    ///
    /// # Errors
    ///
    /// Fails for archetypes not in the registry, or if the pool cannot grow.
    pub fn acquire(&mut self, archetype: ArchetypeId, overrides: SpawnOverrides) -> CoreResult<EntityId> {
        let template = self
            .registry
            .get(archetype)
            .ok_or_else(|| CoreError::UnknownArchetype(format!("#{}", archetype.raw())))?;
        let pool = self
            .pools
            .get_mut(archetype.index())
            .ok_or_else(|| CoreError::UnknownArchetype(template.name.clone()))?;

        let slot = if let Some(slot) = pool.available.pop() {
            slot
        } else {
            let slot = u32::try_from(pool.slots.len())
                .map_err(|_| CoreError::PoolOverflow(template.name.clone()))?;
            pool.slots.push(Entity::pristine(archetype, slot, template));
            warn!(
                archetype = %template.name,
                total_created = pool.slots.len(),
                configured = pool.configured_size,
                "pool exhausted, grew by one"
            );
            slot
        };

        let id = EntityId::from_raw(self.next_id);
        self.next_id += 1;

        if let Some(entity) = pool.slots.get_mut(slot as usize) {
            entity.activate(id, template, &overrides, self.now_ms);
        }
        pool.active.insert(id, slot);
        self.index.insert(id, archetype);
        self.version += 1;

        Ok(id)
    }

    /// Takes an entity by archetype name.
    ///
    /// # Errors
    ///
    /// Fails for unknown names.
    pub fn acquire_named(&mut self, archetype: &str, overrides: SpawnOverrides) -> CoreResult<EntityId> {
        let id = self.registry.require(archetype)?;
        self.acquire(id, overrides)
    }

    /// Returns an entity to its pool, restoring template defaults.
    ///
    /// Returns `false` for unknown or already released ids.
    pub fn release(&mut self, id: EntityId) -> bool {
        let Some(archetype) = self.index.remove(&id) else {
            return false;
        };
        let (Some(template), Some(pool)) =
            (self.registry.get(archetype), self.pools.get_mut(archetype.index()))
        else {
            return false;
        };
        let Some(slot) = pool.active.remove(&id) else {
            return false;
        };

        if let Some(entity) = pool.slots.get_mut(slot as usize) {
            *entity = Entity::pristine(archetype, slot, template);
        }
        pool.available.push(slot);
        self.version += 1;
        true
    }

    /// Applies damage to an active entity.
    ///
    /// A destroyed entity stays in the pool until the caller releases it;
    /// further damage on it answers [`DamageOutcome::NotFound`] so a kill is
    /// only ever reported once.
    pub fn damage(&mut self, id: EntityId, amount: f32) -> DamageOutcome {
        let point_value = self.archetype_of(id).and_then(|a| self.registry.get(a)).map(|t| t.point_value);
        let Some(entity) = self.get_mut_any(id) else {
            return DamageOutcome::NotFound;
        };
        if entity.is_destroyed() {
            return DamageOutcome::NotFound;
        }
        let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };

        if entity.apply_damage(amount) {
            DamageOutcome::Destroyed {
                point_value: point_value.unwrap_or(0),
                position: entity.position,
            }
        } else {
            DamageOutcome::Alive {
                health_remaining: entity.health(),
            }
        }
    }

    /// Archetype of an active entity.
    #[inline]
    #[must_use]
    pub fn archetype_of(&self, id: EntityId) -> Option<ArchetypeId> {
        self.index.get(&id).copied()
    }

    /// Looks up an active, not yet destroyed entity.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        let archetype = self.index.get(&id)?;
        let pool = self.pools.get(archetype.index())?;
        let slot = pool.active.get(&id)?;
        pool.slots.get(*slot as usize).filter(|e| !e.is_destroyed())
    }

    /// Mutable lookup of an active, not yet destroyed entity.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.get_mut_any(id).filter(|e| !e.is_destroyed())
    }

    fn get_mut_any(&mut self, id: EntityId) -> Option<&mut Entity> {
        let archetype = self.index.get(&id)?;
        let pool = self.pools.get_mut(archetype.index())?;
        let slot = *pool.active.get(&id)?;
        pool.slots.get_mut(slot as usize)
    }

    /// Overwrites motion computed elsewhere (worker results).
    ///
    /// Returns `false` if the entity is gone.
    pub fn set_motion(&mut self, id: EntityId, position: Vec3, velocity: Vec3, rotation: Vec3) -> bool {
        if !(position.is_finite() && velocity.is_finite() && rotation.is_finite()) {
            return false;
        }
        match self.get_mut(id) {
            Some(entity) => {
                entity.position = position;
                entity.velocity = velocity;
                entity.rotation = rotation;
                true
            }
            None => false,
        }
    }

    /// Number of active entities across all archetypes.
    #[inline]
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.index.len()
    }

    /// Active entities of one archetype, in slot order.
    #[must_use]
    pub fn active_entities(&self, archetype: ArchetypeId) -> Vec<&Entity> {
        self.refresh_cache();
        let cache = self.cache.borrow();
        let (Some(pool), Some(slots)) = (
            self.pools.get(archetype.index()),
            cache.slots.get(archetype.index()),
        ) else {
            return Vec::new();
        };
        let entities = resolve(pool, slots).collect();
        entities
    }

    /// Active entities of every archetype, grouped by archetype.
    #[must_use]
    pub fn all_active_entities(&self) -> Vec<&Entity> {
        self.refresh_cache();
        let cache = self.cache.borrow();
        let entities = self
            .pools
            .iter()
            .zip(cache.slots.iter())
            .flat_map(|(pool, slots)| resolve(pool, slots))
            .collect();
        entities
    }

    /// How many times the enumeration cache has been rebuilt.
    #[must_use]
    pub fn cache_rebuilds(&self) -> u64 {
        self.cache.borrow().rebuilds
    }

    fn refresh_cache(&self) {
        let mut cache = self.cache.borrow_mut();
        if cache.built && (cache.tick == self.tick || cache.version == self.version) {
            return;
        }

        cache.slots.resize_with(self.pools.len(), Vec::new);
        for (pool, slots) in self.pools.iter().zip(cache.slots.iter_mut()) {
            slots.clear();
            slots.extend(pool.slots.iter().filter(|e| e.is_active()).map(Entity::slot));
        }
        cache.built = true;
        cache.tick = self.tick;
        cache.version = self.version;
        cache.rebuilds += 1;
    }

    /// Appends a snapshot of every live entity to `out`.
    ///
    /// `agent_driven` marks entities whose motion the main thread owns.
    pub fn snapshot_into(&self, out: &mut Vec<EntitySnapshot>, agent_driven: impl Fn(EntityId) -> bool) {
        for pool in &self.pools {
            out.extend(
                pool.slots
                    .iter()
                    .filter(|e| e.is_active() && !e.is_destroyed())
                    .map(|e| e.snapshot(agent_driven(e.id()))),
            );
        }
    }

    /// Occupancy counters for one archetype.
    #[must_use]
    pub fn stats(&self, archetype: ArchetypeId) -> Option<PoolStats> {
        let pool = self.pools.get(archetype.index())?;
        Some(PoolStats {
            active: pool.active.len(),
            available: pool.available.len(),
            total_created: pool.slots.len(),
            configured_size: pool.configured_size,
        })
    }

    /// Releases every active entity. Grown slots are kept.
    ///
    /// Returns how many entities were released.
    pub fn clear_active(&mut self) -> usize {
        let ids: Vec<EntityId> = self.index.keys().copied().collect();
        let released = ids.into_iter().filter(|id| self.release(*id)).count();
        if released > 0 {
            debug!(released, "pools cleared");
        }
        released
    }
}

fn resolve<'p, 's>(pool: &'p ArchetypePool, slots: &'s [u32]) -> impl Iterator<Item = &'p Entity> + 's
where
    'p: 's,
{
    slots
        .iter()
        .filter_map(move |slot| pool.slots.get(*slot as usize))
        .filter(|e| e.is_active())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::ArchetypeTemplate;
    use std::collections::HashSet;

    fn pool_with_scouts(pool_size: usize) -> (EntityPool, ArchetypeId) {
        let mut template: ArchetypeTemplate = ArchetypeRegistry::builtin()
            .get(ArchetypeId::from_raw(0))
            .unwrap()
            .clone();
        template.pool_size = pool_size;
        let registry = ArchetypeRegistry::from_templates([template]).unwrap();
        let scout = registry.require("scout").unwrap();
        (EntityPool::new(registry), scout)
    }

    #[test]
    fn test_pool_grows_when_exhausted() {
        let (mut pool, scout) = pool_with_scouts(2);

        let a = pool.acquire(scout, SpawnOverrides::default()).unwrap();
        let b = pool.acquire(scout, SpawnOverrides::default()).unwrap();
        assert_ne!(a, b);
        assert!(!pool.stats(scout).unwrap().has_grown());

        let c = pool.acquire(scout, SpawnOverrides::default()).unwrap();
        assert_ne!(c, a);
        assert_ne!(c, b);
        assert!(pool.get(c).is_some());

        let stats = pool.stats(scout).unwrap();
        assert_eq!(stats.total_created, 3);
        assert_eq!(stats.active, 3);
        assert!(stats.has_grown());
    }

    #[test]
    fn test_release_unknown_is_noop() {
        let (mut pool, scout) = pool_with_scouts(2);
        assert!(!pool.release(EntityId::from_raw(99)));

        let id = pool.acquire(scout, SpawnOverrides::default()).unwrap();
        assert!(pool.release(id));
        assert!(!pool.release(id));
        assert_eq!(pool.stats(scout).unwrap().available, 2);
    }

    #[test]
    fn test_no_aliasing() {
        let (mut pool, scout) = pool_with_scouts(4);
        let mut live = HashSet::new();

        for round in 0..50 {
            let id = pool.acquire(scout, SpawnOverrides::default()).unwrap();
            assert!(live.insert(id), "id {id} handed out twice");
            if round % 3 == 0 {
                let victim = *live.iter().next().unwrap();
                assert!(pool.release(victim));
                live.remove(&victim);
            }
        }

        let slots: HashSet<u32> = live.iter().map(|id| pool.get(*id).unwrap().slot()).collect();
        assert_eq!(slots.len(), live.len());
    }

    #[test]
    fn test_clean_reuse() {
        let (mut pool, scout) = pool_with_scouts(1);
        pool.begin_tick(100);

        let first = pool
            .acquire(
                scout,
                SpawnOverrides::at(Vec3::new(1.0, 2.0, 3.0))
                    .with_velocity(Vec3::X)
                    .with_max_health(9.0)
                    .with_invulnerability(5_000),
            )
            .unwrap();
        pool.damage(first, 4.0);
        let slot = pool.get(first).unwrap().slot();
        assert!(pool.release(first));

        pool.begin_tick(200);
        let second = pool
            .acquire(scout, SpawnOverrides::at(Vec3::new(7.0, 0.0, 7.0)))
            .unwrap();
        let entity = pool.get(second).unwrap();

        assert_eq!(entity.slot(), slot);
        assert_eq!(entity.position, Vec3::new(7.0, 0.0, 7.0));
        assert_eq!(entity.velocity, Vec3::ZERO);
        assert_eq!(entity.health(), 1.0);
        assert_eq!(entity.max_health(), 1.0);
        assert_eq!(entity.spawned_at_ms(), 200);
        assert!(!entity.is_invulnerable(200));
    }

    #[test]
    fn test_damage_outcomes() {
        let registry = ArchetypeRegistry::builtin();
        let elite = registry.require("elite").unwrap();
        let mut pool = EntityPool::new(registry);

        let id = pool
            .acquire(elite, SpawnOverrides::at(Vec3::new(4.0, 0.0, 4.0)))
            .unwrap();
        assert_eq!(pool.damage(id, 1.0), DamageOutcome::Alive { health_remaining: 2.0 });
        assert_eq!(
            pool.damage(id, 5.0),
            DamageOutcome::Destroyed {
                point_value: 20,
                position: Vec3::new(4.0, 0.0, 4.0)
            }
        );
        // Already destroyed, not yet released
        assert_eq!(pool.damage(id, 1.0), DamageOutcome::NotFound);
        assert!(pool.get(id).is_none());

        assert!(pool.release(id));
        assert_eq!(pool.damage(id, 1.0), DamageOutcome::NotFound);
    }

    #[test]
    fn test_cache_rebuilds_once_per_tick() {
        let (mut pool, scout) = pool_with_scouts(8);
        pool.begin_tick(0);
        let a = pool.acquire(scout, SpawnOverrides::default()).unwrap();
        let b = pool.acquire(scout, SpawnOverrides::default()).unwrap();

        assert_eq!(pool.all_active_entities().len(), 2);
        assert_eq!(pool.active_entities(scout).len(), 2);
        assert_eq!(pool.cache_rebuilds(), 1);

        // Mid-tick release is visible at once, acquire waits for the next tick
        pool.release(a);
        let c = pool.acquire(scout, SpawnOverrides::default()).unwrap();
        let ids: Vec<EntityId> = pool.all_active_entities().iter().map(|e| e.id()).collect();
        assert!(ids.contains(&b));
        assert!(!ids.contains(&a));
        assert_eq!(pool.cache_rebuilds(), 1);

        pool.begin_tick(16);
        let ids: Vec<EntityId> = pool.all_active_entities().iter().map(|e| e.id()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&c));
        assert_eq!(pool.cache_rebuilds(), 2);

        // Nothing changed: a new tick does not force a rebuild
        pool.begin_tick(32);
        let _ = pool.all_active_entities();
        assert_eq!(pool.cache_rebuilds(), 2);
    }

    #[test]
    fn test_cache_sees_live_motion() {
        let (mut pool, scout) = pool_with_scouts(2);
        let id = pool.acquire(scout, SpawnOverrides::default()).unwrap();
        assert_eq!(pool.all_active_entities()[0].position, Vec3::ZERO);

        assert!(pool.set_motion(id, Vec3::new(3.0, 0.0, 0.0), Vec3::X, Vec3::ZERO));
        assert_eq!(pool.all_active_entities()[0].position, Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_clear_active() {
        let registry = ArchetypeRegistry::builtin();
        let mut pool = EntityPool::new(registry);
        for name in ["scout", "asteroid", "elite"] {
            pool.acquire_named(name, SpawnOverrides::default()).unwrap();
        }
        assert_eq!(pool.active_count(), 3);
        assert_eq!(pool.clear_active(), 3);
        assert_eq!(pool.active_count(), 0);

        pool.begin_tick(16);
        assert!(pool.all_active_entities().is_empty());
    }

    #[test]
    fn test_snapshot_into() {
        let registry = ArchetypeRegistry::builtin();
        let mut pool = EntityPool::new(registry);
        let scout = pool.acquire_named("scout", SpawnOverrides::default()).unwrap();
        let rock = pool.acquire_named("asteroid", SpawnOverrides::default()).unwrap();

        let mut snapshots = Vec::new();
        pool.snapshot_into(&mut snapshots, |id| id == scout);
        assert_eq!(snapshots.len(), 2);
        let rock_snapshot = snapshots.iter().find(|s| s.id == rock.raw()).unwrap();
        assert!(!rock_snapshot.is_agent_driven());
        assert_eq!(rock_snapshot.spin, [0.0, 0.8, 0.3]);
    }

    #[test]
    fn test_unknown_archetype() {
        let (mut pool, _) = pool_with_scouts(1);
        assert!(matches!(
            pool.acquire(ArchetypeId::from_raw(42), SpawnOverrides::default()),
            Err(CoreError::UnknownArchetype(_))
        ));
        assert!(matches!(
            pool.acquire_named("mothership", SpawnOverrides::default()),
            Err(CoreError::UnknownArchetype(_))
        ));
    }
}
