//! # Projectile Buffer
//!
//! Fixed-capacity array of packed [`ProjectileRecord`]s.
//!
//! ## Layout
//!
//! ```text
//! records:  [ rec 0 | rec 1 | rec 2 | ... | rec N-1 ]   68 bytes each
//! free:     stack of inactive slot indices
//! slots:    id -> slot for every active record
//! ```
//!
//! `free` and `slots` partition `0..capacity`: every slot is either free or
//! mapped by exactly one id. A full buffer rejects allocation; it never
//! evicts and never grows.

use std::collections::HashMap;
use std::hash::Hasher;

use siphasher::sip::SipHasher13;
use starfall_shared::{
    Color, FireRequest, MissileType, ProjectileFlags, ProjectileRecord, Vec3, WeaponType,
};
use tracing::{trace, warn};

use crate::error::{BufferError, BufferResult};

// Fixed keys: named ids must hash identically on every thread and every run.
const NAME_KEY_0: u64 = 0x5354_4152_4641_4c4c;
const NAME_KEY_1: u64 = 0x7072_6f6a_6563_7469;

/// Folds a string projectile id into the packed numeric id field.
#[must_use]
pub fn hash_projectile_name(name: &str) -> u32 {
    let mut hasher = SipHasher13::new_with_keys(NAME_KEY_0, NAME_KEY_1);
    hasher.write(name.as_bytes());
    let hash = hasher.finish();
    #[allow(clippy::cast_possible_truncation)]
    let folded = (hash ^ (hash >> 32)) as u32;
    folded
}

/// How the caller names a new projectile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectileKey<'a> {
    /// Let the buffer pick an unused id.
    Auto,
    /// Use this numeric id.
    Numeric(u32),
    /// Hash this name into a numeric id.
    Named(&'a str),
}

/// Decoded view of one projectile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projectile {
    /// Numeric id (ignored on allocate; the key decides it).
    pub id: u32,
    /// World position.
    pub position: Vec3,
    /// Velocity (units per second).
    pub velocity: Vec3,
    /// Collision radius.
    pub size: f32,
    /// Damage on hit.
    pub damage: f32,
    /// Yaw, pitch.
    pub rotation: [f32; 2],
    /// Display color.
    pub color: Color,
    /// Weapon that fired it.
    pub weapon: WeaponType,
    /// Missile body.
    pub missile: MissileType,
    /// Behavior flags.
    pub flags: ProjectileFlags,
}

impl Projectile {
    /// Builds a projectile from a weapon's fire request, facing along its
    /// velocity.
    #[must_use]
    pub fn from_fire_request(request: &FireRequest) -> Self {
        Self {
            id: 0,
            position: request.origin,
            velocity: request.velocity,
            size: request.size,
            damage: request.damage,
            rotation: [request.velocity.yaw(), 0.0],
            color: request.color,
            weapon: request.weapon,
            missile: request.missile,
            flags: request.flags,
        }
    }

    /// Packs into a live record.
    #[must_use]
    pub fn encode(&self) -> ProjectileRecord {
        ProjectileRecord {
            position: self.position.to_array(),
            velocity: self.velocity.to_array(),
            size: self.size,
            damage: self.damage,
            rotation: self.rotation,
            color: self.color.to_unit(),
            id: self.id,
            weapon_type: self.weapon.code(),
            missile_type: self.missile.code(),
            active: 1,
            flags: self.flags.bits(),
        }
    }

    /// Unpacks a live record. `None` for inactive records or unknown codes.
    #[must_use]
    pub fn decode(record: &ProjectileRecord) -> Option<Self> {
        if !record.is_active() {
            return None;
        }
        Some(Self {
            id: record.id,
            position: record.position(),
            velocity: record.velocity(),
            size: record.size,
            damage: record.damage,
            rotation: record.rotation,
            color: Color::from_unit(record.color),
            weapon: WeaponType::from_code(record.weapon_type)?,
            missile: MissileType::from_code(record.missile_type)?,
            flags: record.flags(),
        })
    }
}

/// Fixed-capacity packed projectile storage.
#[derive(Clone, Debug)]
pub struct ProjectileBuffer {
    records: Box<[ProjectileRecord]>,
    free: Vec<u32>,
    slots: HashMap<u32, u32>,
    next_auto_id: u32,
}

impl ProjectileBuffer {
    /// Allocates all `capacity` records up front.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(u32::MAX as usize);
        let records = vec![ProjectileRecord::default(); capacity].into_boxed_slice();
        let free = (0..capacity).rev().filter_map(|i| u32::try_from(i).ok()).collect();

        Self {
            records,
            free,
            slots: HashMap::with_capacity(capacity),
            next_auto_id: 1,
        }
    }

    /// Fixed capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Number of live projectiles.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no projectile is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns true if every slot is live.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Returns true if `id` is live.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.slots.contains_key(&id)
    }

    /// Writes a projectile into a free slot and returns its id.
    ///
    /// # Errors
    ///
    /// - [`BufferError::DuplicateId`] if the key's id is already live
    /// - [`BufferError::Full`] if no slot is free
    ///
    /// On error nothing is written.
    pub fn allocate(&mut self, key: ProjectileKey<'_>, projectile: &Projectile) -> BufferResult<u32> {
        if self.free.is_empty() {
            warn!(capacity = self.capacity(), "projectile buffer full");
            return Err(BufferError::Full {
                capacity: self.capacity(),
            });
        }

        let id = match key {
            ProjectileKey::Auto => self.next_free_id(),
            ProjectileKey::Numeric(id) => id,
            ProjectileKey::Named(name) => hash_projectile_name(name),
        };
        if self.slots.contains_key(&id) {
            return Err(BufferError::DuplicateId(id));
        }

        let Some(slot) = self.free.pop() else {
            return Err(BufferError::Full {
                capacity: self.capacity(),
            });
        };
        let mut record = projectile.encode();
        record.id = id;
        if let Some(target) = self.records.get_mut(slot as usize) {
            *target = record;
        }
        self.slots.insert(id, slot);
        trace!(id, slot, "projectile allocated");
        Ok(id)
    }

    fn next_free_id(&mut self) -> u32 {
        // At least one slot is free, so at most `len` ids are taken and
        // this terminates within `len + 1` probes.
        loop {
            let id = self.next_auto_id;
            self.next_auto_id = self.next_auto_id.wrapping_add(1);
            if !self.slots.contains_key(&id) {
                return id;
            }
        }
    }

    /// Frees a projectile's slot. `false` for unknown ids.
    pub fn deallocate(&mut self, id: u32) -> bool {
        let Some(slot) = self.slots.remove(&id) else {
            return false;
        };
        if let Some(record) = self.records.get_mut(slot as usize) {
            *record = ProjectileRecord::default();
        }
        self.free.push(slot);
        true
    }

    /// Raw record of a live projectile.
    #[must_use]
    pub fn record(&self, id: u32) -> Option<&ProjectileRecord> {
        let slot = self.slots.get(&id)?;
        self.records.get(*slot as usize)
    }

    fn record_mut(&mut self, id: u32) -> Option<&mut ProjectileRecord> {
        let slot = self.slots.get(&id)?;
        self.records.get_mut(*slot as usize)
    }

    /// Decoded view of a live projectile.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<Projectile> {
        self.record(id).and_then(Projectile::decode)
    }

    /// Live records, in slot order.
    ///
    /// Walks the id map, so the cost follows the live count, not capacity.
    pub fn active_records(&self) -> impl Iterator<Item = &ProjectileRecord> {
        let mut slots: Vec<u32> = self.slots.values().copied().collect();
        slots.sort_unstable();
        slots
            .into_iter()
            .filter_map(move |slot| self.records.get(slot as usize))
    }

    /// Decoded views of every live projectile, in slot order.
    #[must_use]
    pub fn all_active(&self) -> Vec<Projectile> {
        self.active_records().filter_map(Projectile::decode).collect()
    }

    /// Moves a live projectile. `false` for unknown ids.
    pub fn update_position(&mut self, id: u32, position: Vec3) -> bool {
        match self.record_mut(id) {
            Some(record) => {
                record.position = position.to_array();
                true
            }
            None => false,
        }
    }

    /// Overwrites position, velocity and heading. `false` for unknown ids.
    pub fn update_motion(&mut self, id: u32, position: Vec3, velocity: Vec3) -> bool {
        match self.record_mut(id) {
            Some(record) => {
                record.position = position.to_array();
                record.velocity = velocity.to_array();
                record.rotation[0] = velocity.yaw();
                true
            }
            None => false,
        }
    }

    /// Sets flag bits on a live projectile. `false` for unknown ids.
    pub fn insert_flags(&mut self, id: u32, flags: ProjectileFlags) -> bool {
        match self.record_mut(id) {
            Some(record) => {
                record.flags |= flags.bits();
                true
            }
            None => false,
        }
    }

    /// The whole buffer as bytes (`capacity * 68`).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.records[..])
    }

    /// Makes `self` an exact copy of `other` without reallocating records.
    ///
    /// # Errors
    ///
    /// [`BufferError::CapacityMismatch`] if the capacities differ.
    pub fn copy_from(&mut self, other: &Self) -> BufferResult<()> {
        if self.capacity() != other.capacity() {
            return Err(BufferError::CapacityMismatch {
                expected: self.capacity(),
                actual: other.capacity(),
            });
        }
        self.records.copy_from_slice(&other.records);
        self.free.clone_from(&other.free);
        self.slots.clone_from(&other.slots);
        self.next_auto_id = other.next_auto_id;
        Ok(())
    }

    /// Frees every live projectile. Returns the ids that were freed.
    pub fn clear_active(&mut self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.slots.keys().copied().collect();
        ids.sort_unstable();
        self.records.fill(ProjectileRecord::default());
        self.slots.clear();
        self.free.clear();
        self.free
            .extend((0..self.records.len()).rev().filter_map(|i| u32::try_from(i).ok()));
        ids
    }

    /// Checks that the free list and the id map partition the slots.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let mut seen = vec![false; self.capacity()];
        for &slot in self.free.iter().chain(self.slots.values()) {
            match seen.get_mut(slot as usize) {
                Some(flag) if !*flag => *flag = true,
                _ => return false,
            }
        }
        let all_seen = seen.iter().all(|s| *s);
        let ids_match = self
            .slots
            .iter()
            .all(|(id, slot)| self.records.get(*slot as usize).is_some_and(|r| r.is_active() && r.id == *id));
        all_seen && ids_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bolt(x: f32) -> Projectile {
        Projectile {
            id: 0,
            position: Vec3::new(x, 0.0, 0.0),
            velocity: Vec3::new(0.0, 0.0, 300.0),
            size: 6.0,
            damage: 1.0,
            rotation: [0.0, 0.0],
            color: Color::rgb(255, 50, 50),
            weapon: WeaponType::Blaster,
            missile: MissileType::Standard,
            flags: ProjectileFlags::NONE,
        }
    }

    #[test]
    fn test_full_buffer_reuses_freed_slot() {
        let mut buffer = ProjectileBuffer::new(1);

        let a = buffer.allocate(ProjectileKey::Auto, &bolt(1.0)).unwrap();
        assert_eq!(
            buffer.allocate(ProjectileKey::Auto, &bolt(2.0)),
            Err(BufferError::Full { capacity: 1 })
        );

        assert!(buffer.deallocate(a));
        let b = buffer.allocate(ProjectileKey::Auto, &bolt(2.0)).unwrap();
        assert_eq!(buffer.get(b).unwrap().position.x, 2.0);
        assert!(buffer.is_consistent());
    }

    #[test]
    fn test_rejected_allocation_writes_nothing() {
        let mut buffer = ProjectileBuffer::new(3);
        for x in 0..3 {
            buffer.allocate(ProjectileKey::Auto, &bolt(x as f32)).unwrap();
        }
        let before = buffer.as_bytes().to_vec();

        assert!(buffer.allocate(ProjectileKey::Auto, &bolt(9.0)).is_err());
        assert_eq!(buffer.as_bytes(), &before[..]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut buffer = ProjectileBuffer::new(4);
        buffer.allocate(ProjectileKey::Numeric(7), &bolt(0.0)).unwrap();
        assert_eq!(
            buffer.allocate(ProjectileKey::Numeric(7), &bolt(1.0)),
            Err(BufferError::DuplicateId(7))
        );

        let named = buffer.allocate(ProjectileKey::Named("boss-laser"), &bolt(0.0)).unwrap();
        assert_eq!(named, hash_projectile_name("boss-laser"));
        assert_eq!(
            buffer.allocate(ProjectileKey::Named("boss-laser"), &bolt(0.0)),
            Err(BufferError::DuplicateId(named))
        );

        // Auto ids skip ids already taken
        let auto = buffer.allocate(ProjectileKey::Auto, &bolt(0.0)).unwrap();
        assert_ne!(auto, 7);
        assert_ne!(auto, named);
        assert!(buffer.is_consistent());
    }

    #[test]
    fn test_decode_matches_allocate() {
        let mut buffer = ProjectileBuffer::new(2);
        let mut shot = bolt(5.0);
        shot.weapon = WeaponType::Cannon;
        shot.missile = MissileType::Powerful;
        shot.flags = ProjectileFlags::HOMING | ProjectileFlags::HOSTILE;
        shot.color = Color::rgb(255, 100, 0);

        let id = buffer.allocate(ProjectileKey::Auto, &shot).unwrap();
        let decoded = buffer.get(id).unwrap();
        assert_eq!(decoded, Projectile { id, ..shot });
    }

    #[test]
    fn test_updates_and_unknown_ids() {
        let mut buffer = ProjectileBuffer::new(2);
        let id = buffer.allocate(ProjectileKey::Auto, &bolt(0.0)).unwrap();

        assert!(buffer.update_position(id, Vec3::new(1.0, 2.0, 3.0)));
        assert!(buffer.update_motion(id, Vec3::new(4.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0)));
        assert!(buffer.insert_flags(id, ProjectileFlags::EXPLODED));

        let p = buffer.get(id).unwrap();
        assert_eq!(p.position, Vec3::new(4.0, 0.0, 0.0));
        assert!((p.rotation[0] - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert!(p.flags.contains(ProjectileFlags::EXPLODED));

        assert!(!buffer.update_position(999, Vec3::ZERO));
        assert!(!buffer.insert_flags(999, ProjectileFlags::HOMING));
        assert!(!buffer.deallocate(999));
        assert!(buffer.get(999).is_none());
    }

    #[test]
    fn test_as_bytes_stride() {
        let mut buffer = ProjectileBuffer::new(16);
        assert_eq!(buffer.as_bytes().len(), 16 * ProjectileRecord::STRIDE);

        let id = buffer.allocate(ProjectileKey::Numeric(0xABCD), &bolt(0.0)).unwrap();
        let record: &ProjectileRecord = bytemuck::from_bytes(&buffer.as_bytes()[..ProjectileRecord::STRIDE]);
        assert_eq!(record.id, id);
        assert!(record.is_active());
    }

    #[test]
    fn test_copy_from() {
        let mut a = ProjectileBuffer::new(8);
        a.allocate(ProjectileKey::Numeric(3), &bolt(1.0)).unwrap();
        a.allocate(ProjectileKey::Numeric(4), &bolt(2.0)).unwrap();

        let mut b = ProjectileBuffer::new(8);
        b.copy_from(&a).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(b.len(), 2);
        assert!(b.is_consistent());

        let mut small = ProjectileBuffer::new(4);
        assert_eq!(
            small.copy_from(&a),
            Err(BufferError::CapacityMismatch { expected: 4, actual: 8 })
        );
    }

    #[test]
    fn test_clear_active() {
        let mut buffer = ProjectileBuffer::new(4);
        for id in [9, 2, 5] {
            buffer.allocate(ProjectileKey::Numeric(id), &bolt(0.0)).unwrap();
        }
        assert_eq!(buffer.clear_active(), vec![2, 5, 9]);
        assert!(buffer.is_empty());
        assert!(buffer.as_bytes().iter().all(|b| *b == 0));
        assert!(buffer.is_consistent());
    }

    #[test]
    fn test_enumeration_ignores_free_slots() {
        let mut buffer = ProjectileBuffer::new(100_000);
        let first = buffer.allocate(ProjectileKey::Auto, &bolt(1.0)).unwrap();
        let second = buffer.allocate(ProjectileKey::Numeric(77), &bolt(2.0)).unwrap();
        let third = buffer.allocate(ProjectileKey::Auto, &bolt(3.0)).unwrap();
        assert!(buffer.deallocate(second));

        // Slots are handed out lowest first, so slot order is allocation order
        let ids: Vec<u32> = buffer.active_records().map(|r| r.id).collect();
        assert_eq!(ids, vec![first, third]);

        let live = buffer.all_active();
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].position, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(live[1].position, Vec3::new(3.0, 0.0, 0.0));

        // Reused slot keeps its place in slot order
        let fourth = buffer.allocate(ProjectileKey::Auto, &bolt(4.0)).unwrap();
        let ids: Vec<u32> = buffer.active_records().map(|r| r.id).collect();
        assert_eq!(ids, vec![first, fourth, third]);
    }

    #[test]
    fn test_churn_stays_consistent() {
        let mut buffer = ProjectileBuffer::new(32);
        let mut live = Vec::new();
        for round in 0u32..500 {
            if round % 3 == 2 && !live.is_empty() {
                let id = live.remove((round as usize * 7) % live.len());
                assert!(buffer.deallocate(id));
            } else if let Ok(id) = buffer.allocate(ProjectileKey::Auto, &bolt(round as f32)) {
                live.push(id);
            }
            assert!(buffer.len() <= buffer.capacity());
        }
        assert_eq!(buffer.len(), live.len());
        assert!(buffer.is_consistent());
    }
}
