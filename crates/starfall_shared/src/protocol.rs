//! Packed record types and closed code tables.
//!
//! These types cross thread boundaries as raw bytes. Both sides must agree
//! on these definitions, so every record is `#[repr(C)]` and `Pod` and every
//! symbolic enum has a closed `code()` / `from_code()` table.

use crate::math::Vec3;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Weapon that produced a projectile.
#[repr(u16)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponType {
    /// Single forward shot.
    #[default]
    Blaster = 0,
    /// Shorter cooldown, faster and thinner shots.
    RapidFire = 1,
    /// Three-shot lateral spread.
    MultiShot = 2,
    /// Slow heavy shell.
    Cannon = 3,
    /// Dropped bomb.
    Bomb = 4,
}

impl WeaponType {
    /// Every weapon, in code order.
    pub const ALL: [Self; 5] = [
        Self::Blaster,
        Self::RapidFire,
        Self::MultiShot,
        Self::Cannon,
        Self::Bomb,
    ];

    /// Packed code stored in a [`ProjectileRecord`].
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Reverse lookup of a packed code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Blaster),
            1 => Some(Self::RapidFire),
            2 => Some(Self::MultiShot),
            3 => Some(Self::Cannon),
            4 => Some(Self::Bomb),
            _ => None,
        }
    }

    /// Symbolic name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Blaster => "blaster",
            Self::RapidFire => "rapid_fire",
            Self::MultiShot => "multi_shot",
            Self::Cannon => "cannon",
            Self::Bomb => "bomb",
        }
    }
}

/// Missile body of a projectile.
#[repr(u16)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissileType {
    /// Yellow standard missile.
    #[default]
    Standard = 0,
    /// Cyan rapid missile.
    Rapid = 1,
    /// Orange double-damage missile that explodes on impact.
    Powerful = 2,
    /// Alien bomb aimed at the player.
    Alien = 3,
}

impl MissileType {
    /// Every missile type, in code order.
    pub const ALL: [Self; 4] = [Self::Standard, Self::Rapid, Self::Powerful, Self::Alien];

    /// Packed code stored in a [`ProjectileRecord`].
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Reverse lookup of a packed code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Standard),
            1 => Some(Self::Rapid),
            2 => Some(Self::Powerful),
            3 => Some(Self::Alien),
            _ => None,
        }
    }

    /// Symbolic name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Rapid => "rapid",
            Self::Powerful => "powerful",
            Self::Alien => "alien",
        }
    }
}

/// Projectile bit flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectileFlags(u32);

impl ProjectileFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Steers toward the nearest eligible target.
    pub const HOMING: Self = Self(1 << 0);
    /// Survives hits.
    pub const PIERCING: Self = Self(1 << 1);
    /// Detonated on impact.
    pub const EXPLODED: Self = Self(1 << 2);
    /// Released into the world by the creation stage.
    pub const DEPLOYED: Self = Self(1 << 3);
    /// Fired by an enemy; never damages pooled entities.
    pub const HOSTILE: Self = Self(1 << 4);

    const KNOWN: u32 = 0b1_1111;

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Builds flags from raw bits, dropping unknown bits.
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::KNOWN)
    }

    /// Returns true if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for ProjectileFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// 8-bit RGB color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
}

impl Color {
    /// Creates a color from channels.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channels as floats in `0..=1`, the packed representation.
    #[must_use]
    pub fn to_unit(self) -> [f32; 3] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        ]
    }

    /// Decodes packed `0..=1` floats, rounding to the nearest channel value.
    #[must_use]
    pub fn from_unit(unit: [f32; 3]) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::rgb(channel(unit[0]), channel(unit[1]), channel(unit[2]))
    }

    /// `#rrggbb` form.
    #[must_use]
    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Parses `#rrggbb` (the leading `#` is optional).
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| {
            digits.get(range).and_then(|s| u8::from_str_radix(s, 16).ok())
        };
        Some(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

/// One projectile, packed at a fixed 68-byte stride.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ProjectileRecord {
    /// World position
    pub position: [f32; 3],
    /// Velocity (units per second)
    pub velocity: [f32; 3],
    /// Collision radius
    pub size: f32,
    /// Damage applied on hit
    pub damage: f32,
    /// Yaw, pitch (radians)
    pub rotation: [f32; 2],
    /// RGB in `0..=1`
    pub color: [f32; 3],
    /// Numeric id (unique among active records)
    pub id: u32,
    /// [`WeaponType`] code
    pub weapon_type: u16,
    /// [`MissileType`] code
    pub missile_type: u16,
    /// 1 if the slot is live
    pub active: u32,
    /// [`ProjectileFlags`] bits
    pub flags: u32,
}

impl ProjectileRecord {
    /// Size of one record in bytes.
    pub const STRIDE: usize = std::mem::size_of::<Self>();

    /// Returns true if this slot holds a live projectile.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active != 0
    }

    /// Decoded flags.
    #[inline]
    #[must_use]
    pub const fn flags(&self) -> ProjectileFlags {
        ProjectileFlags::from_bits_truncate(self.flags)
    }

    /// Position as a vector.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    /// Velocity as a vector.
    #[inline]
    #[must_use]
    pub const fn velocity(&self) -> Vec3 {
        Vec3::from_array(self.velocity)
    }
}

/// Flag bit on [`EntitySnapshot::flags`]: the entity is steered by an agent
/// on the main thread and must not be integrated by the physics worker.
pub const SNAPSHOT_AGENT_DRIVEN: u16 = 1 << 0;

/// Read-only copy of one pooled entity, sent to workers.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct EntitySnapshot {
    /// Entity id
    pub id: u64,
    /// World position
    pub position: [f32; 3],
    /// Velocity (units per second)
    pub velocity: [f32; 3],
    /// Euler rotation (radians, `y` is yaw)
    pub rotation: [f32; 3],
    /// Angular velocity (radians per second)
    pub spin: [f32; 3],
    /// Collision radius
    pub size: f32,
    /// Archetype index
    pub archetype: u16,
    /// `SNAPSHOT_*` bits
    pub flags: u16,
}

impl EntitySnapshot {
    /// Returns true if the main thread owns this entity's motion.
    #[inline]
    #[must_use]
    pub const fn is_agent_driven(&self) -> bool {
        self.flags & SNAPSHOT_AGENT_DRIVEN != 0
    }
}

/// Projectile descriptor produced by an agent's weapon.
///
/// Nothing is allocated when this is produced; whoever receives it decides
/// whether and where it enters the projectile buffer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FireRequest {
    /// Entity that fired
    pub owner: u64,
    /// Muzzle position
    pub origin: Vec3,
    /// Initial velocity
    pub velocity: Vec3,
    /// Damage on hit
    pub damage: f32,
    /// Collision radius
    pub size: f32,
    /// Display color
    pub color: Color,
    /// Weapon that fired
    pub weapon: WeaponType,
    /// Missile body
    pub missile: MissileType,
    /// Initial flags
    pub flags: ProjectileFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projectile_record_stride() {
        // Fixed stride for the packed buffer
        assert_eq!(ProjectileRecord::STRIDE, 68);
        assert_eq!(std::mem::align_of::<ProjectileRecord>(), 4);
    }

    #[test]
    fn test_entity_snapshot_size() {
        assert_eq!(std::mem::size_of::<EntitySnapshot>(), 64);
    }

    #[test]
    fn test_code_tables_are_closed() {
        for weapon in WeaponType::ALL {
            assert_eq!(WeaponType::from_code(weapon.code()), Some(weapon));
        }
        for missile in MissileType::ALL {
            assert_eq!(MissileType::from_code(missile.code()), Some(missile));
        }
        assert_eq!(WeaponType::from_code(99), None);
        assert_eq!(MissileType::from_code(4), None);
        assert_eq!(WeaponType::MultiShot.name(), "multi_shot");
        assert_eq!(MissileType::Powerful.name(), "powerful");
    }

    #[test]
    fn test_color_unit_round_trip() {
        for color in [
            Color::rgb(255, 50, 50),
            Color::rgb(0, 255, 255),
            Color::rgb(1, 2, 3),
            Color::rgb(128, 127, 254),
        ] {
            assert_eq!(Color::from_unit(color.to_unit()), color);
        }
    }

    #[test]
    fn test_color_hex() {
        let color = Color::rgb(255, 100, 0);
        assert_eq!(color.hex(), "#ff6400");
        assert_eq!(Color::from_hex("#ff6400"), Some(color));
        assert_eq!(Color::from_hex("ff6400"), Some(color));
        assert_eq!(Color::from_hex("#ff64"), None);
        assert_eq!(Color::from_hex("#gg6400"), None);
    }

    #[test]
    fn test_flags() {
        let mut flags = ProjectileFlags::HOMING | ProjectileFlags::HOSTILE;
        assert!(flags.contains(ProjectileFlags::HOMING));
        assert!(!flags.contains(ProjectileFlags::PIERCING));
        flags.insert(ProjectileFlags::EXPLODED);
        flags.remove(ProjectileFlags::HOMING);
        assert_eq!(flags, ProjectileFlags::EXPLODED | ProjectileFlags::HOSTILE);
        assert_eq!(ProjectileFlags::from_bits_truncate(0xFFFF_FFFF).bits(), 0b1_1111);
    }
}
