//! # Archetype Registry
//!
//! The one authoritative table of entity templates. Pools warm from it,
//! agents read their loadout from it, and the presentation layer reads the
//! same records for sizes and colors, so the numbers cannot drift apart.
//!
//! ## Table format
//!
//! ```toml
//! [[archetype]]
//! name = "scout"
//! max_health = 1.0
//! size = 30.0
//! speed = 60.0
//! point_value = 10
//! pool_size = 32
//! agent = true
//!
//! [archetype.loadout]
//! weapon = "blaster"
//! missile = "alien"
//! projectile_speed = 240.0
//! damage = 1.0
//! projectile_size = 6.0
//! cooldown_ms = 2000
//! color = { r = 255, g = 100, b = 100 }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use starfall_shared::{Color, MissileType, Vec3, WeaponType};

use crate::error::{CoreError, CoreResult};

/// Index of a template in the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(u16);

impl ArchetypeId {
    /// Wraps a raw packed archetype code.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw packed code.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Index into per-archetype tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Weapon carried by an armed archetype.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Loadout {
    /// Weapon code written into projectile records.
    pub weapon: WeaponType,
    /// Missile body written into projectile records.
    #[serde(default)]
    pub missile: MissileType,
    /// Muzzle speed (units per second).
    pub projectile_speed: f32,
    /// Damage per projectile.
    pub damage: f32,
    /// Projectile collision radius.
    #[serde(default = "default_projectile_size")]
    pub projectile_size: f32,
    /// Minimum time between shots (ms).
    pub cooldown_ms: u64,
    /// Projectile color.
    pub color: Color,
}

const fn default_projectile_size() -> f32 {
    6.0
}

const fn default_pool_size() -> usize {
    16
}

/// Default stats for one kind of entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchetypeTemplate {
    /// Unique name (`"scout"`, `"asteroid"`, ...).
    pub name: String,
    /// Health on spawn.
    pub max_health: f32,
    /// Collision radius.
    pub size: f32,
    /// Top speed (units per second).
    pub speed: f32,
    /// Points awarded when destroyed.
    pub point_value: u32,
    /// Pre-warmed pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Spawns with a behavior agent.
    #[serde(default)]
    pub agent: bool,
    /// Spawn shield duration (ms).
    #[serde(default)]
    pub spawn_invulnerable_ms: u64,
    /// Default angular velocity (radians per second).
    #[serde(default)]
    pub spin: Vec3,
    /// Weapon, if armed.
    #[serde(default)]
    pub loadout: Option<Loadout>,
}

impl ArchetypeTemplate {
    /// Checks the template for values the simulation cannot handle.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArchetype`] naming the first bad field.
    pub fn validate(&self) -> CoreResult<()> {
        let fail = |reason: &str| {
            Err(CoreError::InvalidArchetype {
                name: self.name.clone(),
                reason: reason.to_owned(),
            })
        };

        if self.name.trim().is_empty() {
            return fail("name must not be empty");
        }
        if !(self.max_health.is_finite() && self.max_health > 0.0) {
            return fail("max_health must be positive");
        }
        if !(self.size.is_finite() && self.size > 0.0) {
            return fail("size must be positive");
        }
        if !(self.speed.is_finite() && self.speed >= 0.0) {
            return fail("speed must not be negative");
        }
        if !self.spin.is_finite() {
            return fail("spin must be finite");
        }
        if let Some(loadout) = &self.loadout {
            if !(loadout.projectile_speed.is_finite() && loadout.projectile_speed > 0.0) {
                return fail("loadout.projectile_speed must be positive");
            }
            if !(loadout.damage.is_finite() && loadout.damage >= 0.0) {
                return fail("loadout.damage must not be negative");
            }
            if !(loadout.projectile_size.is_finite() && loadout.projectile_size > 0.0) {
                return fail("loadout.projectile_size must be positive");
            }
        }
        Ok(())
    }
}

/// On-disk shape of an archetype table.
#[derive(Debug, Deserialize)]
struct ArchetypeTable {
    #[serde(default)]
    archetype: Vec<ArchetypeTemplate>,
}

/// Authoritative archetype table.
#[derive(Clone, Debug, Default)]
pub struct ArchetypeRegistry {
    templates: Vec<ArchetypeTemplate>,
    by_name: HashMap<String, ArchetypeId>,
}

impl ArchetypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from templates, validating each one.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid or duplicate template.
    pub fn from_templates(templates: impl IntoIterator<Item = ArchetypeTemplate>) -> CoreResult<Self> {
        let mut registry = Self::new();
        for template in templates {
            registry.register(template)?;
        }
        Ok(registry)
    }

    /// Parses a `[[archetype]]` TOML table.
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML or any invalid template.
    pub fn from_toml_str(source: &str) -> CoreResult<Self> {
        let table: ArchetypeTable = toml::from_str(source)?;
        Self::from_templates(table.archetype)
    }

    /// Adds a template.
    ///
    /// # Errors
    ///
    /// Fails if the template is invalid, its name is taken, or the table is full.
    pub fn register(&mut self, template: ArchetypeTemplate) -> CoreResult<ArchetypeId> {
        template.validate()?;
        if self.by_name.contains_key(&template.name) {
            return Err(CoreError::DuplicateArchetype(template.name));
        }
        let raw = u16::try_from(self.templates.len()).map_err(|_| CoreError::TooManyArchetypes {
            max: usize::from(u16::MAX),
        })?;
        let id = ArchetypeId(raw);
        self.by_name.insert(template.name.clone(), id);
        self.templates.push(template);
        Ok(id)
    }

    /// Looks up a template by id.
    #[inline]
    #[must_use]
    pub fn get(&self, id: ArchetypeId) -> Option<&ArchetypeTemplate> {
        self.templates.get(id.index())
    }

    /// Looks up an id by name.
    #[inline]
    #[must_use]
    pub fn id(&self, name: &str) -> Option<ArchetypeId> {
        self.by_name.get(name).copied()
    }

    /// Looks up an id by name, failing for unknown names.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownArchetype`].
    pub fn require(&self, name: &str) -> CoreResult<ArchetypeId> {
        self.id(name)
            .ok_or_else(|| CoreError::UnknownArchetype(name.to_owned()))
    }

    /// Iterates `(id, template)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (ArchetypeId, &ArchetypeTemplate)> {
        self.templates
            .iter()
            .enumerate()
            .filter_map(|(i, t)| u16::try_from(i).ok().map(|raw| (ArchetypeId(raw), t)))
    }

    /// Number of templates.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns true if no templates are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// The shipped archetype table.
    ///
    /// Health and point values follow the arcade original (scouts die in one
    /// hit, armored ships take two, elites three); speeds are the original
    /// per-frame speeds at 60 Hz.
    #[must_use]
    pub fn builtin() -> Self {
        let enemy_fire = Color::rgb(255, 100, 100);
        let templates = [
            ArchetypeTemplate {
                name: "scout".into(),
                max_health: 1.0,
                size: 30.0,
                speed: 60.0,
                point_value: 10,
                pool_size: 32,
                agent: true,
                spawn_invulnerable_ms: 0,
                spin: Vec3::ZERO,
                loadout: Some(Loadout {
                    weapon: WeaponType::Blaster,
                    missile: MissileType::Alien,
                    projectile_speed: 240.0,
                    damage: 1.0,
                    projectile_size: 6.0,
                    cooldown_ms: 2_000,
                    color: enemy_fire,
                }),
            },
            ArchetypeTemplate {
                name: "armored".into(),
                max_health: 2.0,
                size: 30.0,
                speed: 90.0,
                point_value: 15,
                pool_size: 16,
                agent: true,
                spawn_invulnerable_ms: 0,
                spin: Vec3::ZERO,
                loadout: Some(Loadout {
                    weapon: WeaponType::Cannon,
                    missile: MissileType::Powerful,
                    projectile_speed: 180.0,
                    damage: 2.0,
                    projectile_size: 9.0,
                    cooldown_ms: 2_500,
                    color: Color::rgb(255, 100, 0),
                }),
            },
            ArchetypeTemplate {
                name: "elite".into(),
                max_health: 3.0,
                size: 35.0,
                speed: 120.0,
                point_value: 20,
                pool_size: 8,
                agent: true,
                spawn_invulnerable_ms: 500,
                spin: Vec3::ZERO,
                loadout: Some(Loadout {
                    weapon: WeaponType::RapidFire,
                    missile: MissileType::Rapid,
                    projectile_speed: 540.0,
                    damage: 1.0,
                    projectile_size: 4.5,
                    cooldown_ms: 1_200,
                    color: Color::rgb(0, 255, 255),
                }),
            },
            ArchetypeTemplate {
                name: "bomber".into(),
                max_health: 1.0,
                size: 35.0,
                speed: 48.0,
                point_value: 25,
                pool_size: 8,
                agent: true,
                spawn_invulnerable_ms: 0,
                spin: Vec3::ZERO,
                loadout: Some(Loadout {
                    weapon: WeaponType::Bomb,
                    missile: MissileType::Alien,
                    projectile_speed: 240.0,
                    damage: 1.0,
                    projectile_size: 9.0,
                    cooldown_ms: 3_000,
                    color: enemy_fire,
                }),
            },
            ArchetypeTemplate {
                name: "fast".into(),
                max_health: 1.0,
                size: 25.0,
                speed: 120.0,
                point_value: 15,
                pool_size: 16,
                agent: true,
                spawn_invulnerable_ms: 0,
                spin: Vec3::ZERO,
                loadout: Some(Loadout {
                    weapon: WeaponType::MultiShot,
                    missile: MissileType::Standard,
                    projectile_speed: 420.0,
                    damage: 1.0,
                    projectile_size: 6.0,
                    cooldown_ms: 2_200,
                    color: Color::rgb(255, 255, 0),
                }),
            },
            ArchetypeTemplate {
                name: "asteroid".into(),
                max_health: 4.0,
                size: 40.0,
                speed: 30.0,
                point_value: 5,
                pool_size: 24,
                agent: false,
                spawn_invulnerable_ms: 0,
                spin: Vec3::new(0.0, 0.8, 0.3),
                loadout: None,
            },
        ];

        let mut registry = Self::new();
        for template in templates {
            let name = template.name.clone();
            let id = u16::try_from(registry.templates.len()).unwrap_or(u16::MAX);
            registry.by_name.insert(name, ArchetypeId(id));
            registry.templates.push(template);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_valid() {
        let registry = ArchetypeRegistry::builtin();
        assert_eq!(registry.len(), 6);
        for (id, template) in registry.iter() {
            template.validate().unwrap();
            assert_eq!(registry.id(&template.name), Some(id));
        }
        let scout = registry.get(registry.require("scout").unwrap()).unwrap();
        assert_eq!(scout.max_health, 1.0);
        assert_eq!(scout.point_value, 10);
        assert!(registry.get(registry.require("asteroid").unwrap()).unwrap().loadout.is_none());
    }

    #[test]
    fn test_from_toml() {
        let source = r#"
            [[archetype]]
            name = "drone"
            max_health = 2.0
            size = 20.0
            speed = 75.0
            point_value = 12
            agent = true

            [archetype.loadout]
            weapon = "rapid_fire"
            missile = "rapid"
            projectile_speed = 300.0
            damage = 1.0
            cooldown_ms = 900
            color = { r = 0, g = 255, b = 255 }

            [[archetype]]
            name = "rock"
            max_health = 5.0
            size = 50.0
            speed = 10.0
            point_value = 1
            pool_size = 4
            spin = { x = 0.0, y = 1.0, z = 0.0 }
        "#;

        let registry = ArchetypeRegistry::from_toml_str(source).unwrap();
        assert_eq!(registry.len(), 2);

        let drone = registry.get(registry.require("drone").unwrap()).unwrap();
        assert_eq!(drone.pool_size, 16); // default
        let loadout = drone.loadout.unwrap();
        assert_eq!(loadout.weapon, WeaponType::RapidFire);
        assert_eq!(loadout.projectile_size, 6.0); // default

        let rock = registry.get(registry.require("rock").unwrap()).unwrap();
        assert!(!rock.agent);
        assert_eq!(rock.spin, Vec3::Y);
    }

    #[test]
    fn test_duplicate_and_invalid_rejected() {
        let mut registry = ArchetypeRegistry::builtin();
        let dup = registry.get(ArchetypeId::from_raw(0)).unwrap().clone();
        assert!(matches!(registry.register(dup), Err(CoreError::DuplicateArchetype(_))));

        let mut bad = registry.get(ArchetypeId::from_raw(0)).unwrap().clone();
        bad.name = "ghost".into();
        bad.max_health = 0.0;
        assert!(matches!(
            registry.register(bad),
            Err(CoreError::InvalidArchetype { .. })
        ));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let source = r#"
            [[archetype]]
            name = "typo"
            max_health = 1.0
            size = 1.0
            speed = 1.0
            point_value = 1
            max_helth = 3.0
        "#;
        assert!(matches!(
            ArchetypeRegistry::from_toml_str(source),
            Err(CoreError::ArchetypeParse(_))
        ));
    }

    #[test]
    fn test_unknown_name() {
        let registry = ArchetypeRegistry::builtin();
        assert!(registry.id("mothership").is_none());
        assert!(matches!(
            registry.require("mothership"),
            Err(CoreError::UnknownArchetype(name)) if name == "mothership"
        ));
    }
}
