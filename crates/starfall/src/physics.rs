//! # Compute Kernels
//!
//! Pure functions run by the worker threads. The main-thread fallback runs
//! exactly the same functions, so degraded mode differs in latency only.
//!
//! Kernels read snapshots and a lent projectile buffer and return advisory
//! results. They never touch the pool or the live buffer; the orchestrator
//! applies what they return.

use starfall_core::{Projectile, ProjectileBuffer};
use starfall_shared::constants::{HOMING_RANGE, HOMING_TURN_RATE, MULTI_SHOT_SPACING};
use starfall_shared::{
    wrap_angle, EntitySnapshot, FireRequest, MissileType, ProjectileFlags, Vec3, WeaponType,
};

use crate::config::PlayBounds;

/// New motion state for one entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntityMotion {
    /// Entity id.
    pub id: u64,
    /// Integrated position.
    pub position: Vec3,
    /// Velocity (unchanged by integration).
    pub velocity: Vec3,
    /// Integrated rotation.
    pub rotation: Vec3,
}

/// Where hostile projectiles are aimed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerTarget {
    /// Player position.
    pub position: Vec3,
    /// Collision radius.
    pub radius: f32,
}

/// New motion state for one projectile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectileMotion {
    /// Projectile id.
    pub id: u32,
    /// Integrated position.
    pub position: Vec3,
    /// Velocity after homing.
    pub velocity: Vec3,
}

/// A friendly projectile overlapping an entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hit {
    /// Projectile id.
    pub projectile_id: u32,
    /// Entity hit.
    pub entity_id: u64,
    /// Damage carried.
    pub damage: f32,
    /// Impact point.
    pub position: Vec3,
    /// Missile body (powerful missiles explode).
    pub missile: MissileType,
    /// Projectile survives the hit.
    pub piercing: bool,
}

/// A hostile projectile reaching the player.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerHitReport {
    /// Projectile id.
    pub projectile_id: u32,
    /// Damage carried.
    pub damage: f32,
    /// Impact point.
    pub position: Vec3,
}

/// Why the collision step retired a projectile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retirement {
    /// Left the play volume.
    OutOfBounds,
    /// Exploded last step; the blast has been shown.
    Detonated,
}

/// Output of [`step_projectiles`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollisionReport {
    /// Projectiles still in flight.
    pub motions: Vec<ProjectileMotion>,
    /// Friendly projectiles hitting entities.
    pub hits: Vec<Hit>,
    /// Hostile projectiles hitting the player.
    pub player_hits: Vec<PlayerHitReport>,
    /// Projectiles to remove.
    pub retired: Vec<(u32, Retirement)>,
}

/// Integrates every entity not steered by an agent.
pub fn integrate_entities(entities: &[EntitySnapshot], dt: f32) -> Vec<EntityMotion> {
    entities
        .iter()
        .filter(|e| !e.is_agent_driven())
        .map(|e| {
            let velocity = Vec3::from_array(e.velocity);
            let rotation = Vec3::from_array(e.rotation) + Vec3::from_array(e.spin) * dt;
            EntityMotion {
                id: e.id,
                position: Vec3::from_array(e.position) + velocity * dt,
                velocity,
                rotation: Vec3::new(wrap_angle(rotation.x), wrap_angle(rotation.y), wrap_angle(rotation.z)),
            }
        })
        .collect()
}

/// Turns `velocity` toward `to` on the XZ plane by at most `max_turn`
/// radians, keeping its speed.
#[must_use]
pub fn steer_toward(velocity: Vec3, from: Vec3, to: Vec3, max_turn: f32) -> Vec3 {
    let horizontal = Vec3::new(velocity.x, 0.0, velocity.z);
    let speed = horizontal.length();
    if speed <= f32::EPSILON {
        return velocity;
    }
    let current = horizontal.yaw();
    let delta = wrap_angle((to - from).yaw() - current).clamp(-max_turn, max_turn);
    let heading = Vec3::from_yaw(current + delta);
    Vec3::new(heading.x * speed, velocity.y, heading.z * speed)
}

fn nearest_entity(entities: &[EntitySnapshot], point: Vec3, range: f32) -> Option<&EntitySnapshot> {
    entities
        .iter()
        .map(|e| (e, Vec3::from_array(e.position).distance_squared(point)))
        .filter(|(_, d2)| *d2 <= range * range)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(e, _)| e)
}

/// Advances every projectile in the lent buffer one step and checks it
/// against entities, the player and the play volume.
///
/// - Hostile projectiles never hit entities; they hit the player.
/// - A non-piercing projectile hits at most the nearest overlapping entity.
/// - Piercing projectiles hit every overlapping entity and fly on.
/// - Projectiles flagged `EXPLODED` are retired.
pub fn step_projectiles(
    buffer: &ProjectileBuffer,
    entities: &[EntitySnapshot],
    dt: f32,
    bounds: &PlayBounds,
    player: Option<PlayerTarget>,
) -> CollisionReport {
    let mut report = CollisionReport::default();

    for record in buffer.active_records() {
        let flags = record.flags();
        if flags.contains(ProjectileFlags::EXPLODED) {
            report.retired.push((record.id, Retirement::Detonated));
            continue;
        }

        let hostile = flags.contains(ProjectileFlags::HOSTILE);
        let start = record.position();
        let mut velocity = record.velocity();

        if flags.contains(ProjectileFlags::HOMING) {
            let max_turn = HOMING_TURN_RATE * dt;
            let aim = if hostile {
                player.map(|p| p.position)
            } else {
                nearest_entity(entities, start, HOMING_RANGE).map(|e| Vec3::from_array(e.position))
            };
            if let Some(aim) = aim {
                velocity = steer_toward(velocity, start, aim, max_turn);
            }
        }

        let position = start + velocity * dt;
        if !bounds.contains(position) {
            report.retired.push((record.id, Retirement::OutOfBounds));
            continue;
        }

        if hostile {
            if let Some(player) = player {
                if position.distance(player.position) < player.radius + record.size {
                    report.player_hits.push(PlayerHitReport {
                        projectile_id: record.id,
                        damage: record.damage,
                        position,
                    });
                    continue;
                }
            }
        } else {
            let overlapping = entities.iter().filter(|e| {
                Vec3::from_array(e.position).distance(position) < e.size + record.size
            });
            let missile = MissileType::from_code(record.missile_type).unwrap_or_default();
            let hit = |e: &EntitySnapshot, piercing: bool| Hit {
                projectile_id: record.id,
                entity_id: e.id,
                damage: record.damage,
                position,
                missile,
                piercing,
            };

            if flags.contains(ProjectileFlags::PIERCING) {
                report.hits.extend(overlapping.map(|e| hit(e, true)));
            } else if let Some(target) = overlapping
                .min_by(|a, b| {
                    let da = Vec3::from_array(a.position).distance_squared(position);
                    let db = Vec3::from_array(b.position).distance_squared(position);
                    da.total_cmp(&db)
                })
            {
                report.hits.push(hit(target, false));
                continue;
            }
        }

        report.motions.push(ProjectileMotion {
            id: record.id,
            position,
            velocity,
        });
    }

    report
}

/// Turns weapon fire into projectiles ready for the buffer.
///
/// Multi-shot fire becomes a lateral three-shot spread; everything leaves
/// flagged `DEPLOYED`.
pub fn expand_fire_requests(requests: &[FireRequest]) -> Vec<Projectile> {
    let mut projectiles = Vec::with_capacity(requests.len());
    for request in requests {
        let mut base = Projectile::from_fire_request(request);
        base.flags.insert(ProjectileFlags::DEPLOYED);

        if request.weapon == WeaponType::MultiShot {
            let lateral = Vec3::new(request.velocity.x, 0.0, request.velocity.z)
                .perpendicular_xz()
                .normalize_or_zero();
            for offset in [-MULTI_SHOT_SPACING, 0.0, MULTI_SHOT_SPACING] {
                projectiles.push(Projectile {
                    position: base.position + lateral * offset,
                    ..base
                });
            }
        } else {
            projectiles.push(base);
        }
    }
    projectiles
}
