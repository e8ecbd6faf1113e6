//! # Behavior Agents
//!
//! One agent per armed entity. Each tick the agent picks an acceleration
//! from its mode, integrates its entity's motion, turns it toward what it
//! cares about, and decides whether the weapon may fire.
//!
//! ```text
//!            ┌──────────┐  arrival   ┌────────────┐
//!  spawn ───>│  Tasked  │───────────>│ on_arrival │
//!            └──────────┘            └────────────┘
//!  Passive    no steering
//!  Exploring  half-strength seek toward random waypoints
//!  Combat     evade / strafe / seek by distance to the target
//! ```
//!
//! Agents never touch the pool or the projectile buffer. Firing produces a
//! [`FireRequest`] for the caller to route.

use std::f32::consts::TAU;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use starfall_core::{ArchetypeTemplate, Entity, EntityId, Loadout};
use starfall_shared::constants::{DEFAULT_SPAWN_GRACE_MS, DEFAULT_TURN_RATE};
use starfall_shared::{
    wrap_angle, FireRequest, ProjectileFlags, Vec3, DEFAULT_DRAG, DEFAULT_FIRE_CONE_DEGREES,
};

// ============================================================================
// MODES
// ============================================================================

/// Random-waypoint wandering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExploreParams {
    /// Waypoints are drawn around this point.
    pub center: Vec3,
    /// Waypoint radius on the XZ plane.
    pub radius: f32,
    /// A new waypoint is drawn within this distance of the current one.
    pub waypoint_reached_distance: f32,
}

/// Distance bands for fighting a target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CombatParams {
    /// Preferred engagement distance. Beyond 1.5x this the agent closes in.
    pub combat_range: f32,
    /// Closer than this the agent breaks away.
    pub evasion_distance: f32,
    /// Lateral swing while strafing.
    pub strafe_amplitude: f32,
    /// Strafe oscillation (Hz).
    pub strafe_frequency: f32,
}

impl Default for CombatParams {
    fn default() -> Self {
        Self {
            combat_range: 200.0,
            evasion_distance: 60.0,
            strafe_amplitude: 80.0,
            strafe_frequency: 0.5,
        }
    }
}

/// What an agent is currently doing.
#[derive(Clone, Debug, PartialEq)]
pub enum BehaviorMode {
    /// No acceleration.
    Passive,
    /// Wander between random waypoints.
    Exploring(ExploreParams),
    /// Fly to `destination`, then switch to `on_arrival`.
    Tasked {
        /// Where to go.
        destination: Vec3,
        /// Arrival threshold.
        arrival_distance: f32,
        /// Mode taken on arrival.
        on_arrival: Box<BehaviorMode>,
    },
    /// Engage the current target.
    Combat(CombatParams),
}

/// Sub-state chosen each update while in combat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombatManeuver {
    /// Too close: break away.
    Evade,
    /// Too far: close in.
    Seek,
    /// In range: orbit with a lateral swing.
    Strafe,
}

/// Per-agent motion and weapon limits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentTuning {
    /// Full seek acceleration (units per second squared).
    pub seek_acceleration: f32,
    /// Speed clamp.
    pub max_speed: f32,
    /// Velocity multiplier applied every update.
    pub drag: f32,
    /// Yaw rate limit (radians per second).
    pub turn_rate: f32,
    /// Firing cone half-angle.
    pub fire_cone_degrees: f32,
    /// No firing this long after spawn.
    pub spawn_grace_ms: u64,
    /// Muzzle distance ahead of the hull.
    pub muzzle_offset: f32,
}

impl AgentTuning {
    /// Tuning derived from an archetype's speed.
    #[must_use]
    pub fn for_template(template: &ArchetypeTemplate) -> Self {
        Self {
            seek_acceleration: template.speed * 4.0,
            max_speed: template.speed,
            drag: DEFAULT_DRAG,
            turn_rate: DEFAULT_TURN_RATE,
            fire_cone_degrees: DEFAULT_FIRE_CONE_DEGREES,
            spawn_grace_ms: DEFAULT_SPAWN_GRACE_MS,
            muzzle_offset: 5.0,
        }
    }
}

// ============================================================================
// AGENT
// ============================================================================

/// State machine steering one entity.
#[derive(Clone, Debug)]
pub struct BehaviorAgent {
    entity: EntityId,
    mode: BehaviorMode,
    tuning: AgentTuning,
    loadout: Option<Loadout>,
    target: Option<Vec3>,
    waypoint: Option<Vec3>,
    maneuver: Option<CombatManeuver>,
    strafe_phase: f32,
    evade_phase: f32,
    elapsed: f32,
    last_fire_ms: Option<u64>,
    rng: ChaCha8Rng,
}

impl BehaviorAgent {
    /// Creates an agent for `entity` using the archetype's speed and loadout.
    ///
    /// Randomness is seeded from the entity id, so two runs with the same
    /// spawns behave identically.
    #[must_use]
    pub fn new(entity: EntityId, template: &ArchetypeTemplate, mode: BehaviorMode) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(entity.raw());
        #[allow(clippy::cast_precision_loss)]
        let strafe_phase = (entity.raw() as f32 * 0.618_034).fract() * TAU;
        let evade_phase = rng.gen_range(0.0..TAU);
        Self {
            entity,
            mode,
            tuning: AgentTuning::for_template(template),
            loadout: template.loadout,
            target: None,
            waypoint: None,
            maneuver: None,
            strafe_phase,
            evade_phase,
            elapsed: 0.0,
            last_fire_ms: None,
            rng,
        }
    }

    /// Entity this agent steers.
    #[inline]
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Current mode.
    #[inline]
    #[must_use]
    pub const fn mode(&self) -> &BehaviorMode {
        &self.mode
    }

    /// Switches mode. Any exploration waypoint is forgotten.
    pub fn set_mode(&mut self, mode: BehaviorMode) {
        self.mode = mode;
        self.waypoint = None;
        self.maneuver = None;
    }

    /// Current target position.
    #[inline]
    #[must_use]
    pub const fn target(&self) -> Option<Vec3> {
        self.target
    }

    /// Sets or clears the target.
    pub fn set_target(&mut self, target: Option<Vec3>) {
        self.target = target.filter(|t| t.is_finite());
    }

    /// Maneuver picked by the last combat update.
    #[inline]
    #[must_use]
    pub const fn maneuver(&self) -> Option<CombatManeuver> {
        self.maneuver
    }

    /// Current exploration waypoint.
    #[inline]
    #[must_use]
    pub const fn waypoint(&self) -> Option<Vec3> {
        self.waypoint
    }

    /// Time of the last shot.
    #[inline]
    #[must_use]
    pub const fn last_fire_ms(&self) -> Option<u64> {
        self.last_fire_ms
    }

    /// Motion and weapon limits.
    #[inline]
    #[must_use]
    pub const fn tuning(&self) -> &AgentTuning {
        &self.tuning
    }

    /// Mutable limits, e.g. to widen the firing cone.
    pub fn tuning_mut(&mut self) -> &mut AgentTuning {
        &mut self.tuning
    }

    /// Advances the agent and its entity by `dt` seconds.
    pub fn update(&mut self, body: &mut Entity, dt: f32) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.elapsed += dt;

        self.check_arrival(body.position);
        let acceleration = self.acceleration(body.position);

        body.velocity += acceleration * dt;
        body.velocity *= self.tuning.drag;
        body.velocity = body.velocity.clamp_length(self.tuning.max_speed);
        body.position += body.velocity * dt;

        self.turn(body, dt);
    }

    fn check_arrival(&mut self, position: Vec3) {
        let arrived = matches!(
            &self.mode,
            BehaviorMode::Tasked { destination, arrival_distance, .. }
                if position.distance(*destination) < *arrival_distance
        );
        if !arrived {
            return;
        }
        if let BehaviorMode::Tasked { on_arrival, .. } =
            std::mem::replace(&mut self.mode, BehaviorMode::Passive)
        {
            self.set_mode(*on_arrival);
        }
    }

    fn acceleration(&mut self, position: Vec3) -> Vec3 {
        let full = self.tuning.seek_acceleration;
        match self.mode {
            BehaviorMode::Passive => Vec3::ZERO,
            BehaviorMode::Exploring(params) => {
                let waypoint = match self.waypoint {
                    Some(w) if position.distance(w) >= params.waypoint_reached_distance => w,
                    _ => self.pick_waypoint(&params),
                };
                (waypoint - position).normalize_or_zero() * (full * 0.5)
            }
            BehaviorMode::Tasked { destination, .. } => (destination - position).normalize_or_zero() * full,
            BehaviorMode::Combat(params) => self.combat_acceleration(position, &params),
        }
    }

    fn pick_waypoint(&mut self, params: &ExploreParams) -> Vec3 {
        let angle = self.rng.gen_range(0.0..TAU);
        let distance = params.radius.max(0.0) * self.rng.gen::<f32>().sqrt();
        let waypoint = params.center + Vec3::from_yaw(angle) * distance;
        self.waypoint = Some(waypoint);
        waypoint
    }

    fn combat_acceleration(&mut self, position: Vec3, params: &CombatParams) -> Vec3 {
        let Some(target) = self.target else {
            self.maneuver = None;
            return Vec3::ZERO;
        };
        let full = self.tuning.seek_acceleration;
        let to_target = target - position;
        let distance = to_target.length();
        let toward = to_target.normalize_or_zero();

        if distance < params.evasion_distance {
            if self.maneuver != Some(CombatManeuver::Evade) {
                self.evade_phase = self.rng.gen_range(0.0..TAU);
            }
            self.maneuver = Some(CombatManeuver::Evade);
            let away = -toward;
            let sideways = away.perpendicular_xz() * self.evade_phase.sin();
            (away + sideways).normalize_or_zero() * full
        } else if distance > params.combat_range * 1.5 {
            self.maneuver = Some(CombatManeuver::Seek);
            toward * full
        } else {
            self.maneuver = Some(CombatManeuver::Strafe);
            let swing = (TAU * params.strafe_frequency * self.elapsed + self.strafe_phase).sin();
            let anchor = target - toward * params.combat_range
                + toward.perpendicular_xz() * (params.strafe_amplitude * swing);
            (anchor - position).normalize_or_zero() * full
        }
    }

    fn turn(&self, body: &mut Entity, dt: f32) {
        let facing = match (&self.mode, self.target) {
            (BehaviorMode::Combat(_), Some(target)) => target - body.position,
            _ => body.velocity,
        };
        if Vec3::new(facing.x, 0.0, facing.z).length_squared() <= f32::EPSILON {
            return;
        }
        let max_turn = self.tuning.turn_rate * dt;
        let delta = wrap_angle(facing.yaw() - body.rotation.y).clamp(-max_turn, max_turn);
        body.rotation.y = wrap_angle(body.rotation.y + delta);
    }

    /// Returns true if the weapon may fire at `now_ms`.
    ///
    /// Requires a target, a loadout, an expired cooldown, no spawn grace or
    /// shield, and the target inside the firing cone.
    #[must_use]
    pub fn can_fire(&self, body: &Entity, now_ms: u64) -> bool {
        let (Some(target), Some(loadout)) = (self.target, self.loadout) else {
            return false;
        };
        if let Some(last) = self.last_fire_ms {
            if now_ms.saturating_sub(last) < loadout.cooldown_ms {
                return false;
            }
        }
        if now_ms.saturating_sub(body.spawned_at_ms()) < self.tuning.spawn_grace_ms {
            return false;
        }
        if body.is_invulnerable(now_ms) {
            return false;
        }

        let to_target = target - body.position;
        let aim = Vec3::new(to_target.x, 0.0, to_target.z).normalize_or_zero();
        if aim == Vec3::ZERO {
            return false;
        }
        body.forward().dot(aim) >= self.tuning.fire_cone_degrees.to_radians().cos()
    }

    /// Fires at the target if [`can_fire`](Self::can_fire) allows it and
    /// starts the cooldown.
    pub fn fire(&mut self, body: &Entity, now_ms: u64) -> Option<FireRequest> {
        if !self.can_fire(body, now_ms) {
            return None;
        }
        let target = self.target?;
        let loadout = self.loadout?;

        let origin = body.position + body.forward() * (body.size() + self.tuning.muzzle_offset);
        let mut aim = (target - origin).normalize_or_zero();
        if aim == Vec3::ZERO {
            aim = body.forward();
        }

        self.last_fire_ms = Some(now_ms);
        Some(FireRequest {
            owner: self.entity.raw(),
            origin,
            velocity: aim * loadout.projectile_speed,
            damage: loadout.damage,
            size: loadout.projectile_size,
            color: loadout.color,
            weapon: loadout.weapon,
            missile: loadout.missile,
            flags: ProjectileFlags::HOSTILE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starfall_core::{ArchetypeRegistry, EntityPool, SpawnOverrides};

    fn spawn(pool: &mut EntityPool, name: &str, overrides: SpawnOverrides) -> (EntityId, BehaviorAgent) {
        let id = pool.acquire_named(name, overrides).unwrap();
        let template = pool.registry().get(pool.archetype_of(id).unwrap()).unwrap().clone();
        (id, BehaviorAgent::new(id, &template, BehaviorMode::Passive))
    }

    fn pool_at(now_ms: u64) -> EntityPool {
        let mut pool = EntityPool::new(ArchetypeRegistry::builtin());
        pool.begin_tick(now_ms);
        pool
    }

    #[test]
    fn test_passive_drifts_to_rest() {
        let mut pool = pool_at(0);
        let (id, mut agent) = spawn(&mut pool, "scout", SpawnOverrides::at(Vec3::ZERO).with_velocity(Vec3::X * 10.0));
        let body = pool.get_mut(id).unwrap();

        for _ in 0..200 {
            agent.update(body, 1.0 / 60.0);
        }
        assert!(body.velocity.length() < 0.01);
        assert!(body.position.x > 0.0);
    }

    #[test]
    fn test_speed_is_clamped() {
        let mut pool = pool_at(0);
        let (id, mut agent) = spawn(&mut pool, "fast", SpawnOverrides::default());
        agent.set_mode(BehaviorMode::Tasked {
            destination: Vec3::new(0.0, 0.0, 5_000.0),
            arrival_distance: 10.0,
            on_arrival: Box::new(BehaviorMode::Passive),
        });
        let max_speed = agent.tuning().max_speed;
        let body = pool.get_mut(id).unwrap();

        for _ in 0..300 {
            agent.update(body, 1.0 / 60.0);
            assert!(body.velocity.length() <= max_speed + 1e-3);
        }
        assert!(body.position.z > 0.0);
        // Facing follows velocity
        assert!(body.rotation.y.abs() < 0.05);
    }

    #[test]
    fn test_tasked_arrival_switches_next_update() {
        let mut pool = pool_at(0);
        let (id, mut agent) = spawn(&mut pool, "scout", SpawnOverrides::at(Vec3::new(0.0, 0.0, 95.0)));
        agent.set_mode(BehaviorMode::Tasked {
            destination: Vec3::new(0.0, 0.0, 100.0),
            arrival_distance: 10.0,
            on_arrival: Box::new(BehaviorMode::Combat(CombatParams::default())),
        });

        agent.update(pool.get_mut(id).unwrap(), 1.0 / 60.0);
        assert_eq!(agent.mode(), &BehaviorMode::Combat(CombatParams::default()));
    }

    #[test]
    fn test_tasked_switches_on_the_update_after_closing_in() {
        let mut pool = pool_at(0);
        let (id, mut agent) = spawn(&mut pool, "scout", SpawnOverrides::default());
        let destination = Vec3::new(0.0, 0.0, 100.0);
        agent.set_mode(BehaviorMode::Tasked {
            destination,
            arrival_distance: 10.0,
            on_arrival: Box::new(BehaviorMode::Combat(CombatParams::default())),
        });
        let body = pool.get_mut(id).unwrap();

        let mut steps = 0;
        while body.position.distance(destination) >= 10.0 {
            agent.update(body, 1.0 / 60.0);
            steps += 1;
            assert!(steps < 1_000, "never closed in");
        }
        // The step that got inside the radius does not switch yet
        assert!(matches!(agent.mode(), BehaviorMode::Tasked { .. }));

        agent.update(body, 1.0 / 60.0);
        assert_eq!(agent.mode(), &BehaviorMode::Combat(CombatParams::default()));
    }

    #[test]
    fn test_tasked_not_arrived_keeps_seeking() {
        let mut pool = pool_at(0);
        let (id, mut agent) = spawn(&mut pool, "scout", SpawnOverrides::default());
        agent.set_mode(BehaviorMode::Tasked {
            destination: Vec3::new(100.0, 0.0, 0.0),
            arrival_distance: 10.0,
            on_arrival: Box::new(BehaviorMode::Passive),
        });

        agent.update(pool.get_mut(id).unwrap(), 1.0 / 60.0);
        assert!(matches!(agent.mode(), BehaviorMode::Tasked { .. }));
        assert!(pool.get(id).unwrap().velocity.x > 0.0);
    }

    #[test]
    fn test_exploring_waypoints_stay_in_radius() {
        let mut pool = pool_at(0);
        let (id, mut agent) = spawn(&mut pool, "scout", SpawnOverrides::default());
        let params = ExploreParams {
            center: Vec3::new(50.0, 0.0, 50.0),
            radius: 40.0,
            waypoint_reached_distance: 5.0,
        };
        agent.set_mode(BehaviorMode::Exploring(params));
        let body = pool.get_mut(id).unwrap();

        for _ in 0..600 {
            agent.update(body, 1.0 / 60.0);
            let waypoint = agent.waypoint().unwrap();
            assert!(waypoint.distance(params.center) <= params.radius + 1e-3);
        }
        assert!(body.velocity.length() <= agent.tuning().max_speed + 1e-3);
    }

    #[test]
    fn test_combat_maneuver_bands() {
        let mut pool = pool_at(0);
        let (id, mut agent) = spawn(&mut pool, "scout", SpawnOverrides::default());
        agent.set_mode(BehaviorMode::Combat(CombatParams::default()));

        agent.update(pool.get_mut(id).unwrap(), 1.0 / 60.0);
        assert_eq!(agent.maneuver(), None);

        agent.set_target(Some(Vec3::new(0.0, 0.0, 30.0)));
        agent.update(pool.get_mut(id).unwrap(), 1.0 / 60.0);
        assert_eq!(agent.maneuver(), Some(CombatManeuver::Evade));
        assert!(pool.get(id).unwrap().velocity.z < 0.0, "evade moves away");

        agent.set_target(Some(Vec3::new(0.0, 0.0, 900.0)));
        agent.update(pool.get_mut(id).unwrap(), 1.0 / 60.0);
        assert_eq!(agent.maneuver(), Some(CombatManeuver::Seek));

        agent.set_target(Some(Vec3::new(0.0, 0.0, 200.0)));
        agent.update(pool.get_mut(id).unwrap(), 1.0 / 60.0);
        assert_eq!(agent.maneuver(), Some(CombatManeuver::Strafe));
    }

    #[test]
    fn test_turn_rate_limited() {
        let mut pool = pool_at(0);
        let (id, mut agent) = spawn(&mut pool, "scout", SpawnOverrides::default());
        agent.set_mode(BehaviorMode::Combat(CombatParams::default()));
        // Directly behind
        agent.set_target(Some(Vec3::new(0.0, 0.0, -200.0)));

        agent.update(pool.get_mut(id).unwrap(), 0.1);
        let yaw = pool.get(id).unwrap().rotation.y;
        assert!((yaw.abs() - agent.tuning().turn_rate * 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_can_fire_gates() {
        let mut pool = pool_at(0);
        let (id, mut agent) = spawn(&mut pool, "scout", SpawnOverrides::default());
        let body = pool.get(id).unwrap().clone();

        // No target
        assert!(!agent.can_fire(&body, 5_000));

        agent.set_target(Some(Vec3::new(0.0, 0.0, 200.0)));
        // Spawn grace
        assert!(!agent.can_fire(&body, 500));
        assert!(agent.can_fire(&body, 5_000));

        // Outside the cone
        agent.set_target(Some(Vec3::new(200.0, 0.0, 0.0)));
        assert!(!agent.can_fire(&body, 5_000));
        agent.tuning_mut().fire_cone_degrees = 120.0;
        assert!(agent.can_fire(&body, 5_000));
    }

    #[test]
    fn test_invulnerable_cannot_fire() {
        let mut pool = pool_at(0);
        let (id, mut agent) = spawn(&mut pool, "elite", SpawnOverrides::default().with_invulnerability(10_000));
        agent.set_target(Some(Vec3::new(0.0, 0.0, 200.0)));
        let body = pool.get(id).unwrap();

        assert!(!agent.can_fire(body, 5_000));
        assert!(agent.can_fire(body, 10_000));
    }

    #[test]
    fn test_cooldown_dominates() {
        let mut pool = pool_at(0);
        let (id, mut agent) = spawn(&mut pool, "scout", SpawnOverrides::default());
        agent.set_target(Some(Vec3::new(0.0, 0.0, 200.0)));
        let body = pool.get(id).unwrap().clone();

        let request = agent.fire(&body, 5_000).unwrap();
        assert_eq!(agent.last_fire_ms(), Some(5_000));
        assert!(request.flags.contains(ProjectileFlags::HOSTILE));
        assert_eq!(request.owner, id.raw());
        assert!(request.velocity.z > 0.0);
        assert!((request.velocity.length() - 240.0).abs() < 1e-3);
        assert!(request.origin.z > body.size());

        // Perfect aim and a target do not matter while cooling down
        for now in [5_001, 6_000, 6_999] {
            assert!(!agent.can_fire(&body, now));
            assert!(agent.fire(&body, now).is_none());
        }
        assert!(agent.can_fire(&body, 7_000));
    }

    #[test]
    fn test_unarmed_never_fires() {
        let mut pool = pool_at(0);
        let (id, mut agent) = spawn(&mut pool, "asteroid", SpawnOverrides::default());
        agent.set_target(Some(Vec3::new(0.0, 0.0, 200.0)));
        assert!(agent.fire(pool.get(id).unwrap(), 10_000).is_none());
    }
}
