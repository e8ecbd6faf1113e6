//! # Simulation Session
//!
//! One explicitly constructed object owns everything a running game needs:
//!
//! ```text
//! tick(now):
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. BEGIN TICK      pool.begin_tick(now), dt from the last tick      │
//! │ 2. AGENTS          retarget, steer, integrate, maybe fire           │
//! │                    (fire is queued for the creation worker)         │
//! │ 3. ORCHESTRATOR    drain → apply fresh results → send if due        │
//! │ 4. CLEANUP         drop agents whose entity is gone                 │
//! │ 5. EVENTS          hooks, then the bus                              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Presentation reads the pool and the projectile buffer between ticks and
//! never writes to them. Gameplay code mutates through [`Session::damage`]
//! and [`Session::release`].

use std::collections::BTreeMap;

use starfall_core::{DamageOutcome, Entity, EntityId, EntityPool, PingPongBuffers, Projectile, ProjectileBuffer, SpawnOverrides};
use starfall_shared::{ExpiryReason, FireRequest, SimEvent, Vec3};
use tracing::{debug, info};

use crate::config::SimConfig;
use crate::damage::resolve_damage;
use crate::error::SimResult;
use crate::events::{EventBus, EventHooks, EventReceiver, EventSender};
use crate::gameplay::{BehaviorAgent, BehaviorMode, CombatParams};
use crate::physics::PlayerTarget;
use crate::workers::{OrchestratorStats, TickContext, WorkerOrchestrator};

/// Longest step the agents integrate, in seconds.
const MAX_TICK_SECS: f32 = 0.1;

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    /// Tick number, starting at 0.
    pub tick: u64,
    /// Time passed to `tick`.
    pub now_ms: u64,
    /// Step used by the agents (seconds).
    pub dt: f32,
    /// Agents updated.
    pub agents_updated: usize,
    /// Shots queued for creation.
    pub shots_queued: usize,
    /// Events published.
    pub events_published: usize,
    /// Hook invocations.
    pub hooks_run: usize,
    /// Live entities after the tick.
    pub active_entities: usize,
    /// Live projectiles after the tick.
    pub active_projectiles: usize,
}

/// A running simulation.
pub struct Session {
    config: SimConfig,
    pool: EntityPool,
    buffers: PingPongBuffers,
    agents: BTreeMap<EntityId, BehaviorAgent>,
    orchestrator: WorkerOrchestrator,
    bus: EventBus,
    sender: EventSender,
    hooks: EventHooks,
    pending: Vec<SimEvent>,
    player: Option<Vec3>,
    tick_count: u64,
    last_tick_ms: Option<u64>,
    last_stats: FrameStats,
}

impl Session {
    /// Builds pools, buffers and the event bus, and starts the workers.
    ///
    /// # Errors
    ///
    /// Fails if the config or its archetype table is invalid.
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        let pool = EntityPool::new(config.registry()?);
        let buffers = PingPongBuffers::new(config.projectile_capacity);
        let orchestrator = WorkerOrchestrator::start(&config);
        let bus = EventBus::new(config.event_capacity);
        let sender = bus.sender();

        info!(
            archetypes = pool.registry().len(),
            projectile_capacity = config.projectile_capacity,
            threaded = orchestrator.is_threaded(),
            "session started"
        );

        Ok(Self {
            config,
            pool,
            buffers,
            agents: BTreeMap::new(),
            orchestrator,
            bus,
            sender,
            hooks: EventHooks::new(),
            pending: Vec::new(),
            player: None,
            tick_count: 0,
            last_tick_ms: None,
            last_stats: FrameStats::default(),
        })
    }

    // ========================================================================
    // SPAWNING & GAMEPLAY MUTATION
    // ========================================================================

    /// Spawns an entity. Archetypes flagged `agent` get a combat agent
    /// aimed at the player.
    ///
    /// # Errors
    ///
    /// Fails for unknown archetypes.
    pub fn spawn(&mut self, archetype: &str, overrides: SpawnOverrides) -> SimResult<EntityId> {
        self.spawn_with_mode(archetype, overrides, BehaviorMode::Combat(CombatParams::default()))
    }

    /// Spawns an entity; agent archetypes start in `mode`.
    ///
    /// # Errors
    ///
    /// Fails for unknown archetypes.
    pub fn spawn_with_mode(
        &mut self,
        archetype: &str,
        overrides: SpawnOverrides,
        mode: BehaviorMode,
    ) -> SimResult<EntityId> {
        let archetype_id = self.pool.registry().require(archetype)?;
        let id = self.pool.acquire(archetype_id, overrides)?;

        if let Some(template) = self.pool.registry().get(archetype_id) {
            if template.agent {
                let mut agent = BehaviorAgent::new(id, template, mode);
                agent.tuning_mut().fire_cone_degrees = self.config.fire_cone_degrees;
                agent.set_target(self.player);
                self.agents.insert(id, agent);
            }
        }

        let position = self.pool.get(id).map_or(Vec3::ZERO, |e| e.position);
        self.pending.push(SimEvent::EntitySpawned {
            entity_id: id.raw(),
            archetype: archetype.to_owned(),
            position,
        });
        self.publish();
        Ok(id)
    }

    /// Damages an entity; a kill releases it and publishes the score.
    pub fn damage(&mut self, id: EntityId, amount: f32) -> DamageOutcome {
        let outcome = resolve_damage(&mut self.pool, id, amount, &mut self.pending);
        if matches!(outcome, DamageOutcome::Destroyed { .. }) {
            self.agents.remove(&id);
        }
        self.publish();
        outcome
    }

    /// Returns an entity to its pool without scoring it.
    pub fn release(&mut self, id: EntityId) -> bool {
        self.agents.remove(&id);
        self.pool.release(id)
    }

    /// Sets the player position. `None` means no player (agents idle,
    /// hostile fire hits nothing).
    pub fn set_player_position(&mut self, position: Option<Vec3>) {
        self.player = position.filter(|p| p.is_finite());
    }

    /// Current player position.
    #[must_use]
    pub const fn player_position(&self) -> Option<Vec3> {
        self.player
    }

    /// Queues player fire for the projectile-creation worker.
    pub fn fire_player(&mut self, request: FireRequest) {
        self.orchestrator.queue_fire(request);
    }

    // ========================================================================
    // TICK
    // ========================================================================

    /// Advances the simulation to `now_ms`.
    #[allow(clippy::cast_precision_loss)]
    pub fn tick(&mut self, now_ms: u64) -> FrameStats {
        let dt = match self.last_tick_ms {
            Some(last) => now_ms.saturating_sub(last) as f32 / 1_000.0,
            None => self.config.tick_dt(),
        }
        .min(MAX_TICK_SECS);
        self.last_tick_ms = Some(now_ms);
        self.pool.begin_tick(now_ms);

        let mut stats = FrameStats {
            tick: self.tick_count,
            now_ms,
            dt,
            ..FrameStats::default()
        };

        for (id, agent) in &mut self.agents {
            let Some(body) = self.pool.get_mut(*id) else {
                continue;
            };
            agent.set_target(self.player);
            agent.update(body, dt);
            stats.agents_updated += 1;
            if let Some(request) = agent.fire(body, now_ms) {
                self.orchestrator.queue_fire(request);
                stats.shots_queued += 1;
            }
        }

        let agents = &self.agents;
        let agent_driven = |id: EntityId| agents.contains_key(&id);
        self.orchestrator.tick(
            now_ms,
            TickContext {
                pool: &mut self.pool,
                buffers: &mut self.buffers,
                player: self.player.map(|position| PlayerTarget {
                    position,
                    radius: self.config.player_radius,
                }),
                agent_driven: &agent_driven,
                events: &mut self.pending,
            },
        );

        let pool = &self.pool;
        self.agents.retain(|id, _| pool.get(*id).is_some());

        let (published, hooks_run) = self.publish();
        stats.events_published = published;
        stats.hooks_run = hooks_run;
        stats.active_entities = self.pool.active_count();
        stats.active_projectiles = self.buffers.current().len();

        self.tick_count += 1;
        self.last_stats = stats;
        stats
    }

    /// Runs hooks and sends to the bus. Returns (events, hook calls).
    fn publish(&mut self) -> (usize, usize) {
        let published = self.pending.len();
        let mut hooks_run = 0;
        for event in self.pending.drain(..) {
            hooks_run += self.hooks.dispatch(&event);
            self.sender.send(event);
        }
        (published, hooks_run)
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Stops the workers, clears every pool and buffer, restarts the
    /// workers and publishes `SessionReset`.
    pub fn reset(&mut self) {
        self.orchestrator.shutdown(&mut self.buffers);
        let entities = self.pool.clear_active();
        let cleared = self.buffers.clear_active();
        self.agents.clear();
        self.pending.clear();
        self.last_tick_ms = None;
        self.orchestrator = WorkerOrchestrator::start(&self.config);

        info!(entities, projectiles = cleared.len(), "session reset");
        self.pending.extend(cleared.into_iter().map(|projectile_id| SimEvent::ProjectileExpired {
            projectile_id,
            reason: ExpiryReason::Cleared,
        }));
        self.pending.push(SimEvent::SessionReset);
        self.publish();
    }

    /// Stops the workers. The session keeps working on the main thread.
    pub fn shutdown(&mut self) {
        debug!("session shutting down");
        self.orchestrator.shutdown(&mut self.buffers);
    }

    // ========================================================================
    // READ ACCESS
    // ========================================================================

    /// Config the session was built with.
    #[must_use]
    pub const fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Entity pools.
    #[must_use]
    pub const fn pool(&self) -> &EntityPool {
        &self.pool
    }

    /// Every live entity, grouped by archetype.
    #[must_use]
    pub fn entities(&self) -> Vec<&Entity> {
        self.pool.all_active_entities()
    }

    /// The authoritative projectile buffer.
    #[must_use]
    pub const fn projectiles(&self) -> &ProjectileBuffer {
        self.buffers.current()
    }

    /// Decoded live projectiles.
    #[must_use]
    pub fn all_projectiles(&self) -> Vec<Projectile> {
        self.buffers.current().all_active()
    }

    /// Agent steering `id`.
    #[must_use]
    pub fn agent(&self, id: EntityId) -> Option<&BehaviorAgent> {
        self.agents.get(&id)
    }

    /// Mutable agent, e.g. to change its mode.
    pub fn agent_mut(&mut self, id: EntityId) -> Option<&mut BehaviorAgent> {
        self.agents.get_mut(&id)
    }

    /// Number of live agents.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Hook registry.
    pub fn hooks_mut(&mut self) -> &mut EventHooks {
        &mut self.hooks
    }

    /// A new receiver on the event bus.
    #[must_use]
    pub fn events(&self) -> EventReceiver {
        self.bus.receiver()
    }

    /// Worker counters.
    #[must_use]
    pub const fn orchestrator_stats(&self) -> &OrchestratorStats {
        self.orchestrator.stats()
    }

    /// Returns true while worker threads are in use.
    #[must_use]
    pub fn is_threaded(&self) -> bool {
        self.orchestrator.is_threaded()
    }

    /// Returns true after a worker failure.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.orchestrator.is_degraded()
    }

    /// Stats of the last tick.
    #[must_use]
    pub const fn last_stats(&self) -> &FrameStats {
        &self.last_stats
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.orchestrator.shutdown(&mut self.buffers);
    }
}
