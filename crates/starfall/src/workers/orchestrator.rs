//! # Worker Orchestrator
//!
//! Moves physics, collision and projectile creation off the main loop.
//!
//! ```text
//! tick(now):
//!   1. drain   up to N responses      → leases reclaimed, results staged
//!   2. apply   staged results         → fresh: pool / buffer writes
//!                                       stale: dropped
//!   3. send    if the snapshot is due → physics, collision, creation
//!   4. apply   main-thread results    → same tick, age 0
//! ```
//!
//! Results are keyed by the timestamp of the request that produced them.
//! A result is applied once, only while `now - timestamp < tolerance`, and
//! the stage is emptied every tick either way. The main loop never waits:
//! sends use `try_send`, receives use `try_recv`.
//!
//! If a worker cannot be started, its channel disconnects, or the collision
//! worker exits while holding the projectile buffer, the orchestrator stops
//! the remaining threads and runs the same kernels on the main thread from
//! then on.

use std::collections::BTreeMap;

use crossbeam_channel::{unbounded, Receiver, TryRecvError, TrySendError};
use starfall_core::{
    BufferError, DamageOutcome, EntityId, EntityPool, PingPongBuffers, Projectile, ProjectileBuffer, ProjectileKey,
};
use starfall_shared::constants::EXPLOSION_RADIUS;
use starfall_shared::{
    EntitySnapshot, ExpiryReason, FireRequest, MissileType, ProjectileFlags, SimEvent, Vec3,
};
use tracing::{debug, trace, warn};

use super::protocol::{Envelope, WorkerKind, WorkerRequest, WorkerResponse};
use super::thread::{compute, WorkerHandle};
use crate::config::{PlayBounds, SimConfig};
use crate::damage::resolve_damage;
use crate::error::SimError;
use crate::physics::{CollisionReport, EntityMotion, PlayerTarget, Retirement};

/// Longest step handed to a kernel, in seconds.
const MAX_STEP_SECS: f32 = 0.1;

/// Counters for the headless driver and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
    /// Snapshot rounds sent.
    pub dispatches: u64,
    /// Requests accepted by worker threads.
    pub messages_sent: u64,
    /// Responses received (threads or main-thread fallback).
    pub results_received: u64,
    /// Results applied while fresh.
    pub results_applied: u64,
    /// Results dropped as stale.
    pub results_stale: u64,
    /// Collision rounds skipped because the buffer was still out.
    pub skipped_in_transit: u64,
    /// Created projectiles dropped on a full buffer.
    pub projectiles_dropped: u64,
    /// Running on the main thread after a worker failure.
    pub degraded: bool,
    /// Oldest result applied so far (ms).
    pub max_applied_age_ms: u64,
}

/// Everything a tick reads or writes.
pub struct TickContext<'a> {
    /// Authoritative entities.
    pub pool: &'a mut EntityPool,
    /// Authoritative projectiles.
    pub buffers: &'a mut PingPongBuffers,
    /// Player position for hostile projectiles.
    pub player: Option<PlayerTarget>,
    /// Entities whose motion the main thread owns.
    pub agent_driven: &'a dyn Fn(EntityId) -> bool,
    /// Events published this tick.
    pub events: &'a mut Vec<SimEvent>,
}

#[derive(Debug)]
enum Staged {
    Motions(Vec<EntityMotion>),
    Collision(CollisionReport),
    Created(Vec<Projectile>),
}

struct WorkerThreads {
    workers: Vec<WorkerHandle>,
    responses: Receiver<Envelope<WorkerResponse>>,
}

impl WorkerThreads {
    fn start() -> std::io::Result<Self> {
        let (tx, responses) = unbounded();
        let mut workers = Vec::with_capacity(WorkerKind::ALL.len());
        for kind in WorkerKind::ALL {
            // Workers already started are stopped by Drop on error
            workers.push(WorkerHandle::spawn(kind, tx.clone())?);
        }
        Ok(Self { workers, responses })
    }

    fn try_send(
        &self,
        kind: WorkerKind,
        envelope: Envelope<WorkerRequest>,
    ) -> Result<(), TrySendError<Envelope<WorkerRequest>>> {
        match self.workers.iter().find(|w| w.kind() == kind) {
            Some(worker) => worker.try_send(envelope),
            None => Err(TrySendError::Disconnected(envelope)),
        }
    }

    fn is_finished(&self, kind: WorkerKind) -> bool {
        self.workers.iter().find(|w| w.kind() == kind).map_or(true, WorkerHandle::is_finished)
    }

    fn stop(&mut self) {
        for worker in &mut self.workers {
            worker.stop();
        }
    }
}

enum Backend {
    Threads(WorkerThreads),
    Inline,
}

/// Owns the worker threads and the staging area.
pub struct WorkerOrchestrator {
    backend: Backend,
    tolerance_ms: u64,
    interval_us: u64,
    max_inbound: usize,
    bounds: PlayBounds,
    next_send_us: Option<u64>,
    last_dispatch_ms: Option<u64>,
    pending_fire: Vec<FireRequest>,
    staged: BTreeMap<(u64, WorkerKind), Staged>,
    inbound: Vec<Envelope<WorkerResponse>>,
    snapshots: Vec<EntitySnapshot>,
    unreported_failure: Option<String>,
    stats: OrchestratorStats,
}

impl WorkerOrchestrator {
    /// Starts the worker threads, or the main-thread backend if
    /// `config.use_workers` is false or a thread fails to start.
    #[must_use]
    pub fn start(config: &SimConfig) -> Self {
        let mut stats = OrchestratorStats::default();
        let mut unreported_failure = None;

        let backend = if config.use_workers {
            match WorkerThreads::start() {
                Ok(threads) => Backend::Threads(threads),
                Err(err) => {
                    let cause = SimError::WorkerUnavailable(format!("failed to start worker threads: {err}"));
                    warn!(%cause, "computing on the main thread");
                    stats.degraded = true;
                    unreported_failure = Some(cause.to_string());
                    Backend::Inline
                }
            }
        } else {
            debug!("workers disabled, computing on the main thread");
            Backend::Inline
        };

        Self {
            backend,
            tolerance_ms: config.staleness_tolerance_ms,
            interval_us: config.snapshot_interval_us(),
            max_inbound: config.max_inbound_per_tick,
            bounds: config.bounds,
            next_send_us: None,
            last_dispatch_ms: None,
            pending_fire: Vec::new(),
            staged: BTreeMap::new(),
            inbound: Vec::with_capacity(config.max_inbound_per_tick),
            snapshots: Vec::new(),
            unreported_failure,
            stats,
        }
    }

    /// Returns true while worker threads are in use.
    #[must_use]
    pub fn is_threaded(&self) -> bool {
        matches!(self.backend, Backend::Threads(_))
    }

    /// Returns true after a worker failure forced main-thread computation.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.stats.degraded
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> &OrchestratorStats {
        &self.stats
    }

    /// Fire requests waiting for the next creation round.
    #[must_use]
    pub fn pending_fire(&self) -> usize {
        self.pending_fire.len()
    }

    /// Results waiting to be applied.
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Queues weapon fire for the projectile-creation worker.
    pub fn queue_fire(&mut self, request: FireRequest) {
        self.pending_fire.push(request);
    }

    /// Runs one orchestration step at `now_ms`.
    pub fn tick(&mut self, now_ms: u64, ctx: TickContext<'_>) {
        let TickContext {
            pool,
            buffers,
            player,
            agent_driven,
            events,
        } = ctx;

        if let Some(reason) = self.unreported_failure.take() {
            events.push(SimEvent::WorkerDegraded { reason });
        }

        self.drain(buffers, events);
        self.apply(now_ms, pool, buffers.current_mut(), events);

        if self.dispatch_due(now_ms) {
            self.dispatch(now_ms, pool, buffers, player, agent_driven, events);
            if !self.is_threaded() {
                self.apply(now_ms, pool, buffers.current_mut(), events);
            }
        }
    }

    /// Switches to main-thread computation for good.
    ///
    /// Stops every worker, takes back a lent buffer (or gives up on it) and
    /// publishes `WorkerDegraded` carrying `cause`. Does nothing if already
    /// inline.
    pub fn fall_back_inline(&mut self, cause: &SimError, buffers: &mut PingPongBuffers, events: &mut Vec<SimEvent>) {
        if !self.is_threaded() {
            return;
        }
        warn!(%cause, "computing on the main thread");
        self.stop_threads(buffers);
        self.stats.degraded = true;
        events.push(SimEvent::WorkerDegraded {
            reason: cause.to_string(),
        });
    }

    /// Stops the workers and forgets queued work. Used on reset and exit.
    pub fn shutdown(&mut self, buffers: &mut PingPongBuffers) {
        self.stop_threads(buffers);
        self.staged.clear();
        self.pending_fire.clear();
        self.next_send_us = None;
        self.last_dispatch_ms = None;
    }

    fn stop_threads(&mut self, buffers: &mut PingPongBuffers) {
        let Backend::Threads(mut threads) = std::mem::replace(&mut self.backend, Backend::Inline) else {
            return;
        };
        threads.stop();
        // Workers are joined; anything they sent is already queued
        for envelope in threads.responses.try_iter() {
            self.stats.results_received += 1;
            self.stage(envelope.timestamp, envelope.message, buffers);
        }
        if buffers.is_lent() {
            buffers.abandon_lease();
        }
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    fn drain(&mut self, buffers: &mut PingPongBuffers, events: &mut Vec<SimEvent>) {
        let mut disconnected = false;
        if let Backend::Threads(threads) = &self.backend {
            while self.inbound.len() < self.max_inbound {
                match threads.responses.try_recv() {
                    Ok(envelope) => self.inbound.push(envelope),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }

        let mut inbound = std::mem::take(&mut self.inbound);
        for envelope in inbound.drain(..) {
            self.stats.results_received += 1;
            self.stage(envelope.timestamp, envelope.message, buffers);
        }
        self.inbound = inbound;

        if disconnected {
            let cause = SimError::WorkerUnavailable("all workers disconnected".to_owned());
            self.fall_back_inline(&cause, buffers, events);
        }
    }

    fn stage(&mut self, timestamp: u64, response: WorkerResponse, buffers: &mut PingPongBuffers) {
        let kind = response.kind();
        let staged = match response {
            WorkerResponse::PhysicsUpdated { motions } => Staged::Motions(motions),
            WorkerResponse::CollisionChecked { lease, report } => {
                buffers.reclaim(lease);
                Staged::Collision(report)
            }
            WorkerResponse::ProjectilesCreated { projectiles } => Staged::Created(projectiles),
        };
        if self.staged.insert((timestamp, kind), staged).is_some() {
            debug!(timestamp, worker = %kind, "replaced staged result with the same key");
        }
    }

    // ------------------------------------------------------------------------
    // Apply
    // ------------------------------------------------------------------------

    fn apply(&mut self, now_ms: u64, pool: &mut EntityPool, buffer: &mut ProjectileBuffer, events: &mut Vec<SimEvent>) {
        let staged = std::mem::take(&mut self.staged);
        for ((timestamp, kind), result) in staged {
            let age = now_ms.saturating_sub(timestamp);
            if age >= self.tolerance_ms {
                self.stats.results_stale += 1;
                debug!(worker = %kind, age_ms = age, "dropping stale result");
                continue;
            }
            self.stats.results_applied += 1;
            self.stats.max_applied_age_ms = self.stats.max_applied_age_ms.max(age);

            match result {
                Staged::Motions(motions) => apply_motions(&motions, pool),
                Staged::Collision(report) => apply_collision(report, pool, buffer, events),
                Staged::Created(projectiles) => {
                    self.stats.projectiles_dropped += apply_created(&projectiles, buffer, events);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    fn dispatch_due(&mut self, now_ms: u64) -> bool {
        let now_us = now_ms.saturating_mul(1_000);
        if self.next_send_us.is_some_and(|next| now_us < next) {
            return false;
        }
        let next = self.next_send_us.unwrap_or(now_us) + self.interval_us;
        // After a long pause, restart the schedule instead of bursting
        self.next_send_us = Some(if next <= now_us { now_us + self.interval_us } else { next });
        true
    }

    #[allow(clippy::cast_precision_loss)]
    fn dispatch(
        &mut self,
        now_ms: u64,
        pool: &EntityPool,
        buffers: &mut PingPongBuffers,
        player: Option<PlayerTarget>,
        agent_driven: &dyn Fn(EntityId) -> bool,
        events: &mut Vec<SimEvent>,
    ) {
        let dt = match self.last_dispatch_ms {
            Some(last) => now_ms.saturating_sub(last) as f32 / 1_000.0,
            None => self.interval_us as f32 / 1_000_000.0,
        }
        .min(MAX_STEP_SECS);
        self.last_dispatch_ms = Some(now_ms);
        self.stats.dispatches += 1;

        self.snapshots.clear();
        pool.snapshot_into(&mut self.snapshots, agent_driven);

        let passive: Vec<EntitySnapshot> = self.snapshots.iter().filter(|s| !s.is_agent_driven()).copied().collect();
        if !passive.is_empty() {
            let request = WorkerRequest::PhysicsUpdate { entities: passive, dt };
            self.submit(WorkerKind::Physics, Envelope::new(now_ms, request), buffers, events);
        }

        if !buffers.current().is_empty() {
            if buffers.is_lent() && self.collision_worker_exited() {
                let cause = SimError::WorkerUnavailable("collision worker exited holding the projectile buffer".to_owned());
                self.fall_back_inline(&cause, buffers, events);
            }
            match buffers.lend() {
                Ok(lease) => {
                    let request = WorkerRequest::CollisionCheck {
                        lease,
                        entities: self.snapshots.clone(),
                        dt,
                        bounds: self.bounds,
                        player,
                    };
                    self.submit(WorkerKind::Collision, Envelope::new(now_ms, request), buffers, events);
                }
                Err(BufferError::InTransit) => {
                    self.stats.skipped_in_transit += 1;
                    debug!("projectile buffer still out, skipping collision round");
                }
                Err(err) => warn!(%err, "cannot lend projectile buffer"),
            }
        }

        if !self.pending_fire.is_empty() {
            let requests = std::mem::take(&mut self.pending_fire);
            let request = WorkerRequest::CreateProjectiles { requests };
            self.submit(WorkerKind::Creation, Envelope::new(now_ms, request), buffers, events);
        }

        trace!(now_ms, entities = self.snapshots.len(), "snapshot dispatched");
    }

    fn submit(
        &mut self,
        kind: WorkerKind,
        envelope: Envelope<WorkerRequest>,
        buffers: &mut PingPongBuffers,
        events: &mut Vec<SimEvent>,
    ) {
        let Backend::Threads(threads) = &self.backend else {
            self.run_inline(envelope, buffers);
            return;
        };
        match threads.try_send(kind, envelope) {
            Ok(()) => self.stats.messages_sent += 1,
            Err(TrySendError::Full(envelope)) => {
                debug!(worker = %kind, "worker queue full, holding work back");
                self.recover(envelope.message, buffers);
            }
            Err(TrySendError::Disconnected(envelope)) => {
                let cause = SimError::WorkerUnavailable(format!("{kind} worker disconnected"));
                self.fall_back_inline(&cause, buffers, events);
                self.run_inline(envelope, buffers);
            }
        }
    }

    /// A dead collision worker never answers, and with the buffer still out
    /// nothing is sent to it, so its channel never reports the disconnect.
    fn collision_worker_exited(&self) -> bool {
        match &self.backend {
            Backend::Threads(threads) => threads.is_finished(WorkerKind::Collision),
            Backend::Inline => false,
        }
    }

    /// Puts unsent work back where it came from.
    fn recover(&mut self, request: WorkerRequest, buffers: &mut PingPongBuffers) {
        match request {
            WorkerRequest::CollisionCheck { lease, .. } => {
                buffers.reclaim(lease);
            }
            WorkerRequest::CreateProjectiles { mut requests } => {
                requests.append(&mut self.pending_fire);
                self.pending_fire = requests;
            }
            WorkerRequest::PhysicsUpdate { .. } | WorkerRequest::Shutdown => {}
        }
    }

    fn run_inline(&mut self, envelope: Envelope<WorkerRequest>, buffers: &mut PingPongBuffers) {
        let Envelope { timestamp, message } = envelope;
        if let Some(response) = compute(message) {
            self.stats.results_received += 1;
            self.stage(timestamp, response, buffers);
        }
    }
}

// ============================================================================
// RESULT APPLICATION
// ============================================================================

fn apply_motions(motions: &[EntityMotion], pool: &mut EntityPool) {
    for motion in motions {
        pool.set_motion(EntityId::from_raw(motion.id), motion.position, motion.velocity, motion.rotation);
    }
}

fn apply_collision(report: CollisionReport, pool: &mut EntityPool, buffer: &mut ProjectileBuffer, events: &mut Vec<SimEvent>) {
    for motion in &report.motions {
        buffer.update_motion(motion.id, motion.position, motion.velocity);
    }

    for (id, retirement) in report.retired {
        if buffer.deallocate(id) {
            let reason = match retirement {
                Retirement::OutOfBounds => ExpiryReason::OutOfBounds,
                Retirement::Detonated => ExpiryReason::Impact,
            };
            events.push(SimEvent::ProjectileExpired { projectile_id: id, reason });
        }
    }

    for hit in report.hits {
        let live = buffer
            .record(hit.projectile_id)
            .is_some_and(|r| !r.flags().contains(ProjectileFlags::EXPLODED));
        if !live {
            continue;
        }
        let outcome = resolve_damage(pool, EntityId::from_raw(hit.entity_id), hit.damage, events);
        if outcome == DamageOutcome::NotFound || hit.piercing {
            continue;
        }

        if hit.missile == MissileType::Powerful {
            buffer.insert_flags(hit.projectile_id, ProjectileFlags::EXPLODED);
            buffer.update_motion(hit.projectile_id, hit.position, Vec3::ZERO);
            events.push(SimEvent::Explosion {
                position: hit.position,
                radius: EXPLOSION_RADIUS,
            });
        } else if buffer.deallocate(hit.projectile_id) {
            events.push(SimEvent::ProjectileExpired {
                projectile_id: hit.projectile_id,
                reason: ExpiryReason::Impact,
            });
        }
    }

    for hit in report.player_hits {
        if buffer.deallocate(hit.projectile_id) {
            events.push(SimEvent::PlayerHit {
                projectile_id: hit.projectile_id,
                damage: hit.damage,
                position: hit.position,
            });
            events.push(SimEvent::ProjectileExpired {
                projectile_id: hit.projectile_id,
                reason: ExpiryReason::Impact,
            });
        }
    }
}

/// Returns how many projectiles did not fit.
fn apply_created(projectiles: &[Projectile], buffer: &mut ProjectileBuffer, events: &mut Vec<SimEvent>) -> u64 {
    let mut dropped = 0;
    for projectile in projectiles {
        match buffer.allocate(ProjectileKey::Auto, projectile) {
            Ok(id) => events.push(SimEvent::ProjectileSpawned {
                projectile_id: id,
                weapon: projectile.weapon,
                position: projectile.position,
            }),
            Err(err) => {
                dropped += 1;
                trace!(%err, "projectile not created");
            }
        }
    }
    if dropped > 0 {
        warn!(dropped, capacity = buffer.capacity(), "projectile buffer full, fire dropped");
    }
    dropped
}
