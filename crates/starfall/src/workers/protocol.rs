//! Worker message types.
//!
//! Every request travels in an [`Envelope`] stamped with the main loop's
//! clock; the worker copies the stamp onto its response unchanged. The
//! orchestrator uses the stamp alone to decide whether a result is fresh.

use std::fmt;

use starfall_core::{BufferLease, Projectile};
use starfall_shared::{EntitySnapshot, FireRequest};

use crate::config::PlayBounds;
use crate::physics::{CollisionReport, EntityMotion, PlayerTarget};

/// Timestamped message.
#[derive(Debug)]
pub struct Envelope<T> {
    /// Main-loop time (ms) when the request was sent.
    pub timestamp: u64,
    /// Payload.
    pub message: T,
}

impl<T> Envelope<T> {
    /// Wraps `message` with `timestamp`.
    pub const fn new(timestamp: u64, message: T) -> Self {
        Self { timestamp, message }
    }
}

/// The three background computations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorkerKind {
    /// Entity integration.
    Physics,
    /// Projectile movement and hit detection.
    Collision,
    /// Fire requests into projectile records.
    Creation,
}

impl WorkerKind {
    /// Every kind, in apply order.
    pub const ALL: [Self; 3] = [Self::Physics, Self::Collision, Self::Creation];

    /// Short name, used for thread names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Physics => "physics",
            Self::Collision => "collision",
            Self::Creation => "creation",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Main loop to worker.
#[derive(Debug)]
pub enum WorkerRequest {
    /// Integrate agent-less entities.
    PhysicsUpdate {
        /// Entity snapshots.
        entities: Vec<EntitySnapshot>,
        /// Step length (seconds).
        dt: f32,
    },
    /// Step projectiles and check hits.
    CollisionCheck {
        /// Lent projectile buffer; comes back in the response.
        lease: BufferLease,
        /// Entity snapshots.
        entities: Vec<EntitySnapshot>,
        /// Step length (seconds).
        dt: f32,
        /// Play volume.
        bounds: PlayBounds,
        /// Player, if any.
        player: Option<PlayerTarget>,
    },
    /// Expand fire requests into projectiles.
    CreateProjectiles {
        /// Queued fire.
        requests: Vec<FireRequest>,
    },
    /// Exit the worker loop.
    Shutdown,
}

impl WorkerRequest {
    /// Worker that serves this request. `None` for `Shutdown`.
    #[must_use]
    pub const fn kind(&self) -> Option<WorkerKind> {
        match self {
            Self::PhysicsUpdate { .. } => Some(WorkerKind::Physics),
            Self::CollisionCheck { .. } => Some(WorkerKind::Collision),
            Self::CreateProjectiles { .. } => Some(WorkerKind::Creation),
            Self::Shutdown => None,
        }
    }
}

/// Worker to main loop.
#[derive(Debug)]
pub enum WorkerResponse {
    /// New entity motion.
    PhysicsUpdated {
        /// One entry per integrated entity.
        motions: Vec<EntityMotion>,
    },
    /// Projectile step results.
    CollisionChecked {
        /// The buffer lent with the request.
        lease: BufferLease,
        /// What happened.
        report: CollisionReport,
    },
    /// Projectiles ready for the buffer.
    ProjectilesCreated {
        /// Expanded projectiles, ids unassigned.
        projectiles: Vec<Projectile>,
    },
}

impl WorkerResponse {
    /// Worker that produced this response.
    #[must_use]
    pub const fn kind(&self) -> WorkerKind {
        match self {
            Self::PhysicsUpdated { .. } => WorkerKind::Physics,
            Self::CollisionChecked { .. } => WorkerKind::Collision,
            Self::ProjectilesCreated { .. } => WorkerKind::Creation,
        }
    }
}
