//! # STARFALL
//!
//! Simulation core of an arcade shooter: pooled enemies, packed
//! projectiles, per-entity behavior and worker-thread offload.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Session                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐   │
//! │  │  EntityPool     │<────│ BehaviorAgents  │────>│  fire requests  │   │
//! │  │  (per archetype)│     │ (main thread)   │     └────────┬────────┘   │
//! │  └────────┬────────┘     └─────────────────┘              │            │
//! │           │ snapshots                                     │            │
//! │           v                                               v            │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                     WorkerOrchestrator                           │  │
//! │  │   physics thread   collision thread (lent buffer)   creation     │  │
//! │  └──────────────────────────────┬───────────────────────────────────┘  │
//! │                                 │ fresh results only                   │
//! │                                 v                                      │
//! │  ┌─────────────────┐     ┌─────────────────┐                           │
//! │  │ PingPongBuffers │     │ EventHooks/Bus  │───> presentation          │
//! │  └─────────────────┘     └─────────────────┘                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: TOML settings and the archetype table
//! - `damage`: hit resolution shared by gameplay and collision
//! - `events`: event bus and typed hooks
//! - `gameplay`: behavior agents
//! - `physics`: compute kernels run by the workers
//! - `session`: the tick loop
//! - `workers`: threads, protocol and orchestrator

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod damage;
pub mod error;
pub mod events;
pub mod gameplay;
pub mod physics;
pub mod session;
pub mod workers;

pub use starfall_core as core;
pub use starfall_shared as shared;

pub use config::{PlayBounds, SimConfig};
pub use error::{SimError, SimResult};
pub use events::{EventBus, EventHooks, EventReceiver, EventSender};
pub use gameplay::{BehaviorAgent, BehaviorMode, CombatManeuver, CombatParams, ExploreParams};
pub use physics::PlayerTarget;
pub use session::{FrameStats, Session};
pub use workers::{OrchestratorStats, WorkerOrchestrator};
