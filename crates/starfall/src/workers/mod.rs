//! # Worker Offload
//!
//! Background threads for physics, collision and projectile creation, and
//! the orchestrator that feeds them and applies what they return.

pub mod orchestrator;
pub mod protocol;
pub mod thread;

pub use orchestrator::{OrchestratorStats, TickContext, WorkerOrchestrator};
pub use protocol::{Envelope, WorkerKind, WorkerRequest, WorkerResponse};
pub use thread::{compute, WorkerHandle};
