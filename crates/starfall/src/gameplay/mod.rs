//! # Gameplay Systems
//!
//! Per-entity behavior: movement modes, targeting and the firing gate.

pub mod behavior;

pub use behavior::{
    AgentTuning, BehaviorAgent, BehaviorMode, CombatManeuver, CombatParams, ExploreParams,
};
