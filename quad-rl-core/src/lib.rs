//! Core reinforcement learning traits and types for quadrotor control
//!
//! This crate provides the foundational abstractions shared by the agents,
//! the environments and the command-line driver: spaces, tasks, experience
//! records, the environment and agent traits, and the error type.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod agent;
pub mod environment;
pub mod error;
pub mod experience;
pub mod observation;
pub mod reward;
pub mod task;
pub mod telemetry;

// Re-export core traits and types
pub use action::{Action, ContinuousAction, ContinuousSpace, DiscreteAction};
pub use agent::{
    load_json_config, parse_json_config, save_json_config, Agent, AgentConfig, AgentMetrics, EpisodeStats,
};
pub use environment::{Environment, EpisodeInfo, Step, StepInfo, TrackedEnvironment};
pub use error::{RLError, Result};
pub use experience::Experience;
pub use observation::{BoxSpace, VectorObservation};
pub use reward::Reward;
pub use task::TaskSpec;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Agent, ContinuousAction, Environment, Experience, Result, Reward, Step, TaskSpec,
        VectorObservation,
    };
}
