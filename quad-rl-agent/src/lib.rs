//! DDPG and DQN agents for quadrotor control
//!
//! This crate provides:
//! - Deep Deterministic Policy Gradient ([`DDPGAgent`]) over a continuous
//!   force action
//! - Deep Q-Network ([`DQNAgent`]) over discretised vertical thrust levels
//! - The replay buffer, exploration noise and statistics sinks they share
//! - An async runner that drives any [`quad_rl_core::Environment`]

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod ddpg;
pub mod dqn;
pub mod episode;
pub mod network;
pub mod noise;
pub mod runner;
pub mod stats;
pub mod utils;

// Re-export agents
pub use ddpg::{DDPGAgent, DDPGConfig};
pub use dqn::{DQNAgent, DQNConfig};

// Re-export utilities
pub use buffer::ReplayBuffer;
pub use episode::EpisodeState;
pub use noise::{NoiseConfig, OUNoise};
pub use runner::{run_episode, run_episodes};
pub use stats::{CsvStatsSink, MemoryStatsSink, NoopStatsSink, StatsColumn, StatsSink};
pub use utils::{discretize_actions, EpsilonDecay};

// Re-export network components
pub use network::{Approximator, Checkpoint, CriticApproximator, LayerSpec, Parameters, TrainTarget};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        run_episode, run_episodes, DDPGAgent, DDPGConfig, DQNAgent, DQNConfig, StatsSink,
    };
    pub use quad_rl_core::prelude::*;
}
