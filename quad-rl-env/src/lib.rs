//! Quadrotor tasks and environments
//!
//! This crate provides:
//! - The quadrotor task catalogue (takeoff, hover, landing) and a registry
//!   for custom tasks
//! - A scripted environment replaying recorded ticks
//! - Wrappers for time limits, reward shaping and action clipping
//!
//! Physics simulation lives outside this workspace; a simulator bridge only
//! has to implement [`quad_rl_core::Environment`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod scripted;
pub mod tasks;
pub mod wrappers;

// Re-export environments
pub use scripted::ScriptedEnv;
pub use tasks::{
    hover, landing, make_task, register_task, takeoff, task_names, TaskRegistry,
};
pub use wrappers::{scale_rewards, ClipAction, RewardWrapper, TimeLimit};

// Re-export core types
pub use quad_rl_core::{Environment, Reward, Step, TaskSpec};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{make_task, ClipAction, ScriptedEnv, TimeLimit};
    pub use quad_rl_core::prelude::*;
}
