//! Experience records stored by off-policy agents

use serde::{Deserialize, Serialize};

use crate::Action;

/// One environment transition as remembered by an agent.
///
/// The state vectors are already reduced to the agent's state slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience<A> {
    /// State the action was taken in
    pub state: Vec<f64>,
    /// Action taken
    pub action: A,
    /// Reward received for the transition
    pub reward: f64,
    /// State reached
    pub next_state: Vec<f64>,
    /// Whether the transition ended the episode
    pub done: bool,
}

impl<A: Action> Experience<A> {
    /// Create a new experience record
    pub fn new(state: Vec<f64>, action: A, reward: f64, next_state: Vec<f64>, done: bool) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }

    /// `1.0` for non-terminal transitions, `0.0` otherwise
    #[must_use]
    pub fn not_done(&self) -> f64 {
        if self.done {
            0.0
        } else {
            1.0
        }
    }
}
