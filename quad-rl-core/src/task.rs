//! Task descriptors shared by environments and agents
//!
//! A task tells an agent how large the raw observation and action vectors
//! are, which slice of the observation it learns from, and how to embed its
//! reduced action back into the full action vector.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::{BoxSpace, ContinuousAction, ContinuousSpace, RLError, Result, VectorObservation};

/// Static description of a control task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task name, e.g. `takeoff`
    pub name: String,
    /// Bounds of the raw observation
    pub observation_space: BoxSpace,
    /// Bounds of the full action vector
    pub action_space: ContinuousSpace,
    /// Observation components the agents learn from
    pub state_range: Range<usize>,
}

impl TaskSpec {
    /// Create a task, checking that the state slice fits the observation
    pub fn new(
        name: impl Into<String>,
        observation_space: BoxSpace,
        action_space: ContinuousSpace,
        state_range: Range<usize>,
    ) -> Result<Self> {
        if state_range.is_empty() || state_range.end > observation_space.dim() {
            return Err(RLError::InvalidConfig(format!(
                "state range {state_range:?} does not fit a {}-dimensional observation",
                observation_space.dim()
            )));
        }
        Ok(Self {
            name: name.into(),
            observation_space,
            action_space,
            state_range,
        })
    }

    /// Number of state components agents see
    #[must_use]
    pub fn state_size(&self) -> usize {
        self.state_range.len()
    }

    /// Dimension of the full action vector
    #[must_use]
    pub fn action_dim(&self) -> usize {
        self.action_space.dim()
    }

    /// Reduce a raw observation to the learning state
    pub fn reduce_state(&self, observation: &VectorObservation) -> Result<Vec<f64>> {
        if observation.len() < self.state_range.end {
            return Err(RLError::DimensionMismatch {
                expected: self.state_range.end,
                actual: observation.len(),
            });
        }
        Ok(observation.data[self.state_range.clone()].to_vec())
    }

    /// Embed `values` at `dims` in an otherwise zero full-size action
    pub fn expand_action(&self, dims: &[usize], values: &[f64]) -> Result<ContinuousAction> {
        RLError::check_dim(dims.len(), values.len())?;
        let mut action = ContinuousAction::zeros(self.action_dim());
        for (&d, &v) in dims.iter().zip(values) {
            let slot = action.0.get_mut(d).ok_or_else(|| {
                RLError::InvalidAction(format!(
                    "dimension {d} outside a {}-dimensional action",
                    self.action_dim()
                ))
            })?;
            *slot = v;
        }
        Ok(action)
    }
}
