//! Action representations and action spaces

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Marker for actions an agent can store in its replay memory
pub trait Action: Clone + Debug + Send + Sync {}

/// Index into a discretised action set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscreteAction(pub usize);

impl Action for DiscreteAction {}

/// Continuous action (forces and torques for the quadrotor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousAction(pub Vec<f64>);

impl ContinuousAction {
    /// All-zero action of the given dimension
    #[must_use]
    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.0; dim])
    }

    /// Number of components
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the action has no components
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Action for ContinuousAction {}

/// Continuous action space (box)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousSpace {
    /// Lower bounds for each dimension
    pub low: Vec<f64>,
    /// Upper bounds for each dimension
    pub high: Vec<f64>,
}

impl ContinuousSpace {
    /// Create a new continuous action space
    pub fn new(low: Vec<f64>, high: Vec<f64>) -> crate::Result<Self> {
        crate::RLError::check_dim(low.len(), high.len())?;
        if low.iter().zip(&high).any(|(l, h)| l > h) {
            return Err(crate::RLError::InvalidConfig(
                "action space lower bound exceeds upper bound".into(),
            ));
        }
        Ok(Self { low, high })
    }

    /// Box with the same bounds on every dimension
    pub fn symmetric(dim: usize, limit: f64) -> crate::Result<Self> {
        Self::new(vec![-limit; dim], vec![limit; dim])
    }

    /// Dimensionality of the space
    #[must_use]
    pub fn dim(&self) -> usize {
        self.low.len()
    }

    /// Width `high - low` of every dimension
    #[must_use]
    pub fn range(&self) -> Vec<f64> {
        self.high.iter().zip(&self.low).map(|(h, l)| h - l).collect()
    }

    /// Check if an action lies within the bounds
    #[must_use]
    pub fn contains(&self, action: &ContinuousAction) -> bool {
        action.0.len() == self.low.len()
            && action
                .0
                .iter()
                .zip(&self.low)
                .zip(&self.high)
                .all(|((x, l), h)| x >= l && x <= h)
    }

    /// Restrict the space to the given dimensions, in the given order
    pub fn select(&self, dims: &[usize]) -> crate::Result<Self> {
        let mut low = Vec::with_capacity(dims.len());
        let mut high = Vec::with_capacity(dims.len());
        for &d in dims {
            if d >= self.dim() {
                return Err(crate::RLError::InvalidConfig(format!(
                    "action dimension {d} out of range for a {}-dimensional space",
                    self.dim()
                )));
            }
            low.push(self.low[d]);
            high.push(self.high[d]);
        }
        Ok(Self { low, high })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_bounds() {
        assert!(ContinuousSpace::new(vec![1.0], vec![0.0]).is_err());
        assert!(ContinuousSpace::new(vec![0.0, 0.0], vec![1.0]).is_err());
    }

    #[test]
    fn select_keeps_requested_bounds() {
        let space = ContinuousSpace::new(vec![-1.0, -2.0, -3.0], vec![1.0, 2.0, 3.0]).unwrap();
        let sub = space.select(&[2, 0]).unwrap();
        assert_eq!(sub.low, vec![-3.0, -1.0]);
        assert_eq!(sub.high, vec![3.0, 1.0]);
        assert_eq!(sub.range(), vec![6.0, 2.0]);
        assert!(space.select(&[3]).is_err());
    }

    #[test]
    fn contains_checks_every_component() {
        let space = ContinuousSpace::symmetric(2, 1.0).unwrap();
        assert!(space.contains(&ContinuousAction(vec![0.5, -1.0])));
        assert!(!space.contains(&ContinuousAction(vec![0.5, -1.5])));
        assert!(!space.contains(&ContinuousAction(vec![0.5])));
    }
}
