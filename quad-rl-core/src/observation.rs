//! Observation representations and observation spaces

use serde::{Deserialize, Serialize};

/// Raw observation vector as produced by the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorObservation {
    /// The observation data
    pub data: Vec<f64>,
}

impl VectorObservation {
    /// Wrap a raw vector
    #[must_use]
    pub fn new(data: Vec<f64>) -> Self {
        Self { data }
    }

    /// Number of components
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the observation is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<f64>> for VectorObservation {
    fn from(data: Vec<f64>) -> Self {
        Self { data }
    }
}

/// Box observation space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    /// Lower bounds
    pub low: Vec<f64>,
    /// Upper bounds
    pub high: Vec<f64>,
}

impl BoxSpace {
    /// Create a new box observation space
    pub fn new(low: Vec<f64>, high: Vec<f64>) -> crate::Result<Self> {
        crate::RLError::check_dim(low.len(), high.len())?;
        Ok(Self { low, high })
    }

    /// Dimensionality of the space
    #[must_use]
    pub fn dim(&self) -> usize {
        self.low.len()
    }
}
