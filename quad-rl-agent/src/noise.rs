//! Ornstein-Uhlenbeck exploration noise

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use quad_rl_core::{RLError, Result};

/// Parameters of the noise process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Long-run mean per dimension, zeros when absent
    pub mu: Option<Vec<f64>>,
    /// Mean-reversion rate
    pub theta: f64,
    /// Volatility
    pub sigma: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            mu: None,
            theta: 0.15,
            sigma: 0.3,
        }
    }
}

/// Discrete-time mean-reverting random walk:
/// `x += theta * (mu - x) + sigma * N(0, I)`.
#[derive(Debug, Clone)]
pub struct OUNoise {
    mu: Array1<f64>,
    theta: f64,
    sigma: f64,
    state: Array1<f64>,
    rng: StdRng,
}

impl OUNoise {
    /// Create a noise process of `size` dimensions sampling from OS entropy
    pub fn new(size: usize, config: &NoiseConfig) -> Result<Self> {
        Self::with_rng(size, config, StdRng::from_entropy())
    }

    /// Create a noise process whose samples are reproducible
    pub fn with_seed(size: usize, config: &NoiseConfig, seed: u64) -> Result<Self> {
        Self::with_rng(size, config, StdRng::seed_from_u64(seed))
    }

    /// Create a noise process drawing from `rng`
    pub fn with_rng(size: usize, config: &NoiseConfig, rng: StdRng) -> Result<Self> {
        let mu = match &config.mu {
            Some(mu) => {
                RLError::check_dim(size, mu.len())?;
                Array1::from(mu.clone())
            }
            None => Array1::zeros(size),
        };
        if config.theta < 0.0 || config.sigma < 0.0 {
            return Err(RLError::InvalidConfig(
                "noise theta and sigma must be non-negative".into(),
            ));
        }
        Ok(Self {
            state: mu.clone(),
            mu,
            theta: config.theta,
            sigma: config.sigma,
            rng,
        })
    }

    /// Restore the process to its mean
    pub fn reset(&mut self) {
        self.state.assign(&self.mu);
    }

    /// Advance the process one step and return the new state
    pub fn sample(&mut self) -> Array1<f64> {
        let rng = &mut self.rng;
        let gaussian: Array1<f64> =
            Array1::from_shape_simple_fn(self.state.len(), || StandardNormal.sample(rng));
        let delta = (&self.mu - &self.state) * self.theta + gaussian * self.sigma;
        self.state += &delta;
        self.state.clone()
    }

    /// Current state without advancing
    #[must_use]
    pub fn state(&self) -> &Array1<f64> {
        &self.state
    }

    /// Long-run mean
    #[must_use]
    pub fn mu(&self) -> &Array1<f64> {
        &self.mu
    }

    /// Number of dimensions
    #[must_use]
    pub fn size(&self) -> usize {
        self.mu.len()
    }
}
