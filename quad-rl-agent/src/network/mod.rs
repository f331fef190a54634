//! Function approximators behind a backend-neutral interface
//!
//! Agents only ever talk to networks through [`Approximator`] (plus
//! [`CriticApproximator`] for the DDPG critic and [`Checkpoint`] for
//! persistence), so the numerical backend can be swapped without touching
//! agent logic. The default backend lives in [`candle`].

pub mod candle;
pub mod graphs;

use ndarray::{Array2, ArrayD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use quad_rl_core::{RLError, Result};

pub use self::candle::{select_device, CandleNetwork, Graph};
pub use self::graphs::{ActorGraph, CriticGraph, QGraph};

/// Training signal for one [`Approximator::train`] call
#[derive(Debug, Clone)]
pub enum TrainTarget {
    /// Supervised regression: minimise the mean squared error to these outputs
    Regression(Array2<f32>),
    /// Gradient of an external objective with respect to the outputs;
    /// the network ascends it by minimising `mean(-gradient * output)`
    OutputGradient(Array2<f32>),
}

/// Opaque predict / train / get-weights / set-weights capability.
///
/// `inputs` holds one `(batch, features)` matrix per network input, in the
/// order the network declares them.
pub trait Approximator: Send {
    /// Forward pass without recording gradients for training
    fn predict(&self, inputs: &[Array2<f32>]) -> Result<Array2<f32>>;

    /// One optimisation step; returns the loss before the step
    fn train(&mut self, inputs: &[Array2<f32>], target: &TrainTarget) -> Result<f32>;

    /// Copy out every parameter tensor
    fn get_weights(&self) -> Result<Parameters>;

    /// Overwrite every parameter tensor
    fn set_weights(&mut self, params: &Parameters) -> Result<()>;
}

/// Action-value network that can differentiate its output by its action input
pub trait CriticApproximator: Approximator {
    /// `d sum(Q(states, actions)) / d actions`, one row per batch entry
    fn action_gradients(&self, states: &Array2<f32>, actions: &Array2<f32>)
        -> Result<Array2<f32>>;
}

/// Weight persistence in whatever format the backend defines
pub trait Checkpoint {
    /// Save weights to `path`
    fn save_weights(&self, path: &Path) -> Result<()>;

    /// Load weights previously written by [`Checkpoint::save_weights`]
    fn load_weights(&mut self, path: &Path) -> Result<()>;
}

/// Hidden-layer activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// No activation
    Linear,
    /// Rectified linear unit
    Relu,
    /// Hyperbolic tangent
    Tanh,
}

/// One dense hidden layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Output width
    pub units: usize,
    /// Activation applied to the layer output
    pub activation: Activation,
}

impl LayerSpec {
    /// Dense layer followed by a ReLU
    #[must_use]
    pub const fn relu(units: usize) -> Self {
        Self {
            units,
            activation: Activation::Relu,
        }
    }

    /// Dense layer without activation
    #[must_use]
    pub const fn linear(units: usize) -> Self {
        Self {
            units,
            activation: Activation::Linear,
        }
    }
}

/// Named parameter tensors of one network.
///
/// Local and target networks each own a separate set; the target rules below
/// produce new sets instead of sharing storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    tensors: BTreeMap<String, ArrayD<f32>>,
}

impl Parameters {
    /// Empty parameter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a tensor
    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        self.tensors.insert(name.into(), tensor);
    }

    /// Look a tensor up by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.tensors.get(name)
    }

    /// Tensors in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f32>)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of tensors
    #[must_use]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Whether the set holds no tensor
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Fail unless `other` has the same names and shapes
    pub fn check_compatible(&self, other: &Parameters) -> Result<()> {
        RLError::check_dim(self.len(), other.len())?;
        for (name, tensor) in &self.tensors {
            let theirs = other.tensors.get(name).ok_or_else(|| {
                RLError::InvalidState(format!("parameter {name} missing from parameter set"))
            })?;
            if theirs.shape() != tensor.shape() {
                return Err(RLError::InvalidState(format!(
                    "parameter {name} has shape {:?}, expected {:?}",
                    theirs.shape(),
                    tensor.shape()
                )));
            }
        }
        Ok(())
    }

    /// Exponential moving average towards `local`:
    /// `tau * local + (1 - tau) * self`, tensor by tensor.
    pub fn soft_update(&self, local: &Parameters, tau: f32) -> Result<Parameters> {
        if !(0.0..=1.0).contains(&tau) {
            return Err(RLError::InvalidConfig(format!(
                "tau must lie in [0, 1], got {tau}"
            )));
        }
        self.check_compatible(local)?;

        let mut updated = self.clone();
        for (name, target) in &mut updated.tensors {
            let source = &local.tensors[name];
            target.zip_mut_with(source, |t, &l| *t = tau * l + (1.0 - tau) * *t);
        }
        Ok(updated)
    }
}

/// Copy every local parameter into the target network
pub fn hard_update<L, T>(local: &L, target: &mut T) -> Result<()>
where
    L: Approximator + ?Sized,
    T: Approximator + ?Sized,
{
    let params = local.get_weights()?;
    target.get_weights()?.check_compatible(&params)?;
    target.set_weights(&params)
}

/// Move target parameters a fraction `tau` of the way towards local ones
pub fn soft_update<L, T>(local: &L, target: &mut T, tau: f32) -> Result<()>
where
    L: Approximator + ?Sized,
    T: Approximator + ?Sized,
{
    let blended = target.get_weights()?.soft_update(&local.get_weights()?, tau)?;
    target.set_weights(&blended)
}

/// Stack equally sized rows into a `(rows, width)` matrix
pub fn stack_rows<'a, I>(rows: I, width: usize) -> Result<Array2<f32>>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let mut data = Vec::new();
    let mut count = 0;
    for row in rows {
        RLError::check_dim(width, row.len())?;
        #[allow(clippy::cast_possible_truncation)]
        data.extend(row.iter().map(|&x| x as f32));
        count += 1;
    }
    Array2::from_shape_vec((count, width), data).map_err(RLError::backend)
}
