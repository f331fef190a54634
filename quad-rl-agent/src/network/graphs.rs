//! Actor, critic and Q-value graphs

use candle_core::{DType, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

use super::{Activation, Graph, LayerSpec};

/// Stack of dense layers with per-layer activations
struct Mlp {
    layers: Vec<(Linear, Activation)>,
    out_dim: usize,
}

impl Mlp {
    fn new(vb: &VarBuilder, input_dim: usize, hidden: &[LayerSpec]) -> candle_core::Result<Self> {
        let mut layers = Vec::with_capacity(hidden.len());
        let mut prev = input_dim;
        for (i, spec) in hidden.iter().enumerate() {
            layers.push((linear(prev, spec.units, vb.pp(i))?, spec.activation));
            prev = spec.units;
        }
        Ok(Self {
            layers,
            out_dim: prev,
        })
    }

    fn forward(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        let mut x = input.clone();
        for (layer, activation) in &self.layers {
            x = activate(&layer.forward(&x)?, *activation)?;
        }
        Ok(x)
    }
}

fn activate(x: &Tensor, activation: Activation) -> candle_core::Result<Tensor> {
    match activation {
        Activation::Linear => Ok(x.clone()),
        Activation::Relu => x.relu(),
        Activation::Tanh => x.tanh(),
    }
}

/// Deterministic policy: states to actions scaled into `[low, high]`
pub struct ActorGraph {
    body: Mlp,
    head: Linear,
    state_size: usize,
    low: Tensor,
    half_range: Tensor,
}

impl ActorGraph {
    /// Build an actor for `state_size` inputs and one output per bound
    pub fn new(
        vb: VarBuilder,
        state_size: usize,
        hidden: &[LayerSpec],
        action_low: &[f64],
        action_high: &[f64],
    ) -> candle_core::Result<Self> {
        if action_low.len() != action_high.len() {
            candle_core::bail!(
                "action bounds differ in length: {} vs {}",
                action_low.len(),
                action_high.len()
            );
        }
        let action_size = action_low.len();
        let body = Mlp::new(&vb.pp("hidden"), state_size, hidden)?;
        let head = linear(body.out_dim, action_size, vb.pp("raw_actions"))?;

        let low = Tensor::new(action_low, vb.device())?
            .to_dtype(DType::F32)?
            .reshape((1, action_size))?;
        let half_range: Vec<f64> = action_high
            .iter()
            .zip(action_low)
            .map(|(h, l)| (h - l) / 2.0)
            .collect();
        let half_range = Tensor::new(half_range.as_slice(), vb.device())?
            .to_dtype(DType::F32)?
            .reshape((1, action_size))?;

        Ok(Self {
            body,
            head,
            state_size,
            low,
            half_range,
        })
    }
}

impl Graph for ActorGraph {
    fn input_dims(&self) -> Vec<usize> {
        vec![self.state_size]
    }

    fn forward(&self, inputs: &[Tensor]) -> candle_core::Result<Tensor> {
        let raw = self.head.forward(&self.body.forward(&inputs[0])?)?.tanh()?;
        // tanh output in [-1, 1] mapped onto [low, high]
        raw.affine(1.0, 1.0)?
            .broadcast_mul(&self.half_range)?
            .broadcast_add(&self.low)
    }
}

/// Action-value network with separate state and action pathways
/// that are summed before the single-unit output.
pub struct CriticGraph {
    state_path: Mlp,
    action_path: Mlp,
    head: Linear,
    state_size: usize,
    action_size: usize,
}

impl CriticGraph {
    /// Build a critic; both pathways must end at the same width
    pub fn new(
        vb: VarBuilder,
        state_size: usize,
        action_size: usize,
        state_hidden: &[LayerSpec],
        action_hidden: &[LayerSpec],
    ) -> candle_core::Result<Self> {
        let state_path = Mlp::new(&vb.pp("states"), state_size, state_hidden)?;
        let action_path = Mlp::new(&vb.pp("actions"), action_size, action_hidden)?;
        if state_path.out_dim != action_path.out_dim {
            candle_core::bail!(
                "critic pathways end at different widths: {} vs {}",
                state_path.out_dim,
                action_path.out_dim
            );
        }
        let head = linear(state_path.out_dim, 1, vb.pp("q_values"))?;
        Ok(Self {
            state_path,
            action_path,
            head,
            state_size,
            action_size,
        })
    }
}

impl Graph for CriticGraph {
    fn input_dims(&self) -> Vec<usize> {
        vec![self.state_size, self.action_size]
    }

    fn forward(&self, inputs: &[Tensor]) -> candle_core::Result<Tensor> {
        let states = self.state_path.forward(&inputs[0])?;
        let actions = self.action_path.forward(&inputs[1])?;
        let joined = (states + actions)?.relu()?;
        self.head.forward(&joined)
    }
}

/// Q-network mapping a state to one value per discrete action
pub struct QGraph {
    body: Mlp,
    head: Linear,
    state_size: usize,
}

impl QGraph {
    /// Build a Q-network with `num_actions` outputs
    pub fn new(
        vb: VarBuilder,
        state_size: usize,
        hidden: &[LayerSpec],
        num_actions: usize,
    ) -> candle_core::Result<Self> {
        let body = Mlp::new(&vb.pp("hidden"), state_size, hidden)?;
        let head = linear(body.out_dim, num_actions, vb.pp("q_values"))?;
        Ok(Self {
            body,
            head,
            state_size,
        })
    }
}

impl Graph for QGraph {
    fn input_dims(&self) -> Vec<usize> {
        vec![self.state_size]
    }

    fn forward(&self, inputs: &[Tensor]) -> candle_core::Result<Tensor> {
        self.head.forward(&self.body.forward(&inputs[0])?)
    }
}
