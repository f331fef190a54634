//! candle-backed approximators

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use ndarray::{Array2, ArrayD, IxDyn};
use rand::Rng;
use std::path::Path;

use quad_rl_core::{RLError, Result};

use super::{Approximator, Checkpoint, CriticApproximator, CriticGraph, Parameters, TrainTarget};

/// Differentiable computation over candle tensors
pub trait Graph: Send {
    /// Width of every input, in declaration order
    fn input_dims(&self) -> Vec<usize>;

    /// Forward pass
    fn forward(&self, inputs: &[Tensor]) -> candle_core::Result<Tensor>;
}

/// Pick the compute device: CUDA 0 when requested and compiled in, CPU otherwise
pub fn select_device(prefer_gpu: bool) -> Result<Device> {
    if prefer_gpu {
        let device = Device::cuda_if_available(0).map_err(RLError::backend)?;
        if device.is_cpu() {
            tracing::warn!("CUDA requested but unavailable, falling back to CPU");
        }
        Ok(device)
    } else {
        Ok(Device::Cpu)
    }
}

/// Network whose variables live in a candle [`VarMap`] and are trained with Adam
pub struct CandleNetwork<G> {
    graph: G,
    varmap: VarMap,
    optimizer: AdamW,
    device: Device,
}

impl<G: Graph> CandleNetwork<G> {
    /// Build the graph, initialise its weights from `rng` and attach an optimizer.
    ///
    /// Kernels get Glorot-uniform values and biases start at zero, so two
    /// networks built from identically seeded generators are identical.
    pub fn build<F, R>(build: F, learning_rate: f64, device: &Device, rng: &mut R) -> Result<Self>
    where
        F: FnOnce(VarBuilder) -> candle_core::Result<G>,
        R: Rng + ?Sized,
    {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let graph = build(vb).map_err(RLError::backend)?;
        glorot_init(&varmap, device, rng)?;

        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )
        .map_err(RLError::backend)?;

        Ok(Self {
            graph,
            varmap,
            optimizer,
            device: device.clone(),
        })
    }

    /// The underlying graph
    pub fn graph(&self) -> &G {
        &self.graph
    }

    fn input_tensors(&self, inputs: &[Array2<f32>]) -> Result<Vec<Tensor>> {
        let dims = self.graph.input_dims();
        RLError::check_dim(dims.len(), inputs.len())?;
        let batch = inputs.first().map_or(0, Array2::nrows);
        inputs
            .iter()
            .zip(dims)
            .map(|(input, width)| {
                RLError::check_dim(width, input.ncols())?;
                RLError::check_dim(batch, input.nrows())?;
                to_tensor(input, &self.device)
            })
            .collect()
    }

    fn forward(&self, inputs: &[Array2<f32>]) -> Result<Tensor> {
        let tensors = self.input_tensors(inputs)?;
        self.graph.forward(&tensors).map_err(RLError::backend)
    }

    fn loss(&self, output: &Tensor, target: &TrainTarget) -> Result<Tensor> {
        let (rows, cols) = output.dims2().map_err(RLError::backend)?;
        let (target, gradient_ascent) = match target {
            TrainTarget::Regression(y) => (y, false),
            TrainTarget::OutputGradient(g) => (g, true),
        };
        RLError::check_dim(rows, target.nrows())?;
        RLError::check_dim(cols, target.ncols())?;
        let target = to_tensor(target, &self.device)?;

        let loss = if gradient_ascent {
            output.mul(&target).and_then(|t| t.neg()).and_then(|t| t.mean_all())
        } else {
            candle_nn::loss::mse(output, &target)
        };
        loss.map_err(RLError::backend)
    }
}

impl<G: Graph> Approximator for CandleNetwork<G> {
    fn predict(&self, inputs: &[Array2<f32>]) -> Result<Array2<f32>> {
        let output = self.forward(inputs)?;
        to_array(&output)
    }

    fn train(&mut self, inputs: &[Array2<f32>], target: &TrainTarget) -> Result<f32> {
        let output = self.forward(inputs)?;
        let loss = self.loss(&output, target)?;
        let value = loss.to_scalar::<f32>().map_err(RLError::backend)?;
        self.optimizer.backward_step(&loss).map_err(RLError::backend)?;
        Ok(value)
    }

    fn get_weights(&self) -> Result<Parameters> {
        let vars = self
            .varmap
            .data()
            .lock()
            .map_err(|_| RLError::Agent("parameter store lock poisoned".into()))?;
        let mut params = Parameters::new();
        for (name, var) in vars.iter() {
            let values = var
                .as_tensor()
                .flatten_all()
                .and_then(|t| t.to_vec1::<f32>())
                .map_err(RLError::backend)?;
            let array =
                ArrayD::from_shape_vec(IxDyn(var.dims()), values).map_err(RLError::backend)?;
            params.insert(name.clone(), array);
        }
        Ok(params)
    }

    fn set_weights(&mut self, params: &Parameters) -> Result<()> {
        let vars = self
            .varmap
            .data()
            .lock()
            .map_err(|_| RLError::Agent("parameter store lock poisoned".into()))?;
        RLError::check_dim(vars.len(), params.len())?;
        for (name, var) in vars.iter() {
            let array = params.get(name).ok_or_else(|| {
                RLError::InvalidState(format!("parameter {name} missing from parameter set"))
            })?;
            if array.shape() != var.dims() {
                return Err(RLError::InvalidState(format!(
                    "parameter {name} has shape {:?}, expected {:?}",
                    array.shape(),
                    var.dims()
                )));
            }
            let values: Vec<f32> = array.iter().copied().collect();
            let tensor = Tensor::from_vec(values, var.dims().to_vec(), &self.device)
                .map_err(RLError::backend)?;
            var.set(&tensor).map_err(RLError::backend)?;
        }
        Ok(())
    }
}

impl CriticApproximator for CandleNetwork<CriticGraph> {
    fn action_gradients(
        &self,
        states: &Array2<f32>,
        actions: &Array2<f32>,
    ) -> Result<Array2<f32>> {
        let inputs = self.input_tensors(&[states.clone(), actions.clone()])?;
        let action = Var::from_tensor(&inputs[1]).map_err(RLError::backend)?;
        let q = self
            .graph
            .forward(&[inputs[0].clone(), action.as_tensor().clone()])
            .map_err(RLError::backend)?;
        let grads = q
            .sum_all()
            .and_then(|total| total.backward())
            .map_err(RLError::backend)?;
        let gradient = grads
            .get(action.as_tensor())
            .ok_or_else(|| RLError::Agent("critic output does not depend on its action input".into()))?;
        to_array(gradient)
    }
}

impl<G> Checkpoint for CandleNetwork<G> {
    fn save_weights(&self, path: &Path) -> Result<()> {
        self.varmap.save(path).map_err(RLError::backend)
    }

    fn load_weights(&mut self, path: &Path) -> Result<()> {
        self.varmap.load(path).map_err(RLError::backend)
    }
}

fn glorot_init<R: Rng + ?Sized>(varmap: &VarMap, device: &Device, rng: &mut R) -> Result<()> {
    let vars = varmap
        .data()
        .lock()
        .map_err(|_| RLError::Agent("parameter store lock poisoned".into()))?;
    // HashMap order is random; sort so the draw order is stable.
    let mut names: Vec<&String> = vars.keys().collect();
    names.sort();

    for name in names {
        let var = &vars[name];
        let dims = var.dims().to_vec();
        let count: usize = dims.iter().product();
        let values: Vec<f32> = match dims.as_slice() {
            // candle linear kernels are (out, in)
            [fan_out, fan_in] => {
                #[allow(clippy::cast_precision_loss)]
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                (0..count).map(|_| rng.gen_range(-limit..limit)).collect()
            }
            _ => vec![0.0; count],
        };
        let tensor = Tensor::from_vec(values, dims, device).map_err(RLError::backend)?;
        var.set(&tensor).map_err(RLError::backend)?;
    }
    Ok(())
}

fn to_tensor(array: &Array2<f32>, device: &Device) -> Result<Tensor> {
    let values: Vec<f32> = array.iter().copied().collect();
    Tensor::from_vec(values, array.dim(), device).map_err(RLError::backend)
}

fn to_array(tensor: &Tensor) -> Result<Array2<f32>> {
    let shape = tensor.dims2().map_err(RLError::backend)?;
    let values = tensor
        .flatten_all()
        .and_then(|t| t.to_vec1::<f32>())
        .map_err(RLError::backend)?;
    Array2::from_shape_vec(shape, values).map_err(RLError::backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{soft_update, ActorGraph, LayerSpec, QGraph};
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn q_network(seed: u64) -> CandleNetwork<QGraph> {
        let mut rng = StdRng::seed_from_u64(seed);
        CandleNetwork::build(
            |vb| QGraph::new(vb, 3, &[LayerSpec::linear(8), LayerSpec::relu(8)], 2),
            1e-2,
            &Device::Cpu,
            &mut rng,
        )
        .unwrap()
    }

    fn critic(seed: u64) -> CandleNetwork<CriticGraph> {
        let mut rng = StdRng::seed_from_u64(seed);
        CandleNetwork::build(
            |vb| CriticGraph::new(vb, 3, 2, &[LayerSpec::relu(8)], &[LayerSpec::relu(8)]),
            1e-3,
            &Device::Cpu,
            &mut rng,
        )
        .unwrap()
    }

    #[test]
    fn identically_seeded_networks_match() {
        assert_eq!(q_network(4).get_weights().unwrap(), q_network(4).get_weights().unwrap());
        assert_ne!(q_network(4).get_weights().unwrap(), q_network(5).get_weights().unwrap());
    }

    #[test]
    fn biases_start_at_zero() {
        let params = q_network(1).get_weights().unwrap();
        for (name, tensor) in params.iter() {
            if name.ends_with("bias") {
                assert!(tensor.iter().all(|&x| x == 0.0), "{name} not zeroed");
            }
        }
    }

    #[test]
    fn predict_checks_input_shapes() {
        let net = q_network(0);
        let out = net.predict(&[arr2(&[[0.1, 0.2, 0.3], [0.0, 0.0, 1.0]])]).unwrap();
        assert_eq!(out.dim(), (2, 2));
        assert!(net.predict(&[arr2(&[[0.1, 0.2]])]).is_err());
        assert!(net.predict(&[]).is_err());
    }

    #[test]
    fn regression_reduces_loss() {
        let mut net = q_network(2);
        let x = arr2(&[[0.5, -0.5, 1.0], [1.0, 0.0, -1.0]]);
        let y = TrainTarget::Regression(arr2(&[[1.0, -1.0], [0.5, 2.0]]));
        let first = net.train(&[x.clone()], &y).unwrap();
        let mut last = first;
        for _ in 0..200 {
            last = net.train(&[x.clone()], &y).unwrap();
        }
        assert!(last < first * 0.5, "loss went from {first} to {last}");
    }

    #[test]
    fn set_weights_round_trips_and_validates() {
        let source = q_network(7);
        let mut target = q_network(8);
        target.set_weights(&source.get_weights().unwrap()).unwrap();
        assert_eq!(target.get_weights().unwrap(), source.get_weights().unwrap());

        let mut partial = Parameters::new();
        partial.insert("hidden.0.weight", ndarray::ArrayD::zeros(IxDyn(&[8, 3])));
        assert!(target.set_weights(&partial).is_err());
    }

    #[test]
    fn soft_update_extremes_through_backend() {
        let local = q_network(1);
        let mut target = q_network(2);
        let before = target.get_weights().unwrap();
        soft_update(&local, &mut target, 0.0).unwrap();
        assert_eq!(target.get_weights().unwrap(), before);
        soft_update(&local, &mut target, 1.0).unwrap();
        assert_eq!(target.get_weights().unwrap(), local.get_weights().unwrap());
    }

    #[test]
    fn action_gradients_match_finite_differences() {
        let net = critic(3);
        let states = arr2(&[[0.2, -0.1, 0.4]]);
        let actions = arr2(&[[0.3, -0.7]]);
        let grads = net.action_gradients(&states, &actions).unwrap();
        assert_eq!(grads.dim(), (1, 2));

        let h = 1e-2;
        for j in 0..2 {
            let mut plus = actions.clone();
            plus[[0, j]] += h;
            let mut minus = actions.clone();
            minus[[0, j]] -= h;
            let q_plus = net.predict(&[states.clone(), plus]).unwrap()[[0, 0]];
            let q_minus = net.predict(&[states.clone(), minus]).unwrap()[[0, 0]];
            let numeric = (q_plus - q_minus) / (2.0 * h);
            assert_abs_diff_eq!(grads[[0, j]], numeric, epsilon = 5e-2);
        }
    }

    #[test]
    fn actor_output_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = CandleNetwork::build(
            |vb| ActorGraph::new(vb, 3, &[LayerSpec::relu(8)], &[-2.0, 0.0], &[2.0, 10.0]),
            1e-3,
            &Device::Cpu,
            &mut rng,
        )
        .unwrap();
        let out = net.predict(&[arr2(&[[100.0, -50.0, 3.0], [0.0, 0.0, 0.0]])]).unwrap();
        for row in out.rows() {
            assert!((-2.0..=2.0).contains(&row[0]));
            assert!((0.0..=10.0).contains(&row[1]));
        }
    }

    #[test]
    fn checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.safetensors");
        let source = q_network(10);
        source.save_weights(&path).unwrap();

        let mut restored = q_network(11);
        restored.load_weights(&path).unwrap();
        assert_eq!(restored.get_weights().unwrap(), source.get_weights().unwrap());
        assert!(restored.load_weights(&dir.path().join("missing")).is_err());
    }
}
