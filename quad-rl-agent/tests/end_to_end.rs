//! Agents driven over recorded ticks through the async runner

use ndarray::{Array2, ArrayD, IxDyn};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quad_rl_agent::network::{Approximator, Checkpoint, CriticApproximator, Parameters, TrainTarget};
use quad_rl_agent::{
    run_episode, run_episodes, DDPGAgent, DDPGConfig, DQNAgent, DQNConfig, LayerSpec,
    MemoryStatsSink, NoopStatsSink,
};
use quad_rl_core::{Agent, AgentConfig, ContinuousAction, Result, Reward, Step, VectorObservation};
use quad_rl_env::{takeoff, ScriptedEnv};

/// Affine stand-in network: every output is `w[j] * sum(inputs) + b[j]`
#[derive(Clone)]
struct StubNet {
    params: Parameters,
    outputs: usize,
    train_calls: Arc<AtomicUsize>,
}

impl StubNet {
    fn new(outputs: usize, scale: f32) -> Self {
        let mut params = Parameters::new();
        params.insert("w", ArrayD::from_elem(IxDyn(&[outputs]), scale));
        params.insert("b", ArrayD::zeros(IxDyn(&[outputs])));
        Self {
            params,
            outputs,
            train_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn w(&self, j: usize) -> f32 {
        self.params.get("w").unwrap()[IxDyn(&[j])]
    }

    fn b(&self, j: usize) -> f32 {
        self.params.get("b").unwrap()[IxDyn(&[j])]
    }
}

impl Approximator for StubNet {
    fn predict(&self, inputs: &[Array2<f32>]) -> Result<Array2<f32>> {
        let rows = inputs[0].nrows();
        Ok(Array2::from_shape_fn((rows, self.outputs), |(i, j)| {
            let total: f32 = inputs.iter().map(|m| m.row(i).sum()).sum();
            self.w(j) * total + self.b(j)
        }))
    }

    fn train(&mut self, inputs: &[Array2<f32>], target: &TrainTarget) -> Result<f32> {
        self.train_calls.fetch_add(1, Ordering::SeqCst);
        let output = self.predict(inputs)?;
        let signal = match target {
            TrainTarget::Regression(y) => &output - y,
            TrainTarget::OutputGradient(g) => -g,
        };
        let loss = signal.mapv(|x| x * x).mean().unwrap_or(0.0);
        let mut bias = self.params.get("b").unwrap().clone();
        for j in 0..self.outputs {
            bias[IxDyn(&[j])] -= 0.1 * signal.column(j).mean().unwrap_or(0.0);
        }
        self.params.insert("b", bias);
        Ok(loss)
    }

    fn get_weights(&self) -> Result<Parameters> {
        Ok(self.params.clone())
    }

    fn set_weights(&mut self, params: &Parameters) -> Result<()> {
        self.params.check_compatible(params)?;
        self.params = params.clone();
        Ok(())
    }
}

impl CriticApproximator for StubNet {
    fn action_gradients(&self, states: &Array2<f32>, actions: &Array2<f32>) -> Result<Array2<f32>> {
        let w = self.w(0);
        Ok(Array2::from_elem((states.nrows(), actions.ncols()), w))
    }
}

impl Checkpoint for StubNet {
    fn save_weights(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn load_weights(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

fn recording(episodes: usize, length: usize) -> Vec<Step> {
    let mut steps = Vec::new();
    for e in 0..episodes {
        for t in 0..length {
            let z = (e * length + t) as f64 * 0.5;
            steps.push(Step::new(
                VectorObservation::new(vec![0.1, -0.2, z, 0.0, 0.0, 0.0, 1.0]),
                Reward(if t == 0 { 0.0 } else { 1.0 - z * 0.1 }),
                t + 1 == length,
            ));
        }
    }
    steps
}

fn ddpg_config(seed: u64, tau: f64) -> DDPGConfig {
    DDPGConfig {
        base: AgentConfig {
            batch_size: 4,
            buffer_size: 50,
            seed: Some(seed),
            ..DDPGConfig::default().base
        },
        tau,
        actor_hidden: vec![LayerSpec::relu(8)],
        critic_state_hidden: vec![LayerSpec::relu(8)],
        critic_action_hidden: vec![LayerSpec::relu(8)],
        ..DDPGConfig::default()
    }
}

fn stub_ddpg(seed: u64, tau: f64) -> DDPGAgent<StubNet, StubNet> {
    DDPGAgent::with_networks(
        takeoff().unwrap(),
        ddpg_config(seed, tau),
        (StubNet::new(3, 0.5), StubNet::new(3, -1.0)),
        (StubNet::new(1, 0.25), StubNet::new(1, 2.0)),
        Box::new(NoopStatsSink),
    )
    .unwrap()
}

async fn replay_actions<A: Agent>(agent: &mut A, episodes: usize) -> Vec<ContinuousAction> {
    let mut env = ScriptedEnv::from_steps(takeoff().unwrap(), recording(episodes, 6)).unwrap();
    run_episodes(&mut env, agent, episodes).await.unwrap();
    env.actions().to_vec()
}

#[tokio::test]
async fn stub_ddpg_runs_are_identical() {
    let a = replay_actions(&mut stub_ddpg(3, 0.001), 3).await;
    let b = replay_actions(&mut stub_ddpg(3, 0.001), 3).await;
    assert_eq!(a.len(), 15);
    assert_eq!(a, b);
    assert_ne!(a, replay_actions(&mut stub_ddpg(4, 0.001), 3).await);
}

#[tokio::test]
async fn stub_ddpg_learns_and_tracks_targets() {
    let mut agent = stub_ddpg(1, 1.0);
    assert_eq!(agent.actor_target().w(0), 0.5);

    replay_actions(&mut agent, 2).await;
    let updates = agent.metrics().updates;
    assert!(updates > 0);
    // critic and actor each train once per update
    assert_eq!(agent.critic_local().train_calls.load(Ordering::SeqCst), updates);
    assert_eq!(agent.actor_local().train_calls.load(Ordering::SeqCst), updates);
    // tau = 1 copies local into target after every update
    assert_eq!(
        agent.critic_target().get_weights().unwrap(),
        agent.critic_local().get_weights().unwrap()
    );
    assert_ne!(agent.critic_local().b(0), 0.0);
}

#[tokio::test]
async fn candle_ddpg_runs_agree() {
    let run = || async {
        let mut agent =
            DDPGAgent::new(takeoff().unwrap(), ddpg_config(11, 0.01), Box::new(NoopStatsSink))
                .unwrap();
        replay_actions(&mut agent, 3).await
    };
    let (a, b) = (run().await, run().await);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        for (u, v) in x.0.iter().zip(&y.0) {
            assert!((u - v).abs() < 1e-6, "{u} vs {v}");
        }
    }
}

#[tokio::test]
async fn candle_dqn_runs_agree() {
    let config = DQNConfig {
        base: AgentConfig {
            batch_size: 4,
            buffer_size: 50,
            seed: Some(5),
            ..DQNConfig::default().base
        },
        epsilon_start: 0.3,
        hidden: vec![LayerSpec::linear(8), LayerSpec::relu(8)],
        ..DQNConfig::default()
    };
    let run = |config: DQNConfig| async move {
        let mut agent = DQNAgent::new(takeoff().unwrap(), config, Box::new(NoopStatsSink)).unwrap();
        replay_actions(&mut agent, 3).await
    };
    let a = run(config.clone()).await;
    assert_eq!(a, run(config).await);
    assert!(a.iter().all(|action| [17.0, 21.0, 25.0].contains(&action.0[2])));
}

#[tokio::test]
async fn runner_feeds_the_terminal_tick() {
    let sink = MemoryStatsSink::new();
    let config = DQNConfig {
        base: AgentConfig {
            seed: Some(2),
            ..DQNConfig::default().base
        },
        hidden: vec![LayerSpec::linear(4)],
        ..DQNConfig::default()
    };
    let mut agent = DQNAgent::new(takeoff().unwrap(), config, Box::new(sink.clone())).unwrap();
    let mut env = ScriptedEnv::from_steps(takeoff().unwrap(), recording(2, 4)).unwrap();

    let first = run_episode(&mut env, &mut agent).await.unwrap();
    assert_eq!(first.episode, 1);
    assert_eq!(first.steps, 4);
    assert_eq!(agent.episode(), 2);

    let second = run_episode(&mut env, &mut agent).await.unwrap();
    assert_eq!(second.episode, 2);

    let rows = sink.rows();
    assert_eq!(rows.len(), 2);
    assert!((rows[0].total_reward - first.total_reward).abs() < 1e-12);
    assert_eq!(rows[1].epsilon, second.epsilon);
    // three actions per episode reach the environment; the terminal one does not
    assert_eq!(env.actions().len(), 6);
}
