//! Deep Q-Network (DQN) agent implementation
//!
//! Controls a single action dimension (vertical force by default) through a
//! small set of discrete levels, chosen epsilon-greedily from a Q-network
//! trained on replayed transitions.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

use quad_rl_core::{
    load_json_config, save_json_config, Agent, AgentConfig, AgentMetrics, ContinuousAction,
    DiscreteAction, Experience, RLError, Result, Reward, TaskSpec, VectorObservation,
};

use crate::buffer::ReplayBuffer;
use crate::episode::EpisodeState;
use crate::network::{
    select_device, stack_rows, Approximator, CandleNetwork, Checkpoint, LayerSpec, QGraph,
    TrainTarget,
};
use crate::stats::StatsSink;
use crate::utils::{argmax, discretize_actions, seeded_rng, EpsilonDecay};

/// File name of periodic checkpoints inside the checkpoint directory
pub const CHECKPOINT_FILE: &str = "dqn_weights.safetensors";

/// DQN-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DQNConfig {
    /// Base agent configuration
    #[serde(flatten)]
    pub base: AgentConfig,
    /// Initial exploration rate; values above 1 keep the agent fully random
    /// until decay brings them below 1
    pub epsilon_start: f64,
    /// Exploration floor
    pub epsilon_min: f64,
    /// Multiplicative decay applied after every replay
    pub epsilon_decay: f64,
    /// The one action dimension the agent controls
    pub action_dim: usize,
    /// Discrete levels stay strictly above this value
    pub action_floor: f64,
    /// Spacing of discrete levels, counted down from the upper bound
    pub action_step: f64,
    /// Hidden layers of the Q-network
    pub hidden: Vec<LayerSpec>,
    /// Save weights whenever the episode number reaches a multiple of this;
    /// zero disables checkpoints
    pub checkpoint_interval: usize,
    /// Directory for periodic checkpoints
    pub checkpoint_dir: Option<PathBuf>,
    /// Run the network on CUDA when available
    pub use_gpu: bool,
}

impl Default for DQNConfig {
    fn default() -> Self {
        Self {
            base: AgentConfig {
                learning_rate: 1e-3,
                gamma: 0.9,
                batch_size: 64,
                buffer_size: 10_000,
                seed: None,
            },
            epsilon_start: 3.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.996,
            action_dim: 2,
            action_floor: 15.0,
            action_step: 4.0,
            hidden: vec![LayerSpec::linear(32), LayerSpec::relu(64)],
            checkpoint_interval: 250,
            checkpoint_dir: None,
            use_gpu: false,
        }
    }
}

impl DQNConfig {
    /// Reject settings the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        EpsilonDecay::new(self.epsilon_start, self.epsilon_min, self.epsilon_decay)?;
        if self.hidden.iter().any(|l| l.units == 0) {
            return Err(RLError::InvalidConfig("hidden layers need at least one unit".into()));
        }
        Ok(())
    }

    /// Discrete action levels for the given task
    pub fn action_levels(&self, task: &TaskSpec) -> Result<Vec<f64>> {
        let high = task.action_space.high.get(self.action_dim).ok_or_else(|| {
            RLError::InvalidConfig(format!(
                "action dimension {} out of range for a {}-dimensional action",
                self.action_dim,
                task.action_dim()
            ))
        })?;
        discretize_actions(*high, self.action_floor, self.action_step)
    }

    /// Load and validate a JSON configuration
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let config: Self = load_json_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as JSON
    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        save_json_config(self, path)
    }
}

/// DQN agent generic over its Q-function approximator
pub struct DQNAgent<Q = CandleNetwork<QGraph>> {
    task: TaskSpec,
    config: DQNConfig,
    levels: Vec<f64>,
    model: Q,
    memory: ReplayBuffer<DiscreteAction>,
    epsilon: EpsilonDecay,
    rng: StdRng,
    episode: EpisodeState<DiscreteAction>,
    sink: Box<dyn StatsSink>,
    metrics: AgentMetrics,
}

impl DQNAgent {
    /// Create an agent backed by a candle network
    pub fn new(task: TaskSpec, config: DQNConfig, sink: Box<dyn StatsSink>) -> Result<Self> {
        config.validate()?;
        let num_actions = config.action_levels(&task)?.len();
        let state_size = task.state_size();
        let device = select_device(config.use_gpu)?;
        let mut rng = seeded_rng(config.base.seed, 0);
        let model = CandleNetwork::build(
            |vb| QGraph::new(vb, state_size, &config.hidden, num_actions),
            config.base.learning_rate,
            &device,
            &mut rng,
        )?;
        Self::with_model(task, config, model, sink)
    }
}

impl<Q> DQNAgent<Q>
where
    Q: Approximator + Checkpoint,
{
    /// Create an agent around a prebuilt Q-network
    pub fn with_model(
        task: TaskSpec,
        config: DQNConfig,
        model: Q,
        sink: Box<dyn StatsSink>,
    ) -> Result<Self> {
        config.validate()?;
        let levels = config.action_levels(&task)?;
        let memory =
            ReplayBuffer::with_rng(config.base.buffer_size, seeded_rng(config.base.seed, 1))?;
        let epsilon = EpsilonDecay::new(
            config.epsilon_start,
            config.epsilon_min,
            config.epsilon_decay,
        )?;
        let rng = seeded_rng(config.base.seed, 2);

        Ok(Self {
            task,
            config,
            levels,
            model,
            memory,
            epsilon,
            rng,
            episode: EpisodeState::new(),
            sink,
            metrics: AgentMetrics::default(),
        })
    }

    /// Epsilon-greedy choice of a discrete action index
    pub fn act(&mut self, state: &[f64]) -> Result<DiscreteAction> {
        if self.rng.gen::<f64>() <= self.epsilon.value() {
            return Ok(DiscreteAction(self.rng.gen_range(0..self.levels.len())));
        }
        let q_values = self.q_values(state)?;
        argmax(q_values.row(0))
            .map(DiscreteAction)
            .ok_or_else(|| RLError::Agent("Q-network returned no values".into()))
    }

    fn q_values(&self, state: &[f64]) -> Result<Array2<f32>> {
        let input = stack_rows([state], self.task.state_size())?;
        let output = self.model.predict(&[input])?;
        RLError::check_dim(self.levels.len(), output.ncols())?;
        Ok(output)
    }

    /// Fit the Q-network on each transition of `batch`, then decay epsilon.
    ///
    /// The target for a transition is its reward, plus the discounted best
    /// next-state value when the transition is not terminal. Only the taken
    /// action's output is moved towards it.
    pub fn replay(&mut self, batch: &[Experience<DiscreteAction>]) -> Result<()> {
        let mut total_loss = 0.0;
        for experience in batch {
            let target = self.q_target(experience)?;
            let mut target_f = self.q_values(&experience.state)?;
            let slot = target_f.get_mut((0, experience.action.0)).ok_or_else(|| {
                RLError::InvalidAction(format!(
                    "action index {} outside {} levels",
                    experience.action.0,
                    self.levels.len()
                ))
            })?;
            #[allow(clippy::cast_possible_truncation)]
            let target = target as f32;
            *slot = target;
            let input = stack_rows([experience.state.as_slice()], self.task.state_size())?;
            total_loss += self.model.train(&[input], &TrainTarget::Regression(target_f))?;
        }

        let epsilon = self.epsilon.step();
        self.metrics.updates += 1;
        #[allow(clippy::cast_precision_loss)]
        let mean_loss = f64::from(total_loss) / batch.len().max(1) as f64;
        self.metrics.loss = Some(mean_loss);
        debug!(mean_loss, epsilon, batch = batch.len(), "dqn replay");
        Ok(())
    }

    /// Regression target for one transition
    pub fn q_target(&self, experience: &Experience<DiscreteAction>) -> Result<f64> {
        if experience.done {
            return Ok(experience.reward);
        }
        let next = self.q_values(&experience.next_state)?;
        let best = next.row(0).iter().copied().fold(f32::NEG_INFINITY, f32::max);
        Ok(experience.reward + self.config.base.gamma * f64::from(best))
    }

    fn finish_episode(&mut self) -> Result<()> {
        let epsilon = self.epsilon.value();
        let stats = self.episode.finish(Some(epsilon), self.sink.as_mut())?;
        self.metrics.total_episodes += 1;
        self.metrics.last_episode_reward = Some(stats.total_reward);
        info!(
            episode = stats.episode,
            total_reward = stats.total_reward,
            epsilon,
            "episode finished"
        );

        let interval = self.config.checkpoint_interval;
        if interval > 0 && self.episode.episode_num % interval == 0 {
            match &self.config.checkpoint_dir {
                Some(dir) => {
                    std::fs::create_dir_all(dir)?;
                    let path = dir.join(CHECKPOINT_FILE);
                    self.model.save_weights(&path)?;
                    info!(path = %path.display(), "saved checkpoint");
                }
                None => warn!(
                    episode = self.episode.episode_num,
                    "checkpoint due but no checkpoint_dir configured"
                ),
            }
        }
        Ok(())
    }

    /// Level applied for a discrete action
    pub fn level(&self, action: DiscreteAction) -> Option<f64> {
        self.levels.get(action.0).copied()
    }

    /// Discrete action levels, ascending
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Current exploration rate
    pub fn epsilon(&self) -> f64 {
        self.epsilon.value()
    }

    /// Agent configuration
    pub fn config(&self) -> &DQNConfig {
        &self.config
    }

    /// Replay memory
    pub fn memory(&self) -> &ReplayBuffer<DiscreteAction> {
        &self.memory
    }

    /// State of the running episode
    pub fn episode_state(&self) -> &EpisodeState<DiscreteAction> {
        &self.episode
    }

    /// Q-network
    pub fn model(&self) -> &Q {
        &self.model
    }
}

impl<Q> Agent for DQNAgent<Q>
where
    Q: Approximator + Checkpoint,
{
    fn step(
        &mut self,
        observation: &VectorObservation,
        reward: Reward,
        done: bool,
    ) -> Result<ContinuousAction> {
        let state = self.task.reduce_state(observation)?;
        let action = self.act(&state)?;

        if let Some(experience) = self.episode.transition(reward.value(), &state, done) {
            self.memory.push(experience);
        }
        if self.memory.len() > self.config.base.batch_size {
            if let Some(batch) = self.memory.sample(self.config.base.batch_size) {
                self.replay(&batch)?;
            }
        }

        let level = self
            .level(action)
            .ok_or_else(|| RLError::InvalidAction(format!("no level for action {}", action.0)))?;
        trace!(?state, action = action.0, level, reward = reward.value(), done, "dqn step");
        let full_action = self.task.expand_action(&[self.config.action_dim], &[level])?;
        self.episode.advance(state, action, reward.value());
        self.metrics.total_steps += 1;

        if done {
            self.finish_episode()?;
        }
        Ok(full_action)
    }

    fn episode(&self) -> usize {
        self.episode.episode_num
    }

    fn save_weights(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.model.save_weights(path)
    }

    fn load_weights(&mut self, path: &Path) -> Result<()> {
        self.model.load_weights(path)
    }

    fn exploration_rate(&self) -> Option<f64> {
        Some(self.epsilon.value())
    }

    fn metrics(&self) -> AgentMetrics {
        self.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{MemoryStatsSink, NoopStatsSink};
    use approx::assert_abs_diff_eq;
    use quad_rl_core::{BoxSpace, ContinuousSpace};

    fn task() -> TaskSpec {
        TaskSpec::new(
            "test",
            BoxSpace::new(vec![-10.0; 7], vec![10.0; 7]).unwrap(),
            ContinuousSpace::symmetric(6, 25.0).unwrap(),
            0..3,
        )
        .unwrap()
    }

    fn small_config(seed: u64) -> DQNConfig {
        DQNConfig {
            base: AgentConfig {
                batch_size: 4,
                buffer_size: 100,
                seed: Some(seed),
                ..DQNConfig::default().base
            },
            hidden: vec![LayerSpec::linear(8), LayerSpec::relu(8)],
            ..DQNConfig::default()
        }
    }

    fn obs(t: f64) -> VectorObservation {
        VectorObservation::new(vec![0.0, 0.0, t, 0.0, 0.0, 0.0, 1.0])
    }

    #[test]
    fn default_levels_are_the_upper_thrusts() {
        let config = DQNConfig::default();
        config.validate().unwrap();
        assert_eq!(config.action_levels(&task()).unwrap(), vec![17.0, 21.0, 25.0]);

        let config = DQNConfig {
            action_dim: 6,
            ..DQNConfig::default()
        };
        assert!(config.action_levels(&task()).is_err());
    }

    #[test]
    fn partial_config_file_keeps_dqn_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dqn.json");
        std::fs::write(&path, r#"{"epsilon_min": 0.05, "batch_size": 32}"#).unwrap();
        let config = DQNConfig::from_json_file(&path).unwrap();
        assert_eq!(config.epsilon_min, 0.05);
        assert_eq!(config.epsilon_start, 3.0);
        assert_eq!(config.base.batch_size, 32);
        assert_eq!(config.base.gamma, 0.9);
        assert_eq!(config.base.buffer_size, 10_000);
    }

    #[test]
    fn terminal_target_is_the_reward() {
        let config = DQNConfig {
            base: AgentConfig {
                gamma: 0.99,
                ..small_config(1).base
            },
            ..small_config(1)
        };
        let agent = DQNAgent::new(task(), config, Box::new(NoopStatsSink)).unwrap();
        let terminal = Experience::new(vec![1.0, 2.0, 3.0], DiscreteAction(1), -4.0, vec![9.0; 3], true);
        assert_eq!(agent.q_target(&terminal).unwrap(), -4.0);

        let ongoing = Experience { done: false, ..terminal };
        let next = agent.q_values(&ongoing.next_state).unwrap();
        let best = next.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert_abs_diff_eq!(
            agent.q_target(&ongoing).unwrap(),
            -4.0 + 0.99 * f64::from(best),
            epsilon = 1e-9
        );
    }

    #[test]
    fn replay_pulls_the_taken_action_towards_its_target() {
        let config = DQNConfig {
            base: AgentConfig {
                learning_rate: 0.05,
                ..small_config(2).base
            },
            ..small_config(2)
        };
        let mut agent = DQNAgent::new(task(), config, Box::new(NoopStatsSink)).unwrap();
        let state = vec![0.5, -0.5, 1.0];
        let before = agent.q_values(&state).unwrap();
        let experience = Experience::new(state.clone(), DiscreteAction(0), 100.0, state.clone(), true);
        for _ in 0..100 {
            agent.replay(std::slice::from_ref(&experience)).unwrap();
        }
        let after = agent.q_values(&state).unwrap();
        assert!(after[[0, 0]] > before[[0, 0]] + 1.0);
    }

    #[test]
    fn epsilon_decays_per_replay_down_to_its_floor() {
        let config = DQNConfig {
            epsilon_start: 0.5,
            epsilon_min: 0.2,
            epsilon_decay: 0.5,
            ..small_config(3)
        };
        let mut agent = DQNAgent::new(task(), config, Box::new(NoopStatsSink)).unwrap();
        let experience = Experience::new(vec![0.0; 3], DiscreteAction(2), 1.0, vec![0.0; 3], true);
        agent.replay(std::slice::from_ref(&experience)).unwrap();
        assert_abs_diff_eq!(agent.epsilon(), 0.25);
        agent.replay(std::slice::from_ref(&experience)).unwrap();
        assert_abs_diff_eq!(agent.epsilon(), 0.2);
        agent.replay(std::slice::from_ref(&experience)).unwrap();
        assert_abs_diff_eq!(agent.epsilon(), 0.2);
    }

    #[test]
    fn greedy_agent_takes_the_best_level() {
        let config = DQNConfig {
            epsilon_start: 0.0,
            epsilon_min: 0.0,
            ..small_config(4)
        };
        let mut agent = DQNAgent::new(task(), config, Box::new(NoopStatsSink)).unwrap();
        let state = [0.3, 0.1, 2.0];
        let expected = argmax(agent.q_values(&state).unwrap().row(0)).unwrap();
        for _ in 0..5 {
            assert_eq!(agent.act(&state).unwrap(), DiscreteAction(expected));
        }
    }

    #[test]
    fn step_returns_a_force_z_level() {
        let mut agent = DQNAgent::new(task(), small_config(5), Box::new(NoopStatsSink)).unwrap();
        for t in 0..10 {
            let action = agent.step(&obs(f64::from(t)), Reward(0.0), false).unwrap();
            assert_eq!(action.len(), 6);
            assert!([17.0, 21.0, 25.0].contains(&action.0[2]));
            assert!(action.0.iter().enumerate().all(|(i, &x)| i == 2 || x == 0.0));
        }
        // ten ticks store nine transitions; ticks 6 to 10 replay
        assert_eq!(agent.memory().len(), 9);
        assert_eq!(agent.metrics().updates, 5);
    }

    #[test]
    fn episode_stats_carry_epsilon() {
        let sink = MemoryStatsSink::new();
        let mut agent = DQNAgent::new(task(), small_config(6), Box::new(sink.clone())).unwrap();
        agent.step(&obs(0.0), Reward(0.0), false).unwrap();
        agent.step(&obs(1.0), Reward(2.0), true).unwrap();

        let rows = sink.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_reward, 2.0);
        assert_eq!(rows[0].epsilon, Some(3.0));
        assert_eq!(agent.episode(), 2);
        assert!(agent.episode_state().last_state.is_none());
    }

    #[test]
    fn checkpoints_follow_the_interval() {
        let dir = tempfile::tempdir().unwrap();
        let config = DQNConfig {
            checkpoint_interval: 2,
            checkpoint_dir: Some(dir.path().join("ckpt")),
            ..small_config(7)
        };
        let mut agent = DQNAgent::new(task(), config, Box::new(NoopStatsSink)).unwrap();
        let path = dir.path().join("ckpt").join(CHECKPOINT_FILE);

        agent.step(&obs(0.0), Reward(0.0), true).unwrap();
        // episode number is now 2
        assert!(path.exists());

        let mut restored = DQNAgent::new(task(), small_config(8), Box::new(NoopStatsSink)).unwrap();
        restored.load_weights(&path).unwrap();
        assert_eq!(
            restored.model().get_weights().unwrap(),
            agent.model().get_weights().unwrap()
        );
    }

    #[test]
    fn seeded_agents_act_identically() {
        let config = DQNConfig {
            epsilon_start: 0.5,
            ..small_config(10)
        };
        let run = || {
            let mut agent =
                DQNAgent::new(task(), config.clone(), Box::new(NoopStatsSink)).unwrap();
            (0..15)
                .map(|t| {
                    agent
                        .step(&obs(f64::from(t % 5)), Reward(1.0), t % 5 == 4)
                        .unwrap()
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
