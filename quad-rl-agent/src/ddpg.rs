//! Deep Deterministic Policy Gradient (DDPG) agent implementation
//!
//! Actor-critic agent with local and target copies of both networks,
//! Ornstein-Uhlenbeck exploration on the actor output and soft target
//! updates after every learning step.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, trace};

use quad_rl_core::{
    load_json_config, save_json_config, Agent, AgentConfig, AgentMetrics, ContinuousAction,
    Experience, RLError, Result, Reward, TaskSpec, VectorObservation,
};

use crate::buffer::ReplayBuffer;
use crate::episode::EpisodeState;
use crate::network::{
    hard_update, select_device, soft_update, stack_rows, ActorGraph, Approximator, CandleNetwork,
    Checkpoint, CriticApproximator, CriticGraph, LayerSpec, TrainTarget,
};
use crate::noise::{NoiseConfig, OUNoise};
use crate::stats::StatsSink;
use crate::utils::seeded_rng;

const ACTOR_FILE: &str = "actor.safetensors";
const CRITIC_FILE: &str = "critic.safetensors";

/// DDPG-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DDPGConfig {
    /// Base agent configuration
    #[serde(flatten)]
    pub base: AgentConfig,
    /// Soft update rate of the target networks
    pub tau: f64,
    /// Action dimensions the agent controls; the rest stay zero
    pub action_dims: Vec<usize>,
    /// Exploration noise
    pub noise: NoiseConfig,
    /// Hidden layers of the actor
    pub actor_hidden: Vec<LayerSpec>,
    /// Hidden layers of the critic's state pathway
    pub critic_state_hidden: Vec<LayerSpec>,
    /// Hidden layers of the critic's action pathway
    pub critic_action_hidden: Vec<LayerSpec>,
    /// Run the networks on CUDA when available
    pub use_gpu: bool,
}

impl Default for DDPGConfig {
    fn default() -> Self {
        Self {
            base: AgentConfig {
                learning_rate: 1e-3,
                gamma: 0.0,
                batch_size: 64,
                buffer_size: 100_000,
                seed: None,
            },
            tau: 0.001,
            action_dims: vec![0, 1, 2],
            noise: NoiseConfig::default(),
            actor_hidden: vec![LayerSpec::relu(32), LayerSpec::relu(64), LayerSpec::relu(32)],
            critic_state_hidden: vec![LayerSpec::relu(32), LayerSpec::relu(64)],
            critic_action_hidden: vec![LayerSpec::relu(32), LayerSpec::relu(64)],
            use_gpu: false,
        }
    }
}

impl DDPGConfig {
    /// Reject settings the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        if !(0.0..=1.0).contains(&self.tau) {
            return Err(RLError::InvalidConfig(format!(
                "tau must lie in [0, 1], got {}",
                self.tau
            )));
        }
        if self.action_dims.is_empty() {
            return Err(RLError::InvalidConfig("action_dims must not be empty".into()));
        }
        let state_width = self.critic_state_hidden.last().map(|l| l.units);
        let action_width = self.critic_action_hidden.last().map(|l| l.units);
        if state_width.is_none() || state_width != action_width {
            return Err(RLError::InvalidConfig(format!(
                "critic pathways must end at the same width, got {state_width:?} and {action_width:?}"
            )));
        }
        Ok(())
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

/// DDPG agent generic over its actor and critic approximators
pub struct DDPGAgent<Act = CandleNetwork<ActorGraph>, Crit = CandleNetwork<CriticGraph>> {
    task: TaskSpec,
    config: DDPGConfig,
    actor_local: Act,
    actor_target: Act,
    critic_local: Crit,
    critic_target: Crit,
    memory: ReplayBuffer<ContinuousAction>,
    noise: OUNoise,
    episode: EpisodeState<ContinuousAction>,
    sink: Box<dyn StatsSink>,
    metrics: AgentMetrics,
}

impl DDPGAgent {
    /// Create an agent backed by candle networks
    pub fn new(task: TaskSpec, config: DDPGConfig, sink: Box<dyn StatsSink>) -> Result<Self> {
        config.validate()?;
        let bounds = task.action_space.select(&config.action_dims)?;
        let state_size = task.state_size();
        let action_size = config.action_dims.len();
        let lr = config.base.learning_rate;
        let device = select_device(config.use_gpu)?;
        let mut rng = seeded_rng(config.base.seed, 0);

        let mut actor = || {
            CandleNetwork::build(
                |vb| ActorGraph::new(vb, state_size, &config.actor_hidden, &bounds.low, &bounds.high),
                lr,
                &device,
                &mut rng,
            )
        };
        let actor_local = actor()?;
        let actor_target = actor()?;

        let mut critic = || {
            CandleNetwork::build(
                |vb| {
                    CriticGraph::new(
                        vb,
                        state_size,
                        action_size,
                        &config.critic_state_hidden,
                        &config.critic_action_hidden,
                    )
                },
                lr,
                &device,
                &mut rng,
            )
        };
        let critic_local = critic()?;
        let critic_target = critic()?;

        Self::with_networks(
            task,
            config,
            (actor_local, actor_target),
            (critic_local, critic_target),
            sink,
        )
    }
}

impl<Act, Crit> DDPGAgent<Act, Crit>
where
    Act: Approximator,
    Crit: CriticApproximator,
{
    /// Create an agent from prebuilt `(local, target)` network pairs.
    ///
    /// Targets are overwritten with their local weights.
    pub fn with_networks(
        task: TaskSpec,
        config: DDPGConfig,
        actor: (Act, Act),
        critic: (Crit, Crit),
        sink: Box<dyn StatsSink>,
    ) -> Result<Self> {
        config.validate()?;
        task.action_space.select(&config.action_dims)?;

        let (actor_local, mut actor_target) = actor;
        let (critic_local, mut critic_target) = critic;
        hard_update(&actor_local, &mut actor_target)?;
        hard_update(&critic_local, &mut critic_target)?;

        let memory = ReplayBuffer::with_rng(config.base.buffer_size, seeded_rng(config.base.seed, 1))?;
        let noise = OUNoise::with_rng(
            config.action_dims.len(),
            &config.noise,
            seeded_rng(config.base.seed, 2),
        )?;

        Ok(Self {
            task,
            config,
            actor_local,
            actor_target,
            critic_local,
            critic_target,
            memory,
            noise,
            episode: EpisodeState::new(),
            sink,
            metrics: AgentMetrics::default(),
        })
    }

    /// Actor output for `state` plus one noise sample.
    ///
    /// The result is not clipped to the action bounds.
    pub fn act(&mut self, state: &[f64]) -> Result<ContinuousAction> {
        let input = stack_rows([state], self.task.state_size())?;
        let output = self.actor_local.predict(&[input])?;
        RLError::check_dim(self.config.action_dims.len(), output.ncols())?;
        let noise = self.noise.sample();
        let action = output
            .row(0)
            .iter()
            .zip(noise.iter())
            .map(|(&a, &n)| f64::from(a) + n)
            .collect();
        Ok(ContinuousAction(action))
    }

    /// One actor-critic update from a sampled batch
    pub fn learn(&mut self, batch: &[Experience<ContinuousAction>]) -> Result<()> {
        let state_size = self.task.state_size();
        let action_size = self.config.action_dims.len();
        let states = stack_rows(batch.iter().map(|e| e.state.as_slice()), state_size)?;
        let actions = stack_rows(batch.iter().map(|e| e.action.0.as_slice()), action_size)?;
        let next_states = stack_rows(batch.iter().map(|e| e.next_state.as_slice()), state_size)?;
        #[allow(clippy::cast_possible_truncation)]
        let rewards = Array2::from_shape_fn((batch.len(), 1), |(i, _)| batch[i].reward as f32);
        #[allow(clippy::cast_possible_truncation)]
        let not_done = Array2::from_shape_fn((batch.len(), 1), |(i, _)| batch[i].not_done() as f32);

        let next_actions = self.actor_target.predict(&[next_states.clone()])?;
        let target_q = self.critic_target.predict(&[next_states, next_actions])?;
        RLError::check_dim(batch.len(), target_q.nrows())?;
        RLError::check_dim(1, target_q.ncols())?;

        #[allow(clippy::cast_possible_truncation)]
        let gamma = self.config.base.gamma as f32;
        let q_targets = &rewards + &(target_q * &not_done * gamma);
        let critic_loss = self.critic_local.train(
            &[states.clone(), actions.clone()],
            &TrainTarget::Regression(q_targets),
        )?;

        let action_gradients = self.critic_local.action_gradients(&states, &actions)?;
        let actor_loss = self
            .actor_local
            .train(&[states], &TrainTarget::OutputGradient(action_gradients))?;

        #[allow(clippy::cast_possible_truncation)]
        let tau = self.config.tau as f32;
        soft_update(&self.critic_local, &mut self.critic_target, tau)?;
        soft_update(&self.actor_local, &mut self.actor_target, tau)?;

        self.metrics.updates += 1;
        self.metrics.loss = Some(f64::from(critic_loss));
        debug!(critic_loss, actor_loss, batch = batch.len(), "ddpg update");
        Ok(())
    }

    fn finish_episode(&mut self) -> Result<()> {
        self.noise.reset();
        let stats = self.episode.finish(None, self.sink.as_mut())?;
        self.metrics.total_episodes += 1;
        self.metrics.last_episode_reward = Some(stats.total_reward);
        info!(
            episode = stats.episode,
            total_reward = stats.total_reward,
            steps = stats.steps,
            "episode finished"
        );
        Ok(())
    }

    /// Task the agent was built for
    pub fn task(&self) -> &TaskSpec {
        &self.task
    }

    /// Agent configuration
    pub fn config(&self) -> &DDPGConfig {
        &self.config
    }

    /// Replay memory
    pub fn memory(&self) -> &ReplayBuffer<ContinuousAction> {
        &self.memory
    }

    /// Exploration noise
    pub fn noise(&self) -> &OUNoise {
        &self.noise
    }

    /// State of the running episode
    pub fn episode_state(&self) -> &EpisodeState<ContinuousAction> {
        &self.episode
    }

    /// Local actor
    pub fn actor_local(&self) -> &Act {
        &self.actor_local
    }

    /// Target actor
    pub fn actor_target(&self) -> &Act {
        &self.actor_target
    }

    /// Local critic
    pub fn critic_local(&self) -> &Crit {
        &self.critic_local
    }

    /// Target critic
    pub fn critic_target(&self) -> &Crit {
        &self.critic_target
    }
}

impl<Act, Crit> Agent for DDPGAgent<Act, Crit>
where
    Act: Approximator + Checkpoint,
    Crit: CriticApproximator + Checkpoint,
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
                self.learn(&batch)?;
            }
        }

        trace!(?state, action = ?action.0, reward = reward.value(), done, "ddpg step");
        let full_action = self.task.expand_action(&self.config.action_dims, &action.0)?;
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
        std::fs::create_dir_all(path)?;
        self.actor_local.save_weights(&path.join(ACTOR_FILE))?;
        self.critic_local.save_weights(&path.join(CRITIC_FILE))
    }

    fn load_weights(&mut self, path: &Path) -> Result<()> {
        self.actor_local.load_weights(&path.join(ACTOR_FILE))?;
        self.critic_local.load_weights(&path.join(CRITIC_FILE))?;
        hard_update(&self.actor_local, &mut self.actor_target)?;
        hard_update(&self.critic_local, &mut self.critic_target)
    }

    fn metrics(&self) -> AgentMetrics {
        self.metrics.clone()
    }
}
