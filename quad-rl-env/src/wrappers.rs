//! Environment wrappers for common transformations

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use quad_rl_core::{ContinuousAction, Environment, EpisodeInfo, Reward, Step, TaskSpec};

/// Wrapper that modifies rewards
pub struct RewardWrapper<E, F> {
    /// Inner environment
    pub env: E,
    /// Reward transformation function
    pub reward_fn: F,
}

impl<E, F> RewardWrapper<E, F> {
    /// Wrap `env`, passing every reward through `reward_fn`
    pub fn new(env: E, reward_fn: F) -> Self {
        Self { env, reward_fn }
    }
}

/// Multiply every reward by a constant
pub fn scale_rewards<E>(
    env: E,
    factor: f64,
) -> RewardWrapper<E, impl Fn(Reward, &Step) -> Reward + Send + Sync> {
    RewardWrapper::new(env, move |reward: Reward, _: &Step| reward * factor)
}

#[async_trait]
impl<E, F> Environment for RewardWrapper<E, F>
where
    E: Environment,
    F: Fn(Reward, &Step) -> Reward + Send + Sync,
{
    fn task(&self) -> &TaskSpec {
        self.env.task()
    }

    async fn reset(&mut self) -> quad_rl_core::Result<Step> {
        let mut step = self.env.reset().await?;
        step.reward = (self.reward_fn)(step.reward, &step);
        Ok(step)
    }

    async fn step(&mut self, action: &ContinuousAction) -> quad_rl_core::Result<Step> {
        let mut step = self.env.step(action).await?;
        step.reward = (self.reward_fn)(step.reward, &step);
        Ok(step)
    }

    async fn close(&mut self) -> quad_rl_core::Result<()> {
        self.env.close().await
    }

    fn episode_info(&self) -> Option<EpisodeInfo> {
        self.env.episode_info()
    }
}

/// Time limit wrapper.
///
/// Ends the episode after `max_steps` steps, marking the tick with
/// `"truncated": true` in its info.
pub struct TimeLimit<E> {
    /// Inner environment
    pub env: E,
    /// Maximum steps
    pub max_steps: usize,
    /// Current step count
    pub steps: usize,
}

impl<E> TimeLimit<E> {
    /// Create a new time limit wrapper
    pub fn new(env: E, max_steps: usize) -> Self {
        Self {
            env,
            max_steps,
            steps: 0,
        }
    }
}

#[async_trait]
impl<E> Environment for TimeLimit<E>
where
    E: Environment,
{
    fn task(&self) -> &TaskSpec {
        self.env.task()
    }

    async fn reset(&mut self) -> quad_rl_core::Result<Step> {
        self.steps = 0;
        self.env.reset().await
    }

    async fn step(&mut self, action: &ContinuousAction) -> quad_rl_core::Result<Step> {
        self.steps += 1;
        let mut step = self.env.step(action).await?;

        if self.steps >= self.max_steps && !step.done {
            step.done = true;
            step.info.fields.insert("truncated".into(), Value::Bool(true));
        }

        Ok(step)
    }

    async fn close(&mut self) -> quad_rl_core::Result<()> {
        self.env.close().await
    }

    fn episode_info(&self) -> Option<EpisodeInfo> {
        self.env.episode_info()
    }
}

/// Clip every action into the task's action bounds before it reaches the
/// inner environment
pub struct ClipAction<E> {
    /// Inner environment
    pub env: E,
}

impl<E> ClipAction<E> {
    /// Create a new clipping wrapper
    pub fn new(env: E) -> Self {
        Self { env }
    }
}

#[async_trait]
impl<E> Environment for ClipAction<E>
where
    E: Environment,
{
    fn task(&self) -> &TaskSpec {
        self.env.task()
    }

    async fn reset(&mut self) -> quad_rl_core::Result<Step> {
        self.env.reset().await
    }

    async fn step(&mut self, action: &ContinuousAction) -> quad_rl_core::Result<Step> {
        let space = &self.env.task().action_space;
        if space.contains(action) {
            return self.env.step(action).await;
        }
        trace!(?action, "clipping action into bounds");
        let clipped = ContinuousAction(
            action
                .0
                .iter()
                .zip(space.low.iter().zip(&space.high))
                .map(|(&x, (&low, &high))| x.clamp(low, high))
                .collect(),
        );
        self.env.step(&clipped).await
    }

    async fn close(&mut self) -> quad_rl_core::Result<()> {
        self.env.close().await
    }

    fn episode_info(&self) -> Option<EpisodeInfo> {
        self.env.episode_info()
    }
}
