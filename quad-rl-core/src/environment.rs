//! Environment traits and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{ContinuousAction, Reward, TaskSpec, VectorObservation};

/// One tick delivered by the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Raw observation
    pub observation: VectorObservation,
    /// Reward for the previous action
    #[serde(default)]
    pub reward: Reward,
    /// Whether the episode is done
    #[serde(default)]
    pub done: bool,
    /// Additional info from the environment
    #[serde(default, skip_serializing_if = "StepInfo::is_empty")]
    pub info: StepInfo,
}

impl Step {
    /// Tick with no extra info
    #[must_use]
    pub fn new(observation: VectorObservation, reward: Reward, done: bool) -> Self {
        Self {
            observation,
            reward,
            done,
            info: StepInfo::default(),
        }
    }
}

/// Additional information from a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Custom fields
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl StepInfo {
    /// Whether no field is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Episode information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeInfo {
    /// Total reward
    pub total_reward: f64,
    /// Number of steps
    pub steps: usize,
    /// Start time
    pub start_time: chrono::DateTime<chrono::Utc>,
    /// End time
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Environment collaborator driving an agent.
///
/// `reset` starts an episode and returns its first tick; `step` applies the
/// full action vector and returns the next tick.
#[async_trait]
pub trait Environment: Send {
    /// Static description of the task
    fn task(&self) -> &TaskSpec;

    /// Reset the environment
    async fn reset(&mut self) -> crate::Result<Step>;

    /// Take a step in the environment
    async fn step(&mut self, action: &ContinuousAction) -> crate::Result<Step>;

    /// Close the environment
    async fn close(&mut self) -> crate::Result<()> {
        Ok(())
    }

    /// Get current episode info
    fn episode_info(&self) -> Option<EpisodeInfo> {
        None
    }
}

#[async_trait]
impl<E> Environment for Box<E>
where
    E: Environment + ?Sized,
{
    fn task(&self) -> &TaskSpec {
        (**self).task()
    }

    async fn reset(&mut self) -> crate::Result<Step> {
        (**self).reset().await
    }

    async fn step(&mut self, action: &ContinuousAction) -> crate::Result<Step> {
        (**self).step(action).await
    }

    async fn close(&mut self) -> crate::Result<()> {
        (**self).close().await
    }

    fn episode_info(&self) -> Option<EpisodeInfo> {
        (**self).episode_info()
    }
}

/// Wrapper for environments that tracks episodes
pub struct TrackedEnvironment<E> {
    /// Inner environment
    pub env: E,
    /// Current episode
    pub episode: Option<EpisodeInfo>,
}

impl<E> TrackedEnvironment<E> {
    /// Create a new tracked environment
    pub fn new(env: E) -> Self {
        Self { env, episode: None }
    }
}

#[async_trait]
impl<E> Environment for TrackedEnvironment<E>
where
    E: Environment,
{
    fn task(&self) -> &TaskSpec {
        self.env.task()
    }

    async fn reset(&mut self) -> crate::Result<Step> {
        if let Some(ref mut episode) = self.episode {
            episode.end_time.get_or_insert_with(chrono::Utc::now);
        }

        self.episode = Some(EpisodeInfo {
            total_reward: 0.0,
            steps: 0,
            start_time: chrono::Utc::now(),
            end_time: None,
        });

        self.env.reset().await
    }

    async fn step(&mut self, action: &ContinuousAction) -> crate::Result<Step> {
        let step = self.env.step(action).await?;

        if let Some(ref mut episode) = self.episode {
            episode.total_reward += step.reward.0;
            episode.steps += 1;
            if step.done {
                episode.end_time = Some(chrono::Utc::now());
            }
        }

        Ok(step)
    }

    async fn close(&mut self) -> crate::Result<()> {
        self.env.close().await
    }

    fn episode_info(&self) -> Option<EpisodeInfo> {
        self.episode.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoxSpace, ContinuousSpace};

    struct Countdown {
        task: TaskSpec,
        left: usize,
    }

    #[async_trait]
    impl Environment for Countdown {
        fn task(&self) -> &TaskSpec {
            &self.task
        }

        async fn reset(&mut self) -> crate::Result<Step> {
            self.left = 3;
            Ok(Step::new(vec![0.0].into(), Reward::ZERO, false))
        }

        async fn step(&mut self, _action: &ContinuousAction) -> crate::Result<Step> {
            self.left -= 1;
            Ok(Step::new(vec![self.left as f64].into(), Reward(1.5), self.left == 0))
        }
    }

    fn countdown() -> Countdown {
        Countdown {
            task: TaskSpec::new(
                "countdown",
                BoxSpace::new(vec![0.0], vec![3.0]).unwrap(),
                ContinuousSpace::symmetric(1, 1.0).unwrap(),
                0..1,
            )
            .unwrap(),
            left: 0,
        }
    }

    #[tokio::test]
    async fn tracked_environment_accumulates_episode_info() {
        let mut env = TrackedEnvironment::new(countdown());
        assert!(env.episode_info().is_none());

        env.reset().await.unwrap();
        let action = ContinuousAction::zeros(1);
        loop {
            if env.step(&action).await.unwrap().done {
                break;
            }
        }

        let info = env.episode_info().unwrap();
        assert_eq!(info.steps, 3);
        assert!((info.total_reward - 4.5).abs() < 1e-12);
        assert!(info.end_time.is_some());
    }

    #[test]
    fn default_close_succeeds() {
        let mut env = countdown();
        tokio_test::block_on(async {
            env.reset().await.unwrap();
            env.close().await.unwrap();
        });
        assert_eq!(env.left, 3);
    }

    #[test]
    fn step_parses_from_a_json_line() {
        let step: Step =
            serde_json::from_str(r#"{"observation":[1.0,2.0,3.0],"reward":-0.5,"done":true}"#)
                .unwrap();
        assert_eq!(step.observation.data, vec![1.0, 2.0, 3.0]);
        assert_eq!(step.reward, Reward(-0.5));
        assert!(step.done);
        assert!(step.info.is_empty());

        let first: Step = serde_json::from_str(r#"{"observation":[0.0]}"#).unwrap();
        assert_eq!(first.reward, Reward::ZERO);
        assert!(!first.done);
    }
}
