//! Agent traits and types

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{ContinuousAction, RLError, Result, Reward, VectorObservation};

/// Configuration shared by all learning agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Learning rate of every network optimizer
    pub learning_rate: f64,
    /// Discount factor
    pub gamma: f64,
    /// Batch size for training
    pub batch_size: usize,
    /// Buffer size for experience replay
    pub buffer_size: usize,
    /// Seed for weight initialisation, sampling and exploration
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            gamma: 0.99,
            batch_size: 64,
            buffer_size: 10_000,
            seed: None,
        }
    }
}

impl AgentConfig {
    /// Reject settings no agent can run with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(RLError::InvalidConfig("batch_size must be positive".into()));
        }
        if self.buffer_size == 0 {
            return Err(RLError::InvalidConfig("buffer_size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(RLError::InvalidConfig(format!(
                "gamma must lie in [0, 1], got {}",
                self.gamma
            )));
        }
        if !(self.learning_rate > 0.0) {
            return Err(RLError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Read a JSON configuration file into any config type.
///
/// Keys present in the file override `T::default()`; absent keys keep the
/// type's own defaults, including those of flattened sub-configs.
pub fn load_json_config<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned + Serialize + Default,
{
    let json = std::fs::read_to_string(path)?;
    tracing::debug!(path = %path.display(), "loading config");
    parse_json_config(&json)
}

/// Parse JSON text over `T::default()`, see [`load_json_config`]
pub fn parse_json_config<T>(json: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned + Serialize + Default,
{
    let overrides: serde_json::Value = serde_json::from_str(json)?;
    let mut merged = serde_json::to_value(T::default())?;
    merge_json(&mut merged, overrides);
    Ok(serde_json::from_value(merged)?)
}

fn merge_json(base: &mut serde_json::Value, overrides: serde_json::Value) {
    match (base, overrides) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Write any config type as pretty JSON
pub fn save_json_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    tracing::debug!(path = %path.display(), "saved config");
    Ok(())
}

/// Summary of a finished episode, as written to the stats sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    /// Episode number, starting at 1
    pub episode: usize,
    /// Sum of rewards received during the episode
    pub total_reward: f64,
    /// Number of ticks fed to the agent
    pub steps: usize,
    /// Exploration rate at the end of the episode (epsilon-greedy agents)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f64>,
}

/// Agent metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Total steps taken
    pub total_steps: usize,
    /// Total finished episodes
    pub total_episodes: usize,
    /// Learning updates performed
    pub updates: usize,
    /// Reward of the last finished episode
    pub last_episode_reward: Option<f64>,
    /// Loss of the last learning update
    pub loss: Option<f64>,
}

/// Core agent trait.
///
/// Agents are driven one tick at a time: every call to [`Agent::step`]
/// observes the raw environment output and returns the full action vector
/// to apply next.
pub trait Agent {
    /// Process one tick and choose the next action
    fn step(
        &mut self,
        observation: &VectorObservation,
        reward: Reward,
        done: bool,
    ) -> Result<ContinuousAction>;

    /// Number of the episode currently running, starting at 1
    fn episode(&self) -> usize;

    /// Save network weights
    fn save_weights(&self, path: &Path) -> Result<()>;

    /// Load network weights
    fn load_weights(&mut self, path: &Path) -> Result<()>;

    /// Current exploration rate, for agents that explore epsilon-greedily
    fn exploration_rate(&self) -> Option<f64> {
        None
    }

    /// Get agent metrics
    fn metrics(&self) -> AgentMetrics {
        AgentMetrics::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        AgentConfig::default().validate().unwrap();
    }

    #[test]
    fn validation_rejects_bad_values() {
        let bad = [
            AgentConfig {
                batch_size: 0,
                ..AgentConfig::default()
            },
            AgentConfig {
                buffer_size: 0,
                ..AgentConfig::default()
            },
            AgentConfig {
                gamma: 1.5,
                ..AgentConfig::default()
            },
            AgentConfig {
                learning_rate: 0.0,
                ..AgentConfig::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(RLError::InvalidConfig(_))));
        }
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct Wrapped {
        #[serde(flatten)]
        base: AgentConfig,
        extra: Vec<u32>,
    }

    impl Default for Wrapped {
        fn default() -> Self {
            Self {
                base: AgentConfig {
                    gamma: 0.5,
                    buffer_size: 7,
                    ..AgentConfig::default()
                },
                extra: vec![1, 2],
            }
        }
    }

    #[test]
    fn partial_json_keeps_the_outer_defaults() {
        let config: Wrapped = parse_json_config(r#"{"batch_size": 8}"#).unwrap();
        assert_eq!(config.base.batch_size, 8);
        assert_eq!(config.base.gamma, 0.5);
        assert_eq!(config.base.buffer_size, 7);
        assert_eq!(config.extra, vec![1, 2]);

        let config: Wrapped = parse_json_config(r#"{"extra": [9], "seed": 3}"#).unwrap();
        assert_eq!(config.extra, vec![9]);
        assert_eq!(config.base.seed, Some(3));
        assert!(parse_json_config::<Wrapped>("[1]").is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: AgentConfig = serde_json::from_str(r#"{"gamma": 0.5, "seed": 7}"#).unwrap();
        assert_eq!(config.gamma, 0.5);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.batch_size, AgentConfig::default().batch_size);
    }

    #[test]
    fn episode_stats_omit_missing_epsilon() {
        let stats = EpisodeStats {
            episode: 1,
            total_reward: 2.0,
            steps: 3,
            epsilon: None,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(!json.contains("epsilon"));
    }
}
