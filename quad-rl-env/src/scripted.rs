//! Environment replaying recorded ticks
//!
//! Ticks are read from a JSON-lines file, one tick per line:
//!
//! ```text
//! {"observation": [0.0, 0.0, 0.1, 0.0, 0.0, 0.0, 1.0], "reward": 0.0, "done": false}
//! ```
//!
//! Consecutive ticks are grouped into episodes ending at the first tick with
//! `done: true`. `reset` starts the next episode (wrapping around) and returns
//! its first tick; every `step` returns the following tick. Actions sent by
//! the agent are kept for inspection.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, warn};

use quad_rl_core::{ContinuousAction, Environment, RLError, Result, Step, TaskSpec};

/// Recorded tick source
#[derive(Debug, Clone)]
pub struct ScriptedEnv {
    task: TaskSpec,
    episodes: Vec<Vec<Step>>,
    next_episode: usize,
    current: Option<(usize, usize)>,
    actions: Vec<ContinuousAction>,
}

impl ScriptedEnv {
    /// Build from ticks in playback order.
    ///
    /// A trailing group without a terminal tick gets its last tick marked done.
    pub fn from_steps(task: TaskSpec, steps: Vec<Step>) -> Result<Self> {
        let mut episodes = Vec::new();
        let mut episode = Vec::new();
        for step in steps {
            let done = step.done;
            episode.push(step);
            if done {
                episodes.push(std::mem::take(&mut episode));
            }
        }
        let trailing = episode.len();
        if let Some(last) = episode.last_mut() {
            warn!(ticks = trailing, "recording ends mid-episode, closing it");
            last.done = true;
            episodes.push(episode);
        }
        if episodes.is_empty() {
            return Err(RLError::Environment("recording holds no ticks".into()));
        }
        debug!(task = %task.name, episodes = episodes.len(), "loaded recording");

        Ok(Self {
            task,
            episodes,
            next_episode: 0,
            current: None,
            actions: Vec::new(),
        })
    }

    /// Parse JSON-lines text; blank lines are skipped
    pub fn parse_jsonl(task: TaskSpec, content: &str) -> Result<Self> {
        let mut steps = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let step: Step = serde_json::from_str(line).map_err(|e| {
                RLError::Environment(format!("line {}: invalid tick: {e}", number + 1))
            })?;
            steps.push(step);
        }
        Self::from_steps(task, steps)
    }

    /// Load a JSON-lines recording
    pub async fn from_jsonl(task: TaskSpec, path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse_jsonl(task, &content)
    }

    /// Number of recorded episodes
    #[must_use]
    pub fn num_episodes(&self) -> usize {
        self.episodes.len()
    }

    /// Every action received so far, in order
    #[must_use]
    pub fn actions(&self) -> &[ContinuousAction] {
        &self.actions
    }
}

#[async_trait]
impl Environment for ScriptedEnv {
    fn task(&self) -> &TaskSpec {
        &self.task
    }

    async fn reset(&mut self) -> Result<Step> {
        let episode = self.next_episode;
        self.next_episode = (self.next_episode + 1) % self.episodes.len();
        self.current = Some((episode, 0));
        Ok(self.episodes[episode][0].clone())
    }

    async fn step(&mut self, action: &ContinuousAction) -> Result<Step> {
        if action.len() != self.task.action_dim() {
            return Err(RLError::InvalidAction(format!(
                "expected {} action components, got {}",
                self.task.action_dim(),
                action.len()
            )));
        }
        let (episode, tick) = self
            .current
            .ok_or_else(|| RLError::Environment("step called before reset".into()))?;
        let next = self.episodes[episode]
            .get(tick + 1)
            .ok_or_else(|| RLError::Environment("episode already finished".into()))?
            .clone();

        self.actions.push(action.clone());
        self.current = Some((episode, tick + 1));
        Ok(next)
    }
}
