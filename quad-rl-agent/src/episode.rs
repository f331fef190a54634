//! Per-episode bookkeeping shared by the agents

use quad_rl_core::{Action, EpisodeStats, Experience, Result};

use crate::stats::StatsSink;

/// What an agent remembers between ticks of one episode
#[derive(Debug, Clone)]
pub struct EpisodeState<A> {
    /// Reduced state of the previous tick
    pub last_state: Option<Vec<f64>>,
    /// Action chosen on the previous tick
    pub last_action: Option<A>,
    /// Rewards summed over the episode so far
    pub total_reward: f64,
    /// Ticks seen in the episode so far
    pub steps: usize,
    /// Number of the running episode, starting at 1
    pub episode_num: usize,
}

impl<A> Default for EpisodeState<A> {
    fn default() -> Self {
        Self {
            last_state: None,
            last_action: None,
            total_reward: 0.0,
            steps: 0,
            episode_num: 1,
        }
    }
}

impl<A: Action> EpisodeState<A> {
    /// Fresh state for episode 1
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition from the previous tick into `state`, if there was one
    #[must_use]
    pub fn transition(&self, reward: f64, state: &[f64], done: bool) -> Option<Experience<A>> {
        match (&self.last_state, &self.last_action) {
            (Some(last_state), Some(last_action)) => Some(Experience::new(
                last_state.clone(),
                last_action.clone(),
                reward,
                state.to_vec(),
                done,
            )),
            _ => None,
        }
    }

    /// Remember this tick's state and action and count its reward
    pub fn advance(&mut self, state: Vec<f64>, action: A, reward: f64) {
        self.last_state = Some(state);
        self.last_action = Some(action);
        self.total_reward += reward;
        self.steps += 1;
    }

    /// Close the episode: report it to `sink`, bump the episode number and
    /// clear the episode-scoped fields. Returns the reported row.
    pub fn finish(&mut self, epsilon: Option<f64>, sink: &mut dyn StatsSink) -> Result<EpisodeStats> {
        let stats = EpisodeStats {
            episode: self.episode_num,
            total_reward: self.total_reward,
            steps: self.steps,
            epsilon,
        };
        self.episode_num += 1;
        self.last_state = None;
        self.last_action = None;
        self.total_reward = 0.0;
        self.steps = 0;
        sink.record(&stats)?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::MemoryStatsSink;
    use quad_rl_core::DiscreteAction;

    #[test]
    fn first_tick_has_no_transition() {
        let state = EpisodeState::<DiscreteAction>::new();
        assert!(state.transition(1.0, &[0.0], false).is_none());
    }

    #[test]
    fn transition_links_previous_tick() {
        let mut state = EpisodeState::new();
        state.advance(vec![1.0], DiscreteAction(2), 0.0);
        let exp = state.transition(0.5, &[2.0], true).unwrap();
        assert_eq!(exp.state, vec![1.0]);
        assert_eq!(exp.action, DiscreteAction(2));
        assert_eq!(exp.next_state, vec![2.0]);
        assert!(exp.done);
    }

    #[test]
    fn finish_reports_and_resets() {
        let mut sink = MemoryStatsSink::new();
        let mut state = EpisodeState::new();
        state.advance(vec![1.0], DiscreteAction(0), 1.5);
        state.advance(vec![2.0], DiscreteAction(1), 2.0);

        let stats = state.finish(Some(0.3), &mut sink).unwrap();
        assert_eq!(stats.episode, 1);
        assert_eq!(stats.total_reward, 3.5);
        assert_eq!(stats.steps, 2);
        assert_eq!(sink.rows(), vec![stats]);

        assert_eq!(state.episode_num, 2);
        assert_eq!(state.total_reward, 0.0);
        assert!(state.last_state.is_none() && state.last_action.is_none());
    }
}
