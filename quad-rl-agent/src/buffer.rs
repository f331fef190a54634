//! Experience replay buffer for off-policy agents

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;

use quad_rl_core::{Action, Experience, RLError, Result};

/// Fixed-capacity FIFO of experiences with uniform sampling
#[derive(Debug, Clone)]
pub struct ReplayBuffer<A> {
    /// Buffer storage, oldest first
    buffer: VecDeque<Experience<A>>,
    /// Maximum capacity
    capacity: usize,
    rng: StdRng,
}

impl<A: Action> ReplayBuffer<A> {
    /// Create a new replay buffer sampling from OS entropy
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_rng(capacity, StdRng::from_entropy())
    }

    /// Create a replay buffer whose sampling is reproducible
    pub fn with_seed(capacity: usize, seed: u64) -> Result<Self> {
        Self::with_rng(capacity, StdRng::seed_from_u64(seed))
    }

    /// Create a replay buffer drawing samples from `rng`
    pub fn with_rng(capacity: usize, rng: StdRng) -> Result<Self> {
        if capacity == 0 {
            return Err(RLError::InvalidConfig(
                "replay buffer capacity must be positive".into(),
            ));
        }
        Ok(Self {
            buffer: VecDeque::with_capacity(capacity.min(1 << 16)),
            capacity,
            rng,
        })
    }

    /// Add an experience, evicting the oldest one when full
    pub fn push(&mut self, experience: Experience<A>) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(experience);
    }

    /// Build an experience from its parts and add it
    pub fn add(&mut self, state: Vec<f64>, action: A, reward: f64, next_state: Vec<f64>, done: bool) {
        self.push(Experience::new(state, action, reward, next_state, done));
    }

    /// Sample `batch_size` distinct experiences uniformly at random.
    ///
    /// Returns `None` while fewer than `batch_size` experiences are stored.
    pub fn sample(&mut self, batch_size: usize) -> Option<Vec<Experience<A>>> {
        if self.buffer.len() < batch_size {
            return None;
        }

        let indices = rand::seq::index::sample(&mut self.rng, self.buffer.len(), batch_size);
        Some(indices.into_iter().map(|i| self.buffer[i].clone()).collect())
    }

    /// Iterate over stored experiences, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Experience<A>> {
        self.buffer.iter()
    }

    /// Get the current size of the buffer
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Maximum number of experiences kept
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
