//! Utility functions and helpers for RL agents

use rand::rngs::StdRng;
use rand::SeedableRng;

use quad_rl_core::{RLError, Result};

/// Generator for one random stream of an agent.
///
/// With a seed, each `stream` gets its own reproducible generator; without
/// one, every generator draws from OS entropy.
#[must_use]
pub fn seeded_rng(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
        None => StdRng::from_entropy(),
    }
}

/// Multiplicative exploration decay with a floor.
///
/// Each call to [`EpsilonDecay::step`] multiplies the value by `decay` while
/// it is above `min`, never going below `min`.
#[derive(Debug, Clone, PartialEq)]
pub struct EpsilonDecay {
    value: f64,
    min_value: f64,
    decay_rate: f64,
}

impl EpsilonDecay {
    /// Create a new decay schedule
    pub fn new(start: f64, min_value: f64, decay_rate: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&decay_rate) {
            return Err(RLError::InvalidConfig(format!(
                "epsilon decay must lie in [0, 1], got {decay_rate}"
            )));
        }
        if min_value < 0.0 || start < min_value {
            return Err(RLError::InvalidConfig(format!(
                "epsilon must start at or above its floor ({start} < {min_value})"
            )));
        }
        Ok(Self {
            value: start,
            min_value,
            decay_rate,
        })
    }

    /// Current value
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Floor
    #[must_use]
    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    /// Apply one decay and return the new value
    pub fn step(&mut self) -> f64 {
        if self.value > self.min_value {
            self.value = (self.value * self.decay_rate).max(self.min_value);
        }
        self.value
    }
}

/// Most discrete levels a single action dimension may be split into
pub const MAX_ACTION_LEVELS: usize = 1024;

/// Discretise one action dimension: `high, high - step, ...` while the value
/// stays above `floor`, returned in ascending order.
///
/// At most [`MAX_ACTION_LEVELS`] levels are allowed.
pub fn discretize_actions(high: f64, floor: f64, step: f64) -> Result<Vec<f64>> {
    if !(step > 0.0) || !step.is_finite() {
        return Err(RLError::InvalidConfig(format!(
            "action step must be positive and finite, got {step}"
        )));
    }
    if !high.is_finite() || !floor.is_finite() {
        return Err(RLError::InvalidConfig(format!(
            "action bounds must be finite, got floor {floor} and high {high}"
        )));
    }
    if high <= floor {
        return Err(RLError::InvalidConfig(format!(
            "no action between floor {floor} and high {high}"
        )));
    }
    let span = (high - floor) / step;
    if !(span <= MAX_ACTION_LEVELS as f64) {
        return Err(RLError::InvalidConfig(format!(
            "step {step} splits [{floor}, {high}] into more than {MAX_ACTION_LEVELS} levels"
        )));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = span.ceil() as usize;
    #[allow(clippy::cast_precision_loss)]
    let mut values: Vec<f64> = (0..count)
        .map(|k| high - k as f64 * step)
        .filter(|&value| value > floor)
        .collect();
    if values.is_empty() {
        return Err(RLError::InvalidConfig(format!(
            "no action between floor {floor} and high {high}"
        )));
    }
    values.reverse();
    Ok(values)
}

/// Index of the largest value; the first one wins ties.
///
/// NaN never wins unless every value is NaN.
pub fn argmax<'a, I>(values: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a f32>,
{
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.into_iter().enumerate() {
        match best {
            Some((_, b)) if v.is_nan() || (!b.is_nan() && v <= b) => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
