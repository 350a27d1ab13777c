//! Step-decay learning-rate policy.
//!
//! ```text
//! lr(epoch) = base · 0.1^⌊epoch / step⌋        (epoch is 1-indexed)
//! ```
//!
//! The rate is set once at the start of every epoch, before the first scene
//! of that epoch is processed.

/// Multiplicative decay applied every `step` epochs.
pub const DECAY_FACTOR: f64 = 0.1;

/// Effective learning rate for `epoch` (1-indexed).
///
/// A `step` of zero is treated as one.
pub fn step_decay(base: f64, epoch: usize, step: usize) -> f64 {
    let decays = (epoch / step.max(1)) as i32;
    base * DECAY_FACTOR.powi(decays)
}

/// Step-decay schedule bound to a base rate and step size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepDecay {
    base: f64,
    step: usize,
}

impl StepDecay {
    /// Create a schedule; a `step` of zero is treated as one.
    pub fn new(base: f64, step: usize) -> Self {
        StepDecay { base, step: step.max(1) }
    }

    /// Base learning rate.
    pub fn base(&self) -> f64 {
        self.base
    }

    /// Epoch interval between decays.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Learning rate for `epoch` (1-indexed).
    pub fn rate(&self, epoch: usize) -> f64 {
        step_decay(self.base, epoch, self.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn base_rate_before_first_step() {
        let s = StepDecay::new(1e-3, 30);
        for epoch in 1..30 {
            assert_eq!(s.rate(epoch), 1e-3);
        }
    }

    #[test]
    fn decays_by_ten_at_each_step() {
        let s = StepDecay::new(1e-3, 30);
        assert_relative_eq!(s.rate(30), 1e-4, max_relative = 1e-12);
        assert_relative_eq!(s.rate(59), 1e-4, max_relative = 1e-12);
        assert_relative_eq!(s.rate(60), 1e-5, max_relative = 1e-12);
        assert_relative_eq!(s.rate(90), 1e-6, max_relative = 1e-12);
    }

    #[test]
    fn zero_step_is_clamped() {
        assert_eq!(StepDecay::new(1.0, 0).step(), 1);
    }
}
