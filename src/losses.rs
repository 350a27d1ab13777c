//! Velocity-target framing and the prediction-loss seam.
//!
//! Models are supervised on frame-to-frame displacements rather than absolute
//! positions. For a target window of `L` positions `p[0..L]` the targets are
//!
//! ```text
//! v[t] = p[t + 2] - p[t + 1]      for t in 0..L-2
//! ```
//!
//! i.e. supervision starts at the transition from the 2nd to the 3rd frame.
//! The recurrent model consumes the first observed displacement (`p[1] - p[0]`)
//! before it emits its first prediction, so that displacement is never a
//! target.
//!
//! Scoring itself is delegated to a [`PredictionLoss`] implementation.

use ndarray::{s, Array2};

use crate::error::{TrainError, TrainResult};

/// Minimum number of primary rows needed to form one velocity target.
pub const MIN_PATH_ROWS: usize = 3;

/// Number of velocity targets produced by a target window of `len` rows.
pub fn velocity_target_len(len: usize) -> usize {
    len.saturating_sub(2)
}

/// First differences of a `[n, 2]` position array: `[n - 1, 2]`.
///
/// Returns an empty `[0, 2]` array for fewer than two positions.
pub fn displacements(positions: &Array2<f32>) -> Array2<f32> {
    let n = positions.nrows();
    if n < 2 {
        return Array2::zeros((0, 2));
    }
    &positions.slice(s![1.., ..]) - &positions.slice(s![..n - 1, ..])
}

/// Velocity targets of a `[L, 2]` target window: `[L - 2, 2]`.
///
/// # Errors
///
/// Returns [`TrainError::ShapeMismatch`] when the window is not `[L, 2]` with
/// `L >= 3`.
pub fn velocity_targets(target: &Array2<f32>) -> TrainResult<Array2<f32>> {
    let (rows, cols) = target.dim();
    if rows < MIN_PATH_ROWS || cols != 2 {
        return Err(TrainError::shape_mismatch(vec![MIN_PATH_ROWS, 2], vec![rows, cols]));
    }
    Ok(&target.slice(s![2.., ..]) - &target.slice(s![1..rows - 1, ..]))
}

// ---------------------------------------------------------------------------
// Loss seam
// ---------------------------------------------------------------------------

/// A scalar loss produced by a [`PredictionLoss`].
///
/// Backends return their own differentiable type; training only needs the
/// scalar for epoch reporting.
pub trait LossValue {
    /// Scalar value of the loss.
    fn value(&self) -> f64;
}

impl LossValue for f64 {
    fn value(&self) -> f64 {
        *self
    }
}

impl LossValue for f32 {
    fn value(&self) -> f64 {
        f64::from(*self)
    }
}

/// Scores a model's predicted velocities against velocity targets.
///
/// `P` is the model output type. No shape negotiation happens before
/// `score` is called; implementations decide how to treat a length mismatch.
pub trait PredictionLoss<P> {
    /// Loss handed to the optimizer.
    type Loss: LossValue;

    /// Score `predicted` against `targets` (`[T, 2]`).
    fn score(&self, predicted: &P, targets: &Array2<f32>) -> TrainResult<Self::Loss>;
}

/// Mean squared displacement error on plain arrays.
///
/// Not differentiable; used for evaluation and by array-backed models.
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocityMse;

impl PredictionLoss<Array2<f32>> for VelocityMse {
    type Loss = f64;

    fn score(&self, predicted: &Array2<f32>, targets: &Array2<f32>) -> TrainResult<f64> {
        if predicted.dim() != targets.dim() {
            return Err(TrainError::shape_mismatch(targets.shape().to_vec(), predicted.shape().to_vec()));
        }
        if targets.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = predicted
            .iter()
            .zip(targets.iter())
            .map(|(p, t)| f64::from(p - t).powi(2))
            .sum();
        Ok(sum / targets.nrows() as f64)
    }
}
