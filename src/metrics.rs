//! Displacement metrics for evaluating predictors.
//!
//! Predicted and ground-truth rows are matched by frame. Predicted frames the
//! ground truth does not contain are ignored.
//!
//! - **ADE** (average displacement error): mean Euclidean distance over all
//!   matched frames.
//! - **FDE** (final displacement error): distance at the last predicted frame.

use crate::scene::Path;

fn distance(ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
}

/// Mean distance over frames present in both paths; `None` without overlap.
pub fn average_displacement_error(predicted: &Path, truth: &Path) -> Option<f32> {
    let errors: Vec<f32> = predicted
        .rows()
        .iter()
        .filter_map(|p| truth.at_frame(p.frame).map(|t| distance(p.x, p.y, t.x, t.y)))
        .collect();
    if errors.is_empty() {
        return None;
    }
    Some(errors.iter().sum::<f32>() / errors.len() as f32)
}

/// Distance at the last predicted frame; `None` if the truth lacks it.
pub fn final_displacement_error(predicted: &Path, truth: &Path) -> Option<f32> {
    let p = predicted.last();
    truth.at_frame(p.frame).map(|t| distance(p.x, p.y, t.x, t.y))
}

/// Running ADE / FDE means over many predictions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplacementStats {
    ade_sum: f64,
    fde_sum: f64,
    count: usize,
}

impl DisplacementStats {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one prediction. Returns `false` (and records nothing) when the
    /// prediction's final frame is not in the ground truth.
    pub fn push(&mut self, predicted: &Path, truth: &Path) -> bool {
        match (average_displacement_error(predicted, truth), final_displacement_error(predicted, truth)) {
            (Some(ade), Some(fde)) => {
                self.ade_sum += f64::from(ade);
                self.fde_sum += f64::from(fde);
                self.count += 1;
                true
            }
            _ => false,
        }
    }

    /// Number of recorded predictions.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean ADE, or `None` before the first recorded prediction.
    pub fn mean_ade(&self) -> Option<f64> {
        (self.count > 0).then(|| self.ade_sum / self.count as f64)
    }

    /// Mean FDE, or `None` before the first recorded prediction.
    pub fn mean_fde(&self) -> Option<f64> {
        (self.count > 0).then(|| self.fde_sum / self.count as f64)
    }
}
