//! Interfaces of the collaborators the training loop drives.
//!
//! Network architectures and optimizer internals are not part of this
//! crate's core; the trainer sees them only through these traits:
//!
//! - [`TrajectoryModel`]: `observed window → predicted velocities`
//! - [`SocialModel`]: `(observed window, occupancy) → predicted velocities`
//! - [`Optimizer`]: zero / compute gradients, apply update, set learning rate
//! - [`PersistentModel`]: weight (de)serialization for predictor bundles
//!
//! The `tch` backend (feature `tch-backend`) provides concrete
//! implementations.

use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use crate::error::TrainResult;
use crate::occupancy::OccupancyMatrix;

/// Model output that can be read back as `[T, 2]` velocities.
pub trait Velocities {
    /// Predicted `(dx, dy)` per timestep.
    fn to_velocities(&self) -> TrainResult<Array2<f32>>;
}

impl Velocities for Array2<f32> {
    fn to_velocities(&self) -> TrainResult<Array2<f32>> {
        Ok(self.clone())
    }
}

/// Single-trajectory model.
pub trait TrajectoryModel {
    /// Differentiable output handed to the loss.
    type Output: Velocities;

    /// Forward `observed` (`[n, 2]` positions) in training mode.
    fn forward(&self, observed: &Array2<f32>) -> TrainResult<Self::Output>;

    /// Forward for inference; backends may disable gradient tracking.
    fn predict(&self, observed: &Array2<f32>) -> TrainResult<Self::Output> {
        self.forward(observed)
    }
}

/// Occupancy-conditioned model.
pub trait SocialModel {
    /// Differentiable output handed to the loss.
    type Output: Velocities;

    /// Forward `observed` positions with the scene's occupancy matrix.
    fn forward(&self, observed: &Array2<f32>, occupancy: &OccupancyMatrix) -> TrainResult<Self::Output>;

    /// Forward for inference; backends may disable gradient tracking.
    fn predict(&self, observed: &Array2<f32>, occupancy: &OccupancyMatrix) -> TrainResult<Self::Output> {
        self.forward(observed, occupancy)
    }
}

/// Gradient-based parameter updater over a loss of type `L`.
pub trait Optimizer<L> {
    /// Clear accumulated gradients.
    fn zero_gradients(&mut self);

    /// Back-propagate `loss`.
    fn compute_gradients(&mut self, loss: &L) -> TrainResult<()>;

    /// Apply one update step with the current gradients.
    fn apply_update(&mut self) -> TrainResult<()>;

    /// Set the learning rate for subsequent updates.
    fn set_learning_rate(&mut self, lr: f64);
}

/// A model whose weights can be written to and restored from disk.
pub trait PersistentModel: Sized {
    /// Architecture description needed to rebuild the model before loading.
    type Spec: Serialize + DeserializeOwned;

    /// Architecture description of this model.
    fn spec(&self) -> Self::Spec;

    /// Write the weights to `path`.
    fn save_weights(&self, path: &Path) -> TrainResult<()>;

    /// Rebuild from `spec` and load weights from `path`.
    fn load_weights(spec: Self::Spec, path: &Path) -> TrainResult<Self>;
}
