//! PyTorch-backed models, loss and optimizers (feature `tch-backend`).
//!
//! # Architecture
//!
//! ```text
//! velocity (dx, dy) ──► Linear+ReLU ──┐
//!                                     ├─► LSTM cell ──► Linear ──► (μx, μy, σx, σy, ρ)
//! occupancy grid ─────► Linear+ReLU ──┘   (social model only)
//! ```
//!
//! Both models consume the observed displacements step by step and then
//! feed back their own predicted means for `prediction_len - 1` more steps.
//! With `n` observed positions the output has `n + prediction_len - 2` rows,
//! which matches the velocity targets of an `n + prediction_len` row path.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tch::nn::{self, Module, OptimizerConfig, RNN};
use tch::{Device, Kind, Tensor};

use crate::error::{TrainError, TrainResult};
use crate::losses::{LossValue, PredictionLoss};
use crate::model::{Optimizer, PersistentModel, SocialModel, TrajectoryModel, Velocities};
use crate::occupancy::{OccupancyGrid, OccupancyMatrix, Position};

impl From<tch::TchError> for TrainError {
    fn from(e: tch::TchError) -> Self {
        TrainError::Model(e.to_string())
    }
}

/// Number of Gaussian parameters emitted per timestep.
pub const GAUSSIAN_PARAMS: i64 = 5;

fn array_to_tensor(arr: &Array2<f32>, device: Device) -> Tensor {
    let (rows, cols) = arr.dim();
    let data: Vec<f32> = arr.iter().copied().collect();
    Tensor::from_slice(&data).view([rows as i64, cols as i64]).to_device(device)
}

fn vector_to_tensor(v: &Array1<f32>, device: Device) -> Tensor {
    let data: Vec<f32> = v.iter().copied().collect();
    Tensor::from_slice(&data).view([1, v.len() as i64]).to_device(device)
}

/// Map raw head outputs to valid Gaussian parameters:
/// `σ = 0.01 + 0.2·sigmoid(s)`, `ρ = 0.7·sigmoid(r)`.
fn hidden_to_normal(raw: &Tensor) -> Tensor {
    let mu = raw.narrow(1, 0, 2);
    let sigma = raw.narrow(1, 2, 2).sigmoid() * 0.2 + 0.01;
    let rho = raw.narrow(1, 4, 1).sigmoid() * 0.7;
    Tensor::cat(&[mu, sigma, rho], 1)
}

fn check_observed(observed: &Array2<f32>) -> TrainResult<()> {
    if observed.nrows() < 2 || observed.ncols() != 2 {
        return Err(TrainError::shape_mismatch(vec![2, 2], observed.shape().to_vec()));
    }
    Ok(())
}

impl Velocities for Tensor {
    fn to_velocities(&self) -> TrainResult<Array2<f32>> {
        let rows = self.size()[0] as usize;
        let means = self.narrow(1, 0, 2).to_kind(Kind::Float).contiguous().view([-1]);
        let data = Vec::<f32>::try_from(&means)?;
        Array2::from_shape_vec((rows, 2), data).map_err(|e| TrainError::model(e.to_string()))
    }
}

impl LossValue for Tensor {
    fn value(&self) -> f64 {
        self.double_value(&[])
    }
}

// ---------------------------------------------------------------------------
// VanillaLstm
// ---------------------------------------------------------------------------

/// Architecture of [`VanillaLstm`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LstmSpec {
    /// Width of the velocity embedding. Default: **64**.
    pub embedding_dim: i64,
    /// LSTM hidden size. Default: **128**.
    pub hidden_dim: i64,
    /// Future steps to roll out. Default: **12**.
    pub prediction_len: i64,
}

impl Default for LstmSpec {
    fn default() -> Self {
        LstmSpec { embedding_dim: 64, hidden_dim: 128, prediction_len: 12 }
    }
}

/// Single-trajectory LSTM with a bivariate Gaussian output head.
pub struct VanillaLstm {
    vs: nn::VarStore,
    spec: LstmSpec,
    embed: nn::Linear,
    lstm: nn::LSTM,
    head: nn::Linear,
}

impl VanillaLstm {
    /// Build a freshly initialised model on `device`.
    pub fn new(spec: LstmSpec, device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let root = vs.root();
        let embed = nn::linear(&root / "embed", 2, spec.embedding_dim, Default::default());
        let lstm = nn::lstm(&root / "lstm", spec.embedding_dim, spec.hidden_dim, Default::default());
        let head = nn::linear(&root / "head", spec.hidden_dim, GAUSSIAN_PARAMS, Default::default());
        VanillaLstm { vs, spec, embed, lstm, head }
    }

    /// Parameter store (used to build an optimizer).
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    fn step(&self, velocity: &Tensor, state: &nn::LSTMState) -> (Tensor, nn::LSTMState) {
        let input = self.embed.forward(velocity).relu();
        let state = self.lstm.step(&input, state);
        let out = hidden_to_normal(&self.head.forward(&state.h().view([1, self.spec.hidden_dim])));
        (out, state)
    }

    fn rollout(&self, observed: &Array2<f32>) -> TrainResult<Tensor> {
        check_observed(observed)?;
        let obs = array_to_tensor(observed, self.vs.device());
        let n = obs.size()[0];
        let velocities = obs.narrow(0, 1, n - 1) - obs.narrow(0, 0, n - 1);

        let mut state = self.lstm.zero_state(1);
        let mut outputs = Vec::with_capacity((n - 1 + self.spec.prediction_len) as usize);
        for t in 0..n - 1 {
            let (out, next) = self.step(&velocities.narrow(0, t, 1), &state);
            outputs.push(out);
            state = next;
        }
        for _ in 1..self.spec.prediction_len {
            let previous = outputs[outputs.len() - 1].narrow(1, 0, 2);
            let (out, next) = self.step(&previous, &state);
            outputs.push(out);
            state = next;
        }
        Ok(Tensor::cat(&outputs, 0))
    }
}

impl TrajectoryModel for VanillaLstm {
    type Output = Tensor;

    fn forward(&self, observed: &Array2<f32>) -> TrainResult<Tensor> {
        self.rollout(observed)
    }

    fn predict(&self, observed: &Array2<f32>) -> TrainResult<Tensor> {
        tch::no_grad(|| self.rollout(observed))
    }
}

impl PersistentModel for VanillaLstm {
    type Spec = LstmSpec;

    fn spec(&self) -> LstmSpec {
        self.spec
    }

    fn save_weights(&self, path: &Path) -> TrainResult<()> {
        self.vs.save(path)?;
        Ok(())
    }

    fn load_weights(spec: LstmSpec, path: &Path) -> TrainResult<Self> {
        let mut model = VanillaLstm::new(spec, Device::cuda_if_available());
        model.vs.load(path)?;
        Ok(model)
    }
}

// ---------------------------------------------------------------------------
// OccupancyLstm
// ---------------------------------------------------------------------------

/// Architecture of [`OccupancyLstm`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OccupancySpec {
    /// Velocity / grid embedding width. Default: **64**.
    pub embedding_dim: i64,
    /// LSTM hidden size. Default: **128**.
    pub hidden_dim: i64,
    /// Future steps to roll out. Default: **12**.
    pub prediction_len: i64,
    /// Grid cells per side. Default: **6**.
    pub grid_n: usize,
    /// Grid cell side length. Default: **0.5**.
    pub cell_side: f32,
    /// Pool relative velocities instead of counts. Default: **false**.
    pub directional: bool,
}

impl Default for OccupancySpec {
    fn default() -> Self {
        let grid = OccupancyGrid::default();
        OccupancySpec {
            embedding_dim: 64,
            hidden_dim: 128,
            prediction_len: 12,
            grid_n: grid.n,
            cell_side: grid.cell_side,
            directional: false,
        }
    }
}

/// LSTM conditioned on an occupancy grid around the primary pedestrian.
pub struct OccupancyLstm {
    vs: nn::VarStore,
    spec: OccupancySpec,
    grid: OccupancyGrid,
    embed: nn::Linear,
    grid_embed: nn::Linear,
    lstm: nn::LSTM,
    head: nn::Linear,
}

impl OccupancyLstm {
    /// Build a freshly initialised model on `device`.
    pub fn new(spec: OccupancySpec, device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let root = vs.root();
        let grid = OccupancyGrid::new(spec.grid_n, spec.cell_side);
        let grid_len = (if spec.directional { grid.directional_len() } else { grid.len() }) as i64;

        let embed = nn::linear(&root / "embed", 2, spec.embedding_dim, Default::default());
        let grid_embed = nn::linear(&root / "grid_embed", grid_len, spec.embedding_dim, Default::default());
        let lstm = nn::lstm(&root / "lstm", 2 * spec.embedding_dim, spec.hidden_dim, Default::default());
        let head = nn::linear(&root / "head", spec.hidden_dim, GAUSSIAN_PARAMS, Default::default());
        OccupancyLstm { vs, spec, grid, embed, grid_embed, lstm, head }
    }

    /// Parameter store (used to build an optimizer).
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// Pooled grid for the primary at matrix row `index`.
    fn pooled(&self, occupancy: &OccupancyMatrix, index: usize, centre: Position, velocity: Position) -> Array1<f32> {
        let current = occupancy.row(index).unwrap_or(&[]);
        if self.spec.directional {
            let previous = index.checked_sub(1).and_then(|i| occupancy.row(i)).unwrap_or(&[]);
            self.grid.directional(centre, velocity, current, previous)
        } else {
            self.grid.counts(centre, current)
        }
    }

    fn step(&self, velocity: &Tensor, grid: &Array1<f32>, state: &nn::LSTMState) -> (Tensor, nn::LSTMState) {
        let v = self.embed.forward(velocity).relu();
        let g = self.grid_embed.forward(&vector_to_tensor(grid, self.vs.device())).relu();
        let state = self.lstm.step(&Tensor::cat(&[v, g], 1), state);
        let out = hidden_to_normal(&self.head.forward(&state.h().view([1, self.spec.hidden_dim])));
        (out, state)
    }

    fn rollout(&self, observed: &Array2<f32>, occupancy: &OccupancyMatrix) -> TrainResult<Tensor> {
        check_observed(observed)?;
        let n = observed.nrows();
        let obs = array_to_tensor(observed, self.vs.device());
        let velocities = obs.narrow(0, 1, n as i64 - 1) - obs.narrow(0, 0, n as i64 - 1);

        let mut state = self.lstm.zero_state(1);
        let mut outputs = Vec::with_capacity(n - 1 + self.spec.prediction_len as usize);
        for t in 0..n - 1 {
            let centre = [observed[[t + 1, 0]], observed[[t + 1, 1]]];
            let velocity = [centre[0] - observed[[t, 0]], centre[1] - observed[[t, 1]]];
            let grid = self.pooled(occupancy, t + 1, centre, velocity);
            let (out, next) = self.step(&velocities.narrow(0, t as i64, 1), &grid, &state);
            outputs.push(out);
            state = next;
        }

        let mut centre = [observed[[n - 1, 0]], observed[[n - 1, 1]]];
        for k in 1..self.spec.prediction_len as usize {
            let previous = outputs[outputs.len() - 1].narrow(1, 0, 2);
            let velocity = [previous.double_value(&[0, 0]) as f32, previous.double_value(&[0, 1]) as f32];
            centre = [centre[0] + velocity[0], centre[1] + velocity[1]];
            let grid = self.pooled(occupancy, n - 1 + k, centre, velocity);
            let (out, next) = self.step(&previous, &grid, &state);
            outputs.push(out);
            state = next;
        }
        Ok(Tensor::cat(&outputs, 0))
    }
}

impl SocialModel for OccupancyLstm {
    type Output = Tensor;

    fn forward(&self, observed: &Array2<f32>, occupancy: &OccupancyMatrix) -> TrainResult<Tensor> {
        self.rollout(observed, occupancy)
    }

    fn predict(&self, observed: &Array2<f32>, occupancy: &OccupancyMatrix) -> TrainResult<Tensor> {
        tch::no_grad(|| self.rollout(observed, occupancy))
    }
}

impl PersistentModel for OccupancyLstm {
    type Spec = OccupancySpec;

    fn spec(&self) -> OccupancySpec {
        self.spec
    }

    fn save_weights(&self, path: &Path) -> TrainResult<()> {
        self.vs.save(path)?;
        Ok(())
    }

    fn load_weights(spec: OccupancySpec, path: &Path) -> TrainResult<Self> {
        let mut model = OccupancyLstm::new(spec, Device::cuda_if_available());
        model.vs.load(path)?;
        Ok(model)
    }
}

// ---------------------------------------------------------------------------
// GaussianNllLoss
// ---------------------------------------------------------------------------

/// Mean bivariate Gaussian negative log-likelihood of the velocity targets.
///
/// Predictions are `[T, 5]` rows of `(μx, μy, σx, σy, ρ)`; targets `[T, 2]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianNllLoss;

impl PredictionLoss<Tensor> for GaussianNllLoss {
    type Loss = Tensor;

    fn score(&self, predicted: &Tensor, targets: &Array2<f32>) -> TrainResult<Tensor> {
        let size = predicted.size();
        if size.len() != 2 || size[0] != targets.nrows() as i64 || size[1] != GAUSSIAN_PARAMS {
            return Err(TrainError::shape_mismatch(
                vec![targets.nrows(), GAUSSIAN_PARAMS as usize],
                size.iter().map(|&d| d as usize).collect(),
            ));
        }
        let t = array_to_tensor(targets, predicted.device());

        let (mu_x, mu_y) = (predicted.select(1, 0), predicted.select(1, 1));
        let (s_x, s_y) = (predicted.select(1, 2), predicted.select(1, 3));
        let rho = predicted.select(1, 4);

        let dx = t.select(1, 0) - mu_x;
        let dy = t.select(1, 1) - mu_y;
        let s_xy = &s_x * &s_y;
        let z = (&dx / &s_x).square() + (&dy / &s_y).square() - &rho * &dx * &dy * 2.0 / &s_xy;
        let one_minus_rho2 = rho.square() * -1.0 + 1.0;

        let nll = s_xy.log() + one_minus_rho2.log() * 0.5 + z / (&one_minus_rho2 * 2.0)
            + (2.0 * std::f64::consts::PI).ln();
        Ok(nll.mean(Kind::Float))
    }
}

// ---------------------------------------------------------------------------
// TchOptimizer
// ---------------------------------------------------------------------------

/// [`Optimizer`] adapter over `tch::nn::Optimizer`.
pub struct TchOptimizer {
    inner: nn::Optimizer,
}

impl TchOptimizer {
    /// SGD with momentum 0.9 and weight decay 1e-4 (single-trajectory model).
    pub fn sgd(vs: &nn::VarStore, lr: f64) -> TrainResult<Self> {
        let inner = nn::Sgd { momentum: 0.9, dampening: 0.0, wd: 1e-4, nesterov: false }.build(vs, lr)?;
        Ok(TchOptimizer { inner })
    }

    /// Adam with default betas (social model).
    pub fn adam(vs: &nn::VarStore, lr: f64) -> TrainResult<Self> {
        let inner = nn::Adam::default().build(vs, lr)?;
        Ok(TchOptimizer { inner })
    }
}

impl Optimizer<Tensor> for TchOptimizer {
    fn zero_gradients(&mut self) {
        self.inner.zero_grad();
    }

    fn compute_gradients(&mut self, loss: &Tensor) -> TrainResult<()> {
        loss.backward();
        Ok(())
    }

    fn apply_update(&mut self) -> TrainResult<()> {
        self.inner.step();
        Ok(())
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.inner.set_lr(lr);
    }
}
