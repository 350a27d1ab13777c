//! Predictor bundles: a trained model plus inference and persistence.
//!
//! - [`VanillaPredictor`] owns a single-trajectory model.
//! - [`SocialPredictor`] owns a social model and shares a read-only
//!   [`VanillaPredictor`] companion, which forecasts the secondary
//!   pedestrians so the occupancy matrix can be filled beyond the observed
//!   frames.
//!
//! # On-disk layout
//!
//! ```text
//! <dir>/
//!   manifest.json        # format version, kind, horizon, model specs
//!   model.weights        # primary model weights
//!   companion.weights    # social bundles only
//! ```

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;

use tracing::info;

use crate::config::TrainingConfig;
use crate::error::{TrainError, TrainResult};
use crate::model::{PersistentModel, SocialModel, TrajectoryModel, Velocities};
use crate::occupancy::build_occupancy_for_frames;
use crate::scene::{Frame, Path, Row, Scene};

const MANIFEST_FILE: &str = "manifest.json";
const MODEL_WEIGHTS: &str = "model.weights";
const COMPANION_WEIGHTS: &str = "companion.weights";

/// Bundle format written by this version of the crate.
pub const FORMAT_VERSION: u32 = 1;

/// Observation / prediction lengths a predictor works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    /// Number of leading rows fed to the model.
    pub observed_len: usize,
    /// Number of future positions emitted.
    pub prediction_len: usize,
}

impl From<&TrainingConfig> for Horizon {
    fn from(cfg: &TrainingConfig) -> Self {
        Horizon { observed_len: cfg.observed_len, prediction_len: cfg.prediction_len }
    }
}

/// Kind tag stored in a bundle manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorKind {
    /// Single-trajectory predictor.
    Vanilla,
    /// Occupancy-conditioned predictor with a companion.
    Social,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    kind: PredictorKind,
    horizon: Horizon,
    model: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    companion: Option<CompanionEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CompanionEntry {
    horizon: Horizon,
    model: serde_json::Value,
}

// ---------------------------------------------------------------------------
// VanillaPredictor
// ---------------------------------------------------------------------------

/// Trained single-trajectory model with inference and persistence.
#[derive(Debug)]
pub struct VanillaPredictor<M> {
    model: M,
    horizon: Horizon,
}

impl<M> VanillaPredictor<M> {
    /// Wrap a trained model.
    pub fn new(model: M, horizon: Horizon) -> Self {
        VanillaPredictor { model, horizon }
    }

    /// The wrapped model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Unwrap the model.
    pub fn into_model(self) -> M {
        self.model
    }

    /// Observation / prediction lengths.
    pub fn horizon(&self) -> Horizon {
        self.horizon
    }
}

impl<M: TrajectoryModel> VanillaPredictor<M> {
    /// Forecast `prediction_len` future rows of `path`.
    ///
    /// The first `observed_len` rows (at least two) are fed to the model; any
    /// later rows are ignored.
    pub fn predict(&self, path: &Path) -> TrainResult<Path> {
        let observed = observed_prefix(path, self.horizon.observed_len)?;
        let velocities = self.model.predict(&observed.positions())?.to_velocities()?;
        let frames = future_frames(&observed, self.horizon.prediction_len);
        extrapolate(&observed, &velocities, &frames)
    }
}

impl<M: PersistentModel> VanillaPredictor<M> {
    /// Write this bundle into directory `dir`.
    pub fn save(&self, dir: &FsPath) -> TrainResult<()> {
        create_bundle_dir(dir)?;
        self.model.save_weights(&dir.join(MODEL_WEIGHTS))?;
        write_manifest(
            dir,
            &Manifest {
                format_version: FORMAT_VERSION,
                kind: PredictorKind::Vanilla,
                horizon: self.horizon,
                model: serde_json::to_value(self.model.spec())?,
                companion: None,
            },
        )?;
        info!("Saved single-trajectory predictor to {}", dir.display());
        Ok(())
    }

    /// Load a bundle written by [`VanillaPredictor::save`].
    pub fn load(dir: &FsPath) -> TrainResult<Self> {
        let manifest = read_manifest(dir, PredictorKind::Vanilla)?;
        let spec = serde_json::from_value(manifest.model)?;
        let model = M::load_weights(spec, &dir.join(MODEL_WEIGHTS))?;
        Ok(VanillaPredictor::new(model, manifest.horizon))
    }
}

// ---------------------------------------------------------------------------
// SocialPredictor
// ---------------------------------------------------------------------------

/// Trained social model plus its single-trajectory companion.
#[derive(Debug)]
pub struct SocialPredictor<S, C> {
    model: S,
    companion: Arc<VanillaPredictor<C>>,
    horizon: Horizon,
}

impl<S, C> SocialPredictor<S, C> {
    /// Wrap a trained social model and its companion.
    pub fn new(model: S, companion: Arc<VanillaPredictor<C>>, horizon: Horizon) -> Self {
        SocialPredictor { model, companion, horizon }
    }

    /// The wrapped social model.
    pub fn model(&self) -> &S {
        &self.model
    }

    /// The single-trajectory companion.
    pub fn companion(&self) -> &Arc<VanillaPredictor<C>> {
        &self.companion
    }

    /// Observation / prediction lengths.
    pub fn horizon(&self) -> Horizon {
        self.horizon
    }
}

impl<S: SocialModel, C: TrajectoryModel> SocialPredictor<S, C> {
    /// Forecast `prediction_len` future rows of the scene's primary path.
    ///
    /// Secondary pedestrians visible at the last observed frame with at least
    /// two observed rows are forecast by the companion from their most recent
    /// rows; everyone else is absent from the future frames.
    pub fn predict(&self, scene: &Scene) -> TrainResult<Path> {
        let observed = observed_prefix(scene.primary(), self.horizon.observed_len)?;
        let last_frame = observed.last().frame;
        let future = future_frames(&observed, self.horizon.prediction_len);

        let mut context = Vec::with_capacity(scene.secondary().len());
        for path in scene.secondary() {
            let Some(seen) = path.until_frame(last_frame) else { continue };
            if seen.last().frame == last_frame && seen.len() >= 2 {
                let recent = seen.suffix(self.companion.horizon().observed_len);
                let forecast = self.companion.predict(&recent)?;
                let mut rows = seen.rows().to_vec();
                rows.extend(
                    forecast
                        .rows()
                        .iter()
                        .zip(&future)
                        .map(|(r, &frame)| Row::new(frame, r.pedestrian, r.x, r.y)),
                );
                context.push(Path::new(rows)?);
            } else {
                context.push(seen);
            }
        }

        let frames: Vec<Frame> = observed.frames().chain(future.iter().copied()).collect();
        let occupancy = build_occupancy_for_frames(&frames, &context);
        let velocities = self.model.predict(&observed.positions(), &occupancy)?.to_velocities()?;
        extrapolate(&observed, &velocities, &future)
    }
}

impl<S: PersistentModel, C: PersistentModel> SocialPredictor<S, C> {
    /// Write this bundle, companion included, into directory `dir`.
    pub fn save(&self, dir: &FsPath) -> TrainResult<()> {
        create_bundle_dir(dir)?;
        self.model.save_weights(&dir.join(MODEL_WEIGHTS))?;
        self.companion.model().save_weights(&dir.join(COMPANION_WEIGHTS))?;
        write_manifest(
            dir,
            &Manifest {
                format_version: FORMAT_VERSION,
                kind: PredictorKind::Social,
                horizon: self.horizon,
                model: serde_json::to_value(self.model.spec())?,
                companion: Some(CompanionEntry {
                    horizon: self.companion.horizon(),
                    model: serde_json::to_value(self.companion.model().spec())?,
                }),
            },
        )?;
        info!("Saved social predictor to {}", dir.display());
        Ok(())
    }

    /// Load a bundle written by [`SocialPredictor::save`].
    pub fn load(dir: &FsPath) -> TrainResult<Self> {
        let manifest = read_manifest(dir, PredictorKind::Social)?;
        let entry = manifest
            .companion
            .ok_or_else(|| TrainError::persistence("social bundle has no companion entry", dir))?;

        let companion_spec = serde_json::from_value(entry.model)?;
        let companion = C::load_weights(companion_spec, &dir.join(COMPANION_WEIGHTS))?;
        let spec = serde_json::from_value(manifest.model)?;
        let model = S::load_weights(spec, &dir.join(MODEL_WEIGHTS))?;

        Ok(SocialPredictor::new(
            model,
            Arc::new(VanillaPredictor::new(companion, entry.horizon)),
            manifest.horizon,
        ))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn observed_prefix(path: &Path, observed_len: usize) -> TrainResult<Path> {
    let observed = path.prefix(observed_len);
    if observed.len() < 2 {
        return Err(TrainError::shape_mismatch(vec![observed_len, 2], vec![observed.len(), 2]));
    }
    Ok(observed)
}

/// Frames after the observation, spaced by the last observed frame step.
fn future_frames(observed: &Path, count: usize) -> Vec<Frame> {
    let rows = observed.rows();
    let last = rows[rows.len() - 1].frame;
    let step = last - rows[rows.len() - 2].frame;
    (1..=count as Frame).map(|k| last + k * step).collect()
}

/// Integrate predicted velocities from the last observed position.
///
/// With `n` observed rows, output index `n - 2` is the first displacement
/// past the observation.
fn extrapolate(observed: &Path, velocities: &Array2<f32>, frames: &[Frame]) -> TrainResult<Path> {
    let offset = observed.len() - 2;
    let needed = offset + frames.len();
    if velocities.nrows() < needed || velocities.ncols() != 2 {
        return Err(TrainError::shape_mismatch(vec![needed, 2], velocities.shape().to_vec()));
    }

    let last = observed.last();
    let (mut x, mut y) = (last.x, last.y);
    let rows = frames
        .iter()
        .enumerate()
        .map(|(k, &frame)| {
            x += velocities[[offset + k, 0]];
            y += velocities[[offset + k, 1]];
            Row::new(frame, last.pedestrian, x, y)
        })
        .collect();
    Ok(Path::new(rows)?)
}

fn create_bundle_dir(dir: &FsPath) -> TrainResult<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| TrainError::persistence(format!("cannot create bundle directory: {e}"), dir))
}

fn write_manifest(dir: &FsPath, manifest: &Manifest) -> TrainResult<()> {
    let path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(&path, json).map_err(|e| TrainError::persistence(format!("cannot write manifest: {e}"), &path))
}

fn read_manifest(dir: &FsPath, expected: PredictorKind) -> TrainResult<Manifest> {
    let path = dir.join(MANIFEST_FILE);
    let text = std::fs::read_to_string(&path)
        .map_err(|e| TrainError::persistence(format!("cannot read manifest: {e}"), &path))?;
    let manifest: Manifest = serde_json::from_str(&text)?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(TrainError::persistence(
            format!("unsupported bundle format {} (expected {FORMAT_VERSION})", manifest.format_version),
            &path,
        ));
    }
    if manifest.kind != expected {
        return Err(TrainError::persistence(
            format!("bundle holds a {:?} predictor, expected {expected:?}", manifest.kind),
            &path,
        ));
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::PedestrianId;

    fn path(ped: i64, frames: &[Frame]) -> Path {
        Path::new(frames.iter().map(|&f| Row::new(f, PedestrianId(ped), f as f32, 0.0)).collect()).unwrap()
    }

    #[test]
    fn future_frames_follow_last_step() {
        let observed = path(1, &[0, 10, 20, 30]);
        assert_eq!(future_frames(&observed, 3), vec![40, 50, 60]);
    }

    #[test]
    fn extrapolate_starts_after_observation() {
        let observed = path(1, &[0, 1, 2]);
        // Row 0 predicts displacement 1→2 (observed), row 1 is the first future step.
        let v = Array2::from_shape_vec((3, 2), vec![9.0, 9.0, 1.0, 0.5, 1.0, 0.5]).unwrap();
        let out = extrapolate(&observed, &v, &[3, 4]).unwrap();
        let xy: Vec<_> = out.rows().iter().map(|r| (r.frame, r.x, r.y)).collect();
        assert_eq!(xy, vec![(3, 3.0, 0.5), (4, 4.0, 1.0)]);
    }

    #[test]
    fn extrapolate_rejects_short_output() {
        let observed = path(1, &[0, 1, 2]);
        let v = Array2::zeros((1, 2));
        assert!(matches!(extrapolate(&observed, &v, &[3, 4]), Err(TrainError::ShapeMismatch { .. })));
    }

    #[test]
    fn single_row_cannot_be_observed() {
        assert!(observed_prefix(&path(1, &[0]), 9).is_err());
    }
}
