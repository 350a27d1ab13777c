//! Training loop orchestrator.
//!
//! Both model variants share one control structure:
//!
//! ```text
//! validate scenes
//! for epoch in 1..=epochs:
//!     set learning rate (step decay)
//!     shuffle scenes (seeded)
//!     for scene in scenes:
//!         zero gradients
//!         augment → extract windows [→ occupancy] → forward → velocity loss
//!         backward → update
//!         accumulate loss
//!     report mean epoch loss
//! ```
//!
//! The single-trajectory variant rotates and reads only the primary path. The
//! social variant rotates the whole scene, builds its occupancy matrix and
//! forwards both.
//!
//! Scenes are processed strictly one after another; the update from one scene
//! is applied before the next scene is forwarded.

use std::borrow::Cow;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::augmentation::{random_rotation, random_rotation_path};
use crate::config::{ShortScenePolicy, TrainingConfig};
use crate::error::{TrainError, TrainResult};
use crate::losses::{velocity_targets, LossValue, PredictionLoss};
use crate::model::{Optimizer, SocialModel, TrajectoryModel};
use crate::occupancy::build_occupancy;
use crate::predictor::{Horizon, SocialPredictor, VanillaPredictor};
use crate::rng::{shuffle, RandomSource, Xorshift64};
use crate::scene::Scene;
use crate::scheduler::StepDecay;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Summary of one epoch. Purely observational.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    /// Epoch number (1-indexed).
    pub epoch: usize,
    /// Learning rate used for every update of the epoch.
    pub learning_rate: f64,
    /// Accumulated scene loss divided by the number of scenes.
    pub mean_loss: f64,
    /// Number of scenes processed.
    pub scenes: usize,
    /// Number of scenes whose loss was NaN or infinite.
    pub non_finite: usize,
}

/// Per-epoch history of a training run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    /// One entry per completed epoch.
    pub epochs: Vec<EpochReport>,
}

impl TrainingReport {
    /// Mean loss of the last epoch.
    pub fn final_loss(&self) -> Option<f64> {
        self.epochs.last().map(|e| e.mean_loss)
    }
}

// ---------------------------------------------------------------------------
// Trainer
// ---------------------------------------------------------------------------

/// Drives single-trajectory and social training runs.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainingConfig,
    schedule: StepDecay,
}

impl Trainer {
    /// Create a trainer after validating `config`.
    pub fn new(config: TrainingConfig) -> TrainResult<Self> {
        config.validate()?;
        let schedule = config.schedule();
        Ok(Trainer { config, schedule })
    }

    /// Active configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fresh random source seeded from the configuration.
    pub fn seeded_rng(&self) -> Xorshift64 {
        Xorshift64::new(self.config.seed)
    }

    /// Apply the short-scene policy and reject an empty training set.
    ///
    /// A primary path must have exactly `observed_len + prediction_len`
    /// rows, the length whose velocity targets line up with the model output.
    /// Every scene is checked before the first update.
    ///
    /// # Errors
    ///
    /// - [`TrainError::MalformedScene`] for the first mis-sized scene under
    ///   [`ShortScenePolicy::Reject`].
    /// - [`TrainError::EmptyTrainingSet`] when no scene remains.
    pub fn prepare_scenes(&self, scenes: Vec<Scene>) -> TrainResult<Vec<Scene>> {
        let supplied = scenes.len();
        let required = self.config.observed_len + self.config.prediction_len;
        let mut kept = Vec::with_capacity(supplied);
        for (index, scene) in scenes.into_iter().enumerate() {
            let rows = scene.primary().len();
            if rows == required {
                kept.push(scene);
                continue;
            }
            match self.config.short_scene_policy {
                ShortScenePolicy::Reject => {
                    return Err(TrainError::MalformedScene { index, rows, required });
                }
                ShortScenePolicy::Skip => {
                    warn!("Skipping scene {index}: primary path has {rows} rows, expected {required}");
                }
            }
        }
        if kept.is_empty() {
            return Err(TrainError::EmptyTrainingSet);
        }
        if kept.len() < supplied {
            warn!("{} of {supplied} scenes skipped as mis-sized", supplied - kept.len());
        }
        Ok(kept)
    }

    /// Train a single-trajectory model.
    ///
    /// Only the primary path of each scene is used.
    pub fn train_single<M, L, O, R>(
        &self,
        scenes: Vec<Scene>,
        model: M,
        loss: &L,
        optimizer: &mut O,
        rng: &mut R,
    ) -> TrainResult<(VanillaPredictor<M>, TrainingReport)>
    where
        M: TrajectoryModel,
        L: PredictionLoss<M::Output>,
        O: Optimizer<L::Loss>,
        R: RandomSource + ?Sized,
    {
        let scenes = self.prepare_scenes(scenes)?;
        info!("Training single-trajectory model on {} scenes for {} epochs", scenes.len(), self.config.epochs);

        let observed_len = self.config.observed_len;
        let augment = self.config.augment;
        let report = self.run(scenes, rng, optimizer, |scene, rng| {
            let primary = scene.primary();
            let path = if augment {
                Cow::Owned(random_rotation_path(primary, rng))
            } else {
                Cow::Borrowed(primary)
            };

            let observed = path.prefix(observed_len).positions();
            let target = path.positions();

            let outputs = model.forward(&observed)?;
            let targets = velocity_targets(&target)?;
            loss.score(&outputs, &targets)
        })?;

        Ok((VanillaPredictor::new(model, Horizon::from(&self.config)), report))
    }

    /// Train an occupancy-conditioned social model.
    ///
    /// `companion` is the previously trained single-trajectory predictor. It
    /// is not used or modified during training; the returned bundle keeps a
    /// shared reference to it for inference.
    pub fn train_social<S, C, L, O, R>(
        &self,
        scenes: Vec<Scene>,
        model: S,
        companion: Option<Arc<VanillaPredictor<C>>>,
        loss: &L,
        optimizer: &mut O,
        rng: &mut R,
    ) -> TrainResult<(SocialPredictor<S, C>, TrainingReport)>
    where
        S: SocialModel,
        L: PredictionLoss<S::Output>,
        O: Optimizer<L::Loss>,
        R: RandomSource + ?Sized,
    {
        let companion = companion.ok_or(TrainError::MissingCompanion)?;
        let scenes = self.prepare_scenes(scenes)?;
        info!("Training social model on {} scenes for {} epochs", scenes.len(), self.config.epochs);

        let observed_len = self.config.observed_len;
        let augment = self.config.augment;
        let report = self.run(scenes, rng, optimizer, |scene, rng| {
            let scene = if augment {
                Cow::Owned(random_rotation(scene, rng))
            } else {
                Cow::Borrowed(scene)
            };

            let observed = scene.observed_window(observed_len);
            let target = scene.target_window();
            let occupancy = build_occupancy(&scene);

            let outputs = model.forward(&observed, &occupancy)?;
            let targets = velocity_targets(&target)?;
            loss.score(&outputs, &targets)
        })?;

        Ok((SocialPredictor::new(model, companion, Horizon::from(&self.config)), report))
    }

    fn run<R, O, L, F>(
        &self,
        mut scenes: Vec<Scene>,
        rng: &mut R,
        optimizer: &mut O,
        mut scene_loss: F,
    ) -> TrainResult<TrainingReport>
    where
        R: RandomSource + ?Sized,
        O: Optimizer<L>,
        L: LossValue,
        F: FnMut(&Scene, &mut R) -> TrainResult<L>,
    {
        let mut report = TrainingReport::default();
        for epoch in 1..=self.config.epochs {
            let (shuffled, epoch_report) = self.run_epoch(epoch, scenes, rng, optimizer, &mut scene_loss)?;
            scenes = shuffled;
            report.epochs.push(epoch_report);
        }
        Ok(report)
    }

    /// Run one epoch over `scenes` and hand them back in their new order.
    ///
    /// `scene_loss` performs augmentation, window extraction, forward pass
    /// and scoring for one scene. The learning rate is set before the first
    /// scene; the scenes are then shuffled in place with `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::EmptyTrainingSet`] for an empty scene list,
    /// propagates collaborator errors, and returns
    /// [`TrainError::NonFiniteLoss`] (before the offending update) when
    /// `halt_on_non_finite_loss` is set.
    pub fn run_epoch<R, O, L, F>(
        &self,
        epoch: usize,
        mut scenes: Vec<Scene>,
        rng: &mut R,
        optimizer: &mut O,
        mut scene_loss: F,
    ) -> TrainResult<(Vec<Scene>, EpochReport)>
    where
        R: RandomSource + ?Sized,
        O: Optimizer<L>,
        L: LossValue,
        F: FnMut(&Scene, &mut R) -> TrainResult<L>,
    {
        if scenes.is_empty() {
            return Err(TrainError::EmptyTrainingSet);
        }

        let learning_rate = self.schedule.rate(epoch);
        optimizer.set_learning_rate(learning_rate);
        shuffle(&mut scenes, rng);

        let mut epoch_loss = 0.0_f64;
        let mut non_finite = 0usize;
        for (position, scene) in scenes.iter().enumerate() {
            optimizer.zero_gradients();
            let loss = scene_loss(scene, rng)?;
            let value = loss.value();
            if !value.is_finite() {
                if self.config.halt_on_non_finite_loss {
                    return Err(TrainError::NonFiniteLoss { epoch, scene: position, loss: value });
                }
                non_finite += 1;
                warn!("Non-finite loss {value} at epoch {epoch}, scene {position}");
            }

            optimizer.compute_gradients(&loss)?;
            optimizer.apply_update()?;
            epoch_loss += value;
            debug!("epoch {epoch} scene {position}: loss {value:.6}");
        }

        let report = EpochReport {
            epoch,
            learning_rate,
            mean_loss: epoch_loss / scenes.len() as f64,
            scenes: scenes.len(),
            non_finite,
        };
        info!("epoch {epoch}: lr {learning_rate:.2e}, loss {:.6}", report.mean_loss);
        Ok((scenes, report))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
