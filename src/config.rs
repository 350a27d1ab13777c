//! Training configuration.
//!
//! [`TrainingConfig`] holds every policy value of a training run: epoch
//! count, learning-rate schedule, window lengths, seed and the handling of
//! malformed scenes. It is serializable via [`serde`] so runs can be
//! described in, and reproduced from, JSON files.
//!
//! # Example
//!
//! ```rust
//! use trajnet_train::config::TrainingConfig;
//!
//! let cfg = TrainingConfig::social();
//! cfg.validate().expect("preset is valid");
//!
//! assert_eq!(cfg.observed_len, 9);
//! assert!(cfg.lr_step_epochs > TrainingConfig::single_trajectory().lr_step_epochs);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::scheduler::StepDecay;

/// What to do with a scene whose primary path has the wrong length for training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortScenePolicy {
    /// Fail the whole run before any update.
    Reject,
    /// Drop the scene up front and log a warning.
    Skip,
}

/// Complete configuration for one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of epochs to run. Default: **90**.
    pub epochs: usize,

    /// Base learning rate before decay. Default: **1e-3**.
    pub learning_rate: f64,

    /// Decay the learning rate by 10× every this many epochs.
    ///
    /// Default: **20** for the single-trajectory preset, **30** for the
    /// social preset.
    pub lr_step_epochs: usize,

    /// Number of leading primary rows fed to the model. Default: **9**.
    pub observed_len: usize,

    /// Number of future positions a predictor emits. Default: **12**.
    pub prediction_len: usize,

    /// Seed for scene shuffling and rotation augmentation. Default: **42**.
    pub seed: u64,

    /// Apply random rotation augmentation each epoch. Default: **true**.
    pub augment: bool,

    /// Handling of primary paths whose length is not
    /// `observed_len + prediction_len`.
    /// Default: [`ShortScenePolicy::Reject`].
    pub short_scene_policy: ShortScenePolicy,

    /// Abort on a NaN / infinite scene loss. Default: **false**.
    pub halt_on_non_finite_loss: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig::single_trajectory()
    }
}

impl TrainingConfig {
    /// Preset for the single-trajectory model.
    pub fn single_trajectory() -> Self {
        TrainingConfig {
            epochs: 90,
            learning_rate: 1e-3,
            lr_step_epochs: 20,
            observed_len: 9,
            prediction_len: 12,
            seed: 42,
            augment: true,
            short_scene_policy: ShortScenePolicy::Reject,
            halt_on_non_finite_loss: false,
        }
    }

    /// Preset for the occupancy-conditioned social model.
    pub fn social() -> Self {
        TrainingConfig { lr_step_epochs: 30, ..TrainingConfig::single_trajectory() }
    }

    /// Learning-rate schedule described by this config.
    pub fn schedule(&self) -> StepDecay {
        StepDecay::new(self.learning_rate, self.lr_step_epochs)
    }

    /// Load a [`TrainingConfig`] from a JSON file at `path`.
    ///
    /// Missing fields take their single-trajectory defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be opened,
    /// [`ConfigError::ParseError`] if the JSON is malformed, and
    /// [`ConfigError::InvalidValue`] if validation fails.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: TrainingConfig = serde_json::from_str(&contents).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write this configuration as pretty-printed JSON, creating parent
    /// directories if necessary.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileRead {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Validate all fields and return the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epochs == 0 {
            return Err(ConfigError::invalid_value("epochs", "must be > 0"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ConfigError::invalid_value("learning_rate", "must be finite and > 0.0"));
        }
        if self.lr_step_epochs == 0 {
            return Err(ConfigError::invalid_value("lr_step_epochs", "must be > 0"));
        }
        if self.observed_len < 2 {
            return Err(ConfigError::invalid_value("observed_len", "must be >= 2"));
        }
        if self.prediction_len == 0 {
            return Err(ConfigError::invalid_value("prediction_len", "must be > 0"));
        }
        Ok(())
    }
}
