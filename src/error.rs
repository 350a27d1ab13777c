//! Error types for the trajectory training pipeline.
//!
//! This module is the single source of truth for all error types in the
//! crate. Lower-level modules return their own error enums which coerce into
//! [`TrainError`] via [`From`].
//!
//! ## Hierarchy
//!
//! ```text
//! TrainError (top-level)
//! ├── ConfigError   (config validation / file loading)
//! └── SceneError    (Row / Path / Scene invariants)
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::scene::{Frame, PedestrianId};

// ---------------------------------------------------------------------------
// TrainResult
// ---------------------------------------------------------------------------

/// Convenient `Result` alias used by orchestration-level functions.
pub type TrainResult<T> = Result<T, TrainError>;

// ---------------------------------------------------------------------------
// TrainError
// ---------------------------------------------------------------------------

/// Top-level error type for training, inference and persistence.
///
/// The first three variants are the input-validation failures of a training
/// run. They are always raised before any parameter update touches the
/// offending scene or run, and they are never retried.
#[derive(Debug, Error)]
pub enum TrainError {
    /// A scene's primary path does not have the length training requires.
    #[error("Scene {index} is malformed: primary path has {rows} rows, {required} required")]
    MalformedScene {
        /// Position of the scene in the supplied sequence.
        index: usize,
        /// Number of rows in the primary path.
        rows: usize,
        /// Number of rows training requires.
        required: usize,
    },

    /// No scenes were supplied (or none survived validation).
    #[error("Training set is empty")]
    EmptyTrainingSet,

    /// The social variant was started without a single-trajectory companion.
    #[error("Social training requires a trained single-trajectory companion model")]
    MissingCompanion,

    /// A configuration validation or loading error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A data-model invariant was violated.
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// A shape mismatch was detected between two arrays.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// A scene produced a NaN or infinite loss and halting was requested.
    #[error("Non-finite loss {loss} at epoch {epoch}, scene {scene}")]
    NonFiniteLoss {
        /// Epoch number (1-indexed).
        epoch: usize,
        /// Position of the scene within the shuffled epoch order.
        scene: usize,
        /// The offending loss value.
        loss: f64,
    },

    /// A model, loss or optimizer collaborator failed.
    #[error("Model error: {0}")]
    Model(String),

    /// A predictor bundle could not be saved or loaded.
    #[error("Persistence error: {message} (path: {path:?})")]
    Persistence {
        /// Human-readable description.
        message: String,
        /// Path that was being accessed.
        path: PathBuf,
    },

    /// Low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrainError {
    /// Construct a [`TrainError::Model`].
    pub fn model<S: Into<String>>(msg: S) -> Self {
        TrainError::Model(msg.into())
    }

    /// Construct a [`TrainError::Persistence`].
    pub fn persistence<S: Into<String>>(msg: S, path: impl Into<PathBuf>) -> Self {
        TrainError::Persistence { message: msg.into(), path: path.into() }
    }

    /// Construct a [`TrainError::ShapeMismatch`].
    pub fn shape_mismatch(expected: Vec<usize>, actual: Vec<usize>) -> Self {
        TrainError::ShapeMismatch { expected, actual }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors produced when loading or validating a [`TrainingConfig`].
///
/// [`TrainingConfig`]: crate::config::TrainingConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A configuration file could not be read from or written to disk.
    #[error("Cannot access config file `{path}`: {source}")]
    FileRead {
        /// Path that was being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config file `{path}`: {source}")]
    ParseError {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue { field, reason: reason.into() }
    }
}

// ---------------------------------------------------------------------------
// SceneError
// ---------------------------------------------------------------------------

/// Violations of the Row / Path / Scene structural invariants.
#[derive(Debug, Error, PartialEq)]
pub enum SceneError {
    /// A path must contain at least one row.
    #[error("Path contains no rows")]
    EmptyPath,

    /// A scene must contain at least the primary path.
    #[error("Scene contains no paths")]
    EmptyScene,

    /// Rows within a path must have strictly increasing frames.
    #[error("Frames out of order in path of pedestrian {pedestrian}: {previous} then {next}")]
    FramesNotIncreasing {
        /// Pedestrian owning the path.
        pedestrian: PedestrianId,
        /// Frame of the earlier row.
        previous: Frame,
        /// Frame of the row that did not advance.
        next: Frame,
    },

    /// All rows of a path must belong to the same pedestrian.
    #[error("Path mixes pedestrians {expected} and {found}")]
    MixedPedestrians {
        /// Pedestrian of the first row.
        expected: PedestrianId,
        /// Pedestrian of the offending row.
        found: PedestrianId,
    },

    /// A row carries a NaN or infinite coordinate.
    #[error("Non-finite position at frame {frame} for pedestrian {pedestrian}")]
    NonFinitePosition {
        /// Pedestrian owning the row.
        pedestrian: PedestrianId,
        /// Frame of the row.
        frame: Frame,
    },
}
