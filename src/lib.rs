//! # Trajectory Prediction Training Pipeline
//!
//! This crate trains pedestrian trajectory predictors on scenes of tracked
//! paths. It provides the scene data model, rotation augmentation, the
//! social-context occupancy builder, velocity-target loss framing, the
//! step-decay learning-rate schedule, the sequential training loop for
//! single-trajectory and social models, and predictor bundles that can be
//! saved and reloaded.
//!
//! ## Architecture
//!
//! ```text
//! TrainingConfig ──► Trainer ──► VanillaPredictor ──┐
//!       │               │                           │ (companion)
//!       │          SceneSource                      ▼
//!       │     (JsonSceneFile | SyntheticScenes) SocialPredictor
//!       │               │
//!       │      augmentation::random_rotation
//!       │      occupancy::build_occupancy
//!       │
//!       └──► scheduler / losses / metrics
//! ```
//!
//! Models, losses and optimizers are reached only through the traits in
//! [`model`] and [`losses`]; the `tch-backend` feature supplies LSTM
//! implementations.
//!
//! ## Quick Start
//!
//! ```rust
//! use trajnet_train::config::TrainingConfig;
//! use trajnet_train::dataset::{SceneSource, SyntheticConfig, SyntheticScenes};
//! use trajnet_train::occupancy::build_occupancy;
//!
//! let config = TrainingConfig::default();
//! config.validate().expect("config is valid");
//!
//! let scenes = SyntheticScenes::new(SyntheticConfig::default()).load().unwrap();
//! let occupancy = build_occupancy(&scenes[0]);
//! assert_eq!(occupancy.len(), scenes[0].primary().len());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod augmentation;
pub mod config;
pub mod dataset;
pub mod error;
pub mod losses;
pub mod metrics;
pub mod model;
pub mod occupancy;
pub mod predictor;
pub mod rng;
pub mod scene;
pub mod scheduler;
#[cfg(feature = "tch-backend")]
pub mod tch_backend;
pub mod trainer;

// Convenient re-exports at the crate root.
pub use config::{ShortScenePolicy, TrainingConfig};
pub use dataset::{InMemoryScenes, JsonSceneFile, SceneSource, SyntheticConfig, SyntheticScenes};
pub use error::{ConfigError, SceneError, TrainError, TrainResult};
pub use occupancy::{build_occupancy, OccupancyGrid, OccupancyMatrix};
pub use predictor::{Horizon, SocialPredictor, VanillaPredictor};
pub use scene::{Frame, Path, PedestrianId, Row, Scene};
pub use scheduler::{step_decay, StepDecay};
pub use trainer::{EpochReport, Trainer, TrainingReport};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
