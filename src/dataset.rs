//! Scene sources.
//!
//! Training consumes a fully materialised, ordered `Vec<Scene>`. A
//! [`SceneSource`] produces that vector before the training loop starts;
//! however the source gathers its scenes (files, parallel readers), the loop
//! never sees it.
//!
//! - [`InMemoryScenes`]: scenes already in memory.
//! - [`JsonSceneFile`]: a JSON array of scenes (each an array of paths, each
//!   an array of rows).
//! - [`SyntheticScenes`]: deterministic straight-line scenes with partially
//!   visible neighbours; useful for tests and dry runs. **Never uses random
//!   data.**
//!
//! # Example – synthetic scenes
//!
//! ```rust
//! use trajnet_train::dataset::{SceneSource, SyntheticConfig, SyntheticScenes};
//!
//! let source = SyntheticScenes::new(SyntheticConfig { num_scenes: 4, ..SyntheticConfig::default() });
//! let scenes = source.load().unwrap();
//!
//! assert_eq!(scenes.len(), 4);
//! assert_eq!(scenes[0].primary().len(), 21);
//! ```

use std::path::{Path as FsPath, PathBuf};

use tracing::info;

use crate::error::{TrainError, TrainResult};
use crate::scene::{Frame, Path, PedestrianId, Row, Scene};

/// Common interface for everything that can supply training scenes.
pub trait SceneSource {
    /// Produce all scenes, in source order.
    fn load(&self) -> TrainResult<Vec<Scene>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// InMemoryScenes
// ---------------------------------------------------------------------------

/// Scenes that are already in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryScenes {
    scenes: Vec<Scene>,
}

impl InMemoryScenes {
    /// Wrap `scenes`.
    pub fn new(scenes: Vec<Scene>) -> Self {
        InMemoryScenes { scenes }
    }
}

impl SceneSource for InMemoryScenes {
    fn load(&self) -> TrainResult<Vec<Scene>> {
        Ok(self.scenes.clone())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

// ---------------------------------------------------------------------------
// JsonSceneFile
// ---------------------------------------------------------------------------

/// A JSON file holding an array of scenes.
///
/// Every path is re-validated on load, so malformed files are rejected rather
/// than producing broken scenes.
#[derive(Debug, Clone)]
pub struct JsonSceneFile {
    path: PathBuf,
    name: String,
}

impl JsonSceneFile {
    /// Source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        JsonSceneFile { path, name }
    }

    /// Write `scenes` to `path` in the format [`JsonSceneFile`] reads.
    pub fn write(path: &FsPath, scenes: &[Scene]) -> TrainResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TrainError::persistence(format!("cannot create directory: {e}"), parent))?;
        }
        let json = serde_json::to_string(scenes)?;
        std::fs::write(path, json).map_err(|e| TrainError::persistence(format!("cannot write scenes: {e}"), path))
    }
}

impl SceneSource for JsonSceneFile {
    fn load(&self) -> TrainResult<Vec<Scene>> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| TrainError::persistence(format!("cannot read scenes: {e}"), &self.path))?;
        let scenes: Vec<Scene> = serde_json::from_str(&text)?;
        info!("Loaded {} scenes from {}", scenes.len(), self.path.display());
        Ok(scenes)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// SyntheticScenes
// ---------------------------------------------------------------------------

/// Shape of the synthetic scenes.
///
/// All fields are plain numbers; no randomness is involved.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    /// Number of scenes. Default: **32**.
    pub num_scenes: usize,
    /// Rows in every primary path. Default: **21** (9 observed + 12 future).
    pub path_len: usize,
    /// Secondary pedestrians per scene. Default: **3**.
    pub num_neighbours: usize,
    /// Distance covered per frame. Default: **0.4**.
    pub speed: f32,
    /// Frame index step between rows. Default: **10**.
    pub frame_step: Frame,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        SyntheticConfig { num_scenes: 32, path_len: 21, num_neighbours: 3, speed: 0.4, frame_step: 10 }
    }
}

/// Deterministic straight-line scenes.
///
/// Scene `i` has its primary pedestrian walking from the origin along heading
/// `i · 137.5°`. Neighbour `j` walks parallel at a lateral offset of
/// `j + 1` units and is visible only on a window that shrinks with `j`, so
/// the scenes exercise partial coverage.
#[derive(Debug, Clone)]
pub struct SyntheticScenes {
    config: SyntheticConfig,
}

impl SyntheticScenes {
    /// Source generating scenes per `config`.
    pub fn new(config: SyntheticConfig) -> Self {
        SyntheticScenes { config }
    }

    fn scene(&self, index: usize) -> TrainResult<Scene> {
        let cfg = &self.config;
        let heading = (index as f32 * 137.5).to_radians();
        let (dy, dx) = heading.sin_cos();
        let base_ped = (index * (cfg.num_neighbours + 1)) as i64;
        let first_frame = index as Frame * 1000;

        let make = |ped: i64, lateral: f32, rows: std::ops::Range<usize>| -> TrainResult<Path> {
            let rows = rows
                .map(|t| {
                    let along = t as f32 * cfg.speed;
                    Row::new(
                        first_frame + t as Frame * cfg.frame_step,
                        PedestrianId(ped),
                        along * dx - lateral * dy,
                        along * dy + lateral * dx,
                    )
                })
                .collect();
            Ok(Path::new(rows)?)
        };

        let mut paths = vec![make(base_ped, 0.0, 0..cfg.path_len)?];
        for j in 0..cfg.num_neighbours {
            let start = j.min(cfg.path_len.saturating_sub(1));
            let end = cfg.path_len.saturating_sub(2 * j).max(start + 1);
            paths.push(make(base_ped + 1 + j as i64, (j + 1) as f32, start..end)?);
        }
        Ok(Scene::new(paths)?)
    }
}

impl SceneSource for SyntheticScenes {
    fn load(&self) -> TrainResult<Vec<Scene>> {
        (0..self.config.num_scenes).map(|i| self.scene(i)).collect()
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
