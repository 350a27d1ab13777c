//! Row / Path / Scene data model.
//!
//! A [`Scene`] is an ordered set of [`Path`]s sharing a time window. The first
//! path belongs to the *primary* pedestrian (the one being predicted); the
//! rest are *secondary* pedestrians used only as social context.
//!
//! All three types are immutable once built. [`Path::new`] and [`Scene::new`]
//! check the structural invariants, so any value of these types that exists
//! is well formed:
//!
//! - a path has at least one row,
//! - all rows of a path share one pedestrian id,
//! - frames strictly increase within a path,
//! - every coordinate is finite.
//!
//! # Example
//!
//! ```rust
//! use trajnet_train::scene::{Path, PedestrianId, Row, Scene};
//!
//! let ped = PedestrianId(1);
//! let rows = (0..5).map(|f| Row::new(f, ped, f as f32, 0.0)).collect();
//! let scene = Scene::new(vec![Path::new(rows).unwrap()]).unwrap();
//!
//! assert_eq!(scene.primary().len(), 5);
//! assert_eq!(scene.observed_window(3).shape(), &[3, 2]);
//! ```

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SceneError;

/// Frame index of an observation. Monotonically increasing within a path.
pub type Frame = i64;

/// Opaque pedestrian identifier, stable across one scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PedestrianId(pub i64);

impl fmt::Display for PedestrianId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// A single observation of one pedestrian at one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Frame index.
    pub frame: Frame,
    /// Pedestrian the observation belongs to.
    pub pedestrian: PedestrianId,
    /// Horizontal position.
    pub x: f32,
    /// Vertical position.
    pub y: f32,
}

impl Row {
    /// Create a new row.
    pub fn new(frame: Frame, pedestrian: PedestrianId, x: f32, y: f32) -> Self {
        Row { frame, pedestrian, x, y }
    }

    /// Position as an `(x, y)` pair.
    #[inline]
    pub fn position(&self) -> [f32; 2] {
        [self.x, self.y]
    }

    /// Same observation moved to `(x, y)`.
    #[inline]
    pub(crate) fn with_position(&self, x: f32, y: f32) -> Self {
        Row { x, y, ..*self }
    }
}

// ---------------------------------------------------------------------------
// Path
// ---------------------------------------------------------------------------

/// The frame-ordered rows of a single pedestrian.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Row>", into = "Vec<Row>")]
pub struct Path {
    rows: Vec<Row>,
}

impl Path {
    /// Build a path, checking that it is non-empty, single-pedestrian,
    /// strictly frame-ordered and finite.
    pub fn new(rows: Vec<Row>) -> Result<Self, SceneError> {
        let first = rows.first().ok_or(SceneError::EmptyPath)?;
        let pedestrian = first.pedestrian;

        for row in &rows {
            if row.pedestrian != pedestrian {
                return Err(SceneError::MixedPedestrians { expected: pedestrian, found: row.pedestrian });
            }
            if !row.x.is_finite() || !row.y.is_finite() {
                return Err(SceneError::NonFinitePosition { pedestrian, frame: row.frame });
            }
        }
        for pair in rows.windows(2) {
            if pair[1].frame <= pair[0].frame {
                return Err(SceneError::FramesNotIncreasing {
                    pedestrian,
                    previous: pair[0].frame,
                    next: pair[1].frame,
                });
            }
        }
        Ok(Path { rows })
    }

    /// Pedestrian this path belongs to.
    pub fn pedestrian(&self) -> PedestrianId {
        self.rows[0].pedestrian
    }

    /// All rows in frame order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row.
    pub fn first(&self) -> &Row {
        &self.rows[0]
    }

    /// Last row.
    pub fn last(&self) -> &Row {
        &self.rows[self.rows.len() - 1]
    }

    /// Frame list in order.
    pub fn frames(&self) -> impl Iterator<Item = Frame> + '_ {
        self.rows.iter().map(|r| r.frame)
    }

    /// Row at `frame`, if observed.
    pub fn at_frame(&self, frame: Frame) -> Option<&Row> {
        self.rows
            .binary_search_by_key(&frame, |r| r.frame)
            .ok()
            .map(|i| &self.rows[i])
    }

    /// The first `n` rows (all rows if the path is shorter).
    pub fn prefix(&self, n: usize) -> Path {
        let n = n.clamp(1, self.rows.len());
        Path { rows: self.rows[..n].to_vec() }
    }

    /// The last `n` rows (all rows if the path is shorter).
    pub fn suffix(&self, n: usize) -> Path {
        let n = n.clamp(1, self.rows.len());
        Path { rows: self.rows[self.rows.len() - n..].to_vec() }
    }

    /// Rows with `frame <= last_frame`, or `None` when no row qualifies.
    pub fn until_frame(&self, last_frame: Frame) -> Option<Path> {
        let end = self.rows.partition_point(|r| r.frame <= last_frame);
        (end > 0).then(|| Path { rows: self.rows[..end].to_vec() })
    }

    /// Positions as a `[len, 2]` array.
    pub fn positions(&self) -> Array2<f32> {
        positions_of(&self.rows)
    }

    /// Apply `f` to every position, keeping frames and pedestrian ids.
    ///
    /// `f` must return finite values for finite input.
    pub(crate) fn map_positions<F>(&self, mut f: F) -> Path
    where
        F: FnMut(f32, f32) -> (f32, f32),
    {
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let (x, y) = f(r.x, r.y);
                r.with_position(x, y)
            })
            .collect();
        Path { rows }
    }
}

impl TryFrom<Vec<Row>> for Path {
    type Error = SceneError;

    fn try_from(rows: Vec<Row>) -> Result<Self, Self::Error> {
        Path::new(rows)
    }
}

impl From<Path> for Vec<Row> {
    fn from(path: Path) -> Self {
        path.rows
    }
}

fn positions_of(rows: &[Row]) -> Array2<f32> {
    Array2::from_shape_fn((rows.len(), 2), |(i, c)| if c == 0 { rows[i].x } else { rows[i].y })
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

/// One primary path plus the secondary paths co-present in its time window.
///
/// Secondary paths may cover the primary window partially or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Path>", into = "Vec<Path>")]
pub struct Scene {
    paths: Vec<Path>,
}

impl Scene {
    /// Build a scene; the first path is the primary pedestrian.
    pub fn new(paths: Vec<Path>) -> Result<Self, SceneError> {
        if paths.is_empty() {
            return Err(SceneError::EmptyScene);
        }
        Ok(Scene { paths })
    }

    /// Scene with a primary path and no secondary pedestrians.
    pub fn from_primary(primary: Path) -> Self {
        Scene { paths: vec![primary] }
    }

    /// Primary (predicted) pedestrian's path.
    pub fn primary(&self) -> &Path {
        &self.paths[0]
    }

    /// Secondary (context) paths, in scene order.
    pub fn secondary(&self) -> &[Path] {
        &self.paths[1..]
    }

    /// All paths, primary first.
    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    /// Observed window: positions of the first `observed_len` primary rows,
    /// or all of them when the primary path is shorter. Shape `[n, 2]`.
    pub fn observed_window(&self, observed_len: usize) -> Array2<f32> {
        let rows = self.primary().rows();
        positions_of(&rows[..observed_len.min(rows.len())])
    }

    /// Target window: positions of the full primary path. Shape `[len, 2]`.
    pub fn target_window(&self) -> Array2<f32> {
        self.primary().positions()
    }

    /// Apply `f` to every position of every path.
    pub(crate) fn map_positions<F>(&self, mut f: F) -> Scene
    where
        F: FnMut(f32, f32) -> (f32, f32),
    {
        Scene { paths: self.paths.iter().map(|p| p.map_positions(&mut f)).collect() }
    }
}

impl TryFrom<Vec<Path>> for Scene {
    type Error = SceneError;

    fn try_from(paths: Vec<Path>) -> Result<Self, Self::Error> {
        Scene::new(paths)
    }
}

impl From<Scene> for Vec<Path> {
    fn from(scene: Scene) -> Self {
        scene.paths
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn straight(ped: i64, frames: std::ops::Range<i64>) -> Path {
        let rows = frames.map(|f| Row::new(f, PedestrianId(ped), f as f32, 2.0)).collect();
        Path::new(rows).unwrap()
    }

    #[test]
    fn empty_path_is_rejected() {
        assert_eq!(Path::new(vec![]), Err(SceneError::EmptyPath));
    }

    #[test]
    fn empty_scene_is_rejected() {
        assert_eq!(Scene::new(vec![]), Err(SceneError::EmptyScene));
    }

    #[test]
    fn repeated_frame_is_rejected() {
        let p = PedestrianId(3);
        let err = Path::new(vec![Row::new(4, p, 0.0, 0.0), Row::new(4, p, 1.0, 0.0)]).unwrap_err();
        assert_eq!(err, SceneError::FramesNotIncreasing { pedestrian: p, previous: 4, next: 4 });
    }

    #[test]
    fn mixed_pedestrians_are_rejected() {
        let err = Path::new(vec![
            Row::new(0, PedestrianId(1), 0.0, 0.0),
            Row::new(1, PedestrianId(2), 0.0, 0.0),
        ])
        .unwrap_err();
        assert!(matches!(err, SceneError::MixedPedestrians { .. }));
    }

    #[test]
    fn nan_position_is_rejected() {
        let err = Path::new(vec![Row::new(0, PedestrianId(1), f32::NAN, 0.0)]).unwrap_err();
        assert!(matches!(err, SceneError::NonFinitePosition { frame: 0, .. }));
    }

    #[test]
    fn observed_window_truncates_to_path_length() {
        let scene = Scene::from_primary(straight(1, 0..4));
        assert_eq!(scene.observed_window(9).shape(), &[4, 2]);
        assert_eq!(scene.observed_window(2).shape(), &[2, 2]);
        assert_eq!(scene.target_window().shape(), &[4, 2]);
    }

    #[test]
    fn positions_are_row_major_xy() {
        let pos = straight(1, 0..3).positions();
        assert_eq!(pos[[2, 0]], 2.0);
        assert_eq!(pos[[2, 1]], 2.0);
    }

    #[test]
    fn at_frame_finds_exact_frames_only() {
        let path = straight(1, 5..10);
        assert_eq!(path.at_frame(7).map(|r| r.x), Some(7.0));
        assert!(path.at_frame(4).is_none());
        assert!(path.at_frame(10).is_none());
    }

    #[test]
    fn suffix_keeps_most_recent_rows() {
        let path = straight(1, 0..10);
        assert_eq!(path.suffix(3).frames().collect::<Vec<_>>(), vec![7, 8, 9]);
        assert_eq!(path.suffix(50).len(), 10);
        assert_eq!(path.suffix(0).frames().collect::<Vec<_>>(), vec![9]);
    }

    #[test]
    fn until_frame_cuts_future_rows() {
        let path = straight(1, 0..10);
        assert_eq!(path.until_frame(3).unwrap().len(), 4);
        assert!(path.until_frame(-1).is_none());
    }

    #[test]
    fn scene_serde_validates_paths() {
        let json = r#"[[{"frame":1,"pedestrian":7,"x":0.0,"y":0.0},
                        {"frame":1,"pedestrian":7,"x":1.0,"y":0.0}]]"#;
        assert!(serde_json::from_str::<Scene>(json).is_err());

        let scene = Scene::new(vec![straight(1, 0..3), straight(2, 1..2)]).unwrap();
        let text = serde_json::to_string(&scene).unwrap();
        let back: Scene = serde_json::from_str(&text).unwrap();
        assert_eq!(back, scene);
    }
}
