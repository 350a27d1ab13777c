//! Social-context construction.
//!
//! [`build_occupancy`] turns a scene's secondary pedestrians into an
//! [`OccupancyMatrix`]: for every frame of the primary path, the exact
//! position of every secondary pedestrian at that frame, or `None` when that
//! pedestrian was not observed there.
//!
//! ```text
//!               column 0   column 1   ...   (secondary pedestrians,
//!  frame f0  [ Some(xy),   None,      ... ]  first-seen order)
//!  frame f1  [ Some(xy),   Some(xy),  ... ]
//!  ...
//! ```
//!
//! Column order is the order in which pedestrian ids are first met while
//! scanning secondary paths in scene order, rows in frame order. It is
//! recomputed per scene; the same pedestrian may land in a different column
//! in another scene.
//!
//! [`OccupancyGrid`] pools one matrix row into the fixed-size grid a social
//! model consumes at each timestep.

use std::collections::HashMap;

use indexmap::IndexMap;
use ndarray::Array1;

use crate::scene::{Frame, Path, PedestrianId, Scene};

/// An `(x, y)` position.
pub type Position = [f32; 2];

// ---------------------------------------------------------------------------
// OccupancyMatrix
// ---------------------------------------------------------------------------

/// Per-frame, per-secondary-pedestrian position table aligned to a frame list.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyMatrix {
    frames: Vec<Frame>,
    pedestrians: Vec<PedestrianId>,
    cells: Vec<Vec<Option<Position>>>,
}

impl OccupancyMatrix {
    /// Number of rows (one per aligned frame).
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// `true` when no frames are aligned.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of columns (distinct secondary pedestrians).
    pub fn num_pedestrians(&self) -> usize {
        self.pedestrians.len()
    }

    /// Frames the rows are aligned to.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Column identities, in column order.
    pub fn pedestrians(&self) -> &[PedestrianId] {
        &self.pedestrians
    }

    /// Column index of `pedestrian`, if it occurs in the scene.
    pub fn column_of(&self, pedestrian: PedestrianId) -> Option<usize> {
        self.pedestrians.iter().position(|&p| p == pedestrian)
    }

    /// Row `index`, one entry per column.
    pub fn row(&self, index: usize) -> Option<&[Option<Position>]> {
        self.cells.get(index).map(Vec::as_slice)
    }

    /// All rows in frame order.
    pub fn rows(&self) -> &[Vec<Option<Position>>] {
        &self.cells
    }

    /// Entry at (`row`, `column`); `None` when absent or out of range.
    pub fn get(&self, row: usize, column: usize) -> Option<Position> {
        self.cells.get(row).and_then(|r| r.get(column)).copied().flatten()
    }
}

/// Build the occupancy matrix of `scene`, aligned to its primary path frames.
pub fn build_occupancy(scene: &Scene) -> OccupancyMatrix {
    let frames: Vec<Frame> = scene.primary().frames().collect();
    build_occupancy_for_frames(&frames, scene.secondary())
}

/// Build an occupancy matrix over an explicit frame list.
///
/// Observations of secondary pedestrians at frames outside `frames` are
/// dropped. Several paths with the same pedestrian id share one column.
pub fn build_occupancy_for_frames(frames: &[Frame], secondary: &[Path]) -> OccupancyMatrix {
    // IndexMap keeps first-insertion order, which defines column identity.
    let mut seen: IndexMap<PedestrianId, HashMap<Frame, Position>> = IndexMap::new();
    for path in secondary {
        for row in path.rows() {
            seen.entry(row.pedestrian).or_default().insert(row.frame, row.position());
        }
    }

    let cells = frames
        .iter()
        .map(|frame| seen.values().map(|by_frame| by_frame.get(frame).copied()).collect())
        .collect();

    OccupancyMatrix {
        frames: frames.to_vec(),
        pedestrians: seen.keys().copied().collect(),
        cells,
    }
}

// ---------------------------------------------------------------------------
// OccupancyGrid
// ---------------------------------------------------------------------------

/// Square grid of `n × n` cells of side `cell_side`, centred on the primary
/// pedestrian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OccupancyGrid {
    /// Cells per side.
    pub n: usize,
    /// Side length of one cell, in position units.
    pub cell_side: f32,
}

impl Default for OccupancyGrid {
    fn default() -> Self {
        OccupancyGrid { n: 6, cell_side: 0.5 }
    }
}

impl OccupancyGrid {
    /// Create a grid with `n` cells per side.
    pub fn new(n: usize, cell_side: f32) -> Self {
        OccupancyGrid { n, cell_side }
    }

    /// Flattened length of [`OccupancyGrid::counts`].
    pub fn len(&self) -> usize {
        self.n * self.n
    }

    /// `true` for a zero-sized grid.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Flattened length of [`OccupancyGrid::directional`].
    pub fn directional_len(&self) -> usize {
        2 * self.len()
    }

    /// Cell index (`iy * n + ix`) of `other` relative to `centre`.
    fn cell(&self, centre: Position, other: Position) -> Option<usize> {
        let half = self.n as f32 * self.cell_side / 2.0;
        let ix = ((other[0] - centre[0] + half) / self.cell_side).floor();
        let iy = ((other[1] - centre[1] + half) / self.cell_side).floor();
        let n = self.n as f32;
        if ix < 0.0 || iy < 0.0 || ix >= n || iy >= n {
            return None;
        }
        Some(iy as usize * self.n + ix as usize)
    }

    /// Count of present pedestrians in each cell around `centre`.
    ///
    /// Absent entries and pedestrians outside the grid contribute nothing.
    pub fn counts(&self, centre: Position, others: &[Option<Position>]) -> Array1<f32> {
        let mut grid = Array1::zeros(self.len());
        for other in others.iter().flatten() {
            if let Some(i) = self.cell(centre, *other) {
                grid[i] += 1.0;
            }
        }
        grid
    }

    /// Summed relative velocity of the pedestrians in each cell.
    ///
    /// Only pedestrians present in both `current` and `previous` contribute.
    /// The first `n*n` entries hold x components, the next `n*n` y components.
    pub fn directional(
        &self,
        centre: Position,
        centre_velocity: Position,
        current: &[Option<Position>],
        previous: &[Option<Position>],
    ) -> Array1<f32> {
        let cells = self.len();
        let mut grid = Array1::zeros(self.directional_len());
        for (now, before) in current.iter().zip(previous) {
            let (Some(now), Some(before)) = (now, before) else { continue };
            if let Some(i) = self.cell(centre, *now) {
                grid[i] += now[0] - before[0] - centre_velocity[0];
                grid[cells + i] += now[1] - before[1] - centre_velocity[1];
            }
        }
        grid
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Row;

    fn path(ped: i64, rows: &[(Frame, f32, f32)]) -> Path {
        Path::new(rows.iter().map(|&(f, x, y)| Row::new(f, PedestrianId(ped), x, y)).collect()).unwrap()
    }

    #[test]
    fn no_secondary_paths_gives_empty_rows() {
        let scene = Scene::from_primary(path(0, &[(0, 0.0, 0.0), (1, 1.0, 0.0)]));
        let m = build_occupancy(&scene);
        assert_eq!(m.len(), 2);
        assert_eq!(m.num_pedestrians(), 0);
        assert!(m.rows().iter().all(Vec::is_empty));
    }

    #[test]
    fn columns_follow_first_seen_order() {
        let scene = Scene::new(vec![
            path(0, &[(0, 0.0, 0.0)]),
            path(42, &[(0, 1.0, 1.0)]),
            path(7, &[(0, 2.0, 2.0)]),
            path(13, &[(0, 3.0, 3.0)]),
        ])
        .unwrap();
        let m = build_occupancy(&scene);
        assert_eq!(m.pedestrians(), &[PedestrianId(42), PedestrianId(7), PedestrianId(13)]);
        assert_eq!(m.get(0, 1), Some([2.0, 2.0]));
    }

    #[test]
    fn split_paths_of_one_pedestrian_share_a_column() {
        let scene = Scene::new(vec![
            path(0, &[(0, 0.0, 0.0), (1, 0.0, 0.0), (2, 0.0, 0.0)]),
            path(5, &[(0, 1.0, 0.0)]),
            path(6, &[(1, 9.0, 9.0)]),
            path(5, &[(2, 3.0, 0.0)]),
        ])
        .unwrap();
        let m = build_occupancy(&scene);
        assert_eq!(m.num_pedestrians(), 2);
        assert_eq!(m.column_of(PedestrianId(5)), Some(0));
        assert_eq!(m.get(0, 0), Some([1.0, 0.0]));
        assert_eq!(m.get(1, 0), None);
        assert_eq!(m.get(2, 0), Some([3.0, 0.0]));
    }

    #[test]
    fn frames_outside_primary_are_dropped() {
        let scene = Scene::new(vec![
            path(0, &[(10, 0.0, 0.0), (20, 0.0, 0.0)]),
            path(1, &[(15, 1.0, 1.0), (20, 2.0, 2.0), (25, 3.0, 3.0)]),
        ])
        .unwrap();
        let m = build_occupancy(&scene);
        assert_eq!(m.frames(), &[10, 20]);
        assert_eq!(m.row(0).unwrap(), &[None::<Position>]);
        assert_eq!(m.row(1).unwrap(), &[Some([2.0, 2.0])]);
    }

    #[test]
    fn grid_counts_neighbours_by_cell() {
        let grid = OccupancyGrid::new(2, 1.0);
        // Cells span [-1, 1) on both axes around the centre.
        let others = [Some([0.5, 0.5]), Some([0.2, 0.9]), Some([-0.5, -0.5]), Some([5.0, 0.0]), None];
        let g = grid.counts([0.0, 0.0], &others);
        assert_eq!(g.to_vec(), vec![1.0, 0.0, 0.0, 2.0]);
    }

    #[test]
    fn directional_grid_uses_relative_velocity() {
        let grid = OccupancyGrid::new(2, 1.0);
        let current = [Some([0.5, 0.5]), Some([-0.5, -0.5])];
        let previous = [Some([0.0, 0.5]), None];
        let g = grid.directional([0.0, 0.0], [0.25, 0.0], &current, &previous);
        assert_eq!(g.len(), 8);
        assert_eq!(g[3], 0.25);
        assert_eq!(g[4 + 3], 0.0);
        assert_eq!(g.iter().filter(|v| **v != 0.0).count(), 1);
    }
}
