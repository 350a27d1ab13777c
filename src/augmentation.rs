//! Rigid rotation augmentation.
//!
//! One angle is drawn per call and applied to every row of every path, so
//! the relative geometry between the primary and all secondary pedestrians is
//! preserved. Callers invoke this once per training example per epoch.

use std::f64::consts::TAU;

use crate::rng::RandomSource;
use crate::scene::{Path, Scene};

/// Rotate every position of `scene` by a fresh uniform angle in `[0, 2π)`.
pub fn random_rotation<R: RandomSource + ?Sized>(scene: &Scene, rng: &mut R) -> Scene {
    rotate_scene(scene, rng.next_f64() * TAU)
}

/// Rotate a single path by a fresh uniform angle in `[0, 2π)`.
pub fn random_rotation_path<R: RandomSource + ?Sized>(path: &Path, rng: &mut R) -> Path {
    rotate_path(path, rng.next_f64() * TAU)
}

/// Rotate every position of `scene` about the origin by `theta` radians.
pub fn rotate_scene(scene: &Scene, theta: f64) -> Scene {
    let (st, ct) = theta.sin_cos();
    scene.map_positions(|x, y| rotate_xy(x, y, ct, st))
}

/// Rotate every position of `path` about the origin by `theta` radians.
pub fn rotate_path(path: &Path, theta: f64) -> Path {
    let (st, ct) = theta.sin_cos();
    path.map_positions(|x, y| rotate_xy(x, y, ct, st))
}

#[inline]
fn rotate_xy(x: f32, y: f32, ct: f64, st: f64) -> (f32, f32) {
    let (x, y) = (f64::from(x), f64::from(y));
    ((ct * x + st * y) as f32, (-st * x + ct * y) as f32)
}
