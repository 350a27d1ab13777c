//! Integration tests for [`trajnet_train::augmentation`].

use approx::assert_abs_diff_eq;
use trajnet_train::augmentation::{random_rotation, rotate_scene};
use trajnet_train::rng::Xorshift64;
use trajnet_train::scene::{Path, PedestrianId, Row, Scene};

fn scene() -> Scene {
    let path = |ped: i64, pts: &[(f32, f32)]| {
        Path::new(
            pts.iter()
                .enumerate()
                .map(|(f, &(x, y))| Row::new(f as i64 + ped, PedestrianId(ped), x, y))
                .collect(),
        )
        .unwrap()
    };
    Scene::new(vec![
        path(0, &[(0.0, 0.0), (1.0, 0.5), (2.0, 1.0), (3.0, 1.5)]),
        path(1, &[(4.0, -2.0), (4.5, -1.0)]),
        path(2, &[(-3.0, 7.0), (-2.0, 6.0), (-1.0, 5.0)]),
    ])
    .unwrap()
}

fn all_positions(scene: &Scene) -> Vec<(f32, f32)> {
    scene.paths().iter().flat_map(|p| p.rows().iter().map(|r| (r.x, r.y))).collect()
}

fn dist(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

#[test]
fn pairwise_distances_survive_rotation() {
    let original = scene();
    let mut rng = Xorshift64::new(3);
    for _ in 0..10 {
        let rotated = random_rotation(&original, &mut rng);
        let before = all_positions(&original);
        let after = all_positions(&rotated);
        for i in 0..before.len() {
            for j in 0..before.len() {
                assert_abs_diff_eq!(dist(before[i], before[j]), dist(after[i], after[j]), epsilon = 1e-4);
            }
        }
    }
}

#[test]
fn frames_and_ids_are_untouched() {
    let original = scene();
    let rotated = random_rotation(&original, &mut Xorshift64::new(11));
    for (a, b) in original.paths().iter().zip(rotated.paths()) {
        assert_eq!(a.pedestrian(), b.pedestrian());
        assert_eq!(a.frames().collect::<Vec<_>>(), b.frames().collect::<Vec<_>>());
    }
}

#[test]
fn full_turn_is_identity() {
    let original = scene();
    let turned = rotate_scene(&original, std::f64::consts::TAU);
    for (a, b) in all_positions(&original).into_iter().zip(all_positions(&turned)) {
        assert_abs_diff_eq!(a.0, b.0, epsilon = 1e-5);
        assert_abs_diff_eq!(a.1, b.1, epsilon = 1e-5);
    }
}

#[test]
fn rotation_does_not_modify_input() {
    let original = scene();
    let copy = original.clone();
    let _ = random_rotation(&original, &mut Xorshift64::new(1));
    assert_eq!(original, copy);
}
