//! Integration tests for [`trajnet_train::trainer`].
//!
//! Models and optimizers are small in-test doubles over `ndarray` so the
//! training loop can be observed without a deep-learning backend.

use approx::assert_relative_eq;
use ndarray::Array2;
use std::cell::RefCell;
use std::sync::Arc;

use trajnet_train::config::{ShortScenePolicy, TrainingConfig};
use trajnet_train::error::{TrainError, TrainResult};
use trajnet_train::losses::VelocityMse;
use trajnet_train::model::{Optimizer, SocialModel, TrajectoryModel};
use trajnet_train::occupancy::OccupancyMatrix;
use trajnet_train::predictor::{Horizon, VanillaPredictor};
use trajnet_train::rng::Xorshift64;
use trajnet_train::scene::{Path, PedestrianId, Row, Scene};
use trajnet_train::trainer::Trainer;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

fn constant_velocity(observed: &Array2<f32>, prediction_len: usize) -> Array2<f32> {
    let n = observed.nrows();
    let v = [observed[[n - 1, 0]] - observed[[n - 2, 0]], observed[[n - 1, 1]] - observed[[n - 2, 1]]];
    Array2::from_shape_fn((n + prediction_len - 2, 2), |(_, c)| v[c])
}

/// Repeats the last observed displacement and records the first observed x.
struct ConstantVelocity {
    prediction_len: usize,
    seen: RefCell<Vec<f32>>,
}

impl ConstantVelocity {
    fn new(prediction_len: usize) -> Self {
        ConstantVelocity { prediction_len, seen: RefCell::new(Vec::new()) }
    }
}

impl TrajectoryModel for ConstantVelocity {
    type Output = Array2<f32>;

    fn forward(&self, observed: &Array2<f32>) -> TrainResult<Array2<f32>> {
        self.seen.borrow_mut().push(observed[[0, 0]]);
        Ok(constant_velocity(observed, self.prediction_len))
    }
}

/// Social double recording `(rows, columns)` of every occupancy matrix.
struct OccupancyProbe {
    prediction_len: usize,
    shapes: RefCell<Vec<(usize, usize)>>,
}

impl SocialModel for OccupancyProbe {
    type Output = Array2<f32>;

    fn forward(&self, observed: &Array2<f32>, occupancy: &OccupancyMatrix) -> TrainResult<Array2<f32>> {
        self.shapes.borrow_mut().push((occupancy.len(), occupancy.num_pedestrians()));
        Ok(constant_velocity(observed, self.prediction_len))
    }
}

#[derive(Default)]
struct RecordingOptimizer {
    events: Vec<&'static str>,
    rates: Vec<f64>,
}

impl Optimizer<f64> for RecordingOptimizer {
    fn zero_gradients(&mut self) {
        self.events.push("zero");
    }
    fn compute_gradients(&mut self, _loss: &f64) -> TrainResult<()> {
        self.events.push("grad");
        Ok(())
    }
    fn apply_update(&mut self) -> TrainResult<()> {
        self.events.push("update");
        Ok(())
    }
    fn set_learning_rate(&mut self, lr: f64) {
        self.rates.push(lr);
    }
}

/// Straight walk of 21 rows starting at `x0`, one secondary beside it.
fn straight_scene(ped: i64, x0: f32) -> Scene {
    let primary = (0..21).map(|f| Row::new(f, PedestrianId(ped), x0 + f as f32, 0.5 * f as f32)).collect();
    let other = (3..12).map(|f| Row::new(f, PedestrianId(ped + 1000), x0 + f as f32, 2.0)).collect();
    Scene::new(vec![Path::new(primary).unwrap(), Path::new(other).unwrap()]).unwrap()
}

fn scenes(count: usize) -> Vec<Scene> {
    (0..count).map(|i| straight_scene(i as i64, 100.0 * i as f32)).collect()
}

fn config(epochs: usize) -> TrainingConfig {
    TrainingConfig { epochs, augment: false, ..TrainingConfig::single_trajectory() }
}

// ---------------------------------------------------------------------------
// Single-trajectory training
// ---------------------------------------------------------------------------

#[test]
fn constant_velocity_on_straight_walks_has_zero_loss() {
    let trainer = Trainer::new(config(3)).unwrap();
    let mut opt = RecordingOptimizer::default();
    let (_, report) = trainer
        .train_single(scenes(4), ConstantVelocity::new(12), &VelocityMse, &mut opt, &mut trainer.seeded_rng())
        .unwrap();

    assert_eq!(report.epochs.len(), 3);
    for epoch in &report.epochs {
        assert_eq!(epoch.scenes, 4);
        assert_relative_eq!(epoch.mean_loss, 0.0, epsilon = 1e-9);
    }
}

#[test]
fn rotation_does_not_change_constant_velocity_loss() {
    let cfg = TrainingConfig { augment: true, ..config(2) };
    let trainer = Trainer::new(cfg).unwrap();
    let mut opt = RecordingOptimizer::default();
    let (_, report) = trainer
        .train_single(scenes(3), ConstantVelocity::new(12), &VelocityMse, &mut opt, &mut trainer.seeded_rng())
        .unwrap();
    assert!(report.final_loss().unwrap() < 1e-6);
}

#[test]
fn every_scene_gets_zero_grad_update_in_order() {
    let trainer = Trainer::new(config(2)).unwrap();
    let mut opt = RecordingOptimizer::default();
    trainer
        .train_single(scenes(3), ConstantVelocity::new(12), &VelocityMse, &mut opt, &mut trainer.seeded_rng())
        .unwrap();

    let expected: Vec<&str> = std::iter::repeat(["zero", "grad", "update"]).take(6).flatten().collect();
    assert_eq!(opt.events, expected);
}

#[test]
fn learning_rate_is_set_once_per_epoch_with_step_decay() {
    let cfg = TrainingConfig { lr_step_epochs: 2, ..config(5) };
    let trainer = Trainer::new(cfg).unwrap();
    let mut opt = RecordingOptimizer::default();
    let (_, report) = trainer
        .train_single(scenes(2), ConstantVelocity::new(12), &VelocityMse, &mut opt, &mut trainer.seeded_rng())
        .unwrap();

    // epochs 1..=5 with step 2: exponents 0, 1, 1, 2, 2
    let expected = [1e-3, 1e-4, 1e-4, 1e-5, 1e-5];
    assert_eq!(opt.rates.len(), 5);
    for (got, want) in opt.rates.iter().zip(expected) {
        assert_relative_eq!(*got, want, max_relative = 1e-12);
    }
    for (epoch, want) in report.epochs.iter().zip(expected) {
        assert_relative_eq!(epoch.learning_rate, want, max_relative = 1e-12);
    }
}

#[test]
fn observed_window_is_the_configured_prefix() {
    #[derive(Default)]
    struct LenProbe(RefCell<Vec<usize>>);
    impl TrajectoryModel for LenProbe {
        type Output = Array2<f32>;
        fn forward(&self, observed: &Array2<f32>) -> TrainResult<Array2<f32>> {
            self.0.borrow_mut().push(observed.nrows());
            Ok(constant_velocity(observed, 12))
        }
    }

    let trainer = Trainer::new(config(1)).unwrap();
    let mut opt = RecordingOptimizer::default();
    let (predictor, _) = trainer
        .train_single(scenes(3), LenProbe::default(), &VelocityMse, &mut opt, &mut trainer.seeded_rng())
        .unwrap();
    assert_eq!(*predictor.model().0.borrow(), vec![9, 9, 9]);
}

#[test]
fn same_seed_gives_same_scene_order() {
    let run = || {
        let trainer = Trainer::new(config(3)).unwrap();
        let mut opt = RecordingOptimizer::default();
        let (predictor, _) = trainer
            .train_single(scenes(6), ConstantVelocity::new(12), &VelocityMse, &mut opt, &mut Xorshift64::new(9))
            .unwrap();
        predictor.into_model().seen.into_inner()
    };
    let first = run();
    assert_eq!(first, run());
    assert_eq!(first.len(), 18);

    // Each epoch visits every scene exactly once.
    for epoch in first.chunks(6) {
        let mut xs = epoch.to_vec();
        xs.sort_by(f32::total_cmp);
        assert_eq!(xs, vec![0.0, 100.0, 200.0, 300.0, 400.0, 500.0]);
    }
}

#[test]
fn empty_scene_list_is_rejected() {
    let trainer = Trainer::new(config(1)).unwrap();
    let mut opt = RecordingOptimizer::default();
    let result =
        trainer.train_single(vec![], ConstantVelocity::new(12), &VelocityMse, &mut opt, &mut trainer.seeded_rng());
    assert!(matches!(result, Err(TrainError::EmptyTrainingSet)));
    assert!(opt.events.is_empty());
}

#[test]
fn short_primary_is_rejected_before_any_update() {
    let short = Scene::from_primary(
        Path::new(vec![Row::new(0, PedestrianId(1), 0.0, 0.0), Row::new(1, PedestrianId(1), 1.0, 0.0)]).unwrap(),
    );
    let mut input = scenes(2);
    input.push(short);

    let trainer = Trainer::new(config(1)).unwrap();
    let mut opt = RecordingOptimizer::default();
    let result =
        trainer.train_single(input, ConstantVelocity::new(12), &VelocityMse, &mut opt, &mut trainer.seeded_rng());
    assert!(matches!(result, Err(TrainError::MalformedScene { index: 2, rows: 2, .. })));
    assert!(opt.events.is_empty());
}

#[test]
fn mis_sized_primary_is_rejected_before_any_update() {
    let mut input = scenes(6);
    input.push(Scene::from_primary(
        Path::new((0..10).map(|f| Row::new(f, PedestrianId(99), f as f32, 0.0)).collect()).unwrap(),
    ));

    let trainer = Trainer::new(config(2)).unwrap();
    let mut opt = RecordingOptimizer::default();
    let result =
        trainer.train_single(input, ConstantVelocity::new(12), &VelocityMse, &mut opt, &mut trainer.seeded_rng());
    assert!(matches!(result, Err(TrainError::MalformedScene { index: 6, rows: 10, required: 21 })));
    assert!(opt.events.is_empty());
    assert!(opt.rates.is_empty());
}

#[test]
fn skip_policy_trains_on_correctly_sized_scenes_only() {
    let mut input = scenes(6);
    input.insert(2, Scene::from_primary(
        Path::new((0..10).map(|f| Row::new(f, PedestrianId(99), f as f32, 0.0)).collect()).unwrap(),
    ));

    let cfg = TrainingConfig { short_scene_policy: ShortScenePolicy::Skip, ..config(1) };
    let trainer = Trainer::new(cfg).unwrap();
    let mut opt = RecordingOptimizer::default();
    let (_, report) = trainer
        .train_single(input, ConstantVelocity::new(12), &VelocityMse, &mut opt, &mut trainer.seeded_rng())
        .unwrap();
    assert_eq!(report.epochs[0].scenes, 6);
    assert_eq!(opt.events.iter().filter(|&&e| e == "update").count(), 6);
}

#[test]
fn invalid_config_is_rejected_by_trainer() {
    let cfg = TrainingConfig { epochs: 0, ..TrainingConfig::default() };
    assert!(matches!(Trainer::new(cfg), Err(TrainError::Config(_))));
}

// ---------------------------------------------------------------------------
// Social training
// ---------------------------------------------------------------------------

fn companion() -> Arc<VanillaPredictor<ConstantVelocity>> {
    Arc::new(VanillaPredictor::new(
        ConstantVelocity::new(12),
        Horizon { observed_len: 9, prediction_len: 12 },
    ))
}

#[test]
fn social_training_without_companion_fails_first() {
    let trainer = Trainer::new(TrainingConfig { augment: false, ..TrainingConfig::social() }).unwrap();
    let mut opt = RecordingOptimizer::default();
    let probe = OccupancyProbe { prediction_len: 12, shapes: RefCell::new(vec![]) };

    let result = trainer.train_social::<_, ConstantVelocity, _, _, _>(
        vec![],
        probe,
        None,
        &VelocityMse,
        &mut opt,
        &mut trainer.seeded_rng(),
    );
    assert!(matches!(result, Err(TrainError::MissingCompanion)));
    assert!(opt.rates.is_empty());
}

#[test]
fn social_training_feeds_full_length_occupancy() {
    let trainer = Trainer::new(TrainingConfig { epochs: 2, ..TrainingConfig::social() }).unwrap();
    let mut opt = RecordingOptimizer::default();
    let probe = OccupancyProbe { prediction_len: 12, shapes: RefCell::new(vec![]) };
    let companion = companion();

    let (predictor, report) = trainer
        .train_social(scenes(3), probe, Some(Arc::clone(&companion)), &VelocityMse, &mut opt, &mut trainer.seeded_rng())
        .unwrap();

    assert_eq!(*predictor.model().shapes.borrow(), vec![(21, 1); 6]);
    assert!(report.final_loss().unwrap() < 1e-6);
    assert!(Arc::ptr_eq(predictor.companion(), &companion));
    assert!(companion.model().seen.borrow().is_empty(), "companion must not be used during training");
}

#[test]
fn social_preset_decays_more_slowly() {
    let trainer = Trainer::new(TrainingConfig { epochs: 25, augment: false, ..TrainingConfig::social() }).unwrap();
    let mut opt = RecordingOptimizer::default();
    let probe = OccupancyProbe { prediction_len: 12, shapes: RefCell::new(vec![]) };
    trainer
        .train_social(scenes(1), probe, Some(companion()), &VelocityMse, &mut opt, &mut trainer.seeded_rng())
        .unwrap();

    assert!(opt.rates.iter().all(|&lr| (lr - 1e-3).abs() < 1e-15));
}
