//! `train` binary: entry point for the trajectory prediction training pipeline.
//!
//! # Usage
//!
//! ```bash
//! # single-trajectory model on a JSON scene file
//! cargo run --features tch-backend --bin train -- --scenes train.json --output out/vanilla
//!
//! # social model using the bundle above as companion
//! cargo run --features tch-backend --bin train -- --scenes train.json --social \
//!     --companion out/vanilla --output out/occupancy
//!
//! # smoke test on deterministic synthetic scenes
//! cargo run --features tch-backend --bin train -- --dry-run --epochs 2
//! ```

use clap::Parser;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tch::Device;
use tracing::{error, info, warn};
use trajnet_train::config::TrainingConfig;
use trajnet_train::dataset::{JsonSceneFile, SceneSource, SyntheticConfig, SyntheticScenes};
use trajnet_train::error::{TrainError, TrainResult};
use trajnet_train::metrics::DisplacementStats;
use trajnet_train::predictor::VanillaPredictor;
use trajnet_train::scene::{Path, Scene};
use trajnet_train::tch_backend::{GaussianNllLoss, LstmSpec, OccupancyLstm, OccupancySpec, TchOptimizer, VanillaLstm};
use trajnet_train::trainer::Trainer;

/// Command-line arguments for the training binary.
#[derive(Parser, Debug)]
#[command(name = "train", version, about = "Trajectory prediction training pipeline", long_about = None)]
struct Args {
    /// Path to a JSON configuration file.
    ///
    /// If not provided, the preset for the chosen model variant is used.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// JSON file holding the training scenes.
    #[arg(long, value_name = "FILE", required_unless_present = "dry_run")]
    scenes: Option<PathBuf>,

    /// Use deterministic synthetic scenes instead of a scene file.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Override the number of epochs.
    #[arg(long)]
    epochs: Option<usize>,

    /// Train the occupancy-conditioned social model.
    #[arg(long, default_value_t = false)]
    social: bool,

    /// Pool relative velocities instead of counts (social model only).
    #[arg(long, default_value_t = false)]
    directional: bool,

    /// Single-trajectory bundle used as the social model's companion.
    #[arg(long, value_name = "DIR")]
    companion: Option<PathBuf>,

    /// Directory the trained predictor bundle is written to.
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    info!("Trajectory training pipeline v{}", trajnet_train::VERSION);

    if let Err(e) = run(args) {
        error!("Training failed: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> TrainResult<()> {
    let mut config = match args.config.as_deref() {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            TrainingConfig::from_json(path)?
        }
        None if args.social => TrainingConfig::social(),
        None => TrainingConfig::single_trajectory(),
    };
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    config.validate()?;

    info!("  epochs        : {}", config.epochs);
    info!("  learning rate : {} (x0.1 every {} epochs)", config.learning_rate, config.lr_step_epochs);
    info!("  horizon       : {} observed + {} predicted", config.observed_len, config.prediction_len);
    info!("  augmentation  : {}", config.augment);

    let scenes = load_scenes(&args, &config)?;
    let trainer = Trainer::new(config)?;
    let mut rng = trainer.seeded_rng();
    tch::manual_seed(trainer.config().seed as i64);

    let device = Device::cuda_if_available();
    let prediction_len = trainer.config().prediction_len as i64;

    if args.social {
        let companion = match args.companion.as_deref() {
            Some(dir) => {
                info!("Loading companion from {}", dir.display());
                Some(Arc::new(VanillaPredictor::<VanillaLstm>::load(dir)?))
            }
            None => None,
        };

        let spec = OccupancySpec { prediction_len, directional: args.directional, ..OccupancySpec::default() };
        let model = OccupancyLstm::new(spec, device);
        let mut optimizer = TchOptimizer::adam(model.var_store(), trainer.config().learning_rate)?;
        let (predictor, report) =
            trainer.train_social(scenes.clone(), model, companion, &GaussianNllLoss, &mut optimizer, &mut rng)?;
        info!("Final epoch loss: {:?}", report.final_loss());

        evaluate(&scenes, trainer.config().observed_len, |scene| predictor.predict(scene));
        if let Some(dir) = args.output.as_deref() {
            predictor.save(dir)?;
        }
    } else {
        let spec = LstmSpec { prediction_len, ..LstmSpec::default() };
        let model = VanillaLstm::new(spec, device);
        let mut optimizer = TchOptimizer::sgd(model.var_store(), trainer.config().learning_rate)?;
        let (predictor, report) =
            trainer.train_single(scenes.clone(), model, &GaussianNllLoss, &mut optimizer, &mut rng)?;
        info!("Final epoch loss: {:?}", report.final_loss());

        evaluate(&scenes, trainer.config().observed_len, |scene| predictor.predict(scene.primary()));
        if let Some(dir) = args.output.as_deref() {
            predictor.save(dir)?;
        }
    }
    Ok(())
}

fn load_scenes(args: &Args, config: &TrainingConfig) -> TrainResult<Vec<Scene>> {
    if args.dry_run {
        info!("DRY RUN: using synthetic scenes");
        let syn_cfg = SyntheticConfig {
            path_len: config.observed_len + config.prediction_len,
            ..SyntheticConfig::default()
        };
        return SyntheticScenes::new(syn_cfg).load();
    }
    let path: &FsPath = args
        .scenes
        .as_deref()
        .ok_or_else(|| TrainError::persistence("no scene file given", PathBuf::new()))?;
    let source = JsonSceneFile::new(path);
    let scenes = source.load()?;
    info!("Scene source {}: {} scenes", source.name(), scenes.len());
    Ok(scenes)
}

/// Log mean ADE / FDE of `predict` against each scene's primary path.
fn evaluate<F>(scenes: &[Scene], observed_len: usize, mut predict: F)
where
    F: FnMut(&Scene) -> TrainResult<Path>,
{
    let mut stats = DisplacementStats::new();
    for scene in scenes.iter().filter(|s| s.primary().len() > observed_len) {
        match predict(scene) {
            Ok(forecast) => {
                stats.push(&forecast, scene.primary());
            }
            Err(e) => warn!("Prediction failed: {e}"),
        }
    }
    match (stats.mean_ade(), stats.mean_fde()) {
        (Some(ade), Some(fde)) => info!("Evaluation on {} scenes: ADE {ade:.4}, FDE {fde:.4}", stats.count()),
        _ => warn!("No scene could be evaluated"),
    }
}
