use std::{path::PathBuf, process::ExitCode};

use burn::optim::AdamConfig;
use clap::Parser;
use digit_classifier::{
    artifact::DEFAULT_ARTIFACT_DIR,
    backend::TrainBackend,
    data::NormalizationConfig,
    logging::{init_logging, level},
    model::ModelConfig,
    training::{self, TrainingConfig, TrainingMode},
};

/// Trains the digit classifier on MNIST and saves the final snapshot.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Train one capped epoch on a small subset for a fast demo.
    #[arg(long)]
    quick: bool,
    /// Directory receiving the snapshot and the training configuration.
    #[arg(long, default_value = DEFAULT_ARTIFACT_DIR)]
    artifact_dir: PathBuf,
    /// Log the loss of every batch.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(level(args.verbose));

    let mode = if args.quick {
        TrainingMode::Quick
    } else {
        TrainingMode::Full
    };
    let config = TrainingConfig::new(
        ModelConfig::new(),
        AdamConfig::new(),
        NormalizationConfig::new(),
    )
    .with_mode(mode);

    match training::run::<TrainBackend>(&config, &args.artifact_dir, Default::default()) {
        Ok(report) => {
            if let Some(last) = report.epochs.last() {
                log::info!(
                    "Finished {} epoch(s), final test accuracy {:.4}",
                    report.epochs.len(),
                    last.test.accuracy
                );
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("Training failed: {err}");
            ExitCode::FAILURE
        }
    }
}
