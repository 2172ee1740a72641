//! Persistence of the trained parameters.
//!
//! The snapshot is a single named MessagePack file holding full precision
//! weights, keyed by layer name. There is one slot; saving overwrites it.

use std::path::{Path, PathBuf};

use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};

use crate::{
    error::{Error, Result},
    model::{Model, ModelConfig},
    training::TrainingConfig,
};

/// Directory the binaries read and write artifacts in by default.
pub const DEFAULT_ARTIFACT_DIR: &str = "artifacts";

/// File name of the snapshot inside the artifact directory.
pub const SNAPSHOT_FILE: &str = "mnist_cnn.mpk";

/// File name of the training configuration inside the artifact directory.
pub const CONFIG_FILE: &str = "config.json";

pub type SnapshotRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

pub fn snapshot_path(artifact_dir: &Path) -> PathBuf {
    artifact_dir.join(SNAPSHOT_FILE)
}

/// Training configuration stored next to the snapshot at `snapshot_path`.
pub fn config_path(snapshot_path: &Path) -> PathBuf {
    snapshot_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(CONFIG_FILE)
}

/// Reads the configuration the snapshot at `snapshot_path` was trained with.
pub fn load_training_config(snapshot_path: &Path) -> Result<TrainingConfig> {
    let path = config_path(snapshot_path);
    if !path.is_file() {
        return Err(Error::MissingArtifact { path });
    }

    TrainingConfig::load(&path)
        .map_err(|err| Error::Config(format!("{}: {err}", path.display())))
}

/// Writes the parameters of `model` to `path`, replacing any previous snapshot.
pub fn save_snapshot<B: Backend>(model: &Model<B>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    model
        .clone()
        .save_file(path.to_path_buf(), &SnapshotRecorder::new())?;
    log::info!("Saved model snapshot to {}", path.display());

    Ok(())
}

/// Builds a model with the architecture of `config` and fills it from the snapshot at `path`.
pub fn load_snapshot<B: Backend>(
    config: &ModelConfig,
    path: &Path,
    device: &B::Device,
) -> Result<Model<B>> {
    if !path.is_file() {
        return Err(Error::MissingArtifact {
            path: path.to_path_buf(),
        });
    }

    let model = config
        .init::<B>(device)
        .load_file(path.to_path_buf(), &SnapshotRecorder::new(), device)?;
    log::info!("Loaded model snapshot from {}", path.display());

    Ok(model)
}
