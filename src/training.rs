use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::{
            vision::{MnistDataset, MnistItem},
            Dataset,
        },
    },
    module::AutodiffModule,
    optim::{AdamConfig, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
    train::TrainStep,
};
use serde::{Deserialize, Serialize};

use crate::{
    artifact::{config_path, save_snapshot, snapshot_path},
    data::{ordered_loader, truncate, DigitBatch, DigitBatcher, NormalizationConfig},
    error::Error,
    evaluation::{evaluate, Evaluation},
    model::{Model, ModelConfig},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    /// One capped epoch over a fixed prefix of the training split.
    Quick,
    /// Several epochs over the whole training split.
    Full,
}

#[derive(Config)]
pub struct TrainingConfig {
    pub model: ModelConfig,
    pub optimizer: AdamConfig,
    pub normalization: NormalizationConfig,
    #[config(default = "TrainingMode::Full")]
    pub mode: TrainingMode,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    #[config(default = 128)]
    pub batch_size: usize,
    #[config(default = 512)]
    pub eval_batch_size: usize,
    /// Training items kept in quick mode.
    #[config(default = 5000)]
    pub quick_train_items: usize,
    /// Batches processed per epoch in quick mode.
    #[config(default = 80)]
    pub quick_max_batches: usize,
    #[config(default = 3)]
    pub full_epochs: usize,
}

impl TrainingConfig {
    pub fn num_epochs(&self) -> usize {
        match self.mode {
            TrainingMode::Quick => 1,
            TrainingMode::Full => self.full_epochs,
        }
    }

    /// Batch cap per epoch, if any.
    pub fn max_batches(&self) -> Option<usize> {
        match self.mode {
            TrainingMode::Quick => Some(self.quick_max_batches),
            TrainingMode::Full => None,
        }
    }

    /// Length of the training prefix, if the split is truncated.
    pub fn train_items(&self) -> Option<usize> {
        match self.mode {
            TrainingMode::Quick => Some(self.quick_train_items),
            TrainingMode::Full => None,
        }
    }

    fn validate(&self) -> crate::Result<()> {
        if self.batch_size == 0 || self.eval_batch_size == 0 {
            return Err(Error::Config("batch sizes must be positive".to_string()));
        }
        if self.num_epochs() == 0 {
            return Err(Error::Config("at least one epoch is required".to_string()));
        }
        if self.learning_rate <= 0.0 {
            return Err(Error::Config("learning rate must be positive".to_string()));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub batches: usize,
    /// Mean loss over the batches actually executed.
    pub train_loss: f64,
    pub test: Evaluation,
}

#[derive(Clone, Debug, Serialize)]
pub struct TrainingReport {
    pub mode: TrainingMode,
    pub epochs: Vec<EpochReport>,
    pub batches_processed: usize,
    pub snapshot_path: PathBuf,
    pub elapsed: Duration,
}

/// Trains on the downloaded MNIST splits and writes the artifacts to `artifact_dir`.
pub fn run<B: AutodiffBackend>(
    config: &TrainingConfig,
    artifact_dir: &Path,
    device: B::Device,
) -> crate::Result<TrainingReport> {
    train::<B, _, _>(
        config,
        MnistDataset::train(),
        MnistDataset::test(),
        artifact_dir,
        device,
    )
}

/// Trains a freshly initialized model and persists the final parameters.
///
/// The last epoch always wins: there is no early stopping and no best
/// checkpoint selection.
pub fn train<B, D, T>(
    config: &TrainingConfig,
    train_set: D,
    test_set: T,
    artifact_dir: &Path,
    device: B::Device,
) -> crate::Result<TrainingReport>
where
    B: AutodiffBackend,
    D: Dataset<MnistItem> + 'static,
    T: Dataset<MnistItem> + 'static,
{
    config.validate()?;
    std::fs::create_dir_all(artifact_dir)?;

    B::seed(config.seed);

    let train_len = config.train_items().unwrap_or(train_set.len());
    let train_set = truncate(train_set, train_len);
    log::info!(
        "Training in {:?} mode on {} items, testing on {} items",
        config.mode,
        train_set.len(),
        test_set.len()
    );

    let batcher_train = DigitBatcher::<B>::new(device.clone(), config.normalization.clone());
    let batcher_test =
        DigitBatcher::<B::InnerBackend>::new(device.clone(), config.normalization.clone());

    let loader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .build(train_set);
    let loader_test = ordered_loader(test_set, batcher_test, config.eval_batch_size);

    let mut model: Model<B> = config.model.init(&device);
    let mut optim = config.optimizer.init::<B, Model<B>>();

    let num_epochs = config.num_epochs();
    let started = Instant::now();
    let mut epochs = Vec::with_capacity(num_epochs);

    for epoch in 1..num_epochs + 1 {
        let (trained, batches, train_loss) = train_epoch(
            model,
            &mut optim,
            loader_train.as_ref(),
            config.learning_rate,
            config.max_batches(),
        );
        model = trained;

        let test = evaluate(&model.valid(), loader_test.as_ref());
        log::info!(
            "Epoch {epoch}/{num_epochs} - loss {train_loss:.4} - test acc {:.4}",
            test.accuracy
        );

        epochs.push(EpochReport {
            epoch,
            batches,
            train_loss,
            test,
        });
    }

    let snapshot_path = snapshot_path(artifact_dir);
    save_snapshot(&model, &snapshot_path)?;
    config.save(config_path(&snapshot_path))?;

    let elapsed = started.elapsed();
    log::info!(
        "Saved model to {} in {:.1}s (mode={:?})",
        snapshot_path.display(),
        elapsed.as_secs_f64(),
        config.mode
    );

    Ok(TrainingReport {
        mode: config.mode,
        batches_processed: epochs.iter().map(|epoch| epoch.batches).sum(),
        epochs,
        snapshot_path,
        elapsed,
    })
}

/// Runs one pass over `loader`, stopping after `max_batches` when set.
///
/// Returns the updated model, the number of batches executed and their mean loss.
fn train_epoch<B, O>(
    mut model: Model<B>,
    optim: &mut O,
    loader: &dyn DataLoader<DigitBatch<B>>,
    learning_rate: f64,
    max_batches: Option<usize>,
) -> (Model<B>, usize, f64)
where
    B: AutodiffBackend,
    O: Optimizer<Model<B>, B>,
{
    let mut batches = 0;
    let mut loss_total = 0.0;

    for batch in loader.iter().take(max_batches.unwrap_or(usize::MAX)) {
        let output = TrainStep::step(&model, batch);
        let loss = output.item.loss.into_scalar().elem::<f64>();

        // Gradients are consumed by the step, nothing carries over to the next batch.
        model = optim.step(learning_rate, model, output.grads);

        loss_total += loss;
        batches += 1;
        log::debug!("Batch {batches} - loss {loss:.4}");
    }

    let mean_loss = if batches == 0 {
        0.0
    } else {
        loss_total / batches as f64
    };

    (model, batches, mean_loss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artifact::{load_snapshot, CONFIG_FILE},
        test_utils::{synthetic_items, TestAutodiffBackend, TestBackend},
    };
    use burn::data::dataset::InMemDataset;
    use tempfile::TempDir;

    fn config(mode: TrainingMode) -> TrainingConfig {
        TrainingConfig::new(
            ModelConfig::new()
                .with_conv1_channels(4)
                .with_conv2_channels(8)
                .with_hidden_size(16),
            AdamConfig::new(),
            NormalizationConfig::new(),
        )
        .with_mode(mode)
        .with_batch_size(4)
        .with_eval_batch_size(7)
    }

    #[test]
    fn quick_mode_runs_one_capped_epoch() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(TrainingMode::Quick)
            .with_quick_train_items(40)
            .with_quick_max_batches(3);

        let report = train::<TestAutodiffBackend, _, _>(
            &config,
            InMemDataset::new(synthetic_items(100)),
            InMemDataset::new(synthetic_items(15)),
            temp_dir.path(),
            Default::default(),
        )
        .unwrap();

        assert_eq!(report.epochs.len(), 1);
        assert_eq!(report.epochs[0].batches, 3);
        assert!(report.batches_processed <= config.quick_max_batches);
        assert_eq!(report.epochs[0].test.items, 15);
        assert!(report.snapshot_path.is_file());
        assert!(temp_dir.path().join(CONFIG_FILE).is_file());
    }

    #[test]
    fn quick_mode_cap_is_an_upper_bound() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(TrainingMode::Quick)
            .with_quick_train_items(10)
            .with_quick_max_batches(80);

        let report = train::<TestAutodiffBackend, _, _>(
            &config,
            InMemDataset::new(synthetic_items(100)),
            InMemDataset::new(synthetic_items(5)),
            temp_dir.path(),
            Default::default(),
        )
        .unwrap();

        // 10 items with a batch size of 4.
        assert_eq!(report.batches_processed, 3);
    }

    #[test]
    fn full_mode_runs_every_epoch_on_the_whole_test_split() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(TrainingMode::Full);

        let report = train::<TestAutodiffBackend, _, _>(
            &config,
            InMemDataset::new(synthetic_items(12)),
            InMemDataset::new(synthetic_items(9)),
            temp_dir.path(),
            Default::default(),
        )
        .unwrap();

        assert_eq!(report.epochs.len(), 3);
        for (index, epoch) in report.epochs.iter().enumerate() {
            assert_eq!(epoch.epoch, index + 1);
            assert_eq!(epoch.batches, 3);
            assert_eq!(epoch.test.items, 9);
            assert!(epoch.train_loss.is_finite());
        }
        assert_eq!(report.batches_processed, 9);
    }

    #[test]
    fn persisted_snapshot_matches_the_final_epoch() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(TrainingMode::Full).with_full_epochs(1);
        let test_items = synthetic_items(10);

        let report = train::<TestAutodiffBackend, _, _>(
            &config,
            InMemDataset::new(synthetic_items(8)),
            InMemDataset::new(test_items.clone()),
            temp_dir.path(),
            Default::default(),
        )
        .unwrap();

        let device = Default::default();
        let model = load_snapshot::<TestBackend>(&config.model, &report.snapshot_path, &device)
            .unwrap();
        let batcher = DigitBatcher::new(device, config.normalization.clone());
        let loader = ordered_loader(InMemDataset::new(test_items), batcher, 7);
        let reloaded = evaluate(&model, loader.as_ref());

        assert_eq!(reloaded.correct, report.epochs[0].test.correct);
    }

    #[test]
    fn saved_config_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(TrainingMode::Quick).with_quick_max_batches(1);

        train::<TestAutodiffBackend, _, _>(
            &config,
            InMemDataset::new(synthetic_items(8)),
            InMemDataset::new(synthetic_items(2)),
            temp_dir.path(),
            Default::default(),
        )
        .unwrap();

        let loaded = TrainingConfig::load(temp_dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(loaded.mode, TrainingMode::Quick);
        assert_eq!(loaded.normalization.mean, config.normalization.mean);
        assert_eq!(loaded.normalization.std, config.normalization.std);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(TrainingMode::Quick).with_batch_size(0);

        let err = train::<TestAutodiffBackend, _, _>(
            &config,
            InMemDataset::new(synthetic_items(8)),
            InMemDataset::new(synthetic_items(2)),
            temp_dir.path(),
            Default::default(),
        )
        .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn epoch_counts_follow_the_mode() {
        let quick = config(TrainingMode::Quick);
        let full = config(TrainingMode::Full);

        assert_eq!(quick.num_epochs(), 1);
        assert_eq!(quick.max_batches(), Some(80));
        assert_eq!(quick.train_items(), Some(5000));
        assert_eq!(full.num_epochs(), 3);
        assert_eq!(full.max_batches(), None);
        assert_eq!(full.train_items(), None);
    }

    #[test]
    fn epoch_loss_is_the_mean_of_executed_batches() {
        let device = Default::default();
        let model: Model<TestAutodiffBackend> = ModelConfig::new()
            .with_conv1_channels(4)
            .with_conv2_channels(8)
            .with_hidden_size(16)
            .with_dropout(0.0)
            .init(&device);
        let batcher = DigitBatcher::<TestAutodiffBackend>::new(device, NormalizationConfig::new());
        let loader = ordered_loader(InMemDataset::new(synthetic_items(20)), batcher, 4);
        let mut optim = AdamConfig::new().init::<TestAutodiffBackend, Model<TestAutodiffBackend>>();

        // A zero learning rate leaves the parameters untouched between batches.
        let losses: Vec<f64> = loader
            .iter()
            .take(3)
            .map(|batch| {
                model
                    .forward_classification(batch.images, batch.targets)
                    .loss
                    .into_scalar()
                    .elem::<f64>()
            })
            .collect();

        let (_, batches, train_loss) =
            train_epoch(model, &mut optim, loader.as_ref(), 0.0, Some(3));

        let mean = losses.iter().sum::<f64>() / losses.len() as f64;
        assert_eq!(batches, 3);
        assert!((train_loss - mean).abs() < 1e-6);
        assert!(train_loss < losses.iter().sum::<f64>());
    }
}
