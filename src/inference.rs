use std::path::Path;

use burn::{module::AutodiffModule, prelude::*, tensor::backend::AutodiffBackend};
use serde::{Deserialize, Serialize};

use crate::{
    artifact::{load_snapshot, load_training_config},
    data::{ColorConvention, NormalizationConfig},
    error::{Error, Result},
    model::{Model, ModelConfig},
    preprocess::Preprocessor,
};

/// Predicted digit with the softmax distribution it was taken from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub digit: usize,
    /// Probability per class, indexed by digit.
    #[serde(rename = "probs")]
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// Builds a prediction from a probability vector, picking its argmax.
    pub fn from_probabilities(probabilities: Vec<f32>) -> Self {
        let digit = probabilities
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(index, _)| index)
            .unwrap_or_default();

        Self {
            digit,
            probabilities,
        }
    }
}

/// Frozen model plus the preprocessing it was trained with.
///
/// The handle is never mutated after construction. Clones share the parameter
/// storage, so each worker thread can own one.
#[derive(Clone, Debug)]
pub struct Classifier<B: Backend> {
    model: Model<B>,
    preprocessor: Preprocessor,
    convention: ColorConvention,
    device: B::Device,
}

impl<B: Backend> Classifier<B> {
    /// Wraps a model that lives on a backend without autodiff.
    pub fn new(model: Model<B>, normalization: NormalizationConfig, device: B::Device) -> Self {
        let convention = normalization.convention;

        Self {
            model,
            preprocessor: Preprocessor::new(normalization),
            convention,
            device,
        }
    }

    /// Switches a model fresh out of training to eval mode and wraps it.
    pub fn from_trained<A>(model: &Model<A>, normalization: NormalizationConfig) -> Self
    where
        A: AutodiffBackend<InnerBackend = B>,
    {
        let model = model.valid();
        let device = model
            .devices()
            .into_iter()
            .next()
            .unwrap_or_default();

        Self::new(model, normalization, device)
    }

    /// Loads the snapshot at `path` with the architecture and normalization
    /// of the training run that wrote it.
    ///
    /// Both the snapshot and the `config.json` next to it must exist.
    pub fn load(path: &Path, device: B::Device) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::MissingArtifact {
                path: path.to_path_buf(),
            });
        }
        let config = load_training_config(path)?;

        Self::load_with(path, &config.model, config.normalization, device)
    }

    /// Loads the snapshot at `path` into the architecture described by `model`.
    pub fn load_with(
        path: &Path,
        model: &ModelConfig,
        normalization: NormalizationConfig,
        device: B::Device,
    ) -> Result<Self> {
        let model = load_snapshot(model, path, &device)?;

        Ok(Self::new(model, normalization, device))
    }

    /// Sets the convention assumed for payloads that don't state one.
    pub fn with_input_convention(mut self, convention: ColorConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn input_convention(&self) -> ColorConvention {
        self.convention
    }

    /// Classifies a payload painted with the default input convention.
    pub fn predict(&self, payload: &str) -> Result<Prediction> {
        self.predict_with_convention(payload, self.convention)
    }

    /// Classifies a payload painted with `convention`.
    pub fn predict_with_convention(
        &self,
        payload: &str,
        convention: ColorConvention,
    ) -> Result<Prediction> {
        let image = self
            .preprocessor
            .tensor::<B>(payload, convention, &self.device)?;

        self.predict_tensor(image)
    }

    /// Classifies one preprocessed `[1, HEIGHT, WIDTH]` image.
    pub fn predict_tensor(&self, image: Tensor<B, 3>) -> Result<Prediction> {
        let logits = self.model.try_forward(image.unsqueeze::<4>())?;
        let probabilities = burn::tensor::activation::softmax(logits, 1);

        let probabilities = probabilities
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|err| Error::TensorData(format!("{err:?}")))?;

        Ok(Prediction::from_probabilities(probabilities))
    }
}
