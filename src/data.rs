use std::{fmt, str::FromStr};

use burn::{
    data::{
        dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
        dataset::{transform::PartialDataset, vision::MnistItem, Dataset},
    },
    prelude::*,
};
use serde::{Deserialize, Serialize};

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;
pub const NUM_CLASSES: usize = 10;

/// Largest 8-bit pixel intensity.
pub const MAX_INTENSITY: f32 = 255.0;

/// Which way round foreground and background are painted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorConvention {
    /// Bright strokes on a dark background, like MNIST or a drawing canvas.
    LightOnDark,
    /// Dark strokes on a bright background, like ink on paper.
    DarkOnLight,
}

/// Convention of the raw MNIST pixels.
pub const MNIST_CONVENTION: ColorConvention = ColorConvention::LightOnDark;

impl fmt::Display for ColorConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorConvention::LightOnDark => f.write_str("light-on-dark"),
            ColorConvention::DarkOnLight => f.write_str("dark-on-light"),
        }
    }
}

impl FromStr for ColorConvention {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().replace('_', "-").as_str() {
            "light-on-dark" => Ok(ColorConvention::LightOnDark),
            "dark-on-light" => Ok(ColorConvention::DarkOnLight),
            other => Err(format!(
                "unknown color convention `{other}`, expected light-on-dark or dark-on-light"
            )),
        }
    }
}

/// Pixel normalization shared by training and inference.
///
/// Values in [0, 255] are scaled to [0, 1], then shifted by `mean` and divided by `std`.
/// The defaults are the MNIST statistics.
#[derive(Config, Debug)]
pub struct NormalizationConfig {
    #[config(default = 0.1307)]
    pub mean: f64,
    #[config(default = 0.3081)]
    pub std: f64,
    /// Convention of the images the model is trained on.
    #[config(default = "MNIST_CONVENTION")]
    pub convention: ColorConvention,
}

impl NormalizationConfig {
    /// Whether pixels painted with `source` must be inverted before normalization.
    pub fn needs_inversion(&self, source: ColorConvention) -> bool {
        source != self.convention
    }

    /// Maps one intensity, already in the model's convention, to its tensor value.
    pub fn normalize(&self, intensity: f32) -> f32 {
        (intensity / MAX_INTENSITY - self.mean as f32) / self.std as f32
    }

    /// Converts raw intensities painted with `source` into tensor values.
    pub fn apply<I>(&self, intensities: I, source: ColorConvention) -> Vec<f32>
    where
        I: IntoIterator<Item = f32>,
    {
        let invert = self.needs_inversion(source);

        intensities
            .into_iter()
            .map(|value| if invert { MAX_INTENSITY - value } else { value })
            .map(|value| self.normalize(value))
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct DigitBatcher<B: Backend> {
    device: B::Device,
    normalization: NormalizationConfig,
    source: ColorConvention,
}

#[derive(Clone, Debug)]
pub struct DigitBatch<B: Backend> {
    /// Normalized images of shape `[batch_size, 1, HEIGHT, WIDTH]`.
    pub images: Tensor<B, 4>,
    /// Class labels of shape `[batch_size]`.
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> DigitBatcher<B> {
    pub fn new(device: B::Device, normalization: NormalizationConfig) -> Self {
        Self {
            device,
            normalization,
            source: MNIST_CONVENTION,
        }
    }

    /// Declares the convention the dataset items are painted with.
    pub fn with_source_convention(mut self, source: ColorConvention) -> Self {
        self.source = source;
        self
    }
}

impl<B: Backend> Batcher<MnistItem, DigitBatch<B>> for DigitBatcher<B> {
    fn batch(&self, items: Vec<MnistItem>) -> DigitBatch<B> {
        let batch_size = items.len();

        let pixels = items
            .iter()
            .flat_map(|item| item.image.iter().flatten().copied());
        let images = self.normalization.apply(pixels, self.source);
        let targets: Vec<i64> = items.iter().map(|item| item.label as i64).collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(images, [batch_size, 1, HEIGHT, WIDTH]).convert::<B::FloatElem>(),
            &self.device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets, [batch_size]).convert::<B::IntElem>(),
            &self.device,
        );

        DigitBatch { images, targets }
    }
}

/// Keeps the first `len` items of a partition, in their original order.
pub fn truncate<D>(dataset: D, len: usize) -> PartialDataset<D, MnistItem>
where
    D: Dataset<MnistItem>,
{
    let end = usize::min(len, dataset.len());
    PartialDataset::new(dataset, 0, end)
}

/// Builds a loader that visits every item once, in order.
pub fn ordered_loader<B, D>(
    dataset: D,
    batcher: DigitBatcher<B>,
    batch_size: usize,
) -> std::sync::Arc<dyn DataLoader<DigitBatch<B>>>
where
    B: Backend,
    D: Dataset<MnistItem> + 'static,
{
    DataLoaderBuilder::new(batcher)
        .batch_size(batch_size)
        .build(dataset)
}
