use base64::{engine::general_purpose::STANDARD, Engine};
use burn::prelude::*;
use image::{imageops::FilterType, DynamicImage, GrayImage};

use crate::{
    data::{ColorConvention, NormalizationConfig, HEIGHT, WIDTH},
    error::{DecodeError, Error, Result},
};

/// Turns an image payload into the normalized `[1, HEIGHT, WIDTH]` tensor the model consumes.
///
/// Steps, in order: decode, grayscale, color convention correction,
/// bilinear resize, scaling and normalization.
#[derive(Clone, Debug)]
pub struct Preprocessor {
    normalization: NormalizationConfig,
}

impl Preprocessor {
    pub fn new(normalization: NormalizationConfig) -> Self {
        Self { normalization }
    }

    pub fn normalization(&self) -> &NormalizationConfig {
        &self.normalization
    }

    /// Decodes a data URI (`data:image/png;base64,...`) or a bare base64 string.
    pub fn decode(payload: &str) -> core::result::Result<DynamicImage, DecodeError> {
        let encoded = payload
            .split_once(',')
            .map_or(payload, |(_, data)| data);
        let encoded: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

        if encoded.is_empty() {
            return Err(DecodeError::Empty);
        }

        let bytes = STANDARD.decode(encoded)?;
        Ok(image::load_from_memory(&bytes)?)
    }

    /// Normalized pixel values of `image`, row major, `HEIGHT * WIDTH` long.
    pub fn pixels(&self, image: &DynamicImage, source: ColorConvention) -> Vec<f32> {
        let mut gray: GrayImage = image.to_luma8();

        if self.normalization.needs_inversion(source) {
            image::imageops::invert(&mut gray);
        }

        let resized = image::imageops::resize(&gray, WIDTH as u32, HEIGHT as u32, FilterType::Triangle);
        let intensities = resized.into_raw().into_iter().map(f32::from);

        // Inversion already happened on the full resolution image.
        self.normalization
            .apply(intensities, self.normalization.convention)
    }

    /// Runs the whole chain on a payload painted with `source`.
    pub fn tensor<B: Backend>(
        &self,
        payload: &str,
        source: ColorConvention,
        device: &B::Device,
    ) -> Result<Tensor<B, 3>> {
        let image = Self::decode(payload)?;
        let pixels = self.pixels(&image, source);

        if pixels.len() != HEIGHT * WIDTH {
            return Err(Error::Shape {
                expected: vec![1, HEIGHT, WIDTH],
                actual: vec![1, pixels.len()],
            });
        }

        Ok(Tensor::from_data(
            TensorData::new(pixels, [1, HEIGHT, WIDTH]).convert::<B::FloatElem>(),
            device,
        ))
    }
}
