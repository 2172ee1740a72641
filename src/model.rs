use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::backend::AutodiffBackend,
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};

use crate::{
    data::{DigitBatch, HEIGHT, NUM_CLASSES, WIDTH},
    error::Error,
};

/// Spatial side of the feature maps after the two pooling stages.
const POOLED_SIDE: usize = HEIGHT / 4;

/// Two convolution stages followed by a two-layer classifier head.
///
/// The output is raw logits; softmax is applied by the caller.
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: MaxPool2d,
    dropout: Dropout,
    linear1: Linear<B>,
    linear2: Linear<B>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct ModelConfig {
    #[config(default = 32)]
    pub conv1_channels: usize,
    #[config(default = 64)]
    pub conv2_channels: usize,
    #[config(default = 128)]
    pub hidden_size: usize,
    #[config(default = "NUM_CLASSES")]
    pub num_classes: usize,
    #[config(default = 0.25)]
    pub dropout: f64,
}

impl ModelConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        Model {
            conv1: Conv2dConfig::new([1, self.conv1_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            conv2: Conv2dConfig::new([self.conv1_channels, self.conv2_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            linear1: LinearConfig::new(
                self.conv2_channels * POOLED_SIDE * POOLED_SIDE,
                self.hidden_size,
            )
            .init(device),
            linear2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> Model<B> {
    /// # Shapes
    ///   - Images [batch_size, 1, height, width]
    ///   - Output [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.conv1.forward(images); // [batch_size, 32, 28, 28]
        let x = self.activation.forward(x);
        let x = self.pool.forward(x); // [batch_size, 32, 14, 14]

        let x = self.conv2.forward(x); // [batch_size, 64, 14, 14]
        let x = self.activation.forward(x);
        let x = self.pool.forward(x); // [batch_size, 64, 7, 7]

        let [_, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.linear1.forward(x);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.linear2.forward(x)
    }

    /// Same as [forward](Model::forward), rejecting images that are not 1x28x28.
    pub fn try_forward(&self, images: Tensor<B, 4>) -> crate::Result<Tensor<B, 2>> {
        check_input_shape(images.dims())?;
        Ok(self.forward(images))
    }

    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

/// Checks a `[batch, channels, height, width]` shape against the model input.
pub fn check_input_shape(dims: [usize; 4]) -> crate::Result<()> {
    let [batch_size, channels, height, width] = dims;

    if batch_size == 0 || channels != 1 || height != HEIGHT || width != WIDTH {
        return Err(Error::Shape {
            expected: vec![1, HEIGHT, WIDTH],
            actual: dims.to_vec(),
        });
    }

    Ok(())
}

impl<B: AutodiffBackend> TrainStep<DigitBatch<B>, ClassificationOutput<B>> for Model<B> {
    fn step(&self, batch: DigitBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<DigitBatch<B>, ClassificationOutput<B>> for Model<B> {
    fn step(&self, batch: DigitBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}
