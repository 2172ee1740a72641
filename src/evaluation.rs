use burn::{data::dataloader::DataLoader, prelude::*, train::ValidStep};
use serde::Serialize;

use crate::{data::DigitBatch, model::Model};

/// Top-1 accuracy and mean loss over one partition.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Evaluation {
    pub items: usize,
    pub correct: usize,
    pub accuracy: f64,
    /// Mean cross-entropy over the evaluated batches.
    pub loss: f64,
}

/// Scores `model` on every batch of `loader`.
///
/// The model must live on a backend without autodiff so that no gradients are
/// tracked and dropout is disabled. The loader must not shuffle.
pub fn evaluate<B: Backend>(model: &Model<B>, loader: &dyn DataLoader<DigitBatch<B>>) -> Evaluation {
    let mut items = 0;
    let mut correct = 0;
    let mut batches = 0;
    let mut loss_total = 0.0;

    for batch in loader.iter() {
        let output = ValidStep::step(model, batch);
        let [batch_size] = output.targets.dims();

        let predictions = output.output.argmax(1).squeeze::<1>(1);
        let num_correct = predictions
            .equal(output.targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();

        loss_total += output.loss.into_scalar().elem::<f64>();
        correct += num_correct as usize;
        items += batch_size;
        batches += 1;
    }

    let accuracy = if items == 0 {
        0.0
    } else {
        correct as f64 / items as f64
    };
    let loss = if batches == 0 {
        0.0
    } else {
        loss_total / batches as f64
    };
    log::debug!("Evaluated {items} items: {correct} correct");

    Evaluation {
        items,
        correct,
        accuracy,
        loss,
    }
}
