#![recursion_limit = "256"]

//! Handwritten digit classifier: a small convolutional network trained on MNIST
//! and the preprocessing chain that turns a user-drawn image into a prediction.

pub mod artifact;
pub mod backend;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod inference;
pub mod logging;
pub mod model;
pub mod preprocess;
pub mod serving;
pub mod training;

pub use error::{DecodeError, Error, Result};

#[cfg(test)]
pub(crate) mod test_utils;
