//! Backends used by the binaries.

/// Backend used at serving time and for evaluation.
#[cfg(feature = "wgpu")]
pub type ServeBackend = burn::backend::Wgpu;

/// Backend used at serving time and for evaluation.
#[cfg(not(feature = "wgpu"))]
pub type ServeBackend = burn::backend::NdArray<f32>;

/// Backend used for training, with gradient tracking.
pub type TrainBackend = burn::backend::Autodiff<ServeBackend>;
