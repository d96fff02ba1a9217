// SAF (Simple API Facade): re-exports for convenient access

// API traits and types
pub use crate::api::error::{GradError, GradResult};
pub use crate::api::init::{InitType, WeightInit};
pub use crate::api::layer::{Layer, Module};
pub use crate::api::loss::Loss;
pub use crate::api::optim::{LRScheduler, Optimizer};
pub use crate::api::tape;
pub use crate::api::tensor::{Tensor, TensorId};

/// Differentiable functions, recorded on the tape when it is enabled.
pub mod ops {
    pub use crate::core::ops::add::{add, sub};
    pub use crate::core::ops::conv::{conv2d, conv_transpose2d};
    pub use crate::core::ops::matmul::{linear, matmul};
    pub use crate::core::ops::mul::{mul, scale};
    pub use crate::core::ops::norm::instance_norm;
    pub use crate::core::ops::reduce::{mean_all, mean_dim, sum_all};
    pub use crate::core::ops::relu::{leaky_relu, relu};
    pub use crate::core::ops::shape::{cat, reshape, slice, split, squeeze, stack, unsqueeze};
    pub use crate::core::ops::sigmoid::sigmoid;
    pub use crate::core::ops::tanh::tanh;
}

// Loss functions
pub use crate::core::loss::bce::BCELoss;
pub use crate::core::loss::l1::L1Loss;
pub use crate::core::loss::mse::MSELoss;

// Neural network layers
pub use crate::core::nn::activations::{LeakyReLU, ReLU, Sigmoid, Tanh};
pub use crate::core::nn::conv2d::Conv2d;
pub use crate::core::nn::conv_transpose2d::ConvTranspose2d;
pub use crate::core::nn::dropout::Dropout;
pub use crate::core::nn::gru::Gru;
pub use crate::core::nn::instance_norm::InstanceNorm2d;
pub use crate::core::nn::linear::Linear;
pub use crate::core::nn::sequential::Sequential;

// Optimizers
pub use crate::core::optim::adam::Adam;

// LR Schedulers
pub use crate::core::optim::schedulers::{CosineAnnealingLR, LinearDecayLR, StepLR};

// Training
pub use crate::core::training::metrics::LossMeter;
pub use crate::core::training::summary::model_summary;

// Serialization
pub use crate::core::checkpoint::{load_checkpoint, save_checkpoint, Checkpoint, SavedParam};
