use crate::api::error::GradResult;
use crate::api::init::WeightInit;
use crate::api::layer::{Layer, Module};
use crate::api::tensor::Tensor;
use crate::core::ops::matmul;

/// Linear layer: y = x @ W^T + b over `[N, in_features]`.
/// Weights and bias start from U(-1/sqrt(in), 1/sqrt(in)).
pub struct Linear {
    weight: Tensor, // [out_features, in_features]
    bias: Tensor,   // [out_features]
    in_features: usize,
    out_features: usize,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize) -> Self {
        let bound = 1.0 / (in_features.max(1) as f32).sqrt();
        let mut weight = Tensor::rand_uniform([out_features, in_features], -bound, bound);
        weight.set_requires_grad(true);

        let mut bias = Tensor::rand_uniform([out_features], -bound, bound);
        bias.set_requires_grad(true);

        Self {
            weight,
            bias,
            in_features,
            out_features,
        }
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }
}

impl Module for Linear {
    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weight, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.bias]
    }

    fn init_weights(&mut self, init: &WeightInit) -> GradResult<()> {
        let fresh = init.sample(self.weight.shape())?;
        self.weight.update_data_from(&fresh);
        self.bias.update_data_from(&Tensor::zeros([self.out_features]));
        Ok(())
    }
}

impl Layer for Linear {
    fn forward(&mut self, input: &Tensor) -> GradResult<Tensor> {
        matmul::linear(input, &self.weight, Some(&self.bias))
    }
}
