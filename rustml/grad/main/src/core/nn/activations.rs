use crate::api::error::GradResult;
use crate::api::layer::{Layer, Module};
use crate::api::tensor::Tensor;
use crate::core::ops::{relu, sigmoid, tanh};

macro_rules! parameter_free {
    ($($ty:ty),*) => {
        $(impl Module for $ty {
            fn parameters(&self) -> Vec<&Tensor> {
                vec![]
            }

            fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
                vec![]
            }
        })*
    };
}

parameter_free!(ReLU, LeakyReLU, Tanh, Sigmoid);

#[derive(Debug, Default, Clone, Copy)]
pub struct ReLU;

impl ReLU {
    pub fn new() -> Self {
        Self
    }
}

impl Layer for ReLU {
    fn forward(&mut self, input: &Tensor) -> GradResult<Tensor> {
        Ok(relu::relu(input))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LeakyReLU {
    negative_slope: f32,
}

impl LeakyReLU {
    pub fn new(negative_slope: f32) -> Self {
        Self { negative_slope }
    }
}

impl Default for LeakyReLU {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl Layer for LeakyReLU {
    fn forward(&mut self, input: &Tensor) -> GradResult<Tensor> {
        Ok(relu::leaky_relu(input, self.negative_slope))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Tanh;

impl Tanh {
    pub fn new() -> Self {
        Self
    }
}

impl Layer for Tanh {
    fn forward(&mut self, input: &Tensor) -> GradResult<Tensor> {
        Ok(tanh::tanh(input))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Sigmoid;

impl Sigmoid {
    pub fn new() -> Self {
        Self
    }
}

impl Layer for Sigmoid {
    fn forward(&mut self, input: &Tensor) -> GradResult<Tensor> {
        Ok(sigmoid::sigmoid(input))
    }
}
