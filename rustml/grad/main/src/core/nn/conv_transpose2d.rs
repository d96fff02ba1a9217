use crate::api::error::GradResult;
use crate::api::init::WeightInit;
use crate::api::layer::{Layer, Module};
use crate::api::tensor::Tensor;
use crate::core::ops::conv;

/// Transposed 2-D convolution; weight layout `[in_channels, out_channels, k, k]`.
pub struct ConvTranspose2d {
    weight: Tensor,
    bias: Option<Tensor>,
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    padding: usize,
}

impl ConvTranspose2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        bias: bool,
    ) -> Self {
        // torch computes fan_in from dim 1 of the weight here
        let fan_in = out_channels * kernel_size * kernel_size;
        let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
        let mut weight = Tensor::rand_uniform(
            [in_channels, out_channels, kernel_size, kernel_size],
            -bound,
            bound,
        );
        weight.set_requires_grad(true);
        let bias = bias.then(|| {
            let mut b = Tensor::rand_uniform([out_channels], -bound, bound);
            b.set_requires_grad(true);
            b
        });

        Self {
            weight,
            bias,
            in_channels,
            out_channels,
            stride,
            padding,
        }
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

impl Module for ConvTranspose2d {
    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = vec![&self.weight];
        params.extend(self.bias.as_ref());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = vec![&mut self.weight];
        params.extend(self.bias.as_mut());
        params
    }

    fn init_weights(&mut self, init: &WeightInit) -> GradResult<()> {
        let fresh = init.sample(self.weight.shape())?;
        self.weight.update_data_from(&fresh);
        if let Some(bias) = &mut self.bias {
            let zeros = Tensor::zeros(bias.shape());
            bias.update_data_from(&zeros);
        }
        Ok(())
    }
}

impl Layer for ConvTranspose2d {
    fn forward(&mut self, input: &Tensor) -> GradResult<Tensor> {
        conv::conv_transpose2d(
            input,
            &self.weight,
            self.bias.as_ref(),
            self.stride,
            self.padding,
        )
    }
}
