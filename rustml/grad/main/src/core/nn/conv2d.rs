use crate::api::error::GradResult;
use crate::api::init::WeightInit;
use crate::api::layer::{Layer, Module};
use crate::api::tensor::Tensor;
use crate::core::ops::conv;

/// 2-D convolution over `[N, C, H, W]` with a square kernel.
///
/// Weights start from U(-1/sqrt(fan_in), 1/sqrt(fan_in)), as do biases.
pub struct Conv2d {
    weight: Tensor, // [out_channels, in_channels, k, k]
    bias: Option<Tensor>,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

impl Conv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        bias: bool,
    ) -> Self {
        let fan_in = in_channels * kernel_size * kernel_size;
        let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
        let mut weight = Tensor::rand_uniform(
            [out_channels, in_channels, kernel_size, kernel_size],
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
            kernel_size,
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

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Overwrite the weight with a fresh sample, keeping its id.
    pub fn reset_weight(&mut self, init: &WeightInit) -> GradResult<()> {
        let fresh = init.sample(self.weight.shape())?;
        self.weight.update_data_from(&fresh);
        Ok(())
    }

    /// Output spatial size for an input of side `size`.
    pub fn output_size(&self, size: usize) -> usize {
        (size + 2 * self.padding).saturating_sub(self.kernel_size) / self.stride + 1
    }
}

impl Module for Conv2d {
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
        self.reset_weight(init)?;
        if let Some(bias) = &mut self.bias {
            let zeros = Tensor::zeros(bias.shape());
            bias.update_data_from(&zeros);
        }
        Ok(())
    }
}

impl Layer for Conv2d {
    fn forward(&mut self, input: &Tensor) -> GradResult<Tensor> {
        conv::conv2d(
            input,
            &self.weight,
            self.bias.as_ref(),
            self.stride,
            self.padding,
        )
    }
}
