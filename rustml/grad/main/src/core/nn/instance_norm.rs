use crate::api::error::GradResult;
use crate::api::layer::{Layer, Module};
use crate::api::tensor::Tensor;
use crate::core::ops::norm;

/// Instance normalisation over `[N, C, H, W]`.
///
/// Non-affine unless built with [`InstanceNorm2d::affine`]; no running stats.
pub struct InstanceNorm2d {
    num_features: usize,
    eps: f32,
    affine: Option<(Tensor, Tensor)>,
}

impl InstanceNorm2d {
    pub fn new(num_features: usize) -> Self {
        Self {
            num_features,
            eps: 1e-5,
            affine: None,
        }
    }

    /// Learnable per-channel scale (ones) and shift (zeros).
    pub fn affine(num_features: usize) -> Self {
        let mut gamma = Tensor::ones([num_features]);
        gamma.set_requires_grad(true);
        let mut beta = Tensor::zeros([num_features]);
        beta.set_requires_grad(true);
        Self {
            num_features,
            eps: 1e-5,
            affine: Some((gamma, beta)),
        }
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }
}

impl Module for InstanceNorm2d {
    fn parameters(&self) -> Vec<&Tensor> {
        match &self.affine {
            Some((g, b)) => vec![g, b],
            None => vec![],
        }
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        match &mut self.affine {
            Some((g, b)) => vec![g, b],
            None => vec![],
        }
    }
}

impl Layer for InstanceNorm2d {
    fn forward(&mut self, input: &Tensor) -> GradResult<Tensor> {
        let affine = self.affine.as_ref().map(|(g, b)| (g, b));
        norm::instance_norm(input, affine, self.eps)
    }
}
