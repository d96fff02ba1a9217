use crate::api::error::{Pix2PixError, Pix2PixResult};
use rustml_grad::{
    ops, Conv2d, GradResult, InitType, InstanceNorm2d, Layer, Module, Tensor, WeightInit,
};

const NEGATIVE_SLOPE: f32 = 0.2;

/// Convolutional encoder from `[B, C, 2^n, 2^n]` images to a `[B, 8ngf]`
/// style vector.
///
/// conv 5x5/s1 -> ngf, then `num_downs - 1` conv 3x3/s2 stages doubling the
/// width up to 8ngf (each with instance norm and LeakyReLU 0.2), then a final
/// 2x2/s2 conv to 8ngf with no norm. All convs are bias-free.
pub struct StyleEncoder {
    stages: Vec<(Conv2d, InstanceNorm2d)>,
    head: Conv2d,
    in_channels: usize,
    style_dim: usize,
}

impl StyleEncoder {
    pub fn new(in_channels: usize, ngf: usize, num_downs: usize) -> Pix2PixResult<Self> {
        if in_channels == 0 || ngf == 0 || num_downs < 2 {
            return Err(Pix2PixError::InvalidConfig(format!(
                "style encoder needs positive widths and num_downs >= 2, got in {in_channels}, ngf {ngf}, num_downs {num_downs}"
            )));
        }
        let style_dim = ngf * 8;
        let mut stages = Vec::with_capacity(num_downs);
        stages.push((
            Conv2d::new(in_channels, ngf, 5, 1, 2, false),
            InstanceNorm2d::new(ngf),
        ));
        let mut width = ngf;
        for _ in 1..num_downs {
            let next = (width * 2).min(style_dim);
            stages.push((Conv2d::new(width, next, 3, 2, 1, false), InstanceNorm2d::new(next)));
            width = next;
        }
        let head = Conv2d::new(width, style_dim, 2, 2, 0, false);

        let mut encoder = Self {
            stages,
            head,
            in_channels,
            style_dim,
        };
        let xavier = WeightInit::new(InitType::XavierUniform, 1.0);
        for (conv, _) in &mut encoder.stages {
            conv.reset_weight(&xavier)?;
        }
        Ok(encoder)
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn style_dim(&self) -> usize {
        self.style_dim
    }

    /// Encode to a flat `[B, style_dim]` embedding.
    pub fn embed(&mut self, input: &Tensor) -> Pix2PixResult<Tensor> {
        let features = self.forward(input)?;
        let batch = features.shape()[0];
        if features.shape()[2..] != [1, 1] {
            return Err(Pix2PixError::ShapeMismatch {
                expected: vec![batch, self.style_dim, 1, 1],
                got: features.shape().to_vec(),
            });
        }
        Ok(ops::reshape(&features, &[batch, self.style_dim])?)
    }
}

impl Module for StyleEncoder {
    fn parameters(&self) -> Vec<&Tensor> {
        self.stages
            .iter()
            .flat_map(|(conv, _)| conv.parameters())
            .chain(self.head.parameters())
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.stages
            .iter_mut()
            .flat_map(|(conv, _)| conv.parameters_mut())
            .chain(self.head.parameters_mut())
            .collect()
    }

    fn init_weights(&mut self, init: &WeightInit) -> GradResult<()> {
        for (conv, _) in &mut self.stages {
            conv.init_weights(init)?;
        }
        self.head.init_weights(init)
    }
}

impl Layer for StyleEncoder {
    fn forward(&mut self, input: &Tensor) -> GradResult<Tensor> {
        let mut x = input.clone();
        for (conv, norm) in &mut self.stages {
            x = ops::leaky_relu(&norm.forward(&conv.forward(&x)?)?, NEGATIVE_SLOPE);
        }
        self.head.forward(&x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustml_grad::tape;

    #[test]
    fn reference_widths_with_default_depth() {
        let encoder = StyleEncoder::new(1, 64, 6).unwrap();
        let widths: Vec<usize> = encoder
            .stages
            .iter()
            .map(|(conv, _)| conv.out_channels())
            .collect();
        assert_eq!(widths, vec![64, 128, 256, 512, 512, 512]);
        assert_eq!(encoder.head.out_channels(), 512);
        assert_eq!(encoder.head.kernel_size(), 2);
        // no biases anywhere
        assert_eq!(encoder.parameters().len(), 7);
    }

    #[test]
    fn embeds_to_style_vector() {
        let mut encoder = StyleEncoder::new(3, 2, 5).unwrap();
        let x = Tensor::randn([2, 3, 32, 32]);
        let s = tape::no_grad(|| encoder.embed(&x)).unwrap();
        assert_eq!(s.shape(), &[2, 16]);
    }

    #[test]
    fn oversized_images_are_rejected() {
        let mut encoder = StyleEncoder::new(1, 2, 5).unwrap();
        let x = Tensor::randn([1, 1, 64, 64]);
        assert!(matches!(
            tape::no_grad(|| encoder.embed(&x)),
            Err(Pix2PixError::ShapeMismatch { .. })
        ));
    }
}
