use crate::api::config::ModelConfig;
use crate::api::error::{Pix2PixError, Pix2PixResult};
use crate::api::traits::StyledLayer;
use crate::core::style_encoder::StyleEncoder;
use crate::core::unet::UnetGenerator;
use rustml_grad::{ops, GradResult, Gru, Layer, Module, Tensor, WeightInit};

/// Check a `[B, N, H, W]` stack of single-channel images.
pub(crate) fn check_image_stack(
    name: &str,
    images: &Tensor,
    count: Option<usize>,
    side: usize,
) -> Pix2PixResult<()> {
    let shape = images.shape();
    let ok = shape.len() == 4
        && shape[1] > 0
        && count.map_or(true, |c| shape[1] == c)
        && shape[2] == side
        && shape[3] == side;
    if !ok {
        log::debug!("rejected {name} images with shape {shape:?}");
        return Err(Pix2PixError::ShapeMismatch {
            expected: vec![
                shape.first().copied().unwrap_or(0),
                count.unwrap_or(0),
                side,
                side,
            ],
            got: shape.to_vec(),
        });
    }
    Ok(())
}

/// Style-conditioned glyph generator.
///
/// Style images are encoded one by one, summarised by a bidirectional GRU and
/// averaged into a style vector. Each content image then passes a styled
/// U-Net, and a final unstyled U-Net fuses the stack into one image in [0, 1].
pub struct Generator {
    style_encoder: StyleEncoder,
    style_memory: Gru,
    content_unet: UnetGenerator,
    fusion_unet: UnetGenerator,
    content_count: usize,
    image_size: usize,
}

impl Generator {
    pub fn new(config: &ModelConfig) -> Pix2PixResult<Self> {
        config.validate()?;
        let style_dim = config.style_dim();
        Ok(Self {
            style_encoder: StyleEncoder::new(1, config.ngf, config.num_downs)?,
            style_memory: Gru::new(style_dim, style_dim / 2, 2, true)?,
            content_unet: UnetGenerator::new(
                1,
                1,
                config.num_downs,
                config.ngf,
                true,
                config.use_dropout,
            )?,
            fusion_unet: UnetGenerator::new(
                config.content_count,
                1,
                config.num_downs,
                config.ngf,
                false,
                config.use_dropout,
            )?,
            content_count: config.content_count,
            image_size: config.image_size(),
        })
    }

    /// `[B, K, H, W]` style images to a `[B, S]` embedding.
    pub fn encode_style(&mut self, style_images: &Tensor) -> Pix2PixResult<Tensor> {
        check_image_stack("style", style_images, None, self.image_size)?;
        let encoded = ops::split(style_images, 1, 1)?
            .iter()
            .map(|img| self.style_encoder.embed(img))
            .collect::<Pix2PixResult<Vec<_>>>()?;
        let refs: Vec<&Tensor> = encoded.iter().collect();
        let sequence = ops::stack(&refs, 1)?;
        let memory = self.style_memory.forward(&sequence)?;
        Ok(ops::mean_dim(&memory, 1)?)
    }

    /// `content [B, C, H, W]` and `style [B, K, H, W]` to `[B, 1, H, W]`.
    pub fn forward(&mut self, content: &Tensor, style_images: &Tensor) -> Pix2PixResult<Tensor> {
        check_image_stack("content", content, Some(self.content_count), self.image_size)?;
        if style_images.shape().first() != content.shape().first() {
            return Err(Pix2PixError::ShapeMismatch {
                expected: vec![content.shape()[0], 0, self.image_size, self.image_size],
                got: style_images.shape().to_vec(),
            });
        }
        let style = self.encode_style(style_images)?;

        let styled = ops::split(content, 1, 1)?
            .iter()
            .map(|img| self.content_unet.forward(img, Some(&style)))
            .collect::<Pix2PixResult<Vec<_>>>()?;
        let refs: Vec<&Tensor> = styled.iter().collect();
        let stacked = ops::cat(&refs, 1)?;
        let fused = self.fusion_unet.forward(&stacked, None)?;
        Ok(ops::scale(&fused, 0.5, 0.5))
    }

    pub fn content_count(&self) -> usize {
        self.content_count
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }
}

impl Module for Generator {
    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.style_encoder.parameters();
        params.extend(self.style_memory.parameters());
        params.extend(self.content_unet.parameters());
        params.extend(self.fusion_unet.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.style_encoder.parameters_mut();
        params.extend(self.style_memory.parameters_mut());
        params.extend(self.content_unet.parameters_mut());
        params.extend(self.fusion_unet.parameters_mut());
        params
    }

    /// The GRU keeps its own uniform init.
    fn init_weights(&mut self, init: &WeightInit) -> GradResult<()> {
        self.style_encoder.init_weights(init)?;
        self.content_unet.init_weights(init)?;
        self.fusion_unet.init_weights(init)
    }

    fn set_training(&mut self, training: bool) {
        self.content_unet.set_training(training);
        self.fusion_unet.set_training(training);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustml_grad::tape;

    fn tiny() -> ModelConfig {
        ModelConfig {
            ngf: 2,
            num_downs: 5,
            content_count: 2,
            use_dropout: false,
        }
    }

    #[test]
    fn output_is_one_image_in_unit_range() {
        let mut g = Generator::new(&tiny()).unwrap();
        let content = Tensor::rand_uniform([2, 2, 32, 32], 0.0, 1.0);
        let style = Tensor::rand_uniform([2, 3, 32, 32], 0.0, 1.0);
        let fake = tape::no_grad(|| g.forward(&content, &style)).unwrap();
        assert_eq!(fake.shape(), &[2, 1, 32, 32]);
        assert!(fake.to_vec().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn style_embedding_has_style_dim() {
        let mut g = Generator::new(&tiny()).unwrap();
        let style = Tensor::rand_uniform([1, 4, 32, 32], 0.0, 1.0);
        let s = tape::no_grad(|| g.encode_style(&style)).unwrap();
        assert_eq!(s.shape(), &[1, 16]);
    }

    #[test]
    fn wrong_content_count_is_rejected() {
        let mut g = Generator::new(&tiny()).unwrap();
        let content = Tensor::zeros([1, 3, 32, 32]);
        let style = Tensor::zeros([1, 2, 32, 32]);
        assert!(matches!(
            tape::no_grad(|| g.forward(&content, &style)),
            Err(Pix2PixError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn init_leaves_gru_untouched() {
        let mut g = Generator::new(&tiny()).unwrap();
        let before: Vec<Vec<f32>> = g.style_memory.parameters().iter().map(|p| p.to_vec()).collect();
        g.init_weights(&WeightInit::default()).unwrap();
        let after: Vec<Vec<f32>> = g.style_memory.parameters().iter().map(|p| p.to_vec()).collect();
        assert_eq!(before, after);
    }
}
