use crate::api::config::ModelConfig;
use crate::api::error::Pix2PixResult;
use crate::api::traits::StyledLayer;
use crate::core::generator::check_image_stack;
use crate::core::style_encoder::StyleEncoder;
use crate::core::unet::UnetGenerator;
use rustml_grad::{ops, GradResult, Layer, Linear, Module, Tensor, WeightInit};

/// Feature maps the text U-Net derives from one content image.
const TEXT_CHANNELS: usize = 4;
/// Channels of the joint (text features + target) U-Net output.
const JOINT_CHANNELS: usize = 10;

/// Composite discriminator scoring a target glyph against content and style.
///
/// For every content image: text U-Net -> concat target -> joint U-Net ->
/// style encoder -> linear score. Scores are averaged over the content
/// images and squashed to a probability `[B, 1]`.
pub struct Discriminator {
    style_encoder: StyleEncoder,
    text_unet: UnetGenerator,
    joint_unet: UnetGenerator,
    scorer_encoder: StyleEncoder,
    scorer: Linear,
    image_size: usize,
}

impl Discriminator {
    pub fn new(config: &ModelConfig) -> Pix2PixResult<Self> {
        config.validate()?;
        let (ngf, num_downs) = (config.ngf, config.num_downs);
        Ok(Self {
            style_encoder: StyleEncoder::new(1, ngf, num_downs)?,
            text_unet: UnetGenerator::new(1, TEXT_CHANNELS, num_downs, ngf, true, false)?,
            joint_unet: UnetGenerator::new(
                TEXT_CHANNELS + 1,
                JOINT_CHANNELS,
                num_downs,
                ngf,
                true,
                false,
            )?,
            scorer_encoder: StyleEncoder::new(JOINT_CHANNELS, ngf, num_downs)?,
            scorer: Linear::new(config.style_dim(), 1),
            image_size: config.image_size(),
        })
    }

    /// Mean of the per-image style encodings, `[B, S]`.
    fn encode_style(&mut self, style_images: &Tensor) -> Pix2PixResult<Tensor> {
        check_image_stack("style", style_images, None, self.image_size)?;
        let encoded = ops::split(style_images, 1, 1)?
            .iter()
            .map(|img| self.style_encoder.embed(img))
            .collect::<Pix2PixResult<Vec<_>>>()?;
        let refs: Vec<&Tensor> = encoded.iter().collect();
        Ok(ops::mean_dim(&ops::stack(&refs, 1)?, 1)?)
    }

    /// Probability `[B, 1]` that `target` is a real glyph for this content/style.
    pub fn forward(
        &mut self,
        target: &Tensor,
        style_images: &Tensor,
        content: &Tensor,
    ) -> Pix2PixResult<Tensor> {
        check_image_stack("target", target, Some(1), self.image_size)?;
        check_image_stack("content", content, None, self.image_size)?;
        let style = self.encode_style(style_images)?;

        let mut scores = Vec::with_capacity(content.shape()[1]);
        for img in ops::split(content, 1, 1)? {
            let text = self.text_unet.forward(&img, Some(&style))?;
            let joint = self.joint_unet.forward(&ops::cat(&[&text, target], 1)?, Some(&style))?;
            let features = self.scorer_encoder.embed(&joint)?;
            scores.push(self.scorer.forward(&features)?);
        }
        let refs: Vec<&Tensor> = scores.iter().collect();
        let mean = ops::mean_dim(&ops::stack(&refs, 1)?, 1)?;
        Ok(ops::sigmoid(&mean))
    }
}

impl Module for Discriminator {
    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.style_encoder.parameters();
        params.extend(self.text_unet.parameters());
        params.extend(self.joint_unet.parameters());
        params.extend(self.scorer_encoder.parameters());
        params.extend(self.scorer.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.style_encoder.parameters_mut();
        params.extend(self.text_unet.parameters_mut());
        params.extend(self.joint_unet.parameters_mut());
        params.extend(self.scorer_encoder.parameters_mut());
        params.extend(self.scorer.parameters_mut());
        params
    }

    fn init_weights(&mut self, init: &WeightInit) -> GradResult<()> {
        self.style_encoder.init_weights(init)?;
        self.text_unet.init_weights(init)?;
        self.joint_unet.init_weights(init)?;
        self.scorer_encoder.init_weights(init)?;
        self.scorer.init_weights(init)
    }
}
