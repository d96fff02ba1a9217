use crate::api::error::{Pix2PixError, Pix2PixResult};
use crate::api::traits::StyledLayer;
use rustml_grad::{
    ops, ConvTranspose2d, Conv2d, Dropout, GradResult, InstanceNorm2d, Layer, LeakyReLU, Module,
    ReLU, Sequential, Tanh, Tensor, WeightInit,
};

/// Where a block sits in the nesting; decides its layers and skip behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPosition {
    Outermost,
    Middle,
    Innermost,
}

/// One level of the U-Net: `down -> submodule -> up`, plus a skip connection.
///
/// The innermost block optionally concatenates the style embedding onto the
/// 1x1 bottleneck. Every other level hands the style down to its submodule.
pub struct UnetSkipConnectionBlock {
    position: BlockPosition,
    down: Sequential,
    up: Sequential,
    submodule: Option<Box<UnetSkipConnectionBlock>>,
    use_style: bool,
    inner_nc: usize,
}

impl UnetSkipConnectionBlock {
    /// `input_nc` defaults to `outer_nc`. Outermost and middle blocks need a
    /// submodule; the innermost block must not have one.
    pub fn new(
        outer_nc: usize,
        inner_nc: usize,
        input_nc: Option<usize>,
        submodule: Option<Box<UnetSkipConnectionBlock>>,
        position: BlockPosition,
        use_style: bool,
        use_dropout: bool,
    ) -> Pix2PixResult<Self> {
        let input_nc = input_nc.unwrap_or(outer_nc);
        match (position, submodule.is_some()) {
            (BlockPosition::Innermost, true) => {
                return Err(Pix2PixError::InvalidConfig(
                    "innermost U-Net block cannot wrap a submodule".into(),
                ))
            }
            (BlockPosition::Outermost | BlockPosition::Middle, false) => {
                return Err(Pix2PixError::InvalidConfig(format!(
                    "{position:?} U-Net block needs a submodule"
                )))
            }
            _ => {}
        }

        let down_conv: Box<dyn Layer> = Box::new(Conv2d::new(input_nc, inner_nc, 4, 2, 1, true));
        let (down, up) = match position {
            BlockPosition::Outermost => (
                Sequential::new(vec![down_conv]),
                Sequential::new(vec![
                    Box::new(ReLU::new()),
                    Box::new(ConvTranspose2d::new(inner_nc * 2, outer_nc, 4, 2, 1, true)),
                    Box::new(Tanh::new()),
                ]),
            ),
            BlockPosition::Innermost => {
                let up_in = if use_style { inner_nc * 2 } else { inner_nc };
                (
                    Sequential::new(vec![Box::new(LeakyReLU::new(0.2)), down_conv]),
                    Sequential::new(vec![
                        Box::new(ReLU::new()),
                        Box::new(ConvTranspose2d::new(up_in, outer_nc, 4, 2, 1, true)),
                        Box::new(InstanceNorm2d::new(outer_nc)),
                    ]),
                )
            }
            BlockPosition::Middle => {
                let mut up = Sequential::new(vec![
                    Box::new(ReLU::new()),
                    Box::new(ConvTranspose2d::new(inner_nc * 2, outer_nc, 4, 2, 1, true)),
                    Box::new(InstanceNorm2d::new(outer_nc)),
                ]);
                if use_dropout {
                    up.push(Box::new(Dropout::new(0.5)?));
                }
                (
                    Sequential::new(vec![
                        Box::new(LeakyReLU::new(0.2)),
                        down_conv,
                        Box::new(InstanceNorm2d::new(inner_nc)),
                    ]),
                    up,
                )
            }
        };

        Ok(Self {
            position,
            down,
            up,
            submodule,
            use_style,
            inner_nc,
        })
    }

    pub fn position(&self) -> BlockPosition {
        self.position
    }

    /// Append the style `[B, S]` as `[B, S, 1, 1]` channels of the bottleneck.
    fn attach_style(&self, bottleneck: &Tensor, style: Option<&Tensor>) -> Pix2PixResult<Tensor> {
        let style = style.ok_or_else(|| {
            Pix2PixError::InvalidConfig("styled U-Net called without a style embedding".into())
        })?;
        let batch = bottleneck.shape()[0];
        let expected = [batch, self.inner_nc];
        if style.shape() != expected {
            return Err(Pix2PixError::ShapeMismatch {
                expected: expected.to_vec(),
                got: style.shape().to_vec(),
            });
        }
        if bottleneck.shape()[2..] != [1, 1] {
            return Err(Pix2PixError::ShapeMismatch {
                expected: vec![batch, self.inner_nc, 1, 1],
                got: bottleneck.shape().to_vec(),
            });
        }
        let style = ops::reshape(style, &[batch, self.inner_nc, 1, 1])?;
        Ok(ops::cat(&[bottleneck, &style], 1)?)
    }
}

impl Module for UnetSkipConnectionBlock {
    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.down.parameters();
        if let Some(sub) = &self.submodule {
            params.extend(sub.parameters());
        }
        params.extend(self.up.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.down.parameters_mut();
        if let Some(sub) = &mut self.submodule {
            params.extend(sub.parameters_mut());
        }
        params.extend(self.up.parameters_mut());
        params
    }

    fn init_weights(&mut self, init: &WeightInit) -> GradResult<()> {
        self.down.init_weights(init)?;
        if let Some(sub) = &mut self.submodule {
            sub.init_weights(init)?;
        }
        self.up.init_weights(init)
    }

    fn set_training(&mut self, training: bool) {
        self.down.set_training(training);
        if let Some(sub) = &mut self.submodule {
            sub.set_training(training);
        }
        self.up.set_training(training);
    }
}

impl StyledLayer for UnetSkipConnectionBlock {
    fn forward(&mut self, input: &Tensor, style: Option<&Tensor>) -> Pix2PixResult<Tensor> {
        let down = self.down.forward(input)?;
        let mid = if let Some(sub) = self.submodule.as_mut() {
            sub.forward(&down, style)?
        } else if self.use_style {
            self.attach_style(&down, style)?
        } else {
            down
        };
        let up = self.up.forward(&mid)?;
        match self.position {
            BlockPosition::Outermost => Ok(up),
            BlockPosition::Innermost => Ok(ops::cat(&[&up, input], 1)?),
            BlockPosition::Middle => Ok(ops::cat(&[input, &up], 1)?),
        }
    }
}

/// Recursive U-Net encoder-decoder.
///
/// An image of side `2^num_downs` is reduced to a 1x1 bottleneck:
/// innermost(8ngf) <- (num_downs - 5) x middle(8ngf) <- 4ngf <- 2ngf <- ngf
/// <- outermost(output_nc).
pub struct UnetGenerator {
    root: UnetSkipConnectionBlock,
    input_nc: usize,
    output_nc: usize,
    num_downs: usize,
}

impl UnetGenerator {
    pub fn new(
        input_nc: usize,
        output_nc: usize,
        num_downs: usize,
        ngf: usize,
        use_style: bool,
        use_dropout: bool,
    ) -> Pix2PixResult<Self> {
        if num_downs < 5 {
            return Err(Pix2PixError::InvalidConfig(format!(
                "U-Net needs num_downs >= 5, got {num_downs}"
            )));
        }
        let block = |outer, inner, input, sub, position, dropout| {
            UnetSkipConnectionBlock::new(outer, inner, input, sub, position, use_style, dropout)
                .map(Box::new)
        };

        let mut unet = block(ngf * 8, ngf * 8, None, None, BlockPosition::Innermost, false)?;
        for _ in 0..num_downs - 5 {
            unet = block(ngf * 8, ngf * 8, None, Some(unet), BlockPosition::Middle, use_dropout)?;
        }
        unet = block(ngf * 4, ngf * 8, None, Some(unet), BlockPosition::Middle, false)?;
        unet = block(ngf * 2, ngf * 4, None, Some(unet), BlockPosition::Middle, false)?;
        unet = block(ngf, ngf * 2, None, Some(unet), BlockPosition::Middle, false)?;
        let root = UnetSkipConnectionBlock::new(
            output_nc,
            ngf,
            Some(input_nc),
            Some(unet),
            BlockPosition::Outermost,
            use_style,
            false,
        )?;

        Ok(Self {
            root,
            input_nc,
            output_nc,
            num_downs,
        })
    }

    pub fn input_nc(&self) -> usize {
        self.input_nc
    }

    pub fn output_nc(&self) -> usize {
        self.output_nc
    }

    /// Side length that reaches a 1x1 bottleneck.
    pub fn image_size(&self) -> usize {
        1 << self.num_downs
    }
}

impl Module for UnetGenerator {
    fn parameters(&self) -> Vec<&Tensor> {
        self.root.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.root.parameters_mut()
    }

    fn init_weights(&mut self, init: &WeightInit) -> GradResult<()> {
        self.root.init_weights(init)
    }

    fn set_training(&mut self, training: bool) {
        self.root.set_training(training);
    }
}

impl StyledLayer for UnetGenerator {
    fn forward(&mut self, input: &Tensor, style: Option<&Tensor>) -> Pix2PixResult<Tensor> {
        if input.ndim() != 4 || input.shape()[1] != self.input_nc {
            return Err(Pix2PixError::ShapeMismatch {
                expected: vec![input.shape().first().copied().unwrap_or(0), self.input_nc, 0, 0],
                got: input.shape().to_vec(),
            });
        }
        self.root.forward(input, style)
    }
}
