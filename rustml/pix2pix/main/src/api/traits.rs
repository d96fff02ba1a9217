use crate::api::error::Pix2PixResult;
use rustml_grad::{Module, Tensor};

/// A network whose forward pass optionally takes a style embedding `[B, S]`.
pub trait StyledLayer: Module {
    fn forward(&mut self, input: &Tensor, style: Option<&Tensor>) -> Pix2PixResult<Tensor>;
}
