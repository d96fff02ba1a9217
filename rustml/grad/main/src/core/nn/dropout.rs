use crate::api::error::{GradError, GradResult};
use crate::api::layer::{Layer, Module};
use crate::api::tensor::Tensor;
use crate::core::ops::mul;
use rand::Rng;

/// Inverted dropout: zeroes elements with probability `p` and scales the
/// survivors by `1 / (1 - p)` while training; identity in eval mode.
pub struct Dropout {
    p: f32,
    training: bool,
}

impl Dropout {
    pub fn new(p: f32) -> GradResult<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(GradError::InvalidConfig(format!(
                "dropout probability must be in [0, 1), got {p}"
            )));
        }
        Ok(Self { p, training: true })
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn p(&self) -> f32 {
        self.p
    }
}

impl Module for Dropout {
    fn parameters(&self) -> Vec<&Tensor> {
        vec![]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![]
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

impl Layer for Dropout {
    fn forward(&mut self, input: &Tensor) -> GradResult<Tensor> {
        if !self.training || self.p == 0.0 {
            return Ok(input.clone());
        }

        let scale = 1.0 / (1.0 - self.p);
        let mut rng = rand::thread_rng();
        let mask_data: Vec<f32> = (0..input.numel())
            .map(|_| {
                if rng.r#gen::<f32>() >= self.p {
                    scale
                } else {
                    0.0
                }
            })
            .collect();
        let mask = Tensor::from_vec(mask_data, input.shape())?;

        // the mask is a constant, so only the input receives a gradient
        mul::mul(input, &mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_mode_is_identity() {
        let mut d = Dropout::new(0.5).unwrap();
        d.set_training(false);
        let x = Tensor::ones([4, 4]);
        assert_eq!(d.forward(&x).unwrap().to_vec(), x.to_vec());
    }

    #[test]
    fn training_mode_zeroes_or_scales() {
        let mut d = Dropout::new(0.5).unwrap();
        let y = d.forward(&Tensor::ones([256])).unwrap();
        assert!(y.to_vec().iter().all(|&v| v == 0.0 || v == 2.0));
    }

    #[test]
    fn rejects_out_of_range_probability() {
        assert!(Dropout::new(1.0).is_err());
    }
}
