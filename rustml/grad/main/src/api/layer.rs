use crate::api::error::GradResult;
use crate::api::init::WeightInit;
use crate::api::tensor::Tensor;

/// Anything that owns trainable parameters.
pub trait Module {
    fn parameters(&self) -> Vec<&Tensor>;
    fn parameters_mut(&mut self) -> Vec<&mut Tensor>;

    fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }

    /// Re-initialise conv and linear weights. Containers forward this to
    /// their children; parameter-free modules keep the no-op.
    fn init_weights(&mut self, _init: &WeightInit) -> GradResult<()> {
        Ok(())
    }

    /// Switch train/eval behaviour (dropout).
    fn set_training(&mut self, _training: bool) {}

    /// Freeze or unfreeze every parameter.
    fn set_requires_grad(&mut self, requires_grad: bool) {
        for p in self.parameters_mut() {
            p.set_requires_grad(requires_grad);
        }
    }
}

pub trait Layer: Module {
    fn forward(&mut self, input: &Tensor) -> GradResult<Tensor>;
}
