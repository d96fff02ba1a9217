use crate::api::error::GradResult;
use crate::api::loss::Loss;
use crate::api::tape::BackwardOp;
use crate::api::tensor::Tensor;
use crate::core::loss::check_same_shape;
use crate::core::ops::record;

/// Mean squared error.
#[derive(Debug, Default, Clone, Copy)]
pub struct MSELoss;

impl MSELoss {
    pub fn new() -> Self {
        Self
    }
}

impl Loss for MSELoss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> GradResult<Tensor> {
        check_same_shape(predictions, targets)?;
        // MSE = mean((pred - target)^2)
        let diff = predictions.sub_raw(targets)?;
        let output = Tensor::scalar(diff.pow_raw(2.0).mean_all_raw());

        record(
            MSEBackward {
                n: predictions.numel(),
            },
            &output,
            &[predictions],
            vec![diff],
        );
        Ok(output)
    }
}

/// Backward: d(MSE)/d(pred) = 2 * (pred - target) / n
/// saved[0] = pred - target
struct MSEBackward {
    n: usize,
}

impl BackwardOp for MSEBackward {
    fn backward(&self, grad_output: &Tensor, saved: &[Tensor]) -> Vec<Tensor> {
        let scale = 2.0 / self.n as f32 * grad_output.item();
        vec![saved[0].mul_scalar_raw(scale)]
    }

    fn name(&self) -> &str {
        "MSEBackward"
    }
}
