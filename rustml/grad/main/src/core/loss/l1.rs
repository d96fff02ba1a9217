use crate::api::error::GradResult;
use crate::api::loss::Loss;
use crate::api::tape::BackwardOp;
use crate::api::tensor::Tensor;
use crate::core::loss::check_same_shape;
use crate::core::ops::record;

/// Mean absolute error: mean(|predictions - targets|).
#[derive(Debug, Default, Clone, Copy)]
pub struct L1Loss;

impl L1Loss {
    pub fn new() -> Self {
        Self
    }
}

impl Loss for L1Loss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> GradResult<Tensor> {
        check_same_shape(predictions, targets)?;
        let diff = predictions.sub_raw(targets)?;
        let output = Tensor::scalar(diff.abs_raw().mean_all_raw());

        record(
            L1Backward {
                n: predictions.numel(),
            },
            &output,
            &[predictions],
            vec![diff],
        );
        Ok(output)
    }
}

/// Backward: d(L1)/d(pred) = sign(pred - target) / n, with sign(0) = 0.
/// saved[0] = pred - target
struct L1Backward {
    n: usize,
}

impl BackwardOp for L1Backward {
    fn backward(&self, grad_output: &Tensor, saved: &[Tensor]) -> Vec<Tensor> {
        let scale = grad_output.item() / self.n as f32;
        let grad_pred = saved[0].map_raw(|d| {
            if d > 0.0 {
                scale
            } else if d < 0.0 {
                -scale
            } else {
                0.0
            }
        });
        vec![grad_pred]
    }

    fn name(&self) -> &str {
        "L1Backward"
    }
}
