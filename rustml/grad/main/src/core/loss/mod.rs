pub mod bce;
pub mod l1;
pub mod mse;

use crate::api::error::{GradError, GradResult};
use crate::api::tensor::Tensor;

/// Losses compare element by element; targets must match the prediction shape.
pub(crate) fn check_same_shape(predictions: &Tensor, targets: &Tensor) -> GradResult<()> {
    if predictions.shape() != targets.shape() {
        return Err(GradError::ShapeMismatch {
            expected: predictions.shape().to_vec(),
            got: targets.shape().to_vec(),
        });
    }
    Ok(())
}
