use crate::api::error::GradResult;
use crate::api::tensor::Tensor;

pub trait Loss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> GradResult<Tensor>;
}
