use crate::api::tape::BackwardOp;
use crate::api::tensor::Tensor;
use crate::core::ops::record;

pub fn tanh(x: &Tensor) -> Tensor {
    let output = x.map_raw(f32::tanh);
    record(TanhBackward, &output, &[x], vec![output.clone()]);
    output
}

/// Backward for Tanh: grad_output * (1 - t^2)
/// saved[0] = tanh output
pub struct TanhBackward;

impl BackwardOp for TanhBackward {
    fn backward(&self, grad_output: &Tensor, saved: &[Tensor]) -> Vec<Tensor> {
        let grad_input = grad_output
            .zip_map_raw(&saved[0], |g, t| g * (1.0 - t * t))
            .expect("tanh backward");
        vec![grad_input]
    }

    fn name(&self) -> &str {
        "TanhBackward"
    }
}
