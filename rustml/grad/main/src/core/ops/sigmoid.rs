use crate::api::tape::BackwardOp;
use crate::api::tensor::Tensor;
use crate::core::ops::record;

pub fn sigmoid(x: &Tensor) -> Tensor {
    let output = x.map_raw(|v| 1.0 / (1.0 + (-v).exp()));
    record(SigmoidBackward, &output, &[x], vec![output.clone()]);
    output
}

/// Backward for Sigmoid: grad_output * s * (1 - s)
/// saved[0] = sigmoid output (not the input)
pub struct SigmoidBackward;

impl BackwardOp for SigmoidBackward {
    fn backward(&self, grad_output: &Tensor, saved: &[Tensor]) -> Vec<Tensor> {
        let grad_input = grad_output
            .zip_map_raw(&saved[0], |g, s| g * s * (1.0 - s))
            .expect("sigmoid backward");
        vec![grad_input]
    }

    fn name(&self) -> &str {
        "SigmoidBackward"
    }
}
