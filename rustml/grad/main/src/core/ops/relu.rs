use crate::api::tape::BackwardOp;
use crate::api::tensor::Tensor;
use crate::core::ops::record;

/// max(x, 0).
pub fn relu(x: &Tensor) -> Tensor {
    leaky_relu(x, 0.0)
}

/// x for x > 0, slope * x otherwise.
pub fn leaky_relu(x: &Tensor, slope: f32) -> Tensor {
    let output = x.map_raw(|v| if v > 0.0 { v } else { slope * v });
    record(LeakyReLUBackward { slope }, &output, &[x], vec![x.clone()]);
    output
}

/// Backward for (leaky) ReLU: grad * (1 where input > 0, slope otherwise)
/// saved[0] = input (pre-activation)
pub struct LeakyReLUBackward {
    pub slope: f32,
}

impl BackwardOp for LeakyReLUBackward {
    fn backward(&self, grad_output: &Tensor, saved: &[Tensor]) -> Vec<Tensor> {
        let slope = self.slope;
        let grad_input = grad_output
            .zip_map_raw(&saved[0], |g, x| if x > 0.0 { g } else { g * slope })
            .expect("leaky relu backward");
        vec![grad_input]
    }

    fn name(&self) -> &str {
        if self.slope == 0.0 {
            "ReLUBackward"
        } else {
            "LeakyReLUBackward"
        }
    }
}
