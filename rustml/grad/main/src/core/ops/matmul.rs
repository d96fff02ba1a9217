use crate::api::error::{GradError, GradResult};
use crate::api::tape::BackwardOp;
use crate::api::tensor::Tensor;
use crate::core::ops::add::unbroadcast;
use crate::core::ops::record;

/// C = A @ B for 2-D operands.
pub fn matmul(a: &Tensor, b: &Tensor) -> GradResult<Tensor> {
    let output = a.matmul_raw(b)?;
    record(MatMulBackward, &output, &[a, b], vec![a.clone(), b.clone()]);
    Ok(output)
}

/// y = x @ W^T + b, x: [N, in], W: [out, in], b: [out].
pub fn linear(input: &Tensor, weight: &Tensor, bias: Option<&Tensor>) -> GradResult<Tensor> {
    if input.ndim() != 2 || weight.ndim() != 2 || input.shape()[1] != weight.shape()[1] {
        return Err(GradError::ShapeMismatch {
            expected: vec![input.shape().first().copied().unwrap_or(0), weight.shape()[1]],
            got: input.shape().to_vec(),
        });
    }
    let weight_t = weight.transpose_raw(0, 1)?;
    let mut output = input.matmul_raw(&weight_t)?;
    if let Some(bias) = bias {
        output = output.add_raw(bias)?;
    }

    let mut inputs = vec![input, weight];
    if let Some(bias) = bias {
        inputs.push(bias);
    }
    record(
        LinearBackward {
            bias_shape: bias.map(|b| b.shape().to_vec()),
        },
        &output,
        &inputs,
        vec![input.clone(), weight.clone()],
    );
    Ok(output)
}

/// Backward for C = A @ B
/// saved[0] = A, saved[1] = B
/// grad_A = grad_output @ B^T
/// grad_B = A^T @ grad_output
pub struct MatMulBackward;

impl BackwardOp for MatMulBackward {
    fn backward(&self, grad_output: &Tensor, saved: &[Tensor]) -> Vec<Tensor> {
        let a = &saved[0];
        let b = &saved[1];

        // grad_A = grad_output @ B^T
        let b_t = b.transpose_raw(0, 1).expect("transpose B");
        let grad_a = grad_output.matmul_raw(&b_t).expect("matmul grad_a");

        // grad_B = A^T @ grad_output
        let a_t = a.transpose_raw(0, 1).expect("transpose A");
        let grad_b = a_t.matmul_raw(grad_output).expect("matmul grad_b");

        vec![grad_a, grad_b]
    }

    fn name(&self) -> &str {
        "MatMulBackward"
    }
}

/// Combined backward for linear: input, weight and (optional) bias gradients.
/// saved[0] = input, saved[1] = weight
struct LinearBackward {
    bias_shape: Option<Vec<usize>>,
}

impl BackwardOp for LinearBackward {
    fn backward(&self, grad_output: &Tensor, saved: &[Tensor]) -> Vec<Tensor> {
        let input = &saved[0];
        let weight = &saved[1];

        // grad_input = grad_output @ weight  ([N, out] @ [out, in] -> [N, in])
        let grad_input = grad_output.matmul_raw(weight).expect("linear grad_input");

        // grad_weight = grad_output^T @ input  ([out, N] @ [N, in] -> [out, in])
        let grad_output_t = grad_output.transpose_raw(0, 1).expect("transpose grad");
        let grad_weight = grad_output_t.matmul_raw(input).expect("linear grad_weight");

        let mut grads = vec![grad_input, grad_weight];
        if let Some(shape) = &self.bias_shape {
            grads.push(unbroadcast(grad_output, shape));
        }
        grads
    }

    fn name(&self) -> &str {
        "LinearBackward"
    }
}
