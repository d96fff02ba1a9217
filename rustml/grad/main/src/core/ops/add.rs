use crate::api::error::GradResult;
use crate::api::tape::BackwardOp;
use crate::api::tensor::Tensor;
use crate::core::ops::record;
use ndarray::Axis;

/// C = A + B with broadcasting.
pub fn add(a: &Tensor, b: &Tensor) -> GradResult<Tensor> {
    let output = a.add_raw(b)?;
    record(
        AddBackward {
            a_shape: a.shape().to_vec(),
            b_shape: b.shape().to_vec(),
            negate_b: false,
        },
        &output,
        &[a, b],
        vec![],
    );
    Ok(output)
}

/// C = A - B with broadcasting.
pub fn sub(a: &Tensor, b: &Tensor) -> GradResult<Tensor> {
    let output = a.sub_raw(b)?;
    record(
        AddBackward {
            a_shape: a.shape().to_vec(),
            b_shape: b.shape().to_vec(),
            negate_b: true,
        },
        &output,
        &[a, b],
        vec![],
    );
    Ok(output)
}

/// Backward for C = A ± B
/// grad_A = unbroadcast(grad_output, shape_A)
/// grad_B = ±unbroadcast(grad_output, shape_B)
pub struct AddBackward {
    pub a_shape: Vec<usize>,
    pub b_shape: Vec<usize>,
    pub negate_b: bool,
}

impl BackwardOp for AddBackward {
    fn backward(&self, grad_output: &Tensor, _saved: &[Tensor]) -> Vec<Tensor> {
        let grad_a = unbroadcast(grad_output, &self.a_shape);
        let grad_b = unbroadcast(grad_output, &self.b_shape);
        let grad_b = if self.negate_b { grad_b.neg_raw() } else { grad_b };
        vec![grad_a, grad_b]
    }

    fn name(&self) -> &str {
        if self.negate_b {
            "SubBackward"
        } else {
            "AddBackward"
        }
    }
}

/// Reduce gradient back to the original shape when broadcasting occurred.
pub(crate) fn unbroadcast(grad: &Tensor, target_shape: &[usize]) -> Tensor {
    if grad.shape() == target_shape {
        return grad.clone();
    }

    let mut result = grad.array().clone();

    // Sum over leading dimensions that were broadcast (added)
    while result.ndim() > target_shape.len() {
        result = result.sum_axis(Axis(0));
    }

    // Sum over dimensions that were broadcast from size 1
    for (i, &target_dim) in target_shape.iter().enumerate() {
        if target_dim == 1 && result.shape()[i] != 1 {
            result = result.sum_axis(Axis(i)).insert_axis(Axis(i));
        }
    }

    Tensor::from_array(result)
}
