use crate::api::error::GradResult;
use crate::api::tape::BackwardOp;
use crate::api::tensor::{check_axis, Tensor};
use crate::core::ops::record;
use ndarray::Axis;

/// Sum of every element, as a `[1]` tensor.
pub fn sum_all(x: &Tensor) -> Tensor {
    let output = Tensor::scalar(x.sum_all_raw());
    record(
        FillBackward {
            input_shape: x.shape().to_vec(),
            factor: 1.0,
        },
        &output,
        &[x],
        vec![],
    );
    output
}

/// Mean of every element, as a `[1]` tensor.
pub fn mean_all(x: &Tensor) -> Tensor {
    let output = Tensor::scalar(x.mean_all_raw());
    record(
        FillBackward {
            input_shape: x.shape().to_vec(),
            factor: 1.0 / x.numel().max(1) as f32,
        },
        &output,
        &[x],
        vec![],
    );
    output
}

/// Mean over `axis`, which is removed from the shape.
pub fn mean_dim(x: &Tensor, axis: usize) -> GradResult<Tensor> {
    check_axis(axis, x.ndim())?;
    let n = x.shape()[axis];
    let output = x.sum_axis_raw(axis, false)?.div_scalar_raw(n as f32);
    record(
        MeanDimBackward {
            axis,
            size: n,
        },
        &output,
        &[x],
        vec![],
    );
    Ok(output)
}

/// Broadcasts a scalar upstream gradient over the input, times a factor.
struct FillBackward {
    input_shape: Vec<usize>,
    factor: f32,
}

impl BackwardOp for FillBackward {
    fn backward(&self, grad_output: &Tensor, _saved: &[Tensor]) -> Vec<Tensor> {
        vec![Tensor::full(&self.input_shape, grad_output.item() * self.factor)]
    }

    fn name(&self) -> &str {
        "FillBackward"
    }
}

struct MeanDimBackward {
    axis: usize,
    size: usize,
}

impl BackwardOp for MeanDimBackward {
    fn backward(&self, grad_output: &Tensor, _saved: &[Tensor]) -> Vec<Tensor> {
        let expanded = grad_output.array().clone().insert_axis(Axis(self.axis));
        let mut shape = expanded.shape().to_vec();
        shape[self.axis] = self.size;
        let grad = expanded
            .broadcast(shape.as_slice())
            .expect("mean_dim backward broadcast")
            .mapv(|g| g / self.size as f32);
        vec![Tensor::from_array(grad)]
    }

    fn name(&self) -> &str {
        "MeanDimBackward"
    }
}
