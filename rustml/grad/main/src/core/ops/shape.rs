use crate::api::error::{GradError, GradResult};
use crate::api::tape::BackwardOp;
use crate::api::tensor::{check_axis, Tensor};
use crate::core::ops::record;
use ndarray::{ArrayD, Axis, IxDyn, Slice};

pub fn reshape(x: &Tensor, shape: &[usize]) -> GradResult<Tensor> {
    let output = x.reshape_raw(shape)?;
    record(
        ReshapeBackward {
            input_shape: x.shape().to_vec(),
        },
        &output,
        &[x],
        vec![],
    );
    Ok(output)
}

/// Drop a dimension of size 1.
pub fn squeeze(x: &Tensor, dim: usize) -> GradResult<Tensor> {
    check_axis(dim, x.ndim())?;
    if x.shape()[dim] != 1 {
        return Err(GradError::InvalidOperation(format!(
            "cannot squeeze dim {dim} of size {}",
            x.shape()[dim]
        )));
    }
    let mut shape = x.shape().to_vec();
    shape.remove(dim);
    reshape(x, &shape)
}

/// Insert a dimension of size 1 at `dim`.
pub fn unsqueeze(x: &Tensor, dim: usize) -> GradResult<Tensor> {
    if dim > x.ndim() {
        return Err(GradError::InvalidDimension {
            dim: dim as i64,
            ndim: x.ndim(),
        });
    }
    let mut shape = x.shape().to_vec();
    shape.insert(dim, 1);
    reshape(x, &shape)
}

/// x[.., start..end, ..] along `axis`.
pub fn slice(x: &Tensor, axis: usize, start: usize, end: usize) -> GradResult<Tensor> {
    let output = x.slice_raw(axis, start, end)?;
    record(
        SliceBackward {
            input_shape: x.shape().to_vec(),
            axis,
            start,
            end,
        },
        &output,
        &[x],
        vec![],
    );
    Ok(output)
}

/// Chunks of `size` along `axis`; the last chunk may be shorter.
pub fn split(x: &Tensor, size: usize, axis: usize) -> GradResult<Vec<Tensor>> {
    check_axis(axis, x.ndim())?;
    if size == 0 {
        return Err(GradError::InvalidOperation(
            "split size must be greater than 0".into(),
        ));
    }
    let len = x.shape()[axis];
    (0..len)
        .step_by(size)
        .map(|start| slice(x, axis, start, (start + size).min(len)))
        .collect()
}

pub fn cat(tensors: &[&Tensor], axis: usize) -> GradResult<Tensor> {
    let output = Tensor::cat_raw(tensors, axis)?;
    record(
        CatBackward {
            axis,
            sizes: tensors.iter().map(|t| t.shape()[axis]).collect(),
        },
        &output,
        tensors,
        vec![],
    );
    Ok(output)
}

/// Join equally shaped tensors along a new dimension at `axis`.
pub fn stack(tensors: &[&Tensor], axis: usize) -> GradResult<Tensor> {
    let first = tensors
        .first()
        .ok_or_else(|| GradError::InvalidOperation("stack of zero tensors".into()))?;
    for t in tensors.iter().skip(1) {
        if t.shape() != first.shape() {
            return Err(GradError::ShapeMismatch {
                expected: first.shape().to_vec(),
                got: t.shape().to_vec(),
            });
        }
    }
    let expanded = tensors
        .iter()
        .map(|t| unsqueeze(t, axis))
        .collect::<GradResult<Vec<_>>>()?;
    let refs: Vec<&Tensor> = expanded.iter().collect();
    cat(&refs, axis)
}

struct ReshapeBackward {
    input_shape: Vec<usize>,
}

impl BackwardOp for ReshapeBackward {
    fn backward(&self, grad_output: &Tensor, _saved: &[Tensor]) -> Vec<Tensor> {
        vec![grad_output
            .reshape_raw(&self.input_shape)
            .expect("reshape backward")]
    }

    fn name(&self) -> &str {
        "ReshapeBackward"
    }
}

/// Scatters the gradient back into a zero tensor of the input's shape.
struct SliceBackward {
    input_shape: Vec<usize>,
    axis: usize,
    start: usize,
    end: usize,
}

impl BackwardOp for SliceBackward {
    fn backward(&self, grad_output: &Tensor, _saved: &[Tensor]) -> Vec<Tensor> {
        let mut grad = ArrayD::<f32>::zeros(IxDyn(&self.input_shape));
        grad.slice_axis_mut(Axis(self.axis), Slice::from(self.start..self.end))
            .assign(grad_output.array());
        vec![Tensor::from_array(grad)]
    }

    fn name(&self) -> &str {
        "SliceBackward"
    }
}

struct CatBackward {
    axis: usize,
    sizes: Vec<usize>,
}

impl BackwardOp for CatBackward {
    fn backward(&self, grad_output: &Tensor, _saved: &[Tensor]) -> Vec<Tensor> {
        let mut offset = 0;
        self.sizes
            .iter()
            .map(|&size| {
                let part = grad_output
                    .slice_raw(self.axis, offset, offset + size)
                    .expect("cat backward slice");
                offset += size;
                part
            })
            .collect()
    }

    fn name(&self) -> &str {
        "CatBackward"
    }
}
