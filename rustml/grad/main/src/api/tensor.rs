use crate::api::error::{GradError, GradResult};
use ndarray::{ArrayD, ArrayViewD, Axis, Ix2, IxDyn, Slice};
use rand::Rng;
use rand_distr::StandardNormal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorId(pub(crate) u64);

impl TensorId {
    fn next() -> Self {
        TensorId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for TensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TensorId({})", self.0)
    }
}

/// A graph node: an id the gradient tape keys on, plus shared f32 storage.
///
/// Cloning keeps the id, so a clone is the same node of the graph.
/// [`Tensor::detach`] is the only way to get the same data under a new id.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub(crate) id: TensorId,
    pub(crate) data: Arc<ArrayD<f32>>,
    pub(crate) requires_grad: bool,
}

impl Tensor {
    // --- Constructors ---

    pub fn new(data: ArrayD<f32>, requires_grad: bool) -> Self {
        Self {
            id: TensorId::next(),
            data: Arc::new(data),
            requires_grad,
        }
    }

    pub fn from_array(data: ArrayD<f32>) -> Self {
        Self::new(data, false)
    }

    pub fn zeros(shape: impl AsRef<[usize]>) -> Self {
        Self::from_array(ArrayD::zeros(IxDyn(shape.as_ref())))
    }

    pub fn ones(shape: impl AsRef<[usize]>) -> Self {
        Self::from_array(ArrayD::ones(IxDyn(shape.as_ref())))
    }

    pub fn full(shape: impl AsRef<[usize]>, value: f32) -> Self {
        Self::from_array(ArrayD::from_elem(IxDyn(shape.as_ref()), value))
    }

    /// Samples from N(0, 1).
    pub fn randn(shape: impl AsRef<[usize]>) -> Self {
        Self::randn_with(shape, 0.0, 1.0)
    }

    /// Samples from N(mean, std^2).
    pub fn randn_with(shape: impl AsRef<[usize]>, mean: f32, std: f32) -> Self {
        let mut rng = rand::thread_rng();
        let data = ArrayD::from_shape_simple_fn(IxDyn(shape.as_ref()), || {
            let z: f32 = rng.sample(StandardNormal);
            mean + std * z
        });
        Self::from_array(data)
    }

    /// Samples from U(low, high).
    pub fn rand_uniform(shape: impl AsRef<[usize]>, low: f32, high: f32) -> Self {
        let mut rng = rand::thread_rng();
        let span = high - low;
        let data = ArrayD::from_shape_simple_fn(IxDyn(shape.as_ref()), || {
            low + span * rng.r#gen::<f32>()
        });
        Self::from_array(data)
    }

    pub fn from_vec(data: Vec<f32>, shape: impl AsRef<[usize]>) -> GradResult<Self> {
        let shape = shape.as_ref();
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(GradError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }
        let array = ArrayD::from_shape_vec(IxDyn(shape), data)
            .map_err(|e| GradError::InvalidOperation(format!("from_vec: {e}")))?;
        Ok(Self::from_array(array))
    }

    /// A one-element tensor of shape `[1]`, the shape every loss returns.
    pub fn scalar(value: f32) -> Self {
        Self::full([1], value)
    }

    // --- Accessors ---

    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn array(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn view(&self) -> ArrayViewD<'_, f32> {
        self.data.view()
    }

    /// Elements in logical (row-major) order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// First element; the value of a loss.
    pub fn item(&self) -> f32 {
        self.data.iter().next().copied().unwrap_or(0.0)
    }

    /// Same data under a fresh id, cut off from the graph.
    pub fn detach(&self) -> Tensor {
        Tensor {
            id: TensorId::next(),
            data: Arc::clone(&self.data),
            requires_grad: false,
        }
    }

    /// Replace data while preserving TensorId (for optimizer in-place updates).
    pub fn update_data_from(&mut self, other: &Tensor) {
        self.data = Arc::clone(&other.data);
    }

    // --- Raw ops (no tape recording) ---

    pub fn add_raw(&self, other: &Tensor) -> GradResult<Tensor> {
        broadcast_shapes(self.shape(), other.shape())?;
        Ok(Tensor::from_array(&*self.data + &*other.data))
    }

    pub fn sub_raw(&self, other: &Tensor) -> GradResult<Tensor> {
        broadcast_shapes(self.shape(), other.shape())?;
        Ok(Tensor::from_array(&*self.data - &*other.data))
    }

    pub fn mul_raw(&self, other: &Tensor) -> GradResult<Tensor> {
        broadcast_shapes(self.shape(), other.shape())?;
        Ok(Tensor::from_array(&*self.data * &*other.data))
    }

    pub fn div_raw(&self, other: &Tensor) -> GradResult<Tensor> {
        broadcast_shapes(self.shape(), other.shape())?;
        Ok(Tensor::from_array(&*self.data / &*other.data))
    }

    pub fn mul_scalar_raw(&self, scalar: f32) -> Tensor {
        self.map_raw(|x| x * scalar)
    }

    pub fn add_scalar_raw(&self, scalar: f32) -> Tensor {
        self.map_raw(|x| x + scalar)
    }

    pub fn div_scalar_raw(&self, scalar: f32) -> Tensor {
        self.map_raw(|x| x / scalar)
    }

    pub fn neg_raw(&self) -> Tensor {
        self.map_raw(|x| -x)
    }

    pub fn pow_raw(&self, exp: f32) -> Tensor {
        self.map_raw(|x| x.powf(exp))
    }

    pub fn sqrt_raw(&self) -> Tensor {
        self.map_raw(f32::sqrt)
    }

    pub fn exp_raw(&self) -> Tensor {
        self.map_raw(f32::exp)
    }

    pub fn ln_raw(&self) -> Tensor {
        self.map_raw(f32::ln)
    }

    pub fn abs_raw(&self) -> Tensor {
        self.map_raw(f32::abs)
    }

    pub fn map_raw<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Tensor::from_array(self.data.mapv(f))
    }

    /// Element-wise combination of two tensors of identical shape.
    pub fn zip_map_raw<F>(&self, other: &Tensor, f: F) -> GradResult<Tensor>
    where
        F: Fn(f32, f32) -> f32,
    {
        if self.shape() != other.shape() {
            return Err(GradError::ShapeMismatch {
                expected: self.shape().to_vec(),
                got: other.shape().to_vec(),
            });
        }
        let mut out = (*self.data).clone();
        out.zip_mut_with(&other.data, |a, &b| *a = f(*a, b));
        Ok(Tensor::from_array(out))
    }

    pub fn sum_all_raw(&self) -> f32 {
        self.data.sum()
    }

    pub fn mean_all_raw(&self) -> f32 {
        if self.numel() == 0 {
            return 0.0;
        }
        self.data.sum() / self.numel() as f32
    }

    pub fn sum_axis_raw(&self, axis: usize, keepdim: bool) -> GradResult<Tensor> {
        check_axis(axis, self.ndim())?;
        let summed = self.data.sum_axis(Axis(axis));
        let summed = if keepdim {
            summed.insert_axis(Axis(axis))
        } else {
            summed
        };
        Ok(Tensor::from_array(summed))
    }

    pub fn reshape_raw(&self, shape: &[usize]) -> GradResult<Tensor> {
        let numel: usize = shape.iter().product();
        if numel != self.numel() {
            return Err(GradError::ShapeMismatch {
                expected: shape.to_vec(),
                got: self.shape().to_vec(),
            });
        }
        Tensor::from_vec(self.to_vec(), shape)
    }

    pub fn transpose_raw(&self, dim0: usize, dim1: usize) -> GradResult<Tensor> {
        check_axis(dim0, self.ndim())?;
        check_axis(dim1, self.ndim())?;
        let mut view = self.data.view();
        view.swap_axes(dim0, dim1);
        Ok(Tensor::from_array(view.as_standard_layout().into_owned()))
    }

    /// 2-D matrix product `[m, k] @ [k, n] -> [m, n]`.
    pub fn matmul_raw(&self, other: &Tensor) -> GradResult<Tensor> {
        let a = self
            .data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| GradError::InvalidOperation(format!("matmul: lhs must be 2-D, got {:?}", self.shape())))?;
        let b = other
            .data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| GradError::InvalidOperation(format!("matmul: rhs must be 2-D, got {:?}", other.shape())))?;
        if a.ncols() != b.nrows() {
            return Err(GradError::ShapeMismatch {
                expected: vec![a.ncols(), b.ncols()],
                got: other.shape().to_vec(),
            });
        }
        Ok(Tensor::from_array(a.dot(&b).into_dyn()))
    }

    pub fn slice_raw(&self, axis: usize, start: usize, end: usize) -> GradResult<Tensor> {
        check_axis(axis, self.ndim())?;
        let size = self.shape()[axis];
        if start >= end || end > size {
            return Err(GradError::InvalidOperation(format!(
                "slice {start}..{end} out of range for dim {axis} of size {size}"
            )));
        }
        let view = self.data.slice_axis(Axis(axis), Slice::from(start..end));
        Ok(Tensor::from_array(view.to_owned()))
    }

    pub fn cat_raw(tensors: &[&Tensor], axis: usize) -> GradResult<Tensor> {
        let first = tensors
            .first()
            .ok_or_else(|| GradError::InvalidOperation("cat of zero tensors".into()))?;
        check_axis(axis, first.ndim())?;
        for t in tensors.iter().skip(1) {
            let compatible = t.ndim() == first.ndim()
                && t.shape()
                    .iter()
                    .zip(first.shape())
                    .enumerate()
                    .all(|(d, (a, b))| d == axis || a == b);
            if !compatible {
                return Err(GradError::ShapeMismatch {
                    expected: first.shape().to_vec(),
                    got: t.shape().to_vec(),
                });
            }
        }
        let views: Vec<ArrayViewD<'_, f32>> = tensors.iter().map(|t| t.data.view()).collect();
        let out = ndarray::concatenate(Axis(axis), &views)
            .map_err(|e| GradError::InvalidOperation(format!("cat: {e}")))?;
        Ok(Tensor::from_array(out))
    }
}

// --- Helper functions ---

pub(crate) fn check_axis(axis: usize, ndim: usize) -> GradResult<()> {
    if axis < ndim {
        Ok(())
    } else {
        Err(GradError::InvalidDimension {
            dim: axis as i64,
            ndim,
        })
    }
}

/// NumPy-style broadcast of two shapes.
pub(crate) fn broadcast_shapes(a: &[usize], b: &[usize]) -> GradResult<Vec<usize>> {
    let n = a.len().max(b.len());
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let da = if i < n - a.len() { 1 } else { a[i - (n - a.len())] };
        let db = if i < n - b.len() { 1 } else { b[i - (n - b.len())] };
        let d = if da == db || db == 1 {
            da
        } else if da == 1 {
            db
        } else {
            return Err(GradError::ShapeMismatch {
                expected: a.to_vec(),
                got: b.to_vec(),
            });
        };
        out.push(d);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_id_detach_does_not() {
        let t = Tensor::ones([2, 2]);
        assert_eq!(t.clone().id(), t.id());
        let d = t.detach();
        assert_ne!(d.id(), t.id());
        assert_eq!(d.to_vec(), t.to_vec());
    }

    #[test]
    fn broadcast_add() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], [2, 2]).unwrap();
        let b = Tensor::from_vec(vec![10.0, 20.0], [2]).unwrap();
        let c = a.add_raw(&b).unwrap();
        assert_eq!(c.to_vec(), vec![11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn incompatible_shapes_are_rejected() {
        let a = Tensor::zeros([2, 3]);
        let b = Tensor::zeros([2, 4]);
        assert!(matches!(a.add_raw(&b), Err(GradError::ShapeMismatch { .. })));
        assert!(a.matmul_raw(&b).is_err());
    }

    #[test]
    fn from_vec_checks_length() {
        assert!(Tensor::from_vec(vec![1.0; 5], [2, 3]).is_err());
    }

    #[test]
    fn transpose_is_logical() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
        let t = a.transpose_raw(0, 1).unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn cat_and_slice() {
        let a = Tensor::ones([1, 2, 2]);
        let b = Tensor::zeros([1, 3, 2]);
        let c = Tensor::cat_raw(&[&a, &b], 1).unwrap();
        assert_eq!(c.shape(), &[1, 5, 2]);
        let s = c.slice_raw(1, 2, 5).unwrap();
        assert_eq!(s.sum_all_raw(), 0.0);
        assert!(c.slice_raw(1, 4, 6).is_err());
    }

    #[test]
    fn uniform_samples_stay_in_range() {
        let t = Tensor::rand_uniform([1000], -0.5, 0.5);
        assert!(t.to_vec().iter().all(|v| (-0.5..=0.5).contains(v)));
    }
}
