use crate::api::error::{GradError, GradResult};
use crate::api::tape::BackwardOp;
use crate::api::tensor::Tensor;
use crate::core::ops::record;
use ndarray::{Array2, ArrayView2};

/// Sliding-window geometry seen from the image side: an image of
/// `channels x height x width` is read by a `kernel x kernel` window
/// producing `out_h x out_w` positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub kernel: usize,
    pub stride: usize,
    pub padding: usize,
    pub out_h: usize,
    pub out_w: usize,
}

impl ConvGeometry {
    fn new(
        channels: usize,
        height: usize,
        width: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
    ) -> GradResult<Self> {
        if stride == 0 || kernel == 0 {
            return Err(GradError::InvalidOperation(
                "conv kernel and stride must be positive".into(),
            ));
        }
        if height + 2 * padding < kernel || width + 2 * padding < kernel {
            return Err(GradError::InvalidOperation(format!(
                "conv kernel {kernel} larger than padded input {height}x{width} (padding {padding})"
            )));
        }
        Ok(Self {
            channels,
            height,
            width,
            kernel,
            stride,
            padding,
            out_h: (height + 2 * padding - kernel) / stride + 1,
            out_w: (width + 2 * padding - kernel) / stride + 1,
        })
    }

    fn rows(&self) -> usize {
        self.channels * self.kernel * self.kernel
    }

    fn positions(&self) -> usize {
        self.out_h * self.out_w
    }

    fn plane(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Image coordinate read by output position `o` at kernel offset `k`.
    fn source(&self, o: usize, k: usize, limit: usize) -> Option<usize> {
        (o * self.stride + k)
            .checked_sub(self.padding)
            .filter(|&i| i < limit)
    }
}

/// Unfold one `[C, H, W]` image into a `[C*k*k, out_h*out_w]` matrix.
fn im2col(img: &[f32], g: &ConvGeometry) -> Array2<f32> {
    let k = g.kernel;
    let l = g.positions();
    let mut cols = vec![0.0f32; g.rows() * l];
    for c in 0..g.channels {
        let base = c * g.height * g.width;
        for ki in 0..k {
            for kj in 0..k {
                let row = ((c * k + ki) * k + kj) * l;
                for oy in 0..g.out_h {
                    let Some(iy) = g.source(oy, ki, g.height) else {
                        continue;
                    };
                    for ox in 0..g.out_w {
                        if let Some(ix) = g.source(ox, kj, g.width) {
                            cols[row + oy * g.out_w + ox] = img[base + iy * g.width + ix];
                        }
                    }
                }
            }
        }
    }
    Array2::from_shape_vec((g.rows(), l), cols).expect("im2col buffer matches geometry")
}

/// Fold a `[C*k*k, out_h*out_w]` matrix back onto a `[C, H, W]` image, summing overlaps.
fn col2im(cols: &Array2<f32>, g: &ConvGeometry, img: &mut [f32]) {
    let k = g.kernel;
    for c in 0..g.channels {
        let base = c * g.height * g.width;
        for ki in 0..k {
            for kj in 0..k {
                let row = cols.row((c * k + ki) * k + kj);
                for oy in 0..g.out_h {
                    let Some(iy) = g.source(oy, ki, g.height) else {
                        continue;
                    };
                    for ox in 0..g.out_w {
                        if let Some(ix) = g.source(ox, kj, g.width) {
                            img[base + iy * g.width + ix] += row[oy * g.out_w + ox];
                        }
                    }
                }
            }
        }
    }
}

fn check_4d(t: &Tensor, what: &str) -> GradResult<()> {
    if t.ndim() != 4 {
        return Err(GradError::InvalidOperation(format!(
            "{what} must be 4-D, got {:?}",
            t.shape()
        )));
    }
    Ok(())
}

fn check_bias(bias: Option<&Tensor>, channels: usize) -> GradResult<Option<Vec<f32>>> {
    match bias {
        Some(b) if b.shape() != [channels] => Err(GradError::ShapeMismatch {
            expected: vec![channels],
            got: b.shape().to_vec(),
        }),
        Some(b) => Ok(Some(b.to_vec())),
        None => Ok(None),
    }
}

fn matrix(t: &Tensor, rows: usize, cols: usize) -> GradResult<Array2<f32>> {
    Array2::from_shape_vec((rows, cols), t.to_vec())
        .map_err(|e| GradError::InvalidOperation(format!("weight matrix: {e}")))
}

/// 2-D cross-correlation.
///
/// input `[N, C, H, W]`, weight `[O, C, k, k]`, bias `[O]` -> `[N, O, Ho, Wo]`
/// with `Ho = (H + 2p - k) / s + 1`.
pub fn conv2d(
    input: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
    stride: usize,
    padding: usize,
) -> GradResult<Tensor> {
    check_4d(input, "conv2d input")?;
    check_4d(weight, "conv2d weight")?;
    let (n, c, h, w) = (input.shape()[0], input.shape()[1], input.shape()[2], input.shape()[3]);
    let (o, k) = (weight.shape()[0], weight.shape()[2]);
    if weight.shape()[1] != c || weight.shape()[3] != k {
        return Err(GradError::ShapeMismatch {
            expected: vec![o, c, k, k],
            got: weight.shape().to_vec(),
        });
    }
    let bias_data = check_bias(bias, o)?;
    let geo = ConvGeometry::new(c, h, w, k, stride, padding)?;

    let w2 = matrix(weight, o, geo.rows())?;
    let x = input.to_vec();
    let mut out = Vec::with_capacity(n * o * geo.positions());
    for b in 0..n {
        let cols = im2col(&x[b * geo.plane()..(b + 1) * geo.plane()], &geo);
        let mut y = w2.dot(&cols);
        if let Some(bias) = &bias_data {
            for (mut row, &bv) in y.rows_mut().into_iter().zip(bias) {
                row.mapv_inplace(|v| v + bv);
            }
        }
        out.extend(y.iter().copied());
    }
    let output = Tensor::from_vec(out, [n, o, geo.out_h, geo.out_w])?;

    let mut inputs = vec![input, weight];
    if let Some(b) = bias {
        inputs.push(b);
    }
    record(
        Conv2dBackward {
            geo,
            out_channels: o,
            has_bias: bias.is_some(),
        },
        &output,
        &inputs,
        vec![input.clone(), weight.clone()],
    );
    Ok(output)
}

/// Backward for conv2d.
/// saved[0] = input, saved[1] = weight
/// grad_W = sum_n grad_out_n @ cols_n^T
/// grad_x = col2im(W^T @ grad_out_n)
struct Conv2dBackward {
    geo: ConvGeometry,
    out_channels: usize,
    has_bias: bool,
}

impl BackwardOp for Conv2dBackward {
    fn backward(&self, grad_output: &Tensor, saved: &[Tensor]) -> Vec<Tensor> {
        let input = &saved[0];
        let weight = &saved[1];
        let g = &self.geo;
        let (n, o, l) = (input.shape()[0], self.out_channels, g.positions());

        let x = input.to_vec();
        let go = grad_output.to_vec();
        let w2 = matrix(weight, o, g.rows()).expect("conv2d weight matrix");
        let w2_t = w2.t();

        let mut grad_w = Array2::<f32>::zeros((o, g.rows()));
        let mut grad_x = vec![0.0f32; n * g.plane()];
        let mut grad_b = vec![0.0f32; o];
        for b in 0..n {
            let go_b = ArrayView2::from_shape((o, l), &go[b * o * l..(b + 1) * o * l])
                .expect("conv2d grad_output view");
            let cols = im2col(&x[b * g.plane()..(b + 1) * g.plane()], g);
            grad_w += &go_b.dot(&cols.t());
            let grad_cols = w2_t.dot(&go_b);
            col2im(&grad_cols, g, &mut grad_x[b * g.plane()..(b + 1) * g.plane()]);
            for (acc, row) in grad_b.iter_mut().zip(go_b.rows()) {
                *acc += row.sum();
            }
        }

        let mut grads = vec![
            Tensor::from_vec(grad_x, input.shape()).expect("conv2d grad_input"),
            Tensor::from_vec(grad_w.iter().copied().collect(), weight.shape())
                .expect("conv2d grad_weight"),
        ];
        if self.has_bias {
            grads.push(Tensor::from_vec(grad_b, [o]).expect("conv2d grad_bias"));
        }
        grads
    }

    fn name(&self) -> &str {
        "Conv2dBackward"
    }
}

/// 2-D transposed convolution, the adjoint of [`conv2d`].
///
/// input `[N, Cin, H, W]`, weight `[Cin, Cout, k, k]`, bias `[Cout]` ->
/// `[N, Cout, Ho, Wo]` with `Ho = (H - 1) * s - 2p + k`.
pub fn conv_transpose2d(
    input: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
    stride: usize,
    padding: usize,
) -> GradResult<Tensor> {
    check_4d(input, "conv_transpose2d input")?;
    check_4d(weight, "conv_transpose2d weight")?;
    let (n, c_in, h, w) = (input.shape()[0], input.shape()[1], input.shape()[2], input.shape()[3]);
    let (c_out, k) = (weight.shape()[1], weight.shape()[2]);
    if weight.shape()[0] != c_in || weight.shape()[3] != k {
        return Err(GradError::ShapeMismatch {
            expected: vec![c_in, c_out, k, k],
            got: weight.shape().to_vec(),
        });
    }
    if h == 0 || w == 0 || (h - 1) * stride + k <= 2 * padding || (w - 1) * stride + k <= 2 * padding {
        return Err(GradError::InvalidOperation(format!(
            "conv_transpose2d output would be empty for input {h}x{w}"
        )));
    }
    let bias_data = check_bias(bias, c_out)?;
    let out_h = (h - 1) * stride + k - 2 * padding;
    let out_w = (w - 1) * stride + k - 2 * padding;
    let geo = ConvGeometry::new(c_out, out_h, out_w, k, stride, padding)?;
    debug_assert_eq!((geo.out_h, geo.out_w), (h, w));

    let w2 = matrix(weight, c_in, geo.rows())?;
    let w2_t = w2.t();
    let x = input.to_vec();
    let in_plane = c_in * h * w;
    let mut out = vec![0.0f32; n * geo.plane()];
    for b in 0..n {
        let x_b = ArrayView2::from_shape((c_in, h * w), &x[b * in_plane..(b + 1) * in_plane])
            .map_err(|e| GradError::InvalidOperation(format!("conv_transpose2d input: {e}")))?;
        let cols = w2_t.dot(&x_b);
        let img = &mut out[b * geo.plane()..(b + 1) * geo.plane()];
        col2im(&cols, &geo, img);
        if let Some(bias) = &bias_data {
            let spatial = out_h * out_w;
            for (ch, &bv) in bias.iter().enumerate() {
                img[ch * spatial..(ch + 1) * spatial]
                    .iter_mut()
                    .for_each(|v| *v += bv);
            }
        }
    }
    let output = Tensor::from_vec(out, [n, c_out, out_h, out_w])?;

    let mut inputs = vec![input, weight];
    if let Some(b) = bias {
        inputs.push(b);
    }
    record(
        ConvTranspose2dBackward {
            geo,
            has_bias: bias.is_some(),
        },
        &output,
        &inputs,
        vec![input.clone(), weight.clone()],
    );
    Ok(output)
}

/// Backward for conv_transpose2d.
/// saved[0] = input, saved[1] = weight
/// grad_x = W @ im2col(grad_out_n)
/// grad_W = sum_n x_n @ im2col(grad_out_n)^T
struct ConvTranspose2dBackward {
    geo: ConvGeometry,
    has_bias: bool,
}

impl BackwardOp for ConvTranspose2dBackward {
    fn backward(&self, grad_output: &Tensor, saved: &[Tensor]) -> Vec<Tensor> {
        let input = &saved[0];
        let weight = &saved[1];
        let g = &self.geo;
        let (n, c_in) = (input.shape()[0], input.shape()[1]);
        let l = g.positions();
        let spatial = g.height * g.width;

        let x = input.to_vec();
        let go = grad_output.to_vec();
        let w2 = matrix(weight, c_in, g.rows()).expect("conv_transpose2d weight matrix");

        let mut grad_w = Array2::<f32>::zeros((c_in, g.rows()));
        let mut grad_x = Vec::with_capacity(n * c_in * l);
        let mut grad_b = vec![0.0f32; g.channels];
        for b in 0..n {
            let go_b = &go[b * g.plane()..(b + 1) * g.plane()];
            let cols = im2col(go_b, g);
            let x_b = ArrayView2::from_shape((c_in, l), &x[b * c_in * l..(b + 1) * c_in * l])
                .expect("conv_transpose2d input view");
            grad_x.extend(w2.dot(&cols).iter().copied());
            grad_w += &x_b.dot(&cols.t());
            for (ch, acc) in grad_b.iter_mut().enumerate() {
                *acc += go_b[ch * spatial..(ch + 1) * spatial].iter().sum::<f32>();
            }
        }

        let mut grads = vec![
            Tensor::from_vec(grad_x, input.shape()).expect("conv_transpose2d grad_input"),
            Tensor::from_vec(grad_w.iter().copied().collect(), weight.shape())
                .expect("conv_transpose2d grad_weight"),
        ];
        if self.has_bias {
            grads.push(Tensor::from_vec(grad_b, [g.channels]).expect("conv_transpose2d grad_bias"));
        }
        grads
    }

    fn name(&self) -> &str {
        "ConvTranspose2dBackward"
    }
}
