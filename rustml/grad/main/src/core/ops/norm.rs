use crate::api::error::{GradError, GradResult};
use crate::api::tape::BackwardOp;
use crate::api::tensor::Tensor;
use crate::core::ops::record;

/// Per-sample, per-channel normalisation over the spatial dims of `[N, C, H, W]`.
///
/// `y = (x - mean) / sqrt(var + eps) * gamma + beta`, with biased variance.
/// `affine` is `Some((gamma, beta))`, each of shape `[C]`.
pub fn instance_norm(
    input: &Tensor,
    affine: Option<(&Tensor, &Tensor)>,
    eps: f32,
) -> GradResult<Tensor> {
    if input.ndim() != 4 {
        return Err(GradError::InvalidOperation(format!(
            "instance_norm expects [N, C, H, W], got {:?}",
            input.shape()
        )));
    }
    let (n, c) = (input.shape()[0], input.shape()[1]);
    let m = input.shape()[2] * input.shape()[3];
    if m < 2 {
        return Err(GradError::InvalidOperation(format!(
            "instance_norm expected more than 1 spatial element, got input {:?}",
            input.shape()
        )));
    }
    let (gamma, beta) = match affine {
        Some((g, b)) => {
            for t in [g, b] {
                if t.shape() != [c] {
                    return Err(GradError::ShapeMismatch {
                        expected: vec![c],
                        got: t.shape().to_vec(),
                    });
                }
            }
            (g.to_vec(), b.to_vec())
        }
        None => (vec![1.0; c], vec![0.0; c]),
    };

    let x = input.to_vec();
    let mut x_hat = vec![0.0f32; x.len()];
    let mut inv_std = vec![0.0f32; n * c];
    let mut out = vec![0.0f32; x.len()];
    for plane in 0..n * c {
        let ch = plane % c;
        let xs = &x[plane * m..(plane + 1) * m];
        let mean = xs.iter().sum::<f32>() / m as f32;
        let var = xs.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / m as f32;
        let istd = 1.0 / (var + eps).sqrt();
        inv_std[plane] = istd;
        for i in 0..m {
            let xh = (xs[i] - mean) * istd;
            x_hat[plane * m + i] = xh;
            out[plane * m + i] = xh * gamma[ch] + beta[ch];
        }
    }
    let output = Tensor::from_vec(out, input.shape())?;

    let shape = input.shape().to_vec();
    let mut inputs = vec![input];
    if let Some((g, b)) = affine {
        inputs.push(g);
        inputs.push(b);
    }
    record(
        InstanceNormBackward {
            channels: c,
            spatial: m,
            gamma,
            inv_std,
            affine: affine.is_some(),
        },
        &output,
        &inputs,
        vec![Tensor::from_vec(x_hat, &shape)?],
    );
    Ok(output)
}

/// Backward for instance norm, per plane of M elements:
/// dx = inv_std / M * (M * dx_hat - sum(dx_hat) - x_hat * sum(dx_hat * x_hat))
/// saved[0] = x_hat
struct InstanceNormBackward {
    channels: usize,
    spatial: usize,
    gamma: Vec<f32>,
    inv_std: Vec<f32>,
    affine: bool,
}

impl BackwardOp for InstanceNormBackward {
    fn backward(&self, grad_output: &Tensor, saved: &[Tensor]) -> Vec<Tensor> {
        let x_hat = saved[0].to_vec();
        let dy = grad_output.to_vec();
        let (c, m) = (self.channels, self.spatial);
        let mf = m as f32;

        let mut dx = vec![0.0f32; dy.len()];
        let mut d_gamma = vec![0.0f32; c];
        let mut d_beta = vec![0.0f32; c];
        for (plane, &istd) in self.inv_std.iter().enumerate() {
            let ch = plane % c;
            let range = plane * m..(plane + 1) * m;
            let (dys, xhs) = (&dy[range.clone()], &x_hat[range]);
            let mut sum_dxh = 0.0f32;
            let mut sum_dxh_xh = 0.0f32;
            for (&g, &xh) in dys.iter().zip(xhs) {
                let dxh = g * self.gamma[ch];
                sum_dxh += dxh;
                sum_dxh_xh += dxh * xh;
                d_gamma[ch] += g * xh;
                d_beta[ch] += g;
            }
            for i in 0..m {
                let dxh = dys[i] * self.gamma[ch];
                dx[plane * m + i] = istd / mf * (mf * dxh - sum_dxh - xhs[i] * sum_dxh_xh);
            }
        }

        let mut grads =
            vec![Tensor::from_vec(dx, grad_output.shape()).expect("instance_norm grad_input")];
        if self.affine {
            grads.push(Tensor::from_vec(d_gamma, [c]).expect("instance_norm grad_gamma"));
            grads.push(Tensor::from_vec(d_beta, [c]).expect("instance_norm grad_beta"));
        }
        grads
    }

    fn name(&self) -> &str {
        "InstanceNormBackward"
    }
}
