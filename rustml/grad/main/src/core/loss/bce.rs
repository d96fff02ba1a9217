use crate::api::error::{GradError, GradResult};
use crate::api::loss::Loss;
use crate::api::tape::BackwardOp;
use crate::api::tensor::Tensor;
use crate::core::loss::check_same_shape;
use crate::core::ops::record;

/// Log terms are clamped here so that p = 0 or 1 gives a finite loss.
const LOG_FLOOR: f32 = -100.0;
const GRAD_EPS: f32 = 1e-12;

/// Binary cross-entropy over probabilities:
/// -mean(t * ln(p) + (1 - t) * ln(1 - p)).
#[derive(Debug, Default, Clone, Copy)]
pub struct BCELoss;

impl BCELoss {
    pub fn new() -> Self {
        Self
    }
}

impl Loss for BCELoss {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> GradResult<Tensor> {
        check_same_shape(predictions, targets)?;
        if predictions.array().iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(GradError::InvalidOperation(
                "BCE inputs must lie in [0, 1]".into(),
            ));
        }
        let terms = predictions.zip_map_raw(targets, |p, t| {
            t * p.ln().max(LOG_FLOOR) + (1.0 - t) * (1.0 - p).ln().max(LOG_FLOOR)
        })?;
        let output = Tensor::scalar(-terms.mean_all_raw());

        record(
            BCEBackward {
                n: predictions.numel(),
            },
            &output,
            &[predictions],
            vec![predictions.clone(), targets.clone()],
        );
        Ok(output)
    }
}

/// Backward: (p - t) / max(p * (1 - p), eps) / n
/// saved[0] = predictions, saved[1] = targets
struct BCEBackward {
    n: usize,
}

impl BackwardOp for BCEBackward {
    fn backward(&self, grad_output: &Tensor, saved: &[Tensor]) -> Vec<Tensor> {
        let scale = grad_output.item() / self.n as f32;
        let grad_pred = saved[0]
            .zip_map_raw(&saved[1], |p, t| {
                (p - t) / (p * (1.0 - p)).max(GRAD_EPS) * scale
            })
            .expect("bce backward");
        vec![grad_pred]
    }

    fn name(&self) -> &str {
        "BCEBackward"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confident_wrong_prediction_is_clamped() {
        let p = Tensor::from_vec(vec![0.0], [1]).unwrap();
        let t = Tensor::from_vec(vec![1.0], [1]).unwrap();
        let loss = BCELoss::new().forward(&p, &t).unwrap();
        assert!((loss.item() - 100.0).abs() < 1e-3);
    }

    #[test]
    fn half_probability_costs_ln2() {
        let p = Tensor::full([4], 0.5);
        let t = Tensor::from_vec(vec![0.0, 1.0, 0.0, 1.0], [4]).unwrap();
        let loss = BCELoss::new().forward(&p, &t).unwrap();
        assert!((loss.item() - std::f32::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn rejects_values_outside_unit_interval() {
        let p = Tensor::full([2], 1.5);
        let t = Tensor::ones([2]);
        assert!(BCELoss::new().forward(&p, &t).is_err());
    }
}
