use crate::api::error::GradResult;
use crate::api::optim::Optimizer;
use crate::api::tape;
use crate::api::tensor::{Tensor, TensorId};
use std::collections::HashMap;

/// Adam (Kingma & Ba, 2014) with optional L2 weight decay folded into the
/// gradient.
///
/// Parameters that are frozen (`requires_grad == false`) or that received no
/// gradient in the last backward pass are left untouched, and their moment
/// estimates are not advanced.
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    /// Global step counter (incremented once per `step()` call).
    t: u64,
    /// First moment estimates (mean of gradients).
    m: HashMap<TensorId, Tensor>,
    /// Second moment estimates (mean of squared gradients).
    v: HashMap<TensorId, Tensor>,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.0,
            t: 0,
            m: HashMap::new(),
            v: HashMap::new(),
        }
    }

    pub fn with_betas(mut self, beta1: f32, beta2: f32) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn betas(&self) -> (f32, f32) {
        (self.beta1, self.beta2)
    }

    pub fn steps_taken(&self) -> u64 {
        self.t
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Tensor]) -> GradResult<()> {
        self.t += 1;
        let t = self.t as i32;
        let bias_correction1 = 1.0 - self.beta1.powi(t);
        let bias_correction2 = 1.0 - self.beta2.powi(t);

        for param in params.iter_mut() {
            if !param.requires_grad() {
                continue;
            }
            let Some(mut grad) = tape::grad(param) else {
                continue;
            };
            let param_id = param.id();

            if self.weight_decay > 0.0 {
                grad = grad.add_raw(&param.mul_scalar_raw(self.weight_decay))?;
            }

            let m_new = match self.m.get(&param_id) {
                Some(m_prev) => m_prev
                    .mul_scalar_raw(self.beta1)
                    .add_raw(&grad.mul_scalar_raw(1.0 - self.beta1))?,
                None => grad.mul_scalar_raw(1.0 - self.beta1),
            };

            let grad_sq = grad.mul_raw(&grad)?;
            let v_new = match self.v.get(&param_id) {
                Some(v_prev) => v_prev
                    .mul_scalar_raw(self.beta2)
                    .add_raw(&grad_sq.mul_scalar_raw(1.0 - self.beta2))?,
                None => grad_sq.mul_scalar_raw(1.0 - self.beta2),
            };

            // param -= lr * m_hat / (sqrt(v_hat) + eps)
            let m_hat = m_new.div_scalar_raw(bias_correction1);
            let denom = v_new
                .div_scalar_raw(bias_correction2)
                .sqrt_raw()
                .add_scalar_raw(self.epsilon);
            let update = m_hat.div_raw(&denom)?.mul_scalar_raw(self.learning_rate);
            let new_param = param.sub_raw(&update)?;
            param.update_data_from(&new_param);

            self.m.insert(param_id, m_new);
            self.v.insert(param_id, v_new);
        }

        Ok(())
    }

    fn lr(&self) -> f32 {
        self.learning_rate
    }

    fn set_lr(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_by_learning_rate() {
        tape::clear_tape();
        let mut p = Tensor::from_vec(vec![1.0, -1.0], [2]).unwrap();
        p.set_requires_grad(true);
        tape::set_grad(&p, Tensor::from_vec(vec![0.5, -3.0], [2]).unwrap());

        let mut adam = Adam::new(0.1).with_betas(0.5, 0.999);
        adam.step(&mut [&mut p]).unwrap();
        // bias-corrected m_hat / sqrt(v_hat) == sign(grad) on the first step
        let v = p.to_vec();
        assert!((v[0] - 0.9).abs() < 1e-5);
        assert!((v[1] + 0.9).abs() < 1e-5);
        tape::clear_tape();
    }

    #[test]
    fn frozen_parameters_are_skipped() {
        tape::clear_tape();
        let mut p = Tensor::ones([3]);
        tape::set_grad(&p, Tensor::ones([3]));
        let id = p.id();

        let mut adam = Adam::new(0.1);
        adam.step(&mut [&mut p]).unwrap();
        assert_eq!(p.to_vec(), vec![1.0; 3]);
        assert_eq!(p.id(), id);
        tape::clear_tape();
    }
}
