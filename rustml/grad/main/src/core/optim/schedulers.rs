//! Per-epoch learning-rate schedules.
//!
//! Each schedule is a pure function `lr_at(epoch)` of the number of
//! completed epochs; `LRScheduler::step` advances the epoch counter and
//! pushes the new rate into the optimizer.

use std::f32::consts::PI;

use crate::api::optim::{LRScheduler, Optimizer};

/// Multiply the rate by `gamma` every `step_size` epochs.
pub struct StepLR {
    base_lr: f32,
    step_size: usize,
    gamma: f32,
    epoch: usize,
}

impl StepLR {
    pub fn new(base_lr: f32, step_size: usize, gamma: f32) -> Self {
        Self {
            base_lr,
            step_size: step_size.max(1),
            gamma,
            epoch: 0,
        }
    }

    pub fn lr_at(&self, epoch: usize) -> f32 {
        self.base_lr * self.gamma.powi((epoch / self.step_size) as i32)
    }
}

impl LRScheduler for StepLR {
    fn step(&mut self, optimizer: &mut dyn Optimizer) {
        self.epoch += 1;
        optimizer.set_lr(self.lr_at(self.epoch));
    }

    fn get_lr(&self) -> f32 {
        self.lr_at(self.epoch)
    }
}

/// Half-cosine from `base_lr` down to `eta_min` over `t_max` epochs.
pub struct CosineAnnealingLR {
    base_lr: f32,
    t_max: usize,
    eta_min: f32,
    epoch: usize,
}

impl CosineAnnealingLR {
    pub fn new(base_lr: f32, t_max: usize, eta_min: f32) -> Self {
        Self {
            base_lr,
            t_max: t_max.max(1),
            eta_min,
            epoch: 0,
        }
    }

    pub fn lr_at(&self, epoch: usize) -> f32 {
        let progress = epoch.min(self.t_max) as f32 / self.t_max as f32;
        self.eta_min + (self.base_lr - self.eta_min) * 0.5 * (1.0 + (PI * progress).cos())
    }
}

impl LRScheduler for CosineAnnealingLR {
    fn step(&mut self, optimizer: &mut dyn Optimizer) {
        self.epoch += 1;
        optimizer.set_lr(self.lr_at(self.epoch));
    }

    fn get_lr(&self) -> f32 {
        self.lr_at(self.epoch)
    }
}

/// Constant for `n_epochs`, then linear decay over `n_epochs_decay`.
///
/// The multiplier after `e` completed epochs is
/// `1 - max(0, e + 1 - n_epochs) / (n_epochs_decay + 1)`, clamped at zero.
pub struct LinearDecayLR {
    base_lr: f32,
    n_epochs: usize,
    n_epochs_decay: usize,
    epoch: usize,
}

impl LinearDecayLR {
    pub fn new(base_lr: f32, n_epochs: usize, n_epochs_decay: usize) -> Self {
        Self {
            base_lr,
            n_epochs,
            n_epochs_decay,
            epoch: 0,
        }
    }

    pub fn lr_at(&self, epoch: usize) -> f32 {
        let decayed = (epoch + 1).saturating_sub(self.n_epochs) as f32;
        let factor = 1.0 - decayed / (self.n_epochs_decay + 1) as f32;
        self.base_lr * factor.max(0.0)
    }
}

impl LRScheduler for LinearDecayLR {
    fn step(&mut self, optimizer: &mut dyn Optimizer) {
        self.epoch += 1;
        optimizer.set_lr(self.lr_at(self.epoch));
    }

    fn get_lr(&self) -> f32 {
        self.lr_at(self.epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::GradResult;
    use crate::api::tensor::Tensor;

    struct FixedRate(f32);

    impl Optimizer for FixedRate {
        fn step(&mut self, _params: &mut [&mut Tensor]) -> GradResult<()> {
            Ok(())
        }
        fn lr(&self) -> f32 {
            self.0
        }
        fn set_lr(&mut self, lr: f32) {
            self.0 = lr;
        }
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn step_lr_decays_every_step_size_epochs() {
        let sched = StepLR::new(0.1, 3, 0.5);
        let rates: Vec<f32> = [0, 2, 3, 6, 9].iter().map(|&e| sched.lr_at(e)).collect();
        for (got, want) in rates.iter().zip([0.1, 0.1, 0.05, 0.025, 0.0125]) {
            assert!(close(*got, want), "{got} vs {want}");
        }
    }

    #[test]
    fn cosine_reaches_floor_and_stays() {
        let sched = CosineAnnealingLR::new(0.1, 50, 0.001);
        assert!(close(sched.lr_at(0), 0.1));
        assert!((sched.lr_at(25) - 0.0505).abs() < 1e-4);
        assert!(close(sched.lr_at(50), 0.001));
        assert!(close(sched.lr_at(80), 0.001));
    }

    #[test]
    fn linear_decay_matches_epoch_rule() {
        // 3 constant epochs then 3 decay epochs
        let sched = LinearDecayLR::new(0.2, 3, 3);
        let expected = [0.2, 0.2, 0.2, 0.15, 0.1, 0.05, 0.0, 0.0];
        for (epoch, want) in expected.iter().enumerate() {
            assert!(close(sched.lr_at(epoch), *want), "epoch {epoch}");
        }
    }

    #[test]
    fn step_pushes_rate_into_optimizer() {
        let mut sched = LinearDecayLR::new(0.2, 1, 1);
        let mut opt = FixedRate(0.2);
        sched.step(&mut opt);
        assert!(close(opt.lr(), 0.1));
        assert!(close(sched.get_lr(), 0.1));
        sched.step(&mut opt);
        assert_eq!(opt.lr(), 0.0);
    }
}
