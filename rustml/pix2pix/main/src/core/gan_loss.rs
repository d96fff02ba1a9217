use crate::api::error::Pix2PixResult;
use rustml_grad::{BCELoss, Loss, MSELoss, Tensor};

/// Adversarial objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GanObjective {
    /// Least-squares GAN: mean squared error against the label.
    Lsgan,
    /// Binary cross-entropy against the label; predictions must be in [0, 1].
    Vanilla,
}

/// Compares discriminator output with a constant real or fake label
/// expanded to the prediction's shape.
pub struct GanLoss {
    objective: GanObjective,
    criterion: Box<dyn Loss>,
    real_label: f32,
    fake_label: f32,
}

impl GanLoss {
    pub fn new(objective: GanObjective) -> Self {
        Self::with_labels(objective, 1.0, 0.0)
    }

    pub fn with_labels(objective: GanObjective, real_label: f32, fake_label: f32) -> Self {
        let criterion: Box<dyn Loss> = match objective {
            GanObjective::Lsgan => Box::new(MSELoss::new()),
            GanObjective::Vanilla => Box::new(BCELoss::new()),
        };
        Self {
            objective,
            criterion,
            real_label,
            fake_label,
        }
    }

    pub fn from_lsgan_flag(use_lsgan: bool) -> Self {
        Self::new(if use_lsgan {
            GanObjective::Lsgan
        } else {
            GanObjective::Vanilla
        })
    }

    pub fn objective(&self) -> GanObjective {
        self.objective
    }

    /// Label tensor shaped like `prediction`.
    pub fn target_tensor(&self, prediction: &Tensor, target_is_real: bool) -> Tensor {
        let label = if target_is_real {
            self.real_label
        } else {
            self.fake_label
        };
        Tensor::full(prediction.shape(), label)
    }

    pub fn forward(&self, prediction: &Tensor, target_is_real: bool) -> Pix2PixResult<Tensor> {
        let target = self.target_tensor(prediction, target_is_real);
        Ok(self.criterion.forward(prediction, &target)?)
    }
}
