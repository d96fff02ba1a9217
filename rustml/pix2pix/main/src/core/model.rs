use crate::api::config::{LrPolicy, Pix2PixConfig, TrainConfig};
use crate::api::error::{Pix2PixError, Pix2PixResult};
use crate::core::discriminator::Discriminator;
use crate::core::gan_loss::GanLoss;
use crate::core::generator::Generator;
use crate::core::image_pool::ImagePool;
use rustml_grad::{
    ops, tape, Adam, Checkpoint, CosineAnnealingLR, L1Loss, LRScheduler, LinearDecayLR, Loss,
    Module, Optimizer, StepLR, Tensor,
};
use std::path::Path;
use std::time::Instant;

const GENERATOR_GROUP: &str = "generator";
const DISCRIMINATOR_GROUP: &str = "discriminator";
const CONFIG_KEY: &str = "config";
const EPOCH_KEY: &str = "epoch";

/// Losses of one `optimize_parameters` call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossReport {
    pub d_fake: f32,
    pub d_real: f32,
    pub d: f32,
    pub g_gan: f32,
    pub g_l1: f32,
    pub g: f32,
}

impl LossReport {
    /// `(name, value)` pairs for meters and log lines.
    pub fn entries(&self) -> [(&'static str, f32); 6] {
        [
            ("D_fake", self.d_fake),
            ("D_real", self.d_real),
            ("D", self.d),
            ("G_GAN", self.g_gan),
            ("G_L1", self.g_l1),
            ("G", self.g),
        ]
    }
}

/// One training batch: content `[B, C, H, W]`, style `[B, K, H, W]`, real
/// target `[B, 1, H, W]`.
struct Inputs {
    content: Tensor,
    style: Tensor,
    real: Tensor,
}

/// Freeze or unfreeze every parameter of a network.
pub fn set_requires_grad(net: &mut dyn Module, requires_grad: bool) {
    net.set_requires_grad(requires_grad);
}

fn build_scheduler(train: &TrainConfig) -> Box<dyn LRScheduler> {
    match train.lr_policy {
        LrPolicy::Linear => Box::new(LinearDecayLR::new(
            train.learn_rate,
            train.epochs,
            train.epochs_decay,
        )),
        LrPolicy::Step => Box::new(StepLR::new(train.learn_rate, train.lr_decay_iters, 0.1)),
        LrPolicy::Cosine => Box::new(CosineAnnealingLR::new(train.learn_rate, train.epochs, 0.0)),
    }
}

/// Style-conditioned Pix2Pix: generator, discriminator, losses, optimizers
/// and the alternating update.
pub struct Pix2PixModel {
    config: Pix2PixConfig,
    net_g: Generator,
    net_d: Discriminator,
    fake_pool: ImagePool,
    gan_loss: GanLoss,
    l1_loss: L1Loss,
    optimizer_g: Adam,
    optimizer_d: Adam,
    scheduler_g: Box<dyn LRScheduler>,
    scheduler_d: Box<dyn LRScheduler>,
    inputs: Option<Inputs>,
    fake: Option<Tensor>,
}

impl Pix2PixModel {
    /// Build both networks and initialise their conv/linear weights.
    pub fn new(config: Pix2PixConfig) -> Pix2PixResult<Self> {
        config.validate()?;
        let train = &config.train;
        let mut net_g = Generator::new(&config.model)?;
        let mut net_d = Discriminator::new(&config.model)?;
        let init = train.weight_init();
        net_g.init_weights(&init)?;
        net_d.init_weights(&init)?;
        log::info!(
            "initialized networks with {} (gain {}): G {} params, D {} params",
            train.init_type,
            train.init_gain,
            net_g.parameter_count(),
            net_d.parameter_count()
        );

        let adam = || Adam::new(train.learn_rate).with_betas(train.beta1, train.beta2);
        let fake_pool = match train.seed {
            Some(seed) => ImagePool::with_seed(train.pool_size, seed),
            None => ImagePool::new(train.pool_size),
        };
        Ok(Self {
            fake_pool,
            gan_loss: GanLoss::from_lsgan_flag(train.use_lsgan),
            l1_loss: L1Loss::new(),
            optimizer_g: adam(),
            optimizer_d: adam(),
            scheduler_g: build_scheduler(train),
            scheduler_d: build_scheduler(train),
            net_g,
            net_d,
            inputs: None,
            fake: None,
            config,
        })
    }

    pub fn config(&self) -> &Pix2PixConfig {
        &self.config
    }

    pub fn generator(&self) -> &Generator {
        &self.net_g
    }

    pub fn discriminator(&self) -> &Discriminator {
        &self.net_d
    }

    /// Output of the last `forward`.
    pub fn fake(&self) -> Option<&Tensor> {
        self.fake.as_ref()
    }

    pub fn learning_rate(&self) -> f32 {
        self.optimizer_g.lr()
    }

    /// Store a batch. `target` may be `[B, H, W]` (a channel axis is added)
    /// or `[B, 1, H, W]`.
    pub fn set_input(
        &mut self,
        content: &Tensor,
        style: &Tensor,
        target: &Tensor,
    ) -> Pix2PixResult<()> {
        let real = match target.shape() {
            [b, h, w] => target.reshape_raw(&[*b, 1, *h, *w])?,
            [_, 1, _, _] => target.clone(),
            other => {
                return Err(Pix2PixError::ShapeMismatch {
                    expected: vec![content.shape().first().copied().unwrap_or(0), 1, 0, 0],
                    got: other.to_vec(),
                })
            }
        };
        let batch = real.shape()[0];
        for t in [content, style] {
            if t.shape().first() != Some(&batch) {
                return Err(Pix2PixError::ShapeMismatch {
                    expected: vec![batch],
                    got: t.shape().to_vec(),
                });
            }
        }
        self.inputs = Some(Inputs {
            content: content.clone(),
            style: style.clone(),
            real,
        });
        self.fake = None;
        Ok(())
    }

    fn inputs(&self, caller: &'static str) -> Pix2PixResult<&Inputs> {
        self.inputs.as_ref().ok_or(Pix2PixError::InputNotSet(caller))
    }

    /// Run the generator on the stored batch.
    pub fn forward(&mut self) -> Pix2PixResult<Tensor> {
        let started = Instant::now();
        let inputs = self.inputs.as_ref().ok_or(Pix2PixError::InputNotSet("forward"))?;
        let fake = self.net_g.forward(&inputs.content, &inputs.style)?;
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("generator forward took {:?}", started.elapsed());
        }
        self.fake = Some(fake.clone());
        Ok(fake)
    }

    /// Discriminator loss on a pooled fake and the real target; runs backward.
    /// Returns `(fake, real, total)`.
    pub fn backward_d(&mut self) -> Pix2PixResult<(f32, f32, f32)> {
        let fake = self.fake.clone().ok_or(Pix2PixError::InputNotSet("backward_d"))?;
        let inputs = self.inputs.as_ref().ok_or(Pix2PixError::InputNotSet("backward_d"))?;

        let pooled = self.fake_pool.query(&fake)?;
        let pred_fake = self.net_d.forward(&pooled, &inputs.style, &inputs.content)?;
        let loss_fake = self.gan_loss.forward(&pred_fake, false)?;

        let pred_real = self.net_d.forward(&inputs.real, &inputs.style, &inputs.content)?;
        let loss_real = self.gan_loss.forward(&pred_real, true)?;

        let loss_d = ops::scale(&ops::add(&loss_fake, &loss_real)?, 0.5, 0.0);
        tape::backward(&loss_d);
        Ok((loss_fake.item(), loss_real.item(), loss_d.item()))
    }

    /// Generator loss: fool the discriminator plus weighted L1 to the target.
    /// Runs backward and returns `(gan, l1, total)`.
    pub fn backward_g(&mut self) -> Pix2PixResult<(f32, f32, f32)> {
        let fake = self.fake.clone().ok_or(Pix2PixError::InputNotSet("backward_g"))?;
        let inputs = self.inputs.as_ref().ok_or(Pix2PixError::InputNotSet("backward_g"))?;

        let pred_fake = self.net_d.forward(&fake, &inputs.style, &inputs.content)?;
        let loss_gan = self.gan_loss.forward(&pred_fake, true)?;
        let loss_l1 = ops::scale(
            &self.l1_loss.forward(&fake, &inputs.real)?,
            self.config.train.lambda_l1,
            0.0,
        );
        let loss_g = ops::add(&loss_gan, &loss_l1)?;
        tape::backward(&loss_g);
        Ok((loss_gan.item(), loss_l1.item(), loss_g.item()))
    }

    /// One alternating update: discriminator first, then generator with the
    /// discriminator frozen.
    pub fn optimize_parameters(&mut self) -> Pix2PixResult<LossReport> {
        self.inputs("optimize_parameters")?;
        tape::clear_tape();
        let result = self.alternating_step();
        tape::clear_tape();
        result
    }

    fn alternating_step(&mut self) -> Pix2PixResult<LossReport> {
        self.forward()?;

        set_requires_grad(&mut self.net_d, true);
        tape::zero_grad();
        let (d_fake, d_real, d) = self.backward_d()?;
        {
            let mut params = self.net_d.parameters_mut();
            let mut param_refs: Vec<&mut Tensor> = params.iter_mut().map(|p| &mut **p).collect();
            self.optimizer_d.step(&mut param_refs)?;
        }

        set_requires_grad(&mut self.net_d, false);
        tape::zero_grad();
        let (g_gan, g_l1, g) = self.backward_g()?;
        {
            let mut params = self.net_g.parameters_mut();
            let mut param_refs: Vec<&mut Tensor> = params.iter_mut().map(|p| &mut **p).collect();
            self.optimizer_g.step(&mut param_refs)?;
        }

        let report = LossReport {
            d_fake,
            d_real,
            d,
            g_gan,
            g_l1,
            g,
        };
        log::debug!(
            "D_fake={:.4} D_real={:.4} G_GAN={:.4} G_L1={:.4}",
            report.d_fake,
            report.d_real,
            report.g_gan,
            report.g_l1
        );
        Ok(report)
    }

    /// Training mode: dropout active.
    pub fn train(&mut self) {
        self.net_g.set_training(true);
        self.net_d.set_training(true);
    }

    pub fn eval(&mut self) {
        self.net_g.set_training(false);
        self.net_d.set_training(false);
    }

    /// Generate `[B, 1, H, W]` glyphs without recording gradients.
    pub fn generate(&mut self, content: &Tensor, style: &Tensor) -> Pix2PixResult<Tensor> {
        let net_g = &mut self.net_g;
        tape::no_grad(|| net_g.forward(content, style))
    }

    /// Advance both LR schedules by one epoch; returns the new rate.
    pub fn update_learning_rate(&mut self) -> f32 {
        let old = self.optimizer_g.lr();
        self.scheduler_g.step(&mut self.optimizer_g);
        self.scheduler_d.step(&mut self.optimizer_d);
        let lr = self.optimizer_g.lr();
        log::debug!("learning rate {old:.7} -> {lr:.7}");
        lr
    }

    /// Save both networks; the config travels in the file metadata.
    pub fn save<P: AsRef<Path>>(&self, path: P, epoch: usize) -> Pix2PixResult<()> {
        let mut checkpoint = Checkpoint::new()
            .with_metadata(CONFIG_KEY, serde_json::to_string(&self.config)?)
            .with_metadata(EPOCH_KEY, epoch.to_string());
        checkpoint.add_module(GENERATOR_GROUP, &self.net_g);
        checkpoint.add_module(DISCRIMINATOR_GROUP, &self.net_d);
        checkpoint.save(path.as_ref())?;
        log::info!("saved checkpoint (epoch {epoch}) to {}", path.as_ref().display());
        Ok(())
    }

    /// Rebuild a model from a checkpoint written by [`Pix2PixModel::save`].
    /// Returns the model and the epoch it was saved at.
    pub fn load<P: AsRef<Path>>(path: P) -> Pix2PixResult<(Self, usize)> {
        let checkpoint = Checkpoint::load(path.as_ref())?;
        let config = Self::checkpoint_config(&checkpoint)?;
        let epoch = checkpoint
            .metadata(EPOCH_KEY)
            .and_then(|e| e.parse().ok())
            .unwrap_or(0);
        let mut model = Self::new(config)?;
        checkpoint.load_into_module(GENERATOR_GROUP, &mut model.net_g)?;
        checkpoint.load_into_module(DISCRIMINATOR_GROUP, &mut model.net_d)?;
        log::info!(
            "loaded checkpoint (epoch {epoch}) from {}",
            path.as_ref().display()
        );
        Ok((model, epoch))
    }

    /// The config stored in a checkpoint's metadata.
    pub fn checkpoint_config(checkpoint: &Checkpoint) -> Pix2PixResult<Pix2PixConfig> {
        let json = checkpoint.metadata(CONFIG_KEY).ok_or_else(|| {
            Pix2PixError::InvalidConfig("checkpoint carries no model config".into())
        })?;
        Pix2PixConfig::from_json(json)
    }
}
