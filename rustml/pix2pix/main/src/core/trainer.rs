use crate::api::error::Pix2PixResult;
use crate::core::data::dataloader::{DataLoader, GlyphBatch};
use crate::core::data::image_io::save_batch;
use crate::core::model::Pix2PixModel;
use rustml_grad::LossMeter;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Averaged losses of one epoch.
#[derive(Debug, Clone)]
pub struct EpochStats {
    pub epoch: usize,
    pub losses: Vec<(String, f64)>,
    /// Learning rate after this epoch's schedule step.
    pub lr: f32,
}

impl EpochStats {
    pub fn loss(&self, name: &str) -> Option<f64> {
        self.losses.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

/// Runs the alternating GAN updates over a [`DataLoader`] for the configured
/// number of epochs.
///
/// With an output directory set, sample strips go to `samples/` every
/// `sample_every` epochs and checkpoints to `checkpoints/` every
/// `checkpoint_every` epochs plus once at the end (`latest.safetensors`).
pub struct GanTrainer {
    model: Pix2PixModel,
    output_dir: Option<PathBuf>,
    meter: LossMeter,
}

impl GanTrainer {
    pub fn new(model: Pix2PixModel) -> Self {
        Self {
            model,
            output_dir: None,
            meter: LossMeter::new(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn model(&self) -> &Pix2PixModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Pix2PixModel {
        &mut self.model
    }

    pub fn into_model(self) -> Pix2PixModel {
        self.model
    }

    /// One pass over the loader. Returns the per-loss means and the first
    /// batch, kept for sample images.
    pub fn train_epoch(
        &mut self,
        loader: &mut DataLoader,
    ) -> Pix2PixResult<(Vec<(String, f64)>, Option<GlyphBatch>)> {
        self.meter.reset();
        self.model.train();
        loader.reset();
        let total = loader.num_batches();
        let mut preview = None;
        for (step, batch) in loader.by_ref().enumerate() {
            self.model
                .set_input(&batch.content, &batch.style, &batch.target)?;
            let report = self.model.optimize_parameters()?;
            for (name, value) in report.entries() {
                self.meter.update(name, value);
            }
            log::debug!("step {}/{}: {}", step + 1, total, self.meter.summary());
            if preview.is_none() {
                preview = Some(batch);
            }
        }
        Ok((self.meter.means(), preview))
    }

    /// Train for `config.train.total_epochs()` epochs.
    pub fn fit(&mut self, loader: &mut DataLoader) -> Pix2PixResult<Vec<EpochStats>> {
        let train = self.model.config().train.clone();
        let epochs = train.total_epochs();
        let mut history = Vec::with_capacity(epochs);
        log::info!(
            "training for {} epochs, {} batches per epoch",
            epochs,
            loader.num_batches()
        );

        for epoch in 1..=epochs {
            let started = Instant::now();
            let (losses, preview) = self.train_epoch(loader)?;
            let lr = self.model.update_learning_rate();
            log::info!(
                "Epoch {}/{}: {} lr={:.7} ({:.1}s)",
                epoch,
                epochs,
                self.meter.summary(),
                lr,
                started.elapsed().as_secs_f32()
            );

            if let Some(dir) = self.output_dir.clone() {
                if let Some(batch) = preview.filter(|_| every(train.sample_every, epoch)) {
                    self.write_samples(&dir.join("samples"), epoch, &batch)?;
                }
                if every(train.checkpoint_every, epoch) {
                    let path = checkpoint_dir(&dir)?.join(format!("epoch_{epoch:03}.safetensors"));
                    self.model.save(&path, epoch)?;
                }
            }
            history.push(EpochStats { epoch, losses, lr });
        }

        if let Some(dir) = &self.output_dir {
            let path = checkpoint_dir(dir)?.join("latest.safetensors");
            self.model.save(&path, epochs)?;
        }
        Ok(history)
    }

    /// Write fake and real strips for `batch`.
    fn write_samples(&mut self, dir: &Path, epoch: usize, batch: &GlyphBatch) -> Pix2PixResult<()> {
        fs::create_dir_all(dir)?;
        self.model.eval();
        let fake = self.model.generate(&batch.content, &batch.style);
        self.model.train();
        save_batch(dir.join(format!("epoch_{epoch:03}_fake.png")), &fake?)?;
        let shape = batch.target.shape();
        let real = batch.target.reshape_raw(&[shape[0], 1, shape[1], shape[2]])?;
        save_batch(dir.join(format!("epoch_{epoch:03}_real.png")), &real)?;
        log::debug!("wrote epoch {epoch} samples to {}", dir.display());
        Ok(())
    }
}

fn every(interval: usize, epoch: usize) -> bool {
    interval > 0 && epoch % interval == 0
}

fn checkpoint_dir(root: &Path) -> Pix2PixResult<PathBuf> {
    let dir = root.join("checkpoints");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}
