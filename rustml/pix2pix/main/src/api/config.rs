use crate::api::error::{Pix2PixError, Pix2PixResult};
use rustml_grad::{InitType, WeightInit};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Learning-rate schedule applied once per epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LrPolicy {
    /// Constant for `epochs`, then linear decay to zero over `epochs_decay`.
    #[default]
    Linear,
    /// Multiply by 0.1 every `lr_decay_iters` epochs.
    Step,
    /// Cosine annealing to zero over `epochs`.
    Cosine,
}

/// Network shapes. Images are square with side `2^num_downs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Filters in the outermost U-Net layer; the style embedding is `8 * ngf`.
    pub ngf: usize,
    pub num_downs: usize,
    /// Number of content images per sample (input channels of the final U-Net).
    pub content_count: usize,
    pub use_dropout: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            ngf: 64,
            num_downs: 6,
            content_count: 10,
            use_dropout: false,
        }
    }
}

impl ModelConfig {
    pub fn image_size(&self) -> usize {
        1 << self.num_downs
    }

    pub fn style_dim(&self) -> usize {
        self.ngf * 8
    }

    pub fn validate(&self) -> Pix2PixResult<()> {
        if self.ngf == 0 {
            return Err(Pix2PixError::InvalidConfig("ngf must be > 0".into()));
        }
        if self.num_downs < 5 {
            return Err(Pix2PixError::InvalidConfig(format!(
                "num_downs must be >= 5, got {}",
                self.num_downs
            )));
        }
        if self.num_downs > 12 {
            return Err(Pix2PixError::InvalidConfig(format!(
                "num_downs must be <= 12, got {}",
                self.num_downs
            )));
        }
        if self.content_count == 0 {
            return Err(Pix2PixError::InvalidConfig("content_count must be > 0".into()));
        }
        Ok(())
    }
}

/// Optimisation and bookkeeping settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Epochs at the initial learning rate.
    pub epochs: usize,
    /// Epochs of linear decay after `epochs` (linear policy only).
    pub epochs_decay: usize,
    pub batch_size: usize,
    pub learn_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    /// Replay buffer size for discriminator inputs; 0 disables the pool.
    pub pool_size: usize,
    /// Least-squares GAN objective; `false` uses binary cross-entropy.
    pub use_lsgan: bool,
    pub lambda_l1: f32,
    pub init_type: InitType,
    pub init_gain: f32,
    pub lr_policy: LrPolicy,
    pub lr_decay_iters: usize,
    pub shuffle: bool,
    /// Write sample PNGs every N epochs (0 disables).
    pub sample_every: usize,
    /// Save a checkpoint every N epochs (0 saves only at the end).
    pub checkpoint_every: usize,
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            epochs_decay: 100,
            batch_size: 1,
            learn_rate: 2e-4,
            beta1: 0.5,
            beta2: 0.999,
            pool_size: 50,
            use_lsgan: true,
            lambda_l1: 0.05,
            init_type: InitType::Normal,
            init_gain: 0.02,
            lr_policy: LrPolicy::Linear,
            lr_decay_iters: 50,
            shuffle: true,
            sample_every: 1,
            checkpoint_every: 5,
            seed: None,
        }
    }
}

impl TrainConfig {
    pub fn weight_init(&self) -> WeightInit {
        WeightInit::new(self.init_type, self.init_gain)
    }

    /// Total epochs the trainer runs.
    pub fn total_epochs(&self) -> usize {
        match self.lr_policy {
            LrPolicy::Linear => self.epochs + self.epochs_decay,
            LrPolicy::Step | LrPolicy::Cosine => self.epochs,
        }
    }

    pub fn validate(&self) -> Pix2PixResult<()> {
        if self.batch_size == 0 {
            return Err(Pix2PixError::InvalidConfig("batch_size must be > 0".into()));
        }
        if !(self.learn_rate > 0.0) {
            return Err(Pix2PixError::InvalidConfig(format!(
                "learn_rate must be > 0, got {}",
                self.learn_rate
            )));
        }
        for (name, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(Pix2PixError::InvalidConfig(format!(
                    "{name} must be in [0, 1), got {beta}"
                )));
            }
        }
        if self.lambda_l1 < 0.0 {
            return Err(Pix2PixError::InvalidConfig(format!(
                "lambda_l1 must be >= 0, got {}",
                self.lambda_l1
            )));
        }
        if self.lr_policy == LrPolicy::Step && self.lr_decay_iters == 0 {
            return Err(Pix2PixError::InvalidConfig("lr_decay_iters must be > 0".into()));
        }
        if self.total_epochs() == 0 {
            return Err(Pix2PixError::InvalidConfig("at least one epoch is required".into()));
        }
        Ok(())
    }
}

/// Full configuration file: `{ "model": {...}, "train": {...} }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pix2PixConfig {
    pub model: ModelConfig,
    pub train: TrainConfig,
}

impl Pix2PixConfig {
    pub fn from_json(json: &str) -> Pix2PixResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Pix2PixResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Pix2PixResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Pix2PixResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn validate(&self) -> Pix2PixResult<()> {
        self.model.validate()?;
        self.train.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_settings() {
        let config = Pix2PixConfig::default();
        assert_eq!(config.model.image_size(), 64);
        assert_eq!(config.model.style_dim(), 512);
        assert_eq!((config.train.beta1, config.train.beta2), (0.5, 0.999));
        assert_eq!(config.train.total_epochs(), 200);
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            Pix2PixConfig::from_json(r#"{"model": {"ngf": 8}, "train": {"init_type": "xavier"}}"#)
                .unwrap();
        assert_eq!(config.model.ngf, 8);
        assert_eq!(config.model.num_downs, 6);
        assert_eq!(config.train.init_type, InitType::Xavier);
        assert_eq!(config.train.lr_policy, LrPolicy::Linear);
    }

    #[test]
    fn rejects_unusable_values() {
        assert!(Pix2PixConfig::from_json(r#"{"model": {"num_downs": 4}}"#).is_err());
        assert!(Pix2PixConfig::from_json(r#"{"train": {"batch_size": 0}}"#).is_err());
        assert!(Pix2PixConfig::from_json(r#"{"train": {"beta1": 1.5}}"#).is_err());
        assert!(Pix2PixConfig::from_json(r#"{"train": {"init_type": "bogus"}}"#).is_err());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Pix2PixConfig::default();
        config.train.seed = Some(7);
        config.save(&path).unwrap();
        assert_eq!(Pix2PixConfig::load(&path).unwrap(), config);
    }
}
