//! # RustML Pix2Pix
//!
//! Style-conditioned Pix2Pix for glyph generation, built on `rustml-grad`.
//!
//! - [`Generator`]: style encoder + bidirectional GRU summary, a styled
//!   U-Net per content image and an unstyled fusion U-Net
//! - [`Discriminator`]: text and joint U-Nets scored through a style encoder
//! - [`Pix2PixModel`]: GAN/L1 losses, replay pool, alternating Adam updates
//! - [`GlyphDataset`], [`DataLoader`], [`GanTrainer`] for training from PNGs
//!
//! ## Example
//!
//! ```rust,ignore
//! use rustml_pix2pix::*;
//!
//! let config = Pix2PixConfig::load("config.json")?;
//! let dataset = GlyphDataset::from_dir("data/", config.model.image_size())?;
//! let mut loader = DataLoader::new(dataset, config.train.batch_size, true);
//! let mut trainer = GanTrainer::new(Pix2PixModel::new(config)?).with_output_dir("runs/");
//! trainer.fit(&mut loader)?;
//! ```

pub mod api;
pub mod core;
mod saf;

pub use saf::*;
