// SAF (Simple API Facade): re-exports for convenient access

// Configuration and errors
pub use crate::api::config::{LrPolicy, ModelConfig, Pix2PixConfig, TrainConfig};
pub use crate::api::error::{Pix2PixError, Pix2PixResult};
pub use crate::api::traits::StyledLayer;

// Networks
pub use crate::core::discriminator::Discriminator;
pub use crate::core::generator::Generator;
pub use crate::core::style_encoder::StyleEncoder;
pub use crate::core::unet::{BlockPosition, UnetGenerator, UnetSkipConnectionBlock};

// Training pieces
pub use crate::core::gan_loss::{GanLoss, GanObjective};
pub use crate::core::image_pool::ImagePool;
pub use crate::core::model::{set_requires_grad, LossReport, Pix2PixModel};
pub use crate::core::trainer::{EpochStats, GanTrainer};

// Data
pub use crate::core::data::dataloader::{DataLoader, GlyphBatch};
pub use crate::core::data::dataset::{load_conditions, write_sample_dir, GlyphDataset, GlyphSample};
pub use crate::core::data::image_io::{load_grayscale, save_batch, save_grayscale};
