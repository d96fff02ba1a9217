pub mod data;
pub mod discriminator;
pub mod gan_loss;
pub mod generator;
pub mod image_pool;
pub mod model;
pub mod style_encoder;
pub mod trainer;
pub mod unet;
