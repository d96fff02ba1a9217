pub mod activations;
pub mod conv2d;
pub mod conv_transpose2d;
pub mod dropout;
pub mod gru;
pub mod instance_norm;
pub mod linear;
pub mod sequential;
