pub mod error;
pub mod init;
pub mod layer;
pub mod loss;
pub mod optim;
pub mod tape;
pub mod tensor;
