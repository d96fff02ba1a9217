pub mod checkpoint;
pub mod loss;
pub mod nn;
pub mod ops;
pub mod optim;
pub mod training;
