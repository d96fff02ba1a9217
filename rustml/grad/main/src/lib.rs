//! # RustML Grad
//!
//! A small CPU tensor engine with tape-based reverse-mode autodiff.
//!
//! - [`Tensor`]: `ndarray`-backed storage plus a graph id
//! - [`tape`]: thread-local gradient tape (`backward`, `grad`, `no_grad`)
//! - `ops`: differentiable functions (conv, transposed conv, instance norm, ...)
//! - layers, losses, Adam, LR schedules, safetensors checkpoints
//!
//! ## Example
//!
//! ```rust,ignore
//! use rustml_grad::*;
//!
//! let mut conv = Conv2d::new(1, 8, 4, 2, 1, true);
//! let y = conv.forward(&Tensor::randn([2, 1, 16, 16]))?;
//! let loss = ops::mean_all(&y);
//! tape::backward(&loss);
//! ```

pub mod api;
pub mod core;
mod saf;

pub use saf::*;
