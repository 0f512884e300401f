//! Gradient Leakage Library
//!
//! This library reconstructs a classifier's private training batch (images
//! and labels) from nothing but the parameter gradient that batch produced,
//! by optimizing a random candidate until its gradient matches.
//!
//! # Modules
//!
//! - `tensor`: Dense `f64` tensors
//! - `autograd`: Reverse-mode tape with differentiable gradients (second order)
//! - `layers`: Layer trait and implementations (Dense, Conv2D)
//! - `model`: The fixed LeNet classifier under attack
//! - `labels`: One-hot encoding and softmax
//! - `gradients`: Cross-entropy and parameter gradients
//! - `attack`: Dummy state, gradient-matching objective and reconstruction loop
//! - `optimizers`: Optimizer trait and implementations (L-BFGS, Adam)
//! - `data`: CIFAR and Netpbm readers, victim batch assembly
//! - `config`: Attack configuration structures
//! - `utils`: Shared utilities (RNG)
//! - `error`: Error type shared by every module

pub mod attack;
pub mod autograd;
pub mod config;
pub mod data;
pub mod error;
pub mod gradients;
pub mod labels;
pub mod layers;
pub mod model;
pub mod optimizers;
pub mod tensor;
pub mod utils;

pub use attack::{run_attack, DummyState, ReconstructionHistory};
pub use error::{LeakageError, Result};
pub use tensor::Tensor;
