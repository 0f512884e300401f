//! Layer abstractions for the leaked classifier
//!
//! This module provides the Layer trait and the two layer types the
//! classifier is built from.

mod r#trait;
pub mod conv2d;
pub mod dense;

// Re-export the Layer trait for convenience
pub use r#trait::Layer;
pub use conv2d::Conv2DLayer;
pub use dense::DenseLayer;

/// Half-width of the uniform distribution used for every weight and bias.
pub const INIT_RANGE: f64 = 0.5;
