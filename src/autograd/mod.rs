//! Reverse-mode automatic differentiation with higher-order support
//!
//! Operations are recorded on a [`Tape`] as they are evaluated. [`grad`]
//! walks the tape backwards and records the vector-Jacobian products as new
//! tape operations, so gradients can be differentiated again.
//!
//! # Example
//!
//! ```
//! use gradient_leakage::autograd::{grad, Tape};
//! use gradient_leakage::tensor::Tensor;
//!
//! let mut tape = Tape::new();
//! let x = tape.variable(Tensor::scalar(2.0));
//! let y = tape.mul(x, x);
//! let dy = grad(&mut tape, y, &[x])[0];
//! let d2y = grad(&mut tape, dy, &[x])[0];
//! assert_eq!(tape.value(dy).item(), 4.0);
//! assert_eq!(tape.value(d2y).item(), 2.0);
//! ```

mod backward;
pub mod kernels;
mod tape;

pub use backward::grad;
pub use kernels::ConvGeometry;
pub use tape::{NodeId, Tape};
