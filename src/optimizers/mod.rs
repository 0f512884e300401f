//! Optimizers driven by an objective closure
//!
//! The reconstruction loop hands an optimizer a flat parameter vector and an
//! [`Objective`] that maps a point to `(value, gradient)`. Second-order
//! methods such as L-BFGS may evaluate the objective several times per step;
//! first-order methods evaluate it once.
//!
//! # Available Optimizers
//!
//! - [`Lbfgs`]: limited-memory BFGS, optionally with a strong-Wolfe line search
//! - [`Adam`]: adaptive moment estimation with bias correction
//!
//! # Example
//!
//! ```
//! use gradient_leakage::optimizers::{Lbfgs, LbfgsConfig, Optimizer};
//!
//! let mut optimizer = Lbfgs::new(LbfgsConfig::default());
//! let mut x = vec![3.0, -2.0];
//! let mut quadratic = |p: &[f64]| -> gradient_leakage::Result<(f64, Vec<f64>)> {
//!     Ok((p[0] * p[0] + p[1] * p[1], vec![2.0 * p[0], 2.0 * p[1]]))
//! };
//! optimizer.step(&mut x, &mut quadratic).unwrap();
//! assert!(x[0].abs() < 1e-6 && x[1].abs() < 1e-6);
//! ```

pub mod adam;
pub mod lbfgs;

pub use adam::Adam;
pub use lbfgs::{LineSearch, Lbfgs, LbfgsConfig};

use crate::error::Result;

/// A differentiable scalar function of a flat parameter vector.
///
/// Any `FnMut(&[f64]) -> Result<(f64, Vec<f64>)>` closure is an objective.
pub trait Objective {
    /// Objective value and gradient at `point`.
    ///
    /// The gradient has the same length as `point`.
    fn evaluate(&mut self, point: &[f64]) -> Result<(f64, Vec<f64>)>;
}

impl<F> Objective for F
where
    F: FnMut(&[f64]) -> Result<(f64, Vec<f64>)>,
{
    fn evaluate(&mut self, point: &[f64]) -> Result<(f64, Vec<f64>)> {
        self(point)
    }
}

/// Core trait for the optimizers that drive the reconstruction.
///
/// # State Management
///
/// Optimizers keep their internal state (curvature pairs, moments, step
/// counters) across [`step`](Optimizer::step) calls; [`reset`](Optimizer::reset)
/// clears it.
pub trait Optimizer {
    /// Advance `params` by one optimizer step.
    ///
    /// Returns the objective value at `params` as it was on entry.
    ///
    /// # Errors
    ///
    /// Any error from `objective` is returned immediately, leaving `params`
    /// at the last point the optimizer moved to.
    fn step(&mut self, params: &mut [f64], objective: &mut dyn Objective) -> Result<f64>;

    /// Clear all accumulated state.
    fn reset(&mut self);

    /// Base learning rate.
    fn learning_rate(&self) -> f64;

    /// Replace the base learning rate.
    fn set_learning_rate(&mut self, lr: f64);
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0f64, |acc, x| acc.max(x.abs()))
}
