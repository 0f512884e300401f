//! Adam (Adaptive Moment Estimation) optimizer implementation
//!
//! First-order baseline for the reconstruction: one objective evaluation per
//! step, followed by a bias-corrected moment update.

use crate::error::Result;
use crate::optimizers::{Objective, Optimizer};

/// Adam (Adaptive Moment Estimation) optimizer.
///
/// The update rule is:
///
/// ```text
/// m_t = β1 * m_{t-1} + (1 - β1) * gradient
/// v_t = β2 * v_{t-1} + (1 - β2) * gradient²
/// m_hat = m_t / (1 - β1^t)
/// v_hat = v_t / (1 - β2^t)
/// parameter = parameter - α * m_hat / (√v_hat + ε)
/// ```
///
/// # Reference
///
/// Kingma, D. P., & Ba, J. (2014). Adam: A method for stochastic optimization.
/// arXiv preprint arXiv:1412.6980.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    /// First moment estimates (momentum)
    m: Vec<f64>,
    /// Second moment estimates (adaptive learning rate)
    v: Vec<f64>,
    /// Time step counter for bias correction
    t: usize,
}

impl Adam {
    /// Creates a new Adam optimizer with the specified hyperparameters.
    ///
    /// # Examples
    ///
    /// ```
    /// use gradient_leakage::optimizers::{Adam, Optimizer};
    ///
    /// let optimizer = Adam::new(0.1, 0.9, 0.999, 1e-8);
    /// assert_eq!(optimizer.learning_rate(), 0.1);
    /// ```
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }

    /// Apply one Adam update with precomputed gradients.
    ///
    /// # Panics
    ///
    /// Panics if `parameters` and `gradients` have different lengths.
    pub fn update(&mut self, parameters: &mut [f64], gradients: &[f64]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        if self.m.len() != parameters.len() {
            self.m = vec![0.0; parameters.len()];
            self.v = vec![0.0; parameters.len()];
        }

        self.t += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t as i32);

        for i in 0..parameters.len() {
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * gradients[i];
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * gradients[i] * gradients[i];

            let m_hat = self.m[i] / bias_correction1;
            let v_hat = self.v[i] / bias_correction2;
            parameters[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [f64], objective: &mut dyn Objective) -> Result<f64> {
        let (loss, gradient) = objective.evaluate(params)?;
        self.update(params, &gradient);
        Ok(loss)
    }

    fn reset(&mut self) {
        self.m.clear();
        self.v.clear();
        self.t = 0;
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}
