//! Tests for the objective-driven optimizers
//!
//! This file tests:
//! - L-BFGS with a fixed step and with the strong-Wolfe line search
//! - Adam through the `Optimizer` trait
//! - Error propagation out of an objective

use approx::assert_abs_diff_eq;
use gradient_leakage::optimizers::{Adam, Lbfgs, LbfgsConfig, LineSearch, Objective, Optimizer};
use gradient_leakage::{LeakageError, Result};

/// `sum(a_i * x_i^2)` with mildly different curvatures.
fn quadratic(point: &[f64]) -> Result<(f64, Vec<f64>)> {
    let mut value = 0.0;
    let mut gradient = Vec::with_capacity(point.len());
    for (i, &x) in point.iter().enumerate() {
        let a = 1.0 + i as f64;
        value += a * x * x;
        gradient.push(2.0 * a * x);
    }
    Ok((value, gradient))
}

fn rosenbrock(point: &[f64]) -> Result<(f64, Vec<f64>)> {
    let (x, y) = (point[0], point[1]);
    let value = (1.0 - x).powi(2) + 100.0 * (y - x * x).powi(2);
    let gradient = vec![
        -2.0 * (1.0 - x) - 400.0 * x * (y - x * x),
        200.0 * (y - x * x),
    ];
    Ok((value, gradient))
}

fn run(optimizer: &mut dyn Optimizer, x: &mut [f64], objective: &mut dyn Objective, steps: usize) -> f64 {
    for _ in 0..steps {
        optimizer.step(x, objective).unwrap();
    }
    objective.evaluate(x).unwrap().0
}

// ============================================================================
// L-BFGS Tests
// ============================================================================

mod lbfgs_tests {
    use super::*;

    #[test]
    fn test_quadratic_fixed_step() {
        let mut optimizer = Lbfgs::new(LbfgsConfig::default());
        let mut x = vec![1.0, -2.0, 0.5];
        let value = run(&mut optimizer, &mut x, &mut quadratic, 10);
        assert!(value < 1e-8, "value {}", value);
    }

    #[test]
    fn test_quadratic_strong_wolfe() {
        let mut optimizer = Lbfgs::new(LbfgsConfig {
            line_search: LineSearch::StrongWolfe,
            ..LbfgsConfig::default()
        });
        let mut x = vec![1.0, -2.0, 0.5];
        let value = run(&mut optimizer, &mut x, &mut quadratic, 5);
        assert!(value < 1e-8, "value {}", value);
    }

    #[test]
    fn test_rosenbrock_strong_wolfe() {
        let mut optimizer = Lbfgs::new(LbfgsConfig {
            line_search: LineSearch::StrongWolfe,
            ..LbfgsConfig::default()
        });
        let mut x = vec![-1.2, 1.0];
        run(&mut optimizer, &mut x, &mut rosenbrock, 20);
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(x[1], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_strong_wolfe_never_increases_objective() {
        let mut optimizer = Lbfgs::new(LbfgsConfig {
            line_search: LineSearch::StrongWolfe,
            max_iter: 1,
            ..LbfgsConfig::default()
        });
        let mut x = vec![-1.2, 1.0];
        let mut previous = rosenbrock(&x).unwrap().0;
        for _ in 0..30 {
            optimizer.step(&mut x, &mut rosenbrock).unwrap();
            let value = rosenbrock(&x).unwrap().0;
            assert!(value <= previous);
            previous = value;
        }
    }

    #[test]
    fn test_max_eval_limits_evaluations() {
        let mut optimizer = Lbfgs::new(LbfgsConfig {
            max_iter: 100,
            max_eval: Some(7),
            tolerance_grad: 0.0,
            tolerance_change: 0.0,
            ..LbfgsConfig::default()
        });
        let mut x = vec![1.0, -2.0, 0.5];
        optimizer.step(&mut x, &mut quadratic).unwrap();
        assert!(optimizer.function_evaluations() <= 7);
    }

    #[test]
    fn test_objective_error_propagates() {
        let mut optimizer = Lbfgs::new(LbfgsConfig::default());
        let mut calls = 0;
        let mut failing = |point: &[f64]| -> Result<(f64, Vec<f64>)> {
            calls += 1;
            if calls > 2 {
                return Err(LeakageError::NumericalDivergence { value: f64::NAN });
            }
            quadratic(point)
        };
        let mut x = vec![1.0, 1.0];
        let result = optimizer.step(&mut x, &mut failing);
        assert!(matches!(result, Err(LeakageError::NumericalDivergence { .. })));
    }
}

// ============================================================================
// Adam Tests
// ============================================================================

mod adam_tests {
    use super::*;

    #[test]
    fn test_adam_decreases_quadratic() {
        let mut optimizer = Adam::new(0.05, 0.9, 0.999, 1e-8);
        let mut x = vec![1.0, -2.0, 0.5];
        let start = quadratic(&x).unwrap().0;
        let value = run(&mut optimizer, &mut x, &mut quadratic, 500);
        assert!(value < start * 1e-2, "value {}", value);
    }

    #[test]
    fn test_adam_step_returns_entry_value() {
        let mut optimizer = Adam::new(0.1, 0.9, 0.999, 1e-8);
        let mut x = vec![1.0, 1.0];
        let loss = optimizer.step(&mut x, &mut quadratic).unwrap();
        assert_abs_diff_eq!(loss, 3.0, epsilon = 1e-12);
        // First bias-corrected step moves every coordinate by the learning rate.
        assert_abs_diff_eq!(x[0], 0.9, epsilon = 1e-6);
        assert_abs_diff_eq!(x[1], 0.9, epsilon = 1e-6);
    }

    #[test]
    fn test_adam_error_leaves_params() {
        let mut optimizer = Adam::new(0.1, 0.9, 0.999, 1e-8);
        let mut failing =
            |_: &[f64]| -> Result<(f64, Vec<f64>)> { Err(LeakageError::Config("boom".to_string())) };
        let mut x = vec![1.0, 1.0];
        assert!(optimizer.step(&mut x, &mut failing).is_err());
        assert_eq!(x, vec![1.0, 1.0]);
    }
}
