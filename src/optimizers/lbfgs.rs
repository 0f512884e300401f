//! Limited-memory BFGS
//!
//! One call to [`Optimizer::step`] runs up to `max_iter` quasi-Newton
//! iterations. Curvature pairs, the last search direction and the iteration
//! counters survive between calls, so consecutive steps continue the same
//! optimization rather than restarting it.
//!
//! The search direction comes from the two-loop recursion over the stored
//! `(s, y)` pairs. The step length is either fixed (the learning rate, with
//! a conservative first step) or chosen by a strong-Wolfe line search that
//! brackets with cubic interpolation and then zooms.

use std::collections::VecDeque;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::optimizers::{dot, max_abs, Objective, Optimizer};

/// Sufficient-decrease constant of the Wolfe conditions.
const WOLFE_C1: f64 = 1e-4;
/// Curvature constant of the Wolfe conditions.
const WOLFE_C2: f64 = 0.9;
/// Objective evaluations allowed per line search.
const MAX_LINE_SEARCH: usize = 25;
/// Curvature pairs with `y·s` below this are skipped.
const MIN_CURVATURE: f64 = 1e-10;

/// Step-length strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSearch {
    /// Fixed step equal to the learning rate.
    #[default]
    None,
    /// Strong-Wolfe line search.
    StrongWolfe,
}

/// L-BFGS hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LbfgsConfig {
    pub learning_rate: f64,
    /// Iterations per [`Optimizer::step`] call.
    pub max_iter: usize,
    /// Objective evaluations per step; `None` means `max_iter * 5 / 4`.
    pub max_eval: Option<usize>,
    /// Stop when the largest gradient component falls below this.
    pub tolerance_grad: f64,
    /// Stop when the step or the objective change falls below this.
    pub tolerance_change: f64,
    pub history_size: usize,
    pub line_search: LineSearch,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1.0,
            max_iter: 20,
            max_eval: None,
            tolerance_grad: 1e-7,
            tolerance_change: 1e-9,
            history_size: 100,
            line_search: LineSearch::None,
        }
    }
}

impl LbfgsConfig {
    pub fn max_eval(&self) -> usize {
        self.max_eval.unwrap_or(self.max_iter * 5 / 4)
    }
}

/// Curvature history and counters carried across steps.
#[derive(Debug, Clone, Default)]
struct LbfgsState {
    direction: Vec<f64>,
    step_size: f64,
    old_dirs: VecDeque<Vec<f64>>,
    old_steps: VecDeque<Vec<f64>>,
    ro: VecDeque<f64>,
    h_diag: f64,
    prev_flat_grad: Vec<f64>,
    prev_loss: f64,
    n_iter: usize,
    func_evals: usize,
}

/// L-BFGS optimizer.
#[derive(Debug, Clone)]
pub struct Lbfgs {
    config: LbfgsConfig,
    state: LbfgsState,
}

impl Lbfgs {
    pub fn new(config: LbfgsConfig) -> Self {
        Self {
            config,
            state: LbfgsState::default(),
        }
    }

    pub fn config(&self) -> &LbfgsConfig {
        &self.config
    }

    /// Total quasi-Newton iterations since construction or the last reset.
    pub fn iterations(&self) -> usize {
        self.state.n_iter
    }

    /// Total objective evaluations since construction or the last reset.
    pub fn function_evaluations(&self) -> usize {
        self.state.func_evals
    }

    /// Two-loop recursion: `-H * grad` from the stored curvature pairs.
    fn search_direction(&self, flat_grad: &[f64]) -> Vec<f64> {
        let state = &self.state;
        let count = state.old_dirs.len();
        let mut alpha = vec![0.0; count];
        let mut q: Vec<f64> = flat_grad.iter().map(|g| -g).collect();

        for i in (0..count).rev() {
            alpha[i] = dot(&state.old_steps[i], &q) * state.ro[i];
            for (qj, yj) in q.iter_mut().zip(&state.old_dirs[i]) {
                *qj -= alpha[i] * yj;
            }
        }

        let mut r: Vec<f64> = q.iter().map(|v| v * state.h_diag).collect();
        for i in 0..count {
            let beta = dot(&state.old_dirs[i], &r) * state.ro[i];
            for (rj, sj) in r.iter_mut().zip(&state.old_steps[i]) {
                *rj += (alpha[i] - beta) * sj;
            }
        }
        r
    }

    /// Store the pair `(s, y)` when it has positive curvature.
    fn update_curvature(&mut self, flat_grad: &[f64]) {
        let state = &mut self.state;
        let y: Vec<f64> = flat_grad
            .iter()
            .zip(&state.prev_flat_grad)
            .map(|(g, p)| g - p)
            .collect();
        let s: Vec<f64> = state.direction.iter().map(|d| d * state.step_size).collect();
        let ys = dot(&y, &s);
        if ys > MIN_CURVATURE {
            if state.old_dirs.len() == self.config.history_size {
                state.old_dirs.pop_front();
                state.old_steps.pop_front();
                state.ro.pop_front();
            }
            state.h_diag = ys / dot(&y, &y);
            state.old_dirs.push_back(y);
            state.old_steps.push_back(s);
            state.ro.push_back(1.0 / ys);
        }
    }
}

fn offset(x: &[f64], t: f64, d: &[f64]) -> Vec<f64> {
    x.iter().zip(d).map(|(xi, di)| xi + t * di).collect()
}

/// Minimizer of the cubic through two points with known values and slopes,
/// clamped to `bounds` (default: the interval between the points).
fn cubic_interpolate(
    (x1, f1, g1): (f64, f64, f64),
    (x2, f2, g2): (f64, f64, f64),
    bounds: Option<(f64, f64)>,
) -> f64 {
    let (min_bound, max_bound) = bounds.unwrap_or(if x1 <= x2 { (x1, x2) } else { (x2, x1) });
    let d1 = g1 + g2 - 3.0 * (f1 - f2) / (x1 - x2);
    let d2_square = d1 * d1 - g1 * g2;
    if d2_square >= 0.0 {
        let d2 = d2_square.sqrt();
        let min_pos = if x1 <= x2 {
            x2 - (x2 - x1) * ((g2 + d2 - d1) / (g2 - g1 + 2.0 * d2))
        } else {
            x1 - (x1 - x2) * ((g1 + d2 - d1) / (g1 - g2 + 2.0 * d2))
        };
        if min_pos.is_nan() {
            return (min_bound + max_bound) / 2.0;
        }
        min_pos.max(min_bound).min(max_bound)
    } else {
        (min_bound + max_bound) / 2.0
    }
}

/// One point evaluated by the line search.
#[derive(Debug, Clone)]
struct LinePoint {
    t: f64,
    f: f64,
    g: Vec<f64>,
    gtd: f64,
}

/// Outcome of a line search.
struct LineSearchResult {
    loss: f64,
    flat_grad: Vec<f64>,
    t: f64,
    evaluations: usize,
}

/// Strong-Wolfe line search along `d` from `x`, starting at step `t`.
#[allow(clippy::too_many_arguments)]
fn strong_wolfe(
    objective: &mut dyn Objective,
    x: &[f64],
    mut t: f64,
    d: &[f64],
    f: f64,
    g: &[f64],
    gtd: f64,
    tolerance_change: f64,
) -> Result<LineSearchResult> {
    let d_norm = max_abs(d);
    let (mut f_new, mut g_new) = objective.evaluate(&offset(x, t, d))?;
    let mut evaluations = 1;
    let mut gtd_new = dot(&g_new, d);

    let mut prev = LinePoint {
        t: 0.0,
        f,
        g: g.to_vec(),
        gtd,
    };
    let mut done = false;
    let mut ls_iter = 0;
    let mut bracket: Vec<LinePoint> = Vec::new();

    // Bracketing phase.
    while ls_iter < MAX_LINE_SEARCH {
        let current = LinePoint {
            t,
            f: f_new,
            g: g_new.clone(),
            gtd: gtd_new,
        };
        if f_new > f + WOLFE_C1 * t * gtd || (ls_iter > 1 && f_new >= prev.f) {
            bracket = vec![prev, current];
            break;
        }
        if gtd_new.abs() <= -WOLFE_C2 * gtd {
            bracket = vec![current];
            done = true;
            break;
        }
        if gtd_new >= 0.0 {
            bracket = vec![prev, current];
            break;
        }

        let min_step = t + 0.01 * (t - prev.t);
        let max_step = t * 10.0;
        t = cubic_interpolate(
            (prev.t, prev.f, prev.gtd),
            (current.t, current.f, current.gtd),
            Some((min_step, max_step)),
        );
        prev = current;

        let (f_eval, g_eval) = objective.evaluate(&offset(x, t, d))?;
        f_new = f_eval;
        g_new = g_eval;
        evaluations += 1;
        gtd_new = dot(&g_new, d);
        ls_iter += 1;
    }

    if ls_iter == MAX_LINE_SEARCH {
        bracket = vec![
            LinePoint {
                t: 0.0,
                f,
                g: g.to_vec(),
                gtd,
            },
            LinePoint {
                t,
                f: f_new,
                g: g_new.clone(),
                gtd: gtd_new,
            },
        ];
    }

    // Zoom phase.
    let order = |b: &[LinePoint]| -> (usize, usize) {
        if b[0].f <= b[b.len() - 1].f {
            (0, b.len() - 1)
        } else {
            (b.len() - 1, 0)
        }
    };
    let (mut low, mut high) = order(&bracket);
    let mut insufficient_progress = false;

    while !done && ls_iter < MAX_LINE_SEARCH {
        if (bracket[1].t - bracket[0].t).abs() * d_norm < tolerance_change {
            break;
        }

        t = cubic_interpolate(
            (bracket[0].t, bracket[0].f, bracket[0].gtd),
            (bracket[1].t, bracket[1].f, bracket[1].gtd),
            None,
        );

        // Keep the trial point away from the bracket ends.
        let b_max = bracket[0].t.max(bracket[1].t);
        let b_min = bracket[0].t.min(bracket[1].t);
        let eps = 0.1 * (b_max - b_min);
        if (b_max - t).min(t - b_min) < eps {
            if insufficient_progress || t >= b_max || t <= b_min {
                t = if (t - b_max).abs() < (t - b_min).abs() {
                    b_max - eps
                } else {
                    b_min + eps
                };
                insufficient_progress = false;
            } else {
                insufficient_progress = true;
            }
        } else {
            insufficient_progress = false;
        }

        let (f_eval, g_eval) = objective.evaluate(&offset(x, t, d))?;
        evaluations += 1;
        ls_iter += 1;
        let trial = LinePoint {
            t,
            gtd: dot(&g_eval, d),
            f: f_eval,
            g: g_eval,
        };

        if trial.f > f + WOLFE_C1 * t * gtd || trial.f >= bracket[low].f {
            bracket[high] = trial;
            (low, high) = order(&bracket);
        } else {
            if trial.gtd.abs() <= -WOLFE_C2 * gtd {
                done = true;
            } else if trial.gtd * (bracket[high].t - bracket[low].t) >= 0.0 {
                bracket[high] = bracket[low].clone();
            }
            bracket[low] = trial;
        }
    }

    debug!(
        "Line search: step {:.3e} after {} evaluations (wolfe satisfied: {})",
        bracket[low].t, evaluations, done
    );
    let best = bracket.swap_remove(low);
    Ok(LineSearchResult {
        loss: best.f,
        flat_grad: best.g,
        t: best.t,
        evaluations,
    })
}

impl Optimizer for Lbfgs {
    fn step(&mut self, params: &mut [f64], objective: &mut dyn Objective) -> Result<f64> {
        let config = self.config.clone();
        let max_eval = config.max_eval();

        let (orig_loss, mut flat_grad) = objective.evaluate(params)?;
        let mut loss = orig_loss;
        let mut current_evals = 1;
        self.state.func_evals += 1;

        if max_abs(&flat_grad) <= config.tolerance_grad {
            debug!("L-BFGS: gradient below tolerance at entry");
            return Ok(orig_loss);
        }

        let mut n_iter = 0;
        while n_iter < config.max_iter {
            n_iter += 1;
            self.state.n_iter += 1;

            if self.state.n_iter == 1 {
                self.state.direction = flat_grad.iter().map(|g| -g).collect();
                self.state.old_dirs.clear();
                self.state.old_steps.clear();
                self.state.ro.clear();
                self.state.h_diag = 1.0;
            } else {
                self.update_curvature(&flat_grad);
                self.state.direction = self.search_direction(&flat_grad);
            }

            self.state.prev_flat_grad = flat_grad.clone();
            self.state.prev_loss = loss;

            self.state.step_size = if self.state.n_iter == 1 {
                let l1: f64 = flat_grad.iter().map(|g| g.abs()).sum();
                (1.0f64).min(1.0 / l1) * config.learning_rate
            } else {
                config.learning_rate
            };

            let gtd = dot(&flat_grad, &self.state.direction);
            if gtd > -config.tolerance_change {
                debug!("L-BFGS: directional derivative {:.3e} is not a descent", gtd);
                break;
            }

            let mut opt_cond = false;
            let mut ls_func_evals = 0;
            match config.line_search {
                LineSearch::StrongWolfe => {
                    let result = strong_wolfe(
                        objective,
                        params,
                        self.state.step_size,
                        &self.state.direction,
                        loss,
                        &flat_grad,
                        gtd,
                        config.tolerance_change,
                    )?;
                    self.state.step_size = result.t;
                    for (p, d) in params.iter_mut().zip(&self.state.direction) {
                        *p += result.t * d;
                    }
                    loss = result.loss;
                    flat_grad = result.flat_grad;
                    ls_func_evals = result.evaluations;
                    opt_cond = max_abs(&flat_grad) <= config.tolerance_grad;
                }
                LineSearch::None => {
                    let t = self.state.step_size;
                    for (p, d) in params.iter_mut().zip(&self.state.direction) {
                        *p += t * d;
                    }
                    if n_iter != config.max_iter {
                        let (new_loss, new_grad) = objective.evaluate(params)?;
                        loss = new_loss;
                        flat_grad = new_grad;
                        opt_cond = max_abs(&flat_grad) <= config.tolerance_grad;
                        ls_func_evals = 1;
                    }
                }
            }
            current_evals += ls_func_evals;
            self.state.func_evals += ls_func_evals;

            if n_iter == config.max_iter {
                break;
            }
            if current_evals >= max_eval {
                debug!("L-BFGS: evaluation budget of {} reached", max_eval);
                break;
            }
            if opt_cond {
                debug!("L-BFGS: gradient below tolerance");
                break;
            }
            if max_abs(&self.state.direction) * self.state.step_size.abs() <= config.tolerance_change {
                debug!("L-BFGS: step below tolerance");
                break;
            }
            if (loss - self.state.prev_loss).abs() < config.tolerance_change {
                debug!("L-BFGS: objective change below tolerance");
                break;
            }
        }

        Ok(orig_loss)
    }

    fn reset(&mut self) {
        self.state = LbfgsState::default();
    }

    fn learning_rate(&self) -> f64 {
        self.config.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.config.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic(p: &[f64]) -> Result<(f64, Vec<f64>)> {
        let value = p.iter().enumerate().map(|(i, x)| (i + 1) as f64 * x * x).sum();
        let grad = p.iter().enumerate().map(|(i, x)| 2.0 * (i + 1) as f64 * x).collect();
        Ok((value, grad))
    }

    #[test]
    fn test_default_config() {
        let config = LbfgsConfig::default();
        assert_eq!(config.learning_rate, 1.0);
        assert_eq!(config.max_iter, 20);
        assert_eq!(config.max_eval(), 25);
        assert_eq!(config.history_size, 100);
        assert_eq!(config.line_search, LineSearch::None);
    }

    #[test]
    fn test_cubic_interpolate_exact_for_quadratic() {
        // f(x) = (x - 1)^2 sampled at 0 and 3.
        let t = cubic_interpolate((0.0, 1.0, -2.0), (3.0, 4.0, 4.0), None);
        assert!((t - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cubic_interpolate_respects_bounds() {
        let t = cubic_interpolate((0.0, 1.0, -2.0), (3.0, 4.0, 4.0), Some((2.0, 5.0)));
        assert_eq!(t, 2.0);
    }

    #[test]
    fn test_step_returns_entry_loss() {
        let mut optimizer = Lbfgs::new(LbfgsConfig::default());
        let mut x = vec![1.0, 1.0];
        let mut objective = quadratic;
        let loss = optimizer.step(&mut x, &mut objective).unwrap();
        assert_eq!(loss, 3.0);
        assert!(quadratic(&x).unwrap().0 < 1e-6);
    }

    #[test]
    fn test_state_persists_and_resets() {
        let config = LbfgsConfig {
            max_iter: 2,
            ..LbfgsConfig::default()
        };
        let mut optimizer = Lbfgs::new(config);
        let mut x = vec![1.0, -2.0, 0.5];
        let mut objective = quadratic;
        optimizer.step(&mut x, &mut objective).unwrap();
        optimizer.step(&mut x, &mut objective).unwrap();
        assert!(optimizer.iterations() >= 3);

        optimizer.reset();
        assert_eq!(optimizer.iterations(), 0);
        assert_eq!(optimizer.function_evaluations(), 0);
    }

    #[test]
    fn test_zero_gradient_is_a_no_op() {
        let mut optimizer = Lbfgs::new(LbfgsConfig::default());
        let mut x = vec![0.0, 0.0];
        let mut objective = quadratic;
        optimizer.step(&mut x, &mut objective).unwrap();
        assert_eq!(x, vec![0.0, 0.0]);
        assert_eq!(optimizer.iterations(), 0);
    }
}
