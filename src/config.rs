//! Attack configuration
//!
//! [`AttackConfig`] is deserialized from JSON with serde; every field has a
//! default, so a config file only lists what it changes. Validation runs
//! after parsing and again at the start of every attack.
//!
//! # Example
//!
//! ```json
//! {
//!   "index": 25,
//!   "batch_size": 1,
//!   "iterations": 300,
//!   "optimizer": { "kind": "lbfgs", "line_search": "strong_wolfe" }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LeakageError, Result};
use crate::optimizers::{Adam, Lbfgs, LbfgsConfig, Optimizer};

/// Adam hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Optimizer selection, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Lbfgs(LbfgsConfig),
    Adam(AdamConfig),
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Lbfgs(LbfgsConfig::default())
    }
}

impl OptimizerConfig {
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::Lbfgs(_) => "L-BFGS",
            OptimizerConfig::Adam(_) => "Adam",
        }
    }

    /// Fresh optimizer with these settings.
    pub fn build(&self) -> Box<dyn Optimizer> {
        match self {
            OptimizerConfig::Lbfgs(config) => Box::new(Lbfgs::new(config.clone())),
            OptimizerConfig::Adam(config) => Box::new(Adam::new(
                config.learning_rate,
                config.beta1,
                config.beta2,
                config.epsilon,
            )),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            OptimizerConfig::Lbfgs(config) => {
                positive("optimizer.learning_rate", config.learning_rate)?;
                if config.max_iter == 0 {
                    return Err(invalid("optimizer.max_iter must be at least 1"));
                }
                if config.max_eval() == 0 {
                    return Err(invalid("optimizer.max_eval must be at least 1"));
                }
                if config.history_size == 0 {
                    return Err(invalid("optimizer.history_size must be at least 1"));
                }
                if config.tolerance_grad < 0.0 || config.tolerance_change < 0.0 {
                    return Err(invalid("optimizer tolerances must be non-negative"));
                }
            }
            OptimizerConfig::Adam(config) => {
                positive("optimizer.learning_rate", config.learning_rate)?;
                positive("optimizer.epsilon", config.epsilon)?;
                for (name, beta) in [("optimizer.beta1", config.beta1), ("optimizer.beta2", config.beta2)] {
                    if !(0.0..1.0).contains(&beta) {
                        return Err(invalid(format!("{} must be in [0, 1)", name)));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Everything one attack run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackConfig {
    /// Dataset index of the victim sample.
    pub index: usize,
    /// Optional image file replacing the victim sample's pixels.
    pub image: Option<PathBuf>,
    pub batch_size: usize,
    /// Seeds the classifier weights and the initial dummy state.
    pub seed: u64,
    /// Outer optimizer steps.
    pub iterations: usize,
    /// Steps between logged objectives and history snapshots.
    pub log_interval: usize,
    pub optimizer: OptimizerConfig,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            index: 25,
            image: None,
            batch_size: 2,
            seed: 1234,
            iterations: 1000,
            log_interval: 10,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl AttackConfig {
    /// # Errors
    ///
    /// `Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be at least 1"));
        }
        if self.log_interval == 0 {
            return Err(invalid("log_interval must be at least 1"));
        }
        self.optimizer.validate()
    }
}

fn invalid(message: impl Into<String>) -> LeakageError {
    LeakageError::Config(message.into())
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(invalid(format!("{} must be positive, got {}", name, value)))
    }
}

/// Loads an attack configuration from a JSON file.
///
/// Missing fields take their defaults.
///
/// # Examples
///
/// ```no_run
/// use gradient_leakage::config::load_config;
///
/// let cfg = load_config("config/dlg_default.json").unwrap();
/// assert_eq!(cfg.log_interval, 10);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<AttackConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| LeakageError::io(path, e))?;
    let config: AttackConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
