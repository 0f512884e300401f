//! Gradient-matching reconstruction
//!
//! Given a classifier and the gradient one training batch produced, recover
//! the batch: a random [`DummyState`] is optimized until the gradient it
//! induces matches the observed one.
//!
//! # Lifecycle
//!
//! ```text
//! Init --step()--> Iterating --run() completes--> Done
//! ```
//!
//! Any error (numerical divergence included) is returned to the caller and
//! leaves the reconstruction where it stopped.

mod dummy;
mod history;
mod objective;

pub use dummy::DummyState;
pub use history::{ReconstructionHistory, Snapshot};
pub use objective::GradientMatching;

use log::info;

use crate::config::AttackConfig;
use crate::data::VictimBatch;
use crate::error::{LeakageError, Result};
use crate::gradients::{extract_reference_gradient, GradientVector};
use crate::model::LeNet;
use crate::optimizers::Optimizer;
use crate::utils::SimpleRng;

/// Where a [`Reconstruction`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Iterating,
    Done,
}

/// The reconstruction loop: owns the dummy state, the reference gradient and
/// the optimizer; borrows the classifier.
pub struct Reconstruction<'a> {
    model: &'a LeNet,
    reference: GradientVector,
    state: DummyState,
    optimizer: Box<dyn Optimizer>,
    history: ReconstructionHistory,
    log_interval: usize,
    iteration: usize,
    phase: Phase,
}

impl<'a> Reconstruction<'a> {
    /// # Errors
    ///
    /// `ShapeMismatch` if `reference` does not fit `model` or `state` does not
    /// fit the classifier input and class count; `Config` if `log_interval`
    /// is zero.
    pub fn new(
        model: &'a LeNet,
        reference: GradientVector,
        state: DummyState,
        optimizer: Box<dyn Optimizer>,
        log_interval: usize,
    ) -> Result<Self> {
        if log_interval == 0 {
            return Err(LeakageError::Config(
                "log_interval must be at least 1".to_string(),
            ));
        }
        model.check_images(state.images())?;
        let expected = vec![state.batch_size(), model.num_classes()];
        if state.label_logits().shape() != expected.as_slice() {
            return Err(LeakageError::ShapeMismatch {
                what: "dummy label logits",
                expected,
                actual: state.label_logits().shape().to_vec(),
            });
        }
        GradientMatching::new(model, &reference, state.batch_size())?;

        Ok(Self {
            model,
            reference,
            state,
            optimizer,
            history: ReconstructionHistory::new(),
            log_interval,
            iteration: 0,
            phase: Phase::Init,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of completed optimizer steps.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn state(&self) -> &DummyState {
        &self.state
    }

    pub fn history(&self) -> &ReconstructionHistory {
        &self.history
    }

    pub fn reference(&self) -> &GradientVector {
        &self.reference
    }

    fn objective(&self) -> Result<GradientMatching<'_>> {
        GradientMatching::new(self.model, &self.reference, self.state.batch_size())
    }

    /// Matching objective at the current state.
    pub fn current_objective(&self) -> Result<f64> {
        let objective = self.objective()?;
        Ok(objective.evaluate(&self.state.flatten())?.0)
    }

    /// One optimizer step. On logged iterations the objective is evaluated
    /// again afterwards and a snapshot is recorded.
    ///
    /// Returns the objective at the start of the step.
    pub fn step(&mut self) -> Result<f64> {
        if self.phase == Phase::Done {
            return Err(LeakageError::Config(
                "reconstruction has already finished".to_string(),
            ));
        }
        self.phase = Phase::Iterating;

        let mut objective = GradientMatching::new(self.model, &self.reference, self.state.batch_size())?;
        let mut point = self.state.flatten();
        let result = self.optimizer.step(&mut point, &mut objective);
        self.state.assign_flat(&point);
        let loss = result?;

        if self.iteration % self.log_interval == 0 {
            let current = objective.evaluate(&point)?.0;
            info!("{} {:.4}", self.iteration, current);
            self.history.record(self.iteration, current, &self.state);
        }
        self.iteration += 1;
        Ok(loss)
    }

    /// Run `iterations` steps, then mark the reconstruction as done.
    pub fn run(&mut self, iterations: usize) -> Result<()> {
        for _ in 0..iterations {
            self.step()?;
        }
        self.phase = Phase::Done;
        Ok(())
    }

    /// Final dummy state and the recorded history.
    pub fn into_parts(self) -> (DummyState, ReconstructionHistory) {
        (self.state, self.history)
    }
}

/// Full attack on `victim`.
///
/// The classifier is initialized from `config.seed`, its gradient on the
/// victim batch becomes the reference, and the dummy state is drawn from the
/// same random stream right after the classifier weights.
pub fn run_attack(
    config: &AttackConfig,
    victim: &VictimBatch,
) -> Result<(DummyState, ReconstructionHistory)> {
    config.validate()?;
    let mut rng = SimpleRng::new(config.seed);
    let model = LeNet::new(victim.image_shape(), victim.num_classes(), &mut rng)?;
    info!(
        "Classifier: input {:?}, {} classes, {} parameters",
        model.input_shape(),
        model.num_classes(),
        model.parameter_count()
    );

    let reference = extract_reference_gradient(&model, victim.images(), victim.targets())?;
    let state = DummyState::for_victim(victim.images(), victim.targets(), &mut rng);
    state.ensure_matches(victim.images(), victim.targets())?;

    info!(
        "Reconstructing batch of {} with {} for {} iterations",
        victim.len(),
        config.optimizer.name(),
        config.iterations
    );
    let mut reconstruction = Reconstruction::new(
        &model,
        reference,
        state,
        config.optimizer.build(),
        config.log_interval,
    )?;
    reconstruction.run(config.iterations)?;
    Ok(reconstruction.into_parts())
}
