//! Gradient-matching objective
//!
//! For a candidate point `(images, label_logits)` the objective is
//!
//! ```text
//! sum_i || dL(images, softmax(label_logits)) / dθ_i - reference_i ||²
//! ```
//!
//! and its gradient with respect to the candidate is obtained by
//! differentiating through the parameter gradient (second order).

use crate::autograd::{self, Tape};
use crate::error::{LeakageError, Result};
use crate::gradients::{parameter_gradients, GradientVector};
use crate::model::LeNet;
use crate::optimizers::Objective;
use crate::tensor::Tensor;

/// Pure function of `(ParameterSet, candidate point, reference gradient)`.
///
/// Every evaluation records on a fresh tape, so nothing accumulates between
/// calls and evaluating the same point twice gives identical results.
#[derive(Debug, Clone, Copy)]
pub struct GradientMatching<'a> {
    model: &'a LeNet,
    reference: &'a GradientVector,
    batch_size: usize,
}

impl<'a> GradientMatching<'a> {
    /// # Errors
    ///
    /// `ShapeMismatch` if `reference` does not have one component per model
    /// parameter with the parameter's shape, or `batch_size` is zero.
    pub fn new(model: &'a LeNet, reference: &'a GradientVector, batch_size: usize) -> Result<Self> {
        if !reference.matches_shapes(&model.parameter_shapes()) {
            let expected = model.parameter_shapes().into_iter().flatten().collect();
            let actual = reference.shapes().into_iter().flatten().collect();
            return Err(LeakageError::ShapeMismatch {
                what: "reference gradient",
                expected,
                actual,
            });
        }
        if batch_size == 0 {
            return Err(LeakageError::Config(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            model,
            reference,
            batch_size,
        })
    }

    fn image_shape(&self) -> Vec<usize> {
        self.model.input_shape().batch_shape(self.batch_size)
    }

    fn label_shape(&self) -> Vec<usize> {
        vec![self.batch_size, self.model.num_classes()]
    }

    /// Length of the flat point `[images..., logits...]`.
    pub fn dimension(&self) -> usize {
        self.image_shape().iter().product::<usize>() + self.batch_size * self.model.num_classes()
    }

    /// Objective value and its gradient with respect to `point`.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `point` has the wrong length, `NumericalDivergence`
    /// if the objective is not finite.
    pub fn evaluate(&self, point: &[f64]) -> Result<(f64, Vec<f64>)> {
        if point.len() != self.dimension() {
            return Err(LeakageError::ShapeMismatch {
                what: "dummy state vector",
                expected: vec![self.dimension()],
                actual: vec![point.len()],
            });
        }
        let image_shape = self.image_shape();
        let (image_data, logit_data) = point.split_at(image_shape.iter().product());

        let mut tape = Tape::new();
        let images = tape.variable(Tensor::new(image_shape, image_data.to_vec()));
        let logits = tape.variable(Tensor::new(self.label_shape(), logit_data.to_vec()));
        let params = self.model.register_parameters(&mut tape);

        let target = tape.softmax(logits);
        let candidate = parameter_gradients(&mut tape, self.model, &params, images, target);

        let mut objective = tape.constant(Tensor::scalar(0.0));
        for (&g, reference) in candidate.iter().zip(self.reference.iter()) {
            let reference = tape.constant(reference.clone());
            let diff = tape.sub(g, reference);
            let squared = tape.square(diff);
            let term = tape.sum_all(squared);
            objective = tape.add(objective, term);
        }

        let value = tape.value(objective).item();
        if !value.is_finite() {
            return Err(LeakageError::NumericalDivergence { value });
        }

        let grads = autograd::grad(&mut tape, objective, &[images, logits]);
        let mut gradient = Vec::with_capacity(point.len());
        for g in grads {
            gradient.extend_from_slice(tape.value(g).data());
        }
        Ok((value, gradient))
    }
}

impl Objective for GradientMatching<'_> {
    fn evaluate(&mut self, point: &[f64]) -> Result<(f64, Vec<f64>)> {
        GradientMatching::evaluate(self, point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradients::extract_reference_gradient;
    use crate::labels::encode_onehot_batch;
    use crate::model::ImageShape;
    use crate::utils::SimpleRng;

    fn tiny_setup() -> (LeNet, GradientVector, Tensor, Tensor) {
        let shape = ImageShape {
            channels: 1,
            height: 8,
            width: 8,
        };
        let mut rng = SimpleRng::new(11);
        let model = LeNet::new(shape, 4, &mut rng).unwrap();
        let images = Tensor::new(shape.batch_shape(1), (0..64).map(|_| rng.next_f64()).collect());
        let onehot = encode_onehot_batch(&[1], 4).unwrap();
        let reference = extract_reference_gradient(&model, &images, &onehot).unwrap();
        (model, reference, images, onehot)
    }

    #[test]
    fn test_objective_is_zero_at_ground_truth_image_with_sharp_label() {
        let (model, reference, images, _) = tiny_setup();
        let objective = GradientMatching::new(&model, &reference, 1).unwrap();
        let mut point = images.data().to_vec();
        // Softmax of these logits is one-hot at class 1 up to ~1e-300.
        point.extend_from_slice(&[-700.0, 700.0, -700.0, -700.0]);

        let (value, gradient) = objective.evaluate(&point).unwrap();
        assert!(value < 1e-20, "objective at ground truth was {}", value);
        assert_eq!(gradient.len(), point.len());
    }

    #[test]
    fn test_objective_is_pure() {
        let (model, reference, _, _) = tiny_setup();
        let objective = GradientMatching::new(&model, &reference, 1).unwrap();
        let point = SimpleRng::new(3).normal_vec(objective.dimension());
        let first = objective.evaluate(&point).unwrap();
        let second = objective.evaluate(&point).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_wrong_point_length() {
        let (model, reference, _, _) = tiny_setup();
        let objective = GradientMatching::new(&model, &reference, 1).unwrap();
        let err = objective.evaluate(&[0.0; 3]).unwrap_err();
        assert!(matches!(err, LeakageError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_non_finite_objective_is_divergence() {
        let (model, reference, _, _) = tiny_setup();
        let objective = GradientMatching::new(&model, &reference, 1).unwrap();
        let mut point = vec![0.0; objective.dimension()];
        point[0] = f64::NAN;
        let err = objective.evaluate(&point).unwrap_err();
        assert!(matches!(err, LeakageError::NumericalDivergence { .. }));
    }

    #[test]
    fn test_rejects_mismatched_reference() {
        let (model, _, _, _) = tiny_setup();
        let bogus = GradientVector::new(vec![Tensor::zeros(vec![3])]);
        assert!(GradientMatching::new(&model, &bogus, 1).is_err());
    }
}
