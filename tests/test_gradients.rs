//! Tests for reference gradient extraction
//!
//! The leaked gradient must line up with the classifier's parameters, and
//! because the loss sums over the batch, a batch gradient is the sum of the
//! per-sample gradients.

use approx::assert_relative_eq;
use gradient_leakage::gradients::{extract_reference_gradient, GradientVector};
use gradient_leakage::labels::encode_onehot_batch;
use gradient_leakage::model::{ImageShape, LeNet};
use gradient_leakage::tensor::Tensor;
use gradient_leakage::utils::SimpleRng;
use gradient_leakage::LeakageError;

const SHAPE: ImageShape = ImageShape {
    channels: 1,
    height: 8,
    width: 8,
};

fn model() -> LeNet {
    LeNet::new(SHAPE, 4, &mut SimpleRng::new(11)).unwrap()
}

fn image(seed: u64) -> Tensor {
    let mut rng = SimpleRng::new(seed);
    Tensor::new(vec![1, 8, 8], (0..64).map(|_| rng.next_f64()).collect())
}

fn gradient_for(model: &LeNet, images: &[Tensor], labels: &[usize]) -> GradientVector {
    let batch = Tensor::stack(images);
    let targets = encode_onehot_batch(labels, model.num_classes()).unwrap();
    extract_reference_gradient(model, &batch, &targets).unwrap()
}

// ============================================================================
// Shape Tests
// ============================================================================

mod shape_tests {
    use super::*;

    #[test]
    fn test_gradient_matches_parameter_shapes() {
        let model = model();
        let gradient = gradient_for(&model, &[image(1)], &[2]);
        assert_eq!(gradient.len(), 8);
        assert!(gradient.matches_shapes(&model.parameter_shapes()));
        assert!(gradient.norm() > 0.0);
    }

    #[test]
    fn test_target_shape_is_checked() {
        let model = model();
        let images = Tensor::stack(&[image(1)]);
        let result = extract_reference_gradient(&model, &images, &Tensor::zeros(vec![1, 5]));
        assert!(matches!(result, Err(LeakageError::ShapeMismatch { .. })));

        let result = extract_reference_gradient(&model, &images, &Tensor::zeros(vec![2, 4]));
        assert!(matches!(result, Err(LeakageError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_image_shape_is_checked() {
        let model = model();
        let images = Tensor::zeros(vec![1, 3, 8, 8]);
        let result = extract_reference_gradient(&model, &images, &Tensor::zeros(vec![1, 4]));
        assert!(matches!(result, Err(LeakageError::ShapeMismatch { .. })));
    }
}

// ============================================================================
// Batch Tests
// ============================================================================

mod batch_tests {
    use super::*;

    #[test]
    fn test_batch_gradient_is_sum_of_samples() {
        let model = model();
        let a = image(1);
        let b = image(2);
        let joint = gradient_for(&model, &[a.clone(), b.clone()], &[0, 3]);
        let first = gradient_for(&model, &[a], &[0]);
        let second = gradient_for(&model, &[b], &[3]);

        for ((j, f), s) in joint.iter().zip(first.iter()).zip(second.iter()) {
            for ((&jv, &fv), &sv) in j.data().iter().zip(f.data()).zip(s.data()) {
                assert_relative_eq!(jv, fv + sv, epsilon = 1e-10, max_relative = 1e-8);
            }
        }
    }

    #[test]
    fn test_gradient_is_deterministic() {
        let model = model();
        let first = gradient_for(&model, &[image(4)], &[1]);
        let second = gradient_for(&model, &[image(4)], &[1]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_label_changes_gradient() {
        let model = model();
        let first = gradient_for(&model, &[image(4)], &[1]);
        let second = gradient_for(&model, &[image(4)], &[2]);
        assert_ne!(first, second);
    }
}
