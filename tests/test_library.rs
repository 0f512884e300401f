//! Tests for the gradient_leakage public API
//!
//! This file tests the building blocks the attack is assembled from:
//! - DenseLayer and Conv2DLayer: creation, initialization, forward
//! - LeNet: geometry, parameter layout, prediction
//! - Label encoding and softmax
//! - SimpleRng: reproducibility and distribution

use approx::assert_relative_eq;
use gradient_leakage::autograd::Tape;
use gradient_leakage::labels::{encode_onehot, encode_onehot_batch, softmax};
use gradient_leakage::layers::{Conv2DLayer, DenseLayer, Layer, INIT_RANGE};
use gradient_leakage::model::{ImageShape, LeNet};
use gradient_leakage::tensor::Tensor;
use gradient_leakage::utils::SimpleRng;
use gradient_leakage::LeakageError;

// ============================================================================
// DenseLayer Tests
// ============================================================================

mod dense_layer_tests {
    use super::*;

    #[test]
    fn test_dense_layer_creation() {
        let mut rng = SimpleRng::new(42);
        let layer = DenseLayer::new(768, 100, &mut rng);

        assert_eq!(layer.input_size(), 768);
        assert_eq!(layer.output_size(), 100);
        assert_eq!(layer.parameter_count(), 768 * 100 + 100);
        assert_eq!(layer.weights().shape(), &[100, 768]);
    }

    #[test]
    fn test_dense_layer_forward() {
        let mut rng = SimpleRng::new(42);
        let layer = DenseLayer::new(3, 2, &mut rng);
        let input = Tensor::new(vec![1, 3], vec![1.0, -1.0, 0.5]);

        let mut tape = Tape::new();
        let params: Vec<_> = layer
            .parameters()
            .into_iter()
            .map(|p| tape.constant(p.clone()))
            .collect();
        let x = tape.constant(input.clone());
        let out = layer.forward(&mut tape, x, &params);

        let w = layer.weights().data();
        let b = layer.biases().data();
        for j in 0..2 {
            let expected: f64 = (0..3).map(|i| w[j * 3 + i] * input.data()[i]).sum::<f64>() + b[j];
            assert_relative_eq!(tape.value(out).data()[j], expected, epsilon = 1e-12);
        }
    }
}

// ============================================================================
// Conv2DLayer Tests
// ============================================================================

mod conv_layer_tests {
    use super::*;

    #[test]
    fn test_conv_layer_geometry() {
        let mut rng = SimpleRng::new(42);
        let layer = Conv2DLayer::new(3, 12, 5, 2, 2, 32, 32, &mut rng);
        assert_eq!(layer.in_channels(), 3);
        assert_eq!(layer.out_channels(), 12);
        assert_eq!(layer.kernel_size(), 5);
        assert_eq!(layer.padding(), 2);
        assert_eq!(layer.stride(), 2);
        assert_eq!(layer.output_height(), 16);
        assert_eq!(layer.output_width(), 16);
        assert_eq!(layer.output_size(), 12 * 16 * 16);
        assert_eq!(layer.parameter_count(), 12 * 3 * 25 + 12);
    }

    #[test]
    fn test_conv_layer_initialization_range() {
        let mut rng = SimpleRng::new(7);
        let layer = Conv2DLayer::new(2, 4, 3, 1, 1, 6, 6, &mut rng);
        for p in layer.parameters() {
            assert!(p.data().iter().all(|v| v.abs() <= INIT_RANGE));
        }
    }

    #[test]
    fn test_conv_layer_zero_input_gives_bias() {
        let mut rng = SimpleRng::new(8);
        let layer = Conv2DLayer::new(1, 2, 3, 1, 1, 4, 4, &mut rng);

        let mut tape = Tape::new();
        let params: Vec<_> = layer
            .parameters()
            .into_iter()
            .map(|p| tape.constant(p.clone()))
            .collect();
        let x = tape.constant(Tensor::zeros(vec![1, 1, 4, 4]));
        let out = layer.forward(&mut tape, x, &params);

        let out = tape.value(out);
        assert_eq!(out.shape(), &[1, 2, 4, 4]);
        for (c, plane) in out.data().chunks(16).enumerate() {
            assert!(plane.iter().all(|&v| v == layer.biases().data()[c]));
        }
    }
}

// ============================================================================
// LeNet Tests
// ============================================================================

mod model_tests {
    use super::*;

    #[test]
    fn test_cifar_lenet_predict() {
        let model = LeNet::new(ImageShape::CIFAR, 100, &mut SimpleRng::new(1234)).unwrap();
        let images = Tensor::filled(vec![2, 3, 32, 32], 0.5);
        let logits = model.predict(&images).unwrap();
        assert_eq!(logits.shape(), &[2, 100]);
        assert!(logits.is_finite());
        // Identical images give identical rows.
        assert_eq!(logits.data()[..100], logits.data()[100..]);
    }

    #[test]
    fn test_same_seed_same_model() {
        let a = LeNet::new(ImageShape::CIFAR, 10, &mut SimpleRng::new(5)).unwrap();
        let b = LeNet::new(ImageShape::CIFAR, 10, &mut SimpleRng::new(5)).unwrap();
        assert_eq!(a.parameters(), b.parameters());
    }

    #[test]
    fn test_predict_rejects_wrong_geometry() {
        let model = LeNet::new(ImageShape::CIFAR, 10, &mut SimpleRng::new(5)).unwrap();
        let result = model.predict(&Tensor::zeros(vec![1, 1, 32, 32]));
        assert!(matches!(result, Err(LeakageError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_degenerate_geometry_rejected() {
        let tiny = ImageShape {
            channels: 3,
            height: 2,
            width: 2,
        };
        assert!(matches!(
            LeNet::new(tiny, 10, &mut SimpleRng::new(5)),
            Err(LeakageError::Config(_))
        ));
        assert!(LeNet::new(ImageShape::CIFAR, 0, &mut SimpleRng::new(5)).is_err());
    }
}

// ============================================================================
// Label Tests
// ============================================================================

mod label_tests {
    use super::*;

    #[test]
    fn test_onehot_batch() {
        let batch = encode_onehot_batch(&[1, 0], 3).unwrap();
        assert_eq!(batch.shape(), &[2, 3]);
        assert_eq!(batch.data(), &[0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_onehot_out_of_range() {
        assert!(matches!(
            encode_onehot(100, 100),
            Err(LeakageError::IndexOutOfRange { index: 100, len: 100, .. })
        ));
    }

    #[test]
    fn test_softmax_large_logits() {
        let probs = softmax(&Tensor::new(vec![2, 3], vec![1000.0, 0.0, -1000.0, 1.0, 1.0, 1.0]));
        assert_relative_eq!(probs.data()[0], 1.0);
        assert_relative_eq!(probs.data()[2], 0.0);
        for &p in &probs.data()[3..] {
            assert_relative_eq!(p, 1.0 / 3.0, epsilon = 1e-12);
        }
    }
}

// ============================================================================
// SimpleRng Tests
// ============================================================================

mod rng_tests {
    use super::*;

    #[test]
    fn test_rng_reproducible() {
        let mut a = SimpleRng::new(1234);
        let mut b = SimpleRng::new(1234);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_zero_seed_is_usable() {
        let mut rng = SimpleRng::new(0);
        assert_ne!(rng.next_u64(), 0);
    }

    #[test]
    fn test_uniform_range() {
        let mut rng = SimpleRng::new(3);
        for _ in 0..1000 {
            let v = rng.gen_range_f64(-0.5, 0.5);
            assert!((-0.5..0.5).contains(&v));
        }
    }

    #[test]
    fn test_normal_moments() {
        let samples = SimpleRng::new(9).normal_vec(20_000);
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 0.05, "mean {}", mean);
        assert!((var - 1.0).abs() < 0.05, "variance {}", var);
    }
}
