//! Dense (fully connected) layer implementation
//!
//! This module provides a DenseLayer (also known as Linear or Fully Connected
//! layer) that records the transformation: output = input × weightsᵀ + biases

use crate::autograd::{NodeId, Tape};
use crate::layers::Layer;
use crate::tensor::Tensor;
use crate::utils::SimpleRng;

/// Dense (fully connected) layer with weights and biases.
///
/// Performs the linear transformation: y = xWᵀ + b
/// where x is the input (batch_size × input_size),
/// W is the weight matrix (output_size × input_size),
/// and b is the bias vector (output_size).
///
/// # Example
///
/// ```
/// use gradient_leakage::layers::{DenseLayer, Layer};
/// use gradient_leakage::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = DenseLayer::new(768, 100, &mut rng);
/// assert_eq!(layer.parameter_count(), 768 * 100 + 100);
/// ```
#[derive(Debug, Clone)]
pub struct DenseLayer {
    input_size: usize,
    output_size: usize,
    weights: Tensor,
    biases: Tensor,
}

impl DenseLayer {
    /// Create a new DenseLayer with weights and biases drawn uniformly from
    /// `[-INIT_RANGE, INIT_RANGE)`.
    pub fn new(input_size: usize, output_size: usize, rng: &mut SimpleRng) -> Self {
        let limit = super::INIT_RANGE;
        let weights = (0..input_size * output_size)
            .map(|_| rng.gen_range_f64(-limit, limit))
            .collect();
        let biases = (0..output_size)
            .map(|_| rng.gen_range_f64(-limit, limit))
            .collect();

        Self {
            input_size,
            output_size,
            weights: Tensor::new(vec![output_size, input_size], weights),
            biases: Tensor::new(vec![output_size], biases),
        }
    }

    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    pub fn biases(&self) -> &Tensor {
        &self.biases
    }
}

impl Layer for DenseLayer {
    fn forward(&self, tape: &mut Tape, input: NodeId, params: &[NodeId]) -> NodeId {
        assert_eq!(params.len(), 2, "DenseLayer expects weight and bias handles");
        let shape = tape.shape(input).to_vec();
        assert_eq!(
            shape.len(),
            2,
            "DenseLayer expects (batch, features) input, got {:?}",
            shape
        );
        assert_eq!(shape[1], self.input_size, "DenseLayer input size mismatch");

        let weights_t = tape.transpose(params[0]);
        let product = tape.matmul(input, weights_t);
        let bias = tape.channel_broadcast(params[1], vec![shape[0], self.output_size]);
        tape.add(product, bias)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weights, &self.biases]
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }
}
