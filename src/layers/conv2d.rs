//! 2D Convolutional layer implementation
//!
//! This module provides a Conv2DLayer recorded on the autodiff tape as a
//! bias-free convolution followed by a per-channel bias.

use crate::autograd::{NodeId, Tape};
use crate::layers::Layer;
use crate::tensor::Tensor;
use crate::utils::SimpleRng;

/// 2D Convolutional layer with square filters.
///
/// # Fields
///
/// * `in_channels` - Number of input channels (e.g., 3 for RGB)
/// * `out_channels` - Number of output feature maps (number of filters)
/// * `kernel_size` - Size of the convolutional kernel (kernel_size × kernel_size)
/// * `padding` - Zero-padding applied to input (symmetric on all sides)
/// * `stride` - Stride for the convolution operation
/// * `input_height` - Height of input feature map
/// * `input_width` - Width of input feature map
/// * `weights` - Filters `(out_channels, in_channels, kernel_size, kernel_size)`
/// * `biases` - Bias for each output channel `(out_channels)`
///
/// # Example
///
/// ```
/// use gradient_leakage::layers::Conv2DLayer;
/// use gradient_leakage::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// // 3 input channels, 12 filters, 5x5 kernel, padding=2, stride=2, 32x32 input
/// let layer = Conv2DLayer::new(3, 12, 5, 2, 2, 32, 32, &mut rng);
/// assert_eq!(layer.output_height(), 16);
/// ```
#[derive(Debug, Clone)]
pub struct Conv2DLayer {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    padding: usize,
    stride: usize,
    input_height: usize,
    input_width: usize,
    weights: Tensor,
    biases: Tensor,
}

impl Conv2DLayer {
    /// Create a new Conv2DLayer with uniform initialization.
    ///
    /// Weights and biases are both drawn from `[-init_range, init_range)`
    /// with [`super::INIT_RANGE`], the initialization of the leaked model.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: usize,
        stride: usize,
        input_height: usize,
        input_width: usize,
        rng: &mut SimpleRng,
    ) -> Self {
        let limit = super::INIT_RANGE;
        let weight_shape = vec![out_channels, in_channels, kernel_size, kernel_size];
        let weight_count = weight_shape.iter().product();
        let weights = (0..weight_count)
            .map(|_| rng.gen_range_f64(-limit, limit))
            .collect();
        let biases = (0..out_channels)
            .map(|_| rng.gen_range_f64(-limit, limit))
            .collect();

        Self {
            in_channels,
            out_channels,
            kernel_size,
            padding,
            stride,
            input_height,
            input_width,
            weights: Tensor::new(weight_shape, weights),
            biases: Tensor::new(vec![out_channels], biases),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    pub fn biases(&self) -> &Tensor {
        &self.biases
    }

    /// Calculated as: (input_height + 2*padding - kernel_size) / stride + 1
    pub fn output_height(&self) -> usize {
        (self.input_height + 2 * self.padding - self.kernel_size) / self.stride + 1
    }

    /// Calculated as: (input_width + 2*padding - kernel_size) / stride + 1
    pub fn output_width(&self) -> usize {
        (self.input_width + 2 * self.padding - self.kernel_size) / self.stride + 1
    }
}

impl Layer for Conv2DLayer {
    fn forward(&self, tape: &mut Tape, input: NodeId, params: &[NodeId]) -> NodeId {
        assert_eq!(params.len(), 2, "Conv2DLayer expects weight and bias handles");
        let shape = tape.shape(input);
        assert_eq!(
            &shape[1..],
            &[self.in_channels, self.input_height, self.input_width],
            "Conv2DLayer input shape mismatch"
        );

        let conv = tape.conv2d(input, params[0], self.stride, self.padding);
        let out_shape = tape.shape(conv).to_vec();
        let bias = tape.channel_broadcast(params[1], out_shape);
        tape.add(conv, bias)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weights, &self.biases]
    }

    fn input_size(&self) -> usize {
        self.in_channels * self.input_height * self.input_width
    }

    fn output_size(&self) -> usize {
        self.out_channels * self.output_height() * self.output_width()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv2d_parameter_count() {
        let mut rng = SimpleRng::new(42);
        let layer = Conv2DLayer::new(3, 12, 5, 2, 2, 32, 32, &mut rng);

        // weights: 12 * 3 * 5 * 5 = 900, biases: 12
        assert_eq!(layer.parameter_count(), 912);
    }

    #[test]
    fn test_conv2d_output_dimensions() {
        let mut rng = SimpleRng::new(42);
        let strided = Conv2DLayer::new(3, 12, 5, 2, 2, 32, 32, &mut rng);
        assert_eq!(strided.output_height(), 16);
        assert_eq!(strided.output_width(), 16);

        let same = Conv2DLayer::new(12, 12, 5, 2, 1, 8, 8, &mut rng);
        assert_eq!(same.output_size(), 12 * 8 * 8);
    }

    #[test]
    fn test_conv2d_initialization_bounds() {
        let mut rng = SimpleRng::new(42);
        let layer = Conv2DLayer::new(3, 12, 5, 2, 2, 32, 32, &mut rng);

        for &w in layer.weights().data().iter().chain(layer.biases().data()) {
            assert!((-0.5..0.5).contains(&w), "parameter {} outside [-0.5, 0.5)", w);
        }
    }

    #[test]
    fn test_conv2d_forward_adds_bias() {
        let mut rng = SimpleRng::new(7);
        let layer = Conv2DLayer::new(1, 2, 3, 1, 1, 4, 4, &mut rng);
        let mut tape = Tape::new();
        let params: Vec<NodeId> = layer
            .parameters()
            .into_iter()
            .map(|p| tape.constant(p.clone()))
            .collect();
        let input = tape.constant(Tensor::zeros(vec![1, 1, 4, 4]));
        let out = layer.forward(&mut tape, input, &params);

        // Zero input: every output equals its channel bias.
        let value = tape.value(out);
        assert_eq!(value.shape(), &[1, 2, 4, 4]);
        for (c, chunk) in value.data().chunks(16).enumerate() {
            for &v in chunk {
                assert_eq!(v, layer.biases().data()[c]);
            }
        }
    }
}
