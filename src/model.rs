//! The leaked classifier
//!
//! A fixed LeNet-style network: three 5x5 sigmoid convolutions followed by
//! one dense layer. Sigmoid keeps second derivatives non-zero everywhere,
//! which the gradient-matching attack relies on.
//!
//! ```text
//! (C, H, W) -> conv 5x5/2 -> sigmoid -> (12, H/2, W/2)
//!           -> conv 5x5/2 -> sigmoid -> (12, H/4, W/4)
//!           -> conv 5x5/1 -> sigmoid -> (12, H/4, W/4)
//!           -> flatten -> dense -> (K)
//! ```

use crate::autograd::{NodeId, Tape};
use crate::error::{LeakageError, Result};
use crate::layers::{Conv2DLayer, DenseLayer, Layer};
use crate::tensor::Tensor;
use crate::utils::SimpleRng;

const HIDDEN_CHANNELS: usize = 12;
const KERNEL: usize = 5;
const PAD: usize = KERNEL / 2;

/// Channel-first geometry of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    /// CIFAR images: 3 x 32 x 32.
    pub const CIFAR: ImageShape = ImageShape {
        channels: 3,
        height: 32,
        width: 32,
    };

    pub fn numel(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// `(batch, channels, height, width)`.
    pub fn batch_shape(&self, batch: usize) -> Vec<usize> {
        vec![batch, self.channels, self.height, self.width]
    }
}

/// Fixed-architecture classifier whose parameters are never updated.
#[derive(Debug, Clone)]
pub struct LeNet {
    input: ImageShape,
    num_classes: usize,
    convs: [Conv2DLayer; 3],
    fc: DenseLayer,
}

impl LeNet {
    /// Build the classifier, drawing every parameter from `rng`.
    ///
    /// # Errors
    ///
    /// `Config` if the image is smaller than 4x4 or has no channels, or if
    /// there are no classes.
    pub fn new(input: ImageShape, num_classes: usize, rng: &mut SimpleRng) -> Result<Self> {
        if input.channels == 0 || input.height < 4 || input.width < 4 || num_classes == 0 {
            return Err(LeakageError::Config(format!(
                "unsupported classifier geometry {:?} with {} classes",
                input, num_classes
            )));
        }

        let (h, w) = (input.height, input.width);
        let conv1 = Conv2DLayer::new(input.channels, HIDDEN_CHANNELS, KERNEL, PAD, 2, h, w, rng);
        let (h, w) = (conv1.output_height(), conv1.output_width());
        let conv2 = Conv2DLayer::new(HIDDEN_CHANNELS, HIDDEN_CHANNELS, KERNEL, PAD, 2, h, w, rng);
        let (h, w) = (conv2.output_height(), conv2.output_width());
        let conv3 = Conv2DLayer::new(HIDDEN_CHANNELS, HIDDEN_CHANNELS, KERNEL, PAD, 1, h, w, rng);
        let fc = DenseLayer::new(conv3.output_size(), num_classes, rng);

        Ok(Self {
            input,
            num_classes,
            convs: [conv1, conv2, conv3],
            fc,
        })
    }

    pub fn input_shape(&self) -> ImageShape {
        self.input
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn layers(&self) -> [&dyn Layer; 4] {
        [&self.convs[0], &self.convs[1], &self.convs[2], &self.fc]
    }

    /// ParameterSet in a fixed order: per layer, weights then biases.
    pub fn parameters(&self) -> Vec<&Tensor> {
        self.layers()
            .into_iter()
            .flat_map(|layer| layer.parameters())
            .collect()
    }

    pub fn parameter_shapes(&self) -> Vec<Vec<usize>> {
        self.parameters()
            .iter()
            .map(|p| p.shape().to_vec())
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers().into_iter().map(|layer| layer.parameter_count()).sum()
    }

    /// Put every parameter on `tape` as a variable, in [`parameters`](Self::parameters) order.
    pub fn register_parameters(&self, tape: &mut Tape) -> Vec<NodeId> {
        self.parameters()
            .into_iter()
            .map(|p| tape.variable(p.clone()))
            .collect()
    }

    /// Record the forward pass; returns logits `(batch, num_classes)`.
    ///
    /// # Panics
    ///
    /// Panics if `params` did not come from [`register_parameters`](Self::register_parameters)
    /// or `images` does not match the input geometry.
    pub fn forward(&self, tape: &mut Tape, params: &[NodeId], images: NodeId) -> NodeId {
        assert_eq!(params.len(), 8, "LeNet expects 8 parameter handles");
        let batch = tape.shape(images)[0];

        let mut hidden = images;
        for (i, conv) in self.convs.iter().enumerate() {
            let pre = conv.forward(tape, hidden, &params[2 * i..2 * i + 2]);
            hidden = tape.sigmoid(pre);
        }

        let flat = tape.reshape(hidden, vec![batch, self.fc.input_size()]);
        self.fc.forward(tape, flat, &params[6..8])
    }

    /// Plain forward pass on constant inputs.
    pub fn predict(&self, images: &Tensor) -> Result<Tensor> {
        self.check_images(images)?;
        let mut tape = Tape::new();
        let params: Vec<NodeId> = self
            .parameters()
            .into_iter()
            .map(|p| tape.constant(p.clone()))
            .collect();
        let input = tape.constant(images.clone());
        let logits = self.forward(&mut tape, &params, input);
        Ok(tape.value(logits).clone())
    }

    /// Verify `images` is a non-empty `(N, C, H, W)` batch for this classifier.
    pub fn check_images(&self, images: &Tensor) -> Result<()> {
        let batch = images.shape().first().copied().unwrap_or(0);
        let expected = self.input.batch_shape(batch.max(1));
        if batch == 0 || images.shape() != expected.as_slice() {
            return Err(LeakageError::ShapeMismatch {
                what: "classifier input",
                expected,
                actual: images.shape().to_vec(),
            });
        }
        Ok(())
    }
}
