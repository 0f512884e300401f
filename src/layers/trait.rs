//! Layer trait definition for tape-recorded layers
//!
//! A layer owns its parameter values but never updates them. During a
//! forward pass the caller registers the parameters on a tape and hands the
//! resulting node handles back to the layer, which keeps the whole
//! computation differentiable with respect to both inputs and parameters.

use crate::autograd::{NodeId, Tape};
use crate::tensor::Tensor;

/// Core trait for classifier layers.
///
/// # Example
///
/// ```ignore
/// let params: Vec<NodeId> = layer
///     .parameters()
///     .into_iter()
///     .map(|p| tape.variable(p.clone()))
///     .collect();
/// let output = layer.forward(&mut tape, input, &params);
/// ```
pub trait Layer {
    /// Record the layer's transformation on `tape`.
    ///
    /// # Arguments
    ///
    /// * `tape` - Tape receiving the operations
    /// * `input` - Node holding the batched layer input
    /// * `params` - Tape handles for this layer's parameters, in the order
    ///   returned by [`Layer::parameters`]
    ///
    /// # Panics
    ///
    /// Implementations panic if `params` has the wrong length or the input
    /// shape does not match the layer.
    fn forward(&self, tape: &mut Tape, input: NodeId, params: &[NodeId]) -> NodeId;

    /// Parameter tensors (weights first, then biases).
    fn parameters(&self) -> Vec<&Tensor>;

    /// Expected number of input features per sample.
    fn input_size(&self) -> usize;

    /// Number of output features per sample.
    fn output_size(&self) -> usize;

    /// Total count of weights and biases.
    fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }
}
