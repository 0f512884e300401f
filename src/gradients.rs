//! Gradient extraction
//!
//! The loss is cross-entropy against a soft target (a one-hot row for ground
//! truth, a softmax row for the candidate). Gradients with respect to the
//! classifier parameters are computed on the tape, so they can either be
//! differentiated again or copied out as a detached [`GradientVector`].

use log::info;

use crate::autograd::{self, NodeId, Tape};
use crate::error::{LeakageError, Result};
use crate::model::LeNet;
use crate::tensor::Tensor;

/// One gradient tensor per classifier parameter, in ParameterSet order.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientVector(Vec<Tensor>);

impl GradientVector {
    pub fn new(tensors: Vec<Tensor>) -> Self {
        GradientVector(tensors)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tensor> {
        self.0.iter()
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.0
    }

    pub fn shapes(&self) -> Vec<Vec<usize>> {
        self.0.iter().map(|t| t.shape().to_vec()).collect()
    }

    /// True when every component has the shape at the same position in `shapes`.
    pub fn matches_shapes(&self, shapes: &[Vec<usize>]) -> bool {
        self.0.len() == shapes.len()
            && self
                .0
                .iter()
                .zip(shapes)
                .all(|(t, shape)| t.shape() == shape.as_slice())
    }

    /// Euclidean norm over all components.
    pub fn norm(&self) -> f64 {
        self.0.iter().map(Tensor::squared_norm).sum::<f64>().sqrt()
    }
}

/// `-sum(target * log_softmax(logits))` over every sample and class.
///
/// `target` must have the same `(N, K)` shape as `logits`; rows need not be
/// one-hot.
pub fn cross_entropy_for_onehot(tape: &mut Tape, logits: NodeId, target: NodeId) -> NodeId {
    let log_probs = tape.log_softmax(logits);
    let weighted = tape.mul(target, log_probs);
    let total = tape.sum_all(weighted);
    tape.scale(total, -1.0)
}

/// Record forward pass, loss and parameter gradients on `tape`.
///
/// The returned nodes stay connected to `images` and `target`, so they can
/// be differentiated a second time.
pub fn parameter_gradients(
    tape: &mut Tape,
    model: &LeNet,
    params: &[NodeId],
    images: NodeId,
    target: NodeId,
) -> Vec<NodeId> {
    let logits = model.forward(tape, params, images);
    let loss = cross_entropy_for_onehot(tape, logits, target);
    autograd::grad(tape, loss, params)
}

/// Parameter gradient produced by `(images, target)`, detached from any tape.
///
/// # Errors
///
/// `ShapeMismatch` if `images` is not a batch for `model` or `target` is not
/// `(N, num_classes)` for the same batch size.
pub fn extract_reference_gradient(
    model: &LeNet,
    images: &Tensor,
    target: &Tensor,
) -> Result<GradientVector> {
    model.check_images(images)?;
    let expected = vec![images.shape()[0], model.num_classes()];
    if target.shape() != expected.as_slice() {
        return Err(LeakageError::ShapeMismatch {
            what: "target distribution",
            expected,
            actual: target.shape().to_vec(),
        });
    }

    let mut tape = Tape::new();
    let params = model.register_parameters(&mut tape);
    let images = tape.constant(images.clone());
    let target = tape.constant(target.clone());
    let grads = parameter_gradients(&mut tape, model, &params, images, target);

    let reference = GradientVector::new(grads.iter().map(|&g| tape.value(g).clone()).collect());
    info!(
        "Reference gradient: {} tensors, norm {:.6}",
        reference.len(),
        reference.norm()
    );
    Ok(reference)
}
