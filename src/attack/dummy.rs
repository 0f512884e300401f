//! Candidate image batch and label logits

use crate::error::{LeakageError, Result};
use crate::labels::softmax;
use crate::tensor::Tensor;
use crate::utils::SimpleRng;

/// The attacker's trainable guess: images `(N, C, H, W)` and label logits `(N, K)`.
///
/// The optimizer works on the flat concatenation `[images..., logits...]`
/// returned by [`flatten`](DummyState::flatten).
#[derive(Debug, Clone, PartialEq)]
pub struct DummyState {
    images: Tensor,
    label_logits: Tensor,
}

impl DummyState {
    /// Independent standard-normal noise for both tensors, images first.
    pub fn random(image_shape: Vec<usize>, label_shape: Vec<usize>, rng: &mut SimpleRng) -> Self {
        let image_len = image_shape.iter().product();
        let images = Tensor::new(image_shape, rng.normal_vec(image_len));
        let label_len = label_shape.iter().product();
        let label_logits = Tensor::new(label_shape, rng.normal_vec(label_len));
        Self {
            images,
            label_logits,
        }
    }

    /// Noise shaped exactly like the ground-truth batch and its targets.
    pub fn for_victim(images: &Tensor, targets: &Tensor, rng: &mut SimpleRng) -> Self {
        Self::random(images.shape().to_vec(), targets.shape().to_vec(), rng)
    }

    /// Wrap existing tensors.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` unless `images` is 4D and `label_logits` is
    /// `(images.shape()[0], K)`.
    pub fn from_parts(images: Tensor, label_logits: Tensor) -> Result<Self> {
        let batch = images.shape().first().copied().unwrap_or(0);
        if images.shape().len() != 4 || batch == 0 {
            return Err(LeakageError::ShapeMismatch {
                what: "dummy images",
                expected: vec![batch.max(1), 0, 0, 0],
                actual: images.shape().to_vec(),
            });
        }
        if label_logits.shape().len() != 2 || label_logits.shape()[0] != batch {
            let classes = label_logits.shape().last().copied().unwrap_or(0);
            return Err(LeakageError::ShapeMismatch {
                what: "dummy label logits",
                expected: vec![batch, classes],
                actual: label_logits.shape().to_vec(),
            });
        }
        Ok(Self {
            images,
            label_logits,
        })
    }

    /// Check that this state has exactly the shapes of the ground-truth batch.
    pub fn ensure_matches(&self, images: &Tensor, targets: &Tensor) -> Result<()> {
        if self.images.shape() != images.shape() {
            return Err(LeakageError::ShapeMismatch {
                what: "dummy images",
                expected: images.shape().to_vec(),
                actual: self.images.shape().to_vec(),
            });
        }
        if self.label_logits.shape() != targets.shape() {
            return Err(LeakageError::ShapeMismatch {
                what: "dummy label logits",
                expected: targets.shape().to_vec(),
                actual: self.label_logits.shape().to_vec(),
            });
        }
        Ok(())
    }

    pub fn images(&self) -> &Tensor {
        &self.images
    }

    pub fn label_logits(&self) -> &Tensor {
        &self.label_logits
    }

    pub fn batch_size(&self) -> usize {
        self.images.shape()[0]
    }

    /// Total number of free variables.
    pub fn len(&self) -> usize {
        self.images.numel() + self.label_logits.numel()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Images followed by logits, row-major.
    pub fn flatten(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.len());
        flat.extend_from_slice(self.images.data());
        flat.extend_from_slice(self.label_logits.data());
        flat
    }

    /// Overwrite both tensors from a vector laid out like [`flatten`](Self::flatten).
    ///
    /// # Panics
    ///
    /// Panics if `flat.len() != self.len()`.
    pub fn assign_flat(&mut self, flat: &[f64]) {
        assert_eq!(flat.len(), self.len(), "flat state length mismatch");
        let (images, logits) = flat.split_at(self.images.numel());
        self.images.data_mut().copy_from_slice(images);
        self.label_logits.data_mut().copy_from_slice(logits);
    }

    /// Softmax of the label logits; every row is a probability distribution.
    pub fn label_distribution(&self) -> Tensor {
        softmax(&self.label_logits)
    }

    /// Most likely class per sample.
    pub fn predicted_labels(&self) -> Vec<usize> {
        self.label_logits.argmax_rows()
    }

    /// Detached copy of sample `index`, shape `(C, H, W)`.
    pub fn image(&self, index: usize) -> Tensor {
        self.images.sample(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_shapes_and_determinism() {
        let a = DummyState::random(vec![2, 3, 4, 4], vec![2, 10], &mut SimpleRng::new(7));
        let b = DummyState::random(vec![2, 3, 4, 4], vec![2, 10], &mut SimpleRng::new(7));
        assert_eq!(a.images().shape(), &[2, 3, 4, 4]);
        assert_eq!(a.label_logits().shape(), &[2, 10]);
        assert_eq!(a.len(), 96 + 20);
        assert_eq!(a, b);
    }

    #[test]
    fn test_flatten_assign_flat() {
        let mut state = DummyState::random(vec![1, 1, 2, 2], vec![1, 3], &mut SimpleRng::new(1));
        let values: Vec<f64> = (0..7).map(|v| v as f64).collect();
        state.assign_flat(&values);
        assert_eq!(state.images().data(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(state.label_logits().data(), &[4.0, 5.0, 6.0]);
        assert_eq!(state.flatten(), values);
        assert_eq!(state.predicted_labels(), vec![2]);
    }

    #[test]
    fn test_ensure_matches_rejects_wrong_label_shape() {
        let state = DummyState::random(vec![1, 1, 2, 2], vec![1, 3], &mut SimpleRng::new(1));
        let images = Tensor::zeros(vec![1, 1, 2, 2]);
        let targets = Tensor::zeros(vec![1, 4]);
        assert!(matches!(
            state.ensure_matches(&images, &targets),
            Err(LeakageError::ShapeMismatch {
                what: "dummy label logits",
                ..
            })
        ));
    }

    #[test]
    fn test_from_parts_rejects_batch_disagreement() {
        let result = DummyState::from_parts(Tensor::zeros(vec![2, 1, 2, 2]), Tensor::zeros(vec![1, 3]));
        assert!(result.is_err());
    }
}
