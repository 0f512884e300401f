//! Ground-truth batch whose gradient the attacker observes

use log::info;

use crate::data::Dataset;
use crate::error::{LeakageError, Result};
use crate::labels::encode_onehot_batch;
use crate::model::ImageShape;
use crate::tensor::Tensor;

/// Dataset index of the first extra sample when `batch_size > 1`.
pub const EXTRA_SAMPLE_OFFSET: usize = 100;

/// Images `(N, C, H, W)`, integer labels and their one-hot targets `(N, K)`.
#[derive(Debug, Clone, PartialEq)]
pub struct VictimBatch {
    shape: ImageShape,
    num_classes: usize,
    images: Tensor,
    labels: Vec<usize>,
    targets: Tensor,
}

impl VictimBatch {
    /// Build a batch from `(C, H, W)` images and their labels.
    ///
    /// # Errors
    ///
    /// `Config` for an empty batch or mismatched counts, `ShapeMismatch` if
    /// the images disagree in shape, `IndexOutOfRange` for a bad label.
    pub fn new(images: Vec<Tensor>, labels: Vec<usize>, num_classes: usize) -> Result<Self> {
        if images.is_empty() || images.len() != labels.len() {
            return Err(LeakageError::Config(format!(
                "victim batch needs matching non-empty images and labels, got {} and {}",
                images.len(),
                labels.len()
            )));
        }
        let shape = match *images[0].shape() {
            [channels, height, width] => ImageShape {
                channels,
                height,
                width,
            },
            _ => {
                return Err(LeakageError::ShapeMismatch {
                    what: "victim image",
                    expected: vec![3, 32, 32],
                    actual: images[0].shape().to_vec(),
                })
            }
        };
        for image in &images[1..] {
            if image.shape() != images[0].shape() {
                return Err(LeakageError::ShapeMismatch {
                    what: "victim image",
                    expected: images[0].shape().to_vec(),
                    actual: image.shape().to_vec(),
                });
            }
        }

        let targets = encode_onehot_batch(&labels, num_classes)?;
        Ok(Self {
            shape,
            num_classes,
            images: Tensor::stack(&images),
            labels,
            targets,
        })
    }

    /// Sample `index` first, then samples `100, 101, ...` until the batch
    /// holds `batch_size` entries.
    ///
    /// `image_override` replaces the pixels of the first sample and keeps its
    /// dataset label.
    ///
    /// # Errors
    ///
    /// `Config` if `batch_size` is zero, `IndexOutOfRange` if any required
    /// index is past the end of `dataset`, `ShapeMismatch` if the override
    /// does not have the dataset's image shape.
    pub fn assemble(
        dataset: &dyn Dataset,
        index: usize,
        batch_size: usize,
        image_override: Option<Tensor>,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(LeakageError::Config(
                "batch_size must be at least 1".to_string(),
            ));
        }

        let (mut first, label) = dataset.get(index)?;
        if let Some(image) = image_override {
            if image.shape() != first.shape() {
                return Err(LeakageError::ShapeMismatch {
                    what: "replacement image",
                    expected: first.shape().to_vec(),
                    actual: image.shape().to_vec(),
                });
            }
            first = image;
        }

        let mut images = vec![first];
        let mut labels = vec![label];
        for i in 0..batch_size - 1 {
            let (image, label) = dataset.get(EXTRA_SAMPLE_OFFSET + i)?;
            images.push(image);
            labels.push(label);
        }

        info!("Victim batch: index {}, labels {:?}", index, labels);
        Self::new(images, labels, dataset.num_classes())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn image_shape(&self) -> ImageShape {
        self.shape
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// `(N, C, H, W)`.
    pub fn images(&self) -> &Tensor {
        &self.images
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// One-hot rows `(N, K)`.
    pub fn targets(&self) -> &Tensor {
        &self.targets
    }
}
