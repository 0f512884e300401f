//! Data collaborators
//!
//! Datasets yield `(image, label)` pairs by index, images as `(C, H, W)`
//! tensors in `[0, 1]`. The attack consumes one assembled [`VictimBatch`].

pub mod cifar;
pub mod netpbm;
pub mod victim;

pub use cifar::{CifarDataset, CifarVariant};
pub use netpbm::{read_netpbm, write_ppm};
pub use victim::VictimBatch;

use crate::error::{LeakageError, Result};
use crate::model::ImageShape;
use crate::tensor::Tensor;

/// Indexable collection of labeled images.
pub trait Dataset {
    /// Number of samples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct classes labels are drawn from.
    fn num_classes(&self) -> usize;

    /// Geometry shared by every image.
    fn image_shape(&self) -> ImageShape;

    /// Image `(C, H, W)` and class label of sample `index`.
    ///
    /// # Errors
    ///
    /// `IndexOutOfRange` if `index >= len()`.
    fn get(&self, index: usize) -> Result<(Tensor, usize)>;
}

/// Samples held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    shape: ImageShape,
    num_classes: usize,
    images: Vec<Tensor>,
    labels: Vec<usize>,
}

impl InMemoryDataset {
    /// # Errors
    ///
    /// `ShapeMismatch` if an image is not `(C, H, W)` of `shape`;
    /// `IndexOutOfRange` if a label is not below `num_classes`;
    /// `Config` if images and labels differ in count.
    pub fn new(
        shape: ImageShape,
        num_classes: usize,
        images: Vec<Tensor>,
        labels: Vec<usize>,
    ) -> Result<Self> {
        if images.len() != labels.len() {
            return Err(LeakageError::Config(format!(
                "{} images but {} labels",
                images.len(),
                labels.len()
            )));
        }
        let expected = [shape.channels, shape.height, shape.width];
        for image in &images {
            if image.shape() != expected {
                return Err(LeakageError::ShapeMismatch {
                    what: "dataset image",
                    expected: expected.to_vec(),
                    actual: image.shape().to_vec(),
                });
            }
        }
        if let Some(&label) = labels.iter().find(|&&l| l >= num_classes) {
            return Err(LeakageError::IndexOutOfRange {
                what: "class labels",
                index: label,
                len: num_classes,
            });
        }
        Ok(Self {
            shape,
            num_classes,
            images,
            labels,
        })
    }
}

impl Dataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.images.len()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn image_shape(&self) -> ImageShape {
        self.shape
    }

    fn get(&self, index: usize) -> Result<(Tensor, usize)> {
        match self.images.get(index) {
            Some(image) => Ok((image.clone(), self.labels[index])),
            None => Err(LeakageError::IndexOutOfRange {
                what: "dataset",
                index,
                len: self.images.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAY_2X2: ImageShape = ImageShape {
        channels: 1,
        height: 2,
        width: 2,
    };

    #[test]
    fn test_in_memory_get() {
        let images = vec![Tensor::zeros(vec![1, 2, 2]), Tensor::filled(vec![1, 2, 2], 0.5)];
        let dataset = InMemoryDataset::new(GRAY_2X2, 3, images, vec![2, 0]).unwrap();
        assert_eq!(dataset.len(), 2);
        let (image, label) = dataset.get(1).unwrap();
        assert_eq!(label, 0);
        assert_eq!(image.data(), &[0.5; 4]);
        assert!(matches!(
            dataset.get(2),
            Err(LeakageError::IndexOutOfRange { index: 2, len: 2, .. })
        ));
    }

    #[test]
    fn test_in_memory_validation() {
        let bad_shape = InMemoryDataset::new(GRAY_2X2, 3, vec![Tensor::zeros(vec![1, 3, 3])], vec![0]);
        assert!(matches!(bad_shape, Err(LeakageError::ShapeMismatch { .. })));

        let bad_label = InMemoryDataset::new(GRAY_2X2, 3, vec![Tensor::zeros(vec![1, 2, 2])], vec![3]);
        assert!(matches!(bad_label, Err(LeakageError::IndexOutOfRange { .. })));
    }
}
