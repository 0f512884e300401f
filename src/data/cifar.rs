//! CIFAR binary format reader
//!
//! A CIFAR `.bin` file is a flat sequence of fixed-size records:
//!
//! ```text
//! CIFAR-10:  <label:u8> <3072 pixel bytes>
//! CIFAR-100: <coarse:u8> <fine:u8> <3072 pixel bytes>
//! ```
//!
//! Pixels are stored channel-major (1024 red, 1024 green, 1024 blue, each
//! 32x32 row-major), which is already the `(C, H, W)` tensor layout.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::data::Dataset;
use crate::error::{LeakageError, Result};
use crate::model::ImageShape;
use crate::tensor::Tensor;

const PIXELS_PER_IMAGE: usize = 3 * 32 * 32;

/// Which CIFAR release a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CifarVariant {
    Cifar10,
    /// Labels are the 100 fine classes.
    Cifar100,
}

impl CifarVariant {
    /// Bytes before the pixels of each record.
    fn label_bytes(self) -> usize {
        match self {
            CifarVariant::Cifar10 => 1,
            CifarVariant::Cifar100 => 2,
        }
    }

    pub fn record_size(self) -> usize {
        self.label_bytes() + PIXELS_PER_IMAGE
    }

    pub fn num_classes(self) -> usize {
        match self {
            CifarVariant::Cifar10 => 10,
            CifarVariant::Cifar100 => 100,
        }
    }
}

/// A CIFAR binary file loaded into memory.
#[derive(Debug, Clone)]
pub struct CifarDataset {
    path: PathBuf,
    variant: CifarVariant,
    data: Vec<u8>,
}

impl CifarDataset {
    /// Read and check a whole CIFAR binary file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read; `Decode` if it is empty, is not a
    /// whole number of records, or holds an out-of-range label.
    pub fn open(path: impl AsRef<Path>, variant: CifarVariant) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| LeakageError::io(path, e))?;
        let dataset = Self::from_bytes(path, variant, data)?;
        info!(
            "Loaded {} {:?} records from {}",
            dataset.len(),
            variant,
            path.display()
        );
        Ok(dataset)
    }

    /// Parse records already in memory; `path` is only used in error messages.
    pub fn from_bytes(path: impl Into<PathBuf>, variant: CifarVariant, data: Vec<u8>) -> Result<Self> {
        let path = path.into();
        let record = variant.record_size();
        if data.is_empty() {
            return Err(LeakageError::decode(path, "file is empty"));
        }
        if data.len() % record != 0 {
            return Err(LeakageError::decode(
                path,
                format!(
                    "file is truncated: {} bytes is not a multiple of the {}-byte record",
                    data.len(),
                    record
                ),
            ));
        }

        let label_offset = variant.label_bytes() - 1;
        for (i, chunk) in data.chunks_exact(record).enumerate() {
            let label = chunk[label_offset] as usize;
            if label >= variant.num_classes() {
                return Err(LeakageError::decode(
                    path,
                    format!("record {} has label {}", i, label),
                ));
            }
        }

        Ok(Self {
            path,
            variant,
            data,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn variant(&self) -> CifarVariant {
        self.variant
    }
}

impl Dataset for CifarDataset {
    fn len(&self) -> usize {
        self.data.len() / self.variant.record_size()
    }

    fn num_classes(&self) -> usize {
        self.variant.num_classes()
    }

    fn image_shape(&self) -> ImageShape {
        ImageShape::CIFAR
    }

    fn get(&self, index: usize) -> Result<(Tensor, usize)> {
        if index >= self.len() {
            return Err(LeakageError::IndexOutOfRange {
                what: "dataset",
                index,
                len: self.len(),
            });
        }
        let record = self.variant.record_size();
        let bytes = &self.data[index * record..(index + 1) * record];
        let label = bytes[self.variant.label_bytes() - 1] as usize;

        // Normalize to [0,1] floats.
        let pixels = bytes[self.variant.label_bytes()..]
            .iter()
            .map(|&b| b as f64 / 255.0)
            .collect();
        let shape = ImageShape::CIFAR;
        Ok((
            Tensor::new(vec![shape.channels, shape.height, shape.width], pixels),
            label,
        ))
    }
}
