//! Dense row-major tensors
//!
//! A `Tensor` is a flat `f64` buffer plus a shape. Scalars use shape `[1]`.
//! The autodiff tape stores one `Tensor` per node.

/// Dense row-major tensor of `f64` values.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Tensor {
    /// Create a tensor from a shape and a matching data buffer.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` differs from the product of `shape`.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "Tensor data length must match shape {:?}",
            shape
        );
        Self { shape, data }
    }

    /// Tensor of zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::filled(shape, 0.0)
    }

    /// Tensor with every element set to `value`.
    pub fn filled(shape: Vec<usize>, value: f64) -> Self {
        let numel = shape.iter().product();
        Self {
            shape,
            data: vec![value; numel],
        }
    }

    /// Single-element tensor of shape `[1]`.
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: vec![1],
            data: vec![value],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// First element; the value of a scalar tensor.
    pub fn item(&self) -> f64 {
        self.data[0]
    }

    /// Same data under a new shape with the same element count.
    pub fn reshape(mut self, shape: Vec<usize>) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            self.data.len(),
            "Cannot reshape {:?} into {:?}",
            self.shape,
            shape
        );
        self.shape = shape;
        self
    }

    /// Copy of the `index`-th slice along the leading dimension.
    pub fn sample(&self, index: usize) -> Tensor {
        assert!(!self.shape.is_empty(), "sample() needs a batch dimension");
        assert!(index < self.shape[0], "sample index {} out of range", index);
        let inner: usize = self.shape[1..].iter().product();
        let start = index * inner;
        let shape = if self.shape.len() == 1 {
            vec![1]
        } else {
            self.shape[1..].to_vec()
        };
        Tensor::new(shape, self.data[start..start + inner].to_vec())
    }

    /// Stack equally shaped tensors along a new leading dimension.
    pub fn stack(items: &[Tensor]) -> Tensor {
        assert!(!items.is_empty(), "Cannot stack an empty list");
        let inner_shape = items[0].shape.clone();
        let mut data = Vec::with_capacity(items.len() * items[0].numel());
        for item in items {
            assert_eq!(item.shape, inner_shape, "Stacked tensors must share a shape");
            data.extend_from_slice(&item.data);
        }
        let mut shape = vec![items.len()];
        shape.extend(inner_shape);
        Tensor::new(shape, data)
    }

    /// Index of the largest entry of each row of a `(rows, cols)` tensor.
    pub fn argmax_rows(&self) -> Vec<usize> {
        assert_eq!(self.shape.len(), 2, "argmax_rows expects a 2D tensor");
        let cols = self.shape[1];
        self.data
            .chunks_exact(cols)
            .map(|row| {
                let mut best = 0;
                for (j, &v) in row.iter().enumerate().skip(1) {
                    if v > row[best] {
                        best = j;
                    }
                }
                best
            })
            .collect()
    }

    /// Largest absolute element (0 for empty tensors).
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0f64, |acc, v| acc.max(v.abs()))
    }

    /// Sum of squared elements.
    pub fn squared_norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum()
    }

    /// True when no element is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.numel(), 6);
        assert_eq!(t.item(), 1.0);
    }

    #[test]
    #[should_panic(expected = "Tensor data length must match shape")]
    fn test_new_mismatched_length() {
        Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_sample_and_stack() {
        let a = Tensor::new(vec![1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        let b = Tensor::new(vec![1, 2, 2], vec![5.0, 6.0, 7.0, 8.0]);
        let batch = Tensor::stack(&[a.clone(), b]);
        assert_eq!(batch.shape(), &[2, 1, 2, 2]);
        assert_eq!(batch.sample(0), a);
        assert_eq!(batch.sample(1).data(), &[5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_argmax_rows() {
        let t = Tensor::new(vec![2, 3], vec![0.1, 0.7, 0.2, 3.0, -1.0, 2.9]);
        assert_eq!(t.argmax_rows(), vec![1, 0]);
    }

    #[test]
    fn test_finite_checks() {
        let mut t = Tensor::zeros(vec![3]);
        assert!(t.is_finite());
        t.data_mut()[1] = f64::NAN;
        assert!(!t.is_finite());
    }
}
