//! Label encoding
//!
//! Ground-truth labels are one-hot rows; candidate labels are unconstrained
//! logits mapped onto the probability simplex with a row softmax.

use crate::error::{LeakageError, Result};
use crate::tensor::Tensor;

/// One-hot vector of length `num_classes` with a 1 at `label_id`.
///
/// # Errors
///
/// `IndexOutOfRange` if `label_id >= num_classes`.
///
/// # Examples
///
/// ```
/// use gradient_leakage::labels::encode_onehot;
///
/// let onehot = encode_onehot(2, 4).unwrap();
/// assert_eq!(onehot.data(), &[0.0, 0.0, 1.0, 0.0]);
/// ```
pub fn encode_onehot(label_id: usize, num_classes: usize) -> Result<Tensor> {
    if label_id >= num_classes {
        return Err(LeakageError::IndexOutOfRange {
            what: "class labels",
            index: label_id,
            len: num_classes,
        });
    }
    let mut data = vec![0.0; num_classes];
    data[label_id] = 1.0;
    Ok(Tensor::new(vec![num_classes], data))
}

/// Stack one-hot rows into a `(labels.len(), num_classes)` tensor.
pub fn encode_onehot_batch(labels: &[usize], num_classes: usize) -> Result<Tensor> {
    let rows = labels
        .iter()
        .map(|&label| encode_onehot(label, num_classes))
        .collect::<Result<Vec<_>>>()?;
    if rows.is_empty() {
        return Err(LeakageError::Config(
            "cannot encode an empty label batch".to_string(),
        ));
    }
    Ok(Tensor::stack(&rows))
}

/// Softmax along the last dimension.
///
/// Uses the max-subtraction trick for numerical stability to avoid overflow
/// with large logits.
pub fn softmax(logits: &Tensor) -> Tensor {
    let cols = *logits.shape().last().unwrap_or(&1);
    let mut out = logits.clone();
    if cols == 0 {
        return out;
    }

    for row in out.data_mut().chunks_exact_mut(cols) {
        let mut max_value = row[0];
        for &value in row.iter().skip(1) {
            if value > max_value {
                max_value = value;
            }
        }

        let mut sum = 0.0;
        for value in row.iter_mut() {
            *value = (*value - max_value).exp();
            sum += *value;
        }

        let inv_sum = 1.0 / sum;
        for value in row.iter_mut() {
            *value *= inv_sum;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    #[test]
    fn test_onehot_out_of_range() {
        let err = encode_onehot(10, 10).unwrap_err();
        assert!(matches!(
            err,
            LeakageError::IndexOutOfRange {
                index: 10,
                len: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_onehot_batch_shape() {
        let batch = encode_onehot_batch(&[3, 0], 5).unwrap();
        assert_eq!(batch.shape(), &[2, 5]);
        assert_eq!(batch.data()[3], 1.0);
        assert_eq!(batch.data()[5], 1.0);
        assert_eq!(batch.data().iter().sum::<f64>(), 2.0);
    }

    #[test]
    fn test_onehot_batch_empty() {
        assert!(encode_onehot_batch(&[], 5).is_err());
    }

    #[test]
    fn test_softmax_uniform_input() {
        let probs = softmax(&Tensor::new(vec![1, 4], vec![2.0; 4]));
        for &p in probs.data() {
            assert!((p - 0.25).abs() < EPSILON);
        }
    }

    #[test]
    fn test_softmax_numerical_stability() {
        let probs = softmax(&Tensor::new(vec![1, 3], vec![1000.0, 1001.0, 1002.0]));
        let sum: f64 = probs.data().iter().sum();
        assert!((sum - 1.0).abs() < EPSILON);
        assert!(probs.is_finite());
    }
}
