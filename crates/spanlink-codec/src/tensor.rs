//! Host-side tensor helpers shared by the scheme codecs.
//!
//! Targets are assembled in a [`DenseTarget`] (row-major, zero-initialised)
//! and moved to a candle [`Tensor`] once complete. Writes outside the
//! declared shape are dropped, never panics.

use candle_core::{DType, Device, Tensor, WithDType};

use crate::{CodecError, Result};

/// Dense row-major buffer that becomes a target tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseTarget<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T: WithDType> DenseTarget<T> {
    pub fn zeros(shape: &[usize]) -> Self {
        Self::filled(shape, T::from_f64(0.0))
    }

    pub fn filled(shape: &[usize], value: T) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![value; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            offset = offset * dim + i;
        }
        Some(offset)
    }

    /// Write `value` at `index`; returns `false` (and writes nothing) when out of range.
    pub fn set(&mut self, index: &[usize], value: T) -> bool {
        match self.offset(index) {
            Some(offset) => {
                self.data[offset] = value;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, index: &[usize]) -> Option<T> {
        self.offset(index).map(|o| self.data[o])
    }

    /// Number of entries different from zero.
    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|v| **v != T::from_f64(0.0)).count()
    }

    pub fn into_tensor(self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_vec(self.data, self.shape, device)?)
    }
}

/// Number of upper-triangular `(i, j)` pairs (`i <= j`) for `seq_len` positions.
pub fn shaking_len(seq_len: usize) -> usize {
    seq_len * (seq_len + 1) / 2
}

/// Flat position of pair `(i, j)` in the row-major upper triangle.
pub fn shaking_index(seq_len: usize, i: usize, j: usize) -> Option<usize> {
    if i > j || j >= seq_len {
        return None;
    }
    Some(i * (2 * seq_len - i + 1) / 2 + (j - i))
}

/// Every upper-triangular pair, in [`shaking_index`] order.
pub fn shaking_pairs(seq_len: usize) -> Vec<(usize, usize)> {
    (0..seq_len)
        .flat_map(|i| (i..seq_len).map(move |j| (i, j)))
        .collect()
}

/// Host copy of a score tensor for random access.
#[derive(Debug, Clone)]
pub struct ScoreGrid {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl ScoreGrid {
    pub fn from_tensor(scores: &Tensor) -> Result<Self> {
        let shape = scores.dims().to_vec();
        let data = scores.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Score at `index`; out-of-range lookups read as negative infinity.
    pub fn get(&self, index: &[usize]) -> f32 {
        if index.len() != self.shape.len() {
            return f32::NEG_INFINITY;
        }
        let mut offset = 0;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return f32::NEG_INFINITY;
            }
            offset = offset * dim + i;
        }
        self.data[offset]
    }
}

/// Indices of all entries strictly above `threshold`, in row-major order.
pub fn above_threshold(scores: &Tensor, threshold: f32) -> Result<Vec<Vec<usize>>> {
    let dims = scores.dims().to_vec();
    let mask = scores
        .to_dtype(DType::F32)?
        .gt(threshold as f64)?
        .flatten_all()?
        .to_vec1::<u8>()?;
    Ok(mask
        .iter()
        .enumerate()
        .filter(|(_, hit)| **hit != 0)
        .map(|(flat, _)| unravel(flat, &dims))
        .collect())
}

fn unravel(mut flat: usize, dims: &[usize]) -> Vec<usize> {
    let mut index = vec![0; dims.len()];
    for (slot, &dim) in index.iter_mut().zip(dims).rev() {
        *slot = flat % dim;
        flat /= dim;
    }
    index
}

/// Number of attended positions per row of a `(bs, seq)` mask.
pub fn mask_lengths(attention_mask: &Tensor) -> Result<Vec<usize>> {
    attention_mask.dims2()?;
    let rows = attention_mask.to_dtype(DType::U32)?.to_vec2::<u32>()?;
    Ok(rows
        .iter()
        .map(|row| row.iter().filter(|v| **v != 0).count())
        .collect())
}

/// Check a score tensor's leading dims against the batch.
pub(crate) fn expect_leading(scores: &Tensor, expected: &[usize]) -> Result<()> {
    let dims = scores.dims();
    if dims.len() < expected.len() || dims[..expected.len()] != *expected {
        return Err(CodecError::shape(expected, dims));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_writes_are_dropped() {
        let mut t = DenseTarget::<i64>::zeros(&[2, 3]);
        assert!(t.set(&[1, 2], 1));
        assert!(!t.set(&[2, 0], 1));
        assert!(!t.set(&[0], 1));
        assert_eq!(t.count_nonzero(), 1);
        assert_eq!(t.get(&[1, 2]), Some(1));
    }

    #[test]
    fn test_shaking_index_matches_pair_order() {
        let n = 5;
        let pairs = shaking_pairs(n);
        assert_eq!(pairs.len(), shaking_len(n));
        for (flat, (i, j)) in pairs.iter().enumerate() {
            assert_eq!(shaking_index(n, *i, *j), Some(flat));
        }
        assert_eq!(shaking_index(n, 3, 2), None);
        assert_eq!(shaking_index(n, 0, 5), None);
    }

    #[test]
    fn test_above_threshold_is_strict() {
        let scores = Tensor::from_vec(vec![0.0f32, 1.0, -1.0, 2.0], (2, 2), &Device::Cpu).unwrap();
        let hits = above_threshold(&scores, 0.0).unwrap();
        assert_eq!(hits, vec![vec![0, 1], vec![1, 1]]);
    }

    #[test]
    fn test_mask_lengths() {
        let mask = Tensor::from_vec(vec![1u32, 1, 1, 0, 1, 1, 0, 0], (2, 4), &Device::Cpu).unwrap();
        assert_eq!(mask_lengths(&mask).unwrap(), vec![3, 2]);
    }

    #[test]
    fn test_into_tensor_keeps_shape() {
        let mut t = DenseTarget::<i64>::zeros(&[2, 2, 3]);
        t.set(&[1, 0, 2], 1);
        let tensor = t.into_tensor(&Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[2, 2, 3]);
        assert_eq!(tensor.dtype(), DType::I64);
    }
}
