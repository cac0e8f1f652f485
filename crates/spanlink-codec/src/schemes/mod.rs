//! Tagging schemes.
//!
//! Every scheme is one struct implementing both halves of its codec:
//! [`SchemeCollator`] turns the token-space labels of a batch into target
//! tensors, [`SchemeDecoder`] turns model scores back into char-space
//! results.

use std::collections::BTreeMap;

use candle_core::{Device, Tensor};

use crate::align::OffsetMapping;
use crate::tensor::mask_lengths;
use crate::types::{slice_chars, TextSpan};
use crate::{CodecError, Result};

pub mod event;
pub mod gplinker;
pub mod grte;
pub mod handshaking;
pub mod pfn;
pub mod pointer;
pub mod tplinker;

pub use event::{EventScores, GpLinkerEvent};
pub use gplinker::{GpLinker, PairScores};
pub use grte::{Grte, GrteTag};
pub use handshaking::{HandshakingNer, TargetLayout};
pub use pfn::Pfn;
pub use pointer::{Pointer, PointerLabels, PointerScores};
pub use tplinker::TpLinkerPlus;

/// Named target tensors of one training batch.
#[derive(Debug, Clone, Default)]
pub struct TargetTensors(BTreeMap<&'static str, Tensor>);

impl TargetTensors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &'static str, tensor: Tensor) {
        self.0.insert(name, tensor);
    }

    pub fn with(mut self, name: &'static str, tensor: Tensor) -> Self {
        self.insert(name, tensor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Geometry of the padded batch targets are built for.
#[derive(Debug, Clone, Copy)]
pub struct BatchLayout<'a> {
    /// Unpadded token count per example.
    pub lengths: &'a [usize],
    /// Padded sequence length.
    pub seq_len: usize,
    /// Fill value outside each example's region, where a scheme pads at all.
    pub label_pad_value: i64,
    pub device: &'a Device,
}

impl BatchLayout<'_> {
    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }
}

/// Encoder half of a scheme: batch labels to target tensors.
pub trait SchemeCollator {
    /// Token-space labels carried by one feature.
    type Labels;

    fn targets(&self, labels: &[&Self::Labels], layout: &BatchLayout<'_>) -> Result<TargetTensors>;
}

/// Everything a decoder needs besides the scores.
#[derive(Debug, Clone, Copy)]
pub struct DecodeBatch<'a> {
    pub attention_mask: &'a Tensor,
    pub texts: &'a [String],
    pub offset_mappings: &'a [OffsetMapping],
}

impl<'a> DecodeBatch<'a> {
    pub fn new(attention_mask: &'a Tensor, texts: &'a [String], offset_mappings: &'a [OffsetMapping]) -> Self {
        Self {
            attention_mask,
            texts,
            offset_mappings,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.texts.len()
    }

    /// Unpadded length of every example, after checking the batch agrees with itself.
    pub fn lengths(&self) -> Result<Vec<usize>> {
        let lengths = mask_lengths(self.attention_mask)?;
        for actual in [lengths.len(), self.offset_mappings.len()] {
            if actual != self.texts.len() {
                return Err(CodecError::BatchLength {
                    expected: self.texts.len(),
                    actual,
                });
            }
        }
        Ok(lengths)
    }

    /// Padded sequence length.
    pub fn seq_len(&self) -> Result<usize> {
        Ok(self.attention_mask.dims2()?.1)
    }

    /// Char span and text of the inclusive token range `[start, end]` of example `b`.
    pub fn text_span(&self, b: usize, start: usize, end: usize) -> Option<TextSpan> {
        let (char_start, char_end) = self.offset_mappings.get(b)?.char_span(start, end)?;
        if char_end <= char_start {
            return None;
        }
        Some(TextSpan {
            start: char_start,
            end: char_end,
            text: slice_chars(self.texts.get(b)?, char_start, char_end),
        })
    }
}

/// Decoder half of a scheme: model scores to one result per example.
pub trait SchemeDecoder {
    type Scores;
    type Output;

    fn decode(&self, scores: &Self::Scores, batch: &DecodeBatch<'_>) -> Result<Vec<Self::Output>>;
}

/// A decoded token span survives only if it is ordered and stays clear of
/// position 0 and of the last attended position.
pub(crate) fn is_valid_span(start: usize, end: usize, length: usize) -> bool {
    start <= end && start != 0 && start + 1 < length && end + 1 < length
}

/// A token span can be encoded when it is ordered and inside the sequence.
pub(crate) fn fits(start: usize, end: usize, seq_len: usize) -> bool {
    start <= end && end < seq_len
}

/// Largest per-example count, at least one so padded dims never collapse.
pub(crate) fn max_count<I: IntoIterator<Item = usize>>(counts: I) -> usize {
    counts.into_iter().max().unwrap_or(0).max(1)
}

#[cfg(test)]
pub(crate) mod testing {
    use candle_core::{DType, Device, Tensor};

    use crate::align::OffsetMapping;

    /// One offset per char, wrapped in `[CLS]` / `[SEP]`.
    pub fn char_offsets(text: &str) -> OffsetMapping {
        let n = text.chars().count();
        let mut offsets = vec![(0, 0)];
        offsets.extend((0..n).map(|i| (i, i + 1)));
        offsets.push((0, 0));
        OffsetMapping::new(offsets)
    }

    pub fn full_mask(batch: usize, seq_len: usize) -> Tensor {
        Tensor::ones((batch, seq_len), DType::U32, &Device::Cpu).unwrap()
    }

    /// Turn an integer target into scores where every nonzero cell is positive.
    pub fn as_scores(target: &Tensor) -> Tensor {
        target.to_dtype(DType::F32).unwrap()
    }
}
