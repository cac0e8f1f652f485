//! Handshaking (TPLinker-style) span matrix for nested NER.
//!
//! Every labelled span `(start, end)` lights up cell `[start, end, label]`
//! and its mirror `[end, start, label]` of a `(seq, seq, labels)` matrix.
//! Models usually score only the upper triangle; the decoder accepts both
//! the dense `(bs, seq, seq, labels)` layout and the packed
//! `(bs, seq * (seq + 1) / 2, labels)` shaking layout, and the collator
//! emits whichever [`TargetLayout`] it is configured with.

use candle_core::Tensor;
use tracing::debug;

use crate::config::DecodeConfig;
use crate::labels::{LabelRegistry, LabelSpace};
use crate::schemes::{fits, is_valid_span, BatchLayout, DecodeBatch, SchemeCollator, SchemeDecoder, TargetTensors};
use crate::tensor::{above_threshold, expect_leading, shaking_index, shaking_len, shaking_pairs, DenseTarget};
use crate::types::{DecodedEntity, EntitySet, Span};
use crate::{CodecError, Result};

/// Shape of the training targets built by the collator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetLayout {
    /// `(bs, seq, seq, labels)`
    #[default]
    Dense,
    /// `(bs, seq * (seq + 1) / 2, labels)`
    Shaking,
}

#[derive(Debug, Clone)]
pub struct HandshakingNer {
    labels: LabelSpace,
    decode: DecodeConfig,
    layout: TargetLayout,
}

impl HandshakingNer {
    /// Build from a prepared registry.
    pub fn new(registry: &LabelRegistry) -> Result<Self> {
        Ok(Self::from_space(registry.get()?.clone()))
    }

    pub fn from_space(labels: LabelSpace) -> Self {
        Self {
            labels,
            decode: DecodeConfig::default(),
            layout: TargetLayout::Dense,
        }
    }

    /// Build training targets in the packed shaking layout.
    pub fn shaking(mut self) -> Self {
        self.layout = TargetLayout::Shaking;
        self
    }

    pub fn target_layout(&self) -> TargetLayout {
        self.layout
    }

    pub fn with_decode_config(mut self, decode: DecodeConfig) -> Self {
        self.decode = decode;
        self
    }

    pub fn labels(&self) -> &LabelSpace {
        &self.labels
    }

    fn keep(&self, span: &Span, seq_len: usize) -> bool {
        fits(span.start, span.end, seq_len) && span.label_id < self.labels.len()
    }

    /// Symmetric `(seq_len, seq_len, labels)` matrix for one example.
    pub fn encode(&self, spans: &[Span], seq_len: usize) -> DenseTarget<i64> {
        let mut matrix = DenseTarget::zeros(&[seq_len, seq_len, self.labels.len()]);
        let mut dropped = 0;
        for span in spans {
            if !self.keep(span, seq_len) {
                dropped += 1;
                continue;
            }
            matrix.set(&[span.start, span.end, span.label_id], 1);
            matrix.set(&[span.end, span.start, span.label_id], 1);
        }
        if dropped > 0 {
            debug!("Dropped {} spans outside a {}-token sequence", dropped, seq_len);
        }
        matrix
    }

    /// Upper triangle of [`encode`](Self::encode), packed to `(seq * (seq + 1) / 2, labels)`.
    pub fn encode_shaking(&self, spans: &[Span], seq_len: usize) -> DenseTarget<i64> {
        let mut packed = DenseTarget::zeros(&[shaking_len(seq_len), self.labels.len()]);
        for span in spans.iter().filter(|s| self.keep(s, seq_len)) {
            if let Some(pos) = shaking_index(seq_len, span.start, span.end) {
                packed.set(&[pos, span.label_id], 1);
            }
        }
        packed
    }

    /// `(batch, start, end, label)` of every cell above threshold.
    fn candidates(&self, scores: &Tensor, bs: usize, seq_len: usize) -> Result<Vec<[usize; 4]>> {
        let num_labels = self.labels.len();
        match scores.rank() {
            3 => {
                expect_leading(scores, &[bs, shaking_len(seq_len), num_labels])?;
                let pairs = shaking_pairs(seq_len);
                Ok(above_threshold(scores, self.decode.threshold)?
                    .into_iter()
                    .map(|ix| {
                        let (start, end) = pairs[ix[1]];
                        [ix[0], start, end, ix[2]]
                    })
                    .collect())
            }
            4 => {
                expect_leading(scores, &[bs, seq_len, seq_len, num_labels])?;
                Ok(above_threshold(scores, self.decode.threshold)?
                    .into_iter()
                    .map(|ix| [ix[0], ix[1], ix[2], ix[3]])
                    .collect())
            }
            _ => Err(CodecError::shape(
                "(bs, seq, seq, labels) or (bs, seq*(seq+1)/2, labels)",
                scores.dims(),
            )),
        }
    }
}

impl SchemeCollator for HandshakingNer {
    type Labels = Vec<Span>;

    fn targets(&self, labels: &[&Vec<Span>], layout: &BatchLayout<'_>) -> Result<TargetTensors> {
        let batch = match self.layout {
            TargetLayout::Dense => self.dense_targets(labels, layout),
            TargetLayout::Shaking => self.shaking_targets(labels, layout),
        };
        Ok(TargetTensors::new().with("labels", batch.into_tensor(layout.device)?))
    }
}

impl HandshakingNer {
    fn dense_targets(&self, labels: &[&Vec<Span>], layout: &BatchLayout<'_>) -> DenseTarget<i64> {
        let n = layout.seq_len;
        let num_labels = self.labels.len();
        let mut batch = DenseTarget::filled(&[labels.len(), n, n, num_labels], layout.label_pad_value);

        for (b, (spans, &length)) in labels.iter().zip(layout.lengths).enumerate() {
            let matrix = self.encode(spans, length);
            for i in 0..length {
                for j in 0..length {
                    for l in 0..num_labels {
                        batch.set(&[b, i, j, l], matrix.get(&[i, j, l]).unwrap_or(0));
                    }
                }
            }
        }
        batch
    }

    /// Rows are indexed against the padded length so they line up with the
    /// model's packed scores; pairs reaching into padding keep the pad value.
    fn shaking_targets(&self, labels: &[&Vec<Span>], layout: &BatchLayout<'_>) -> DenseTarget<i64> {
        let n = layout.seq_len;
        let num_labels = self.labels.len();
        let mut batch = DenseTarget::filled(&[labels.len(), shaking_len(n), num_labels], layout.label_pad_value);

        for (b, (spans, &length)) in labels.iter().zip(layout.lengths).enumerate() {
            for i in 0..length {
                for j in i..length {
                    if let Some(pos) = shaking_index(n, i, j) {
                        for l in 0..num_labels {
                            batch.set(&[b, pos, l], 0);
                        }
                    }
                }
            }
            for span in spans.iter().filter(|s| self.keep(s, length)) {
                if let Some(pos) = shaking_index(n, span.start, span.end) {
                    batch.set(&[b, pos, span.label_id], 1);
                }
            }
        }
        batch
    }
}

impl SchemeDecoder for HandshakingNer {
    type Scores = Tensor;
    type Output = EntitySet;

    fn decode(&self, scores: &Tensor, batch: &DecodeBatch<'_>) -> Result<Vec<EntitySet>> {
        let lengths = batch.lengths()?;
        let seq_len = batch.seq_len()?;
        let mut results = vec![EntitySet::new(); batch.batch_size()];

        for [b, start, end, label] in self.candidates(scores, batch.batch_size(), seq_len)? {
            if !is_valid_span(start, end, lengths[b]) {
                continue;
            }
            let (Some(name), Some(span)) = (self.labels.name(label), batch.text_span(b, start, end)) else {
                continue;
            };
            results[b].insert(DecodedEntity {
                label: name.to_string(),
                start: span.start,
                end: span.end,
                text: span.text,
            });
        }
        Ok(results)
    }
}
