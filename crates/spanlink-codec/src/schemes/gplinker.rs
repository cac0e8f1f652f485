//! GPLinker: relations as entity, head-link and tail-link pointer tables.
//!
//! Targets are sparse index lists padded to the batch's largest triple
//! count: `entity_labels (bs, 2, max_spo, 2)` holds subject and object
//! boundaries, `head_labels` / `tail_labels (bs, predicates, max_spo, 2)` hold
//! the `(subject, object)` head and tail pairs of each predicate. Unused slots
//! stay zero.

use std::collections::BTreeSet;

use candle_core::Tensor;
use tracing::debug;

use crate::config::DecodeConfig;
use crate::labels::{LabelRegistry, LabelSpace};
use crate::schemes::{fits, is_valid_span, max_count, BatchLayout, DecodeBatch, SchemeCollator, SchemeDecoder, TargetTensors};
use crate::tensor::{above_threshold, expect_leading, DenseTarget, ScoreGrid};
use crate::types::{DecodedTriple, RelationTriple, TripleSet};
use crate::Result;

/// Scores of the three pointer tables, each `(bs, channels, seq, seq)`.
#[derive(Debug, Clone)]
pub struct PairScores {
    /// Channel 0 scores subject spans, channel 1 object spans.
    pub entity: Tensor,
    pub head: Tensor,
    pub tail: Tensor,
}

#[derive(Debug, Clone)]
pub struct GpLinker {
    predicates: LabelSpace,
    decode: DecodeConfig,
}

impl GpLinker {
    pub fn new(registry: &LabelRegistry) -> Result<Self> {
        Ok(Self::from_space(registry.get()?.clone()))
    }

    pub fn from_space(predicates: LabelSpace) -> Self {
        Self {
            predicates,
            decode: DecodeConfig::default(),
        }
    }

    pub fn with_decode_config(mut self, decode: DecodeConfig) -> Self {
        self.decode = decode;
        self
    }

    pub fn predicates(&self) -> &LabelSpace {
        &self.predicates
    }
}

/// Triples a relation encoder can place in a `seq_len`-token example.
pub(crate) fn encodable<'a>(
    triples: &'a [RelationTriple],
    num_predicates: usize,
    seq_len: usize,
) -> Vec<&'a RelationTriple> {
    let kept: Vec<_> = triples
        .iter()
        .filter(|t| {
            t.predicate < num_predicates
                && fits(t.subject_head, t.subject_tail, seq_len)
                && fits(t.object_head, t.object_tail, seq_len)
        })
        .collect();
    if kept.len() < triples.len() {
        debug!("Dropped {} triples outside a {}-token sequence", triples.len() - kept.len(), seq_len);
    }
    kept
}

impl SchemeCollator for GpLinker {
    type Labels = Vec<RelationTriple>;

    fn targets(&self, labels: &[&Vec<RelationTriple>], layout: &BatchLayout<'_>) -> Result<TargetTensors> {
        let bs = labels.len();
        let num_predicates = self.predicates.len();
        let kept: Vec<Vec<&RelationTriple>> = labels
            .iter()
            .zip(layout.lengths)
            .map(|(triples, &length)| encodable(triples, num_predicates, length))
            .collect();
        let max_spo = max_count(kept.iter().map(Vec::len));

        let mut entity = DenseTarget::<i64>::zeros(&[bs, 2, max_spo, 2]);
        let mut head = DenseTarget::<i64>::zeros(&[bs, num_predicates, max_spo, 2]);
        let mut tail = DenseTarget::<i64>::zeros(&[bs, num_predicates, max_spo, 2]);

        for (b, triples) in kept.iter().enumerate() {
            for (slot, t) in triples.iter().enumerate() {
                let p = t.predicate;
                for (index, value) in [
                    ([b, 0, slot, 0], t.subject_head),
                    ([b, 0, slot, 1], t.subject_tail),
                    ([b, 1, slot, 0], t.object_head),
                    ([b, 1, slot, 1], t.object_tail),
                ] {
                    entity.set(&index, value as i64);
                }
                head.set(&[b, p, slot, 0], t.subject_head as i64);
                head.set(&[b, p, slot, 1], t.object_head as i64);
                tail.set(&[b, p, slot, 0], t.subject_tail as i64);
                tail.set(&[b, p, slot, 1], t.object_tail as i64);
            }
        }

        Ok(TargetTensors::new()
            .with("entity_labels", entity.into_tensor(layout.device)?)
            .with("head_labels", head.into_tensor(layout.device)?)
            .with("tail_labels", tail.into_tensor(layout.device)?))
    }
}

impl SchemeDecoder for GpLinker {
    type Scores = PairScores;
    type Output = TripleSet;

    fn decode(&self, scores: &PairScores, batch: &DecodeBatch<'_>) -> Result<Vec<TripleSet>> {
        decode_pair_tables(scores, &self.predicates, self.decode.threshold, batch)
    }
}

/// Join subject and object spans through predicate head and tail links.
///
/// A triple `(sh..st, p, oh..ot)` is recovered when subject span `(sh, st)`
/// and object span `(oh, ot)` both score above threshold, and so do
/// `head[p, sh, oh]` and `tail[p, st, ot]`.
pub(crate) fn decode_pair_tables(
    scores: &PairScores,
    predicates: &LabelSpace,
    threshold: f32,
    batch: &DecodeBatch<'_>,
) -> Result<Vec<TripleSet>> {
    let lengths = batch.lengths()?;
    let seq_len = batch.seq_len()?;
    let bs = batch.batch_size();
    let num_predicates = predicates.len();
    expect_leading(&scores.entity, &[bs, 2, seq_len, seq_len])?;
    expect_leading(&scores.head, &[bs, num_predicates, seq_len, seq_len])?;
    expect_leading(&scores.tail, &[bs, num_predicates, seq_len, seq_len])?;

    let mut subjects = vec![BTreeSet::new(); bs];
    let mut objects = vec![BTreeSet::new(); bs];
    for ix in above_threshold(&scores.entity, threshold)? {
        let (b, channel, start, end) = (ix[0], ix[1], ix[2], ix[3]);
        if !is_valid_span(start, end, lengths[b]) {
            continue;
        }
        if channel == 0 {
            subjects[b].insert((start, end));
        } else {
            objects[b].insert((start, end));
        }
    }

    let head = ScoreGrid::from_tensor(&scores.head)?;
    let tail = ScoreGrid::from_tensor(&scores.tail)?;
    let mut results = vec![TripleSet::new(); bs];
    for b in 0..bs {
        for &(sh, st) in &subjects[b] {
            for &(oh, ot) in &objects[b] {
                for p in 0..num_predicates {
                    if head.get(&[b, p, sh, oh]) <= threshold || tail.get(&[b, p, st, ot]) <= threshold {
                        continue;
                    }
                    let (Some(subject), Some(object), Some(predicate)) =
                        (batch.text_span(b, sh, st), batch.text_span(b, oh, ot), predicates.name(p))
                    else {
                        continue;
                    };
                    results[b].insert(DecodedTriple {
                        subject,
                        predicate: predicate.to_string(),
                        object,
                    });
                }
            }
        }
    }
    Ok(results)
}
