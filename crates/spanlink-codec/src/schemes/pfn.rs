//! PFN: dense boolean span and link tables.
//!
//! `entity_labels (bs, 2, seq, seq)` marks subject (channel 0) and object
//! (channel 1) spans at `[start, end]`; `head_labels` / `tail_labels
//! (bs, predicates, seq, seq)` mark `[p, sh, oh]` and `[p, st, ot]`. The
//! tables share GPLinker's decoding.

use crate::config::DecodeConfig;
use crate::labels::{LabelRegistry, LabelSpace};
use crate::schemes::gplinker::{decode_pair_tables, encodable, PairScores};
use crate::schemes::{BatchLayout, DecodeBatch, SchemeCollator, SchemeDecoder, TargetTensors};
use crate::tensor::DenseTarget;
use crate::types::{RelationTriple, TripleSet};
use crate::Result;

#[derive(Debug, Clone)]
pub struct Pfn {
    predicates: LabelSpace,
    decode: DecodeConfig,
}

impl Pfn {
    pub fn new(registry: &LabelRegistry) -> Result<Self> {
        Ok(Self::from_space(registry.get()?.clone()))
    }

    /// PFN heads end in a sigmoid, so decoding defaults to the 0.5 cut.
    pub fn from_space(predicates: LabelSpace) -> Self {
        Self {
            predicates,
            decode: DecodeConfig::probabilities(),
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

impl SchemeCollator for Pfn {
    type Labels = Vec<RelationTriple>;

    fn targets(&self, labels: &[&Vec<RelationTriple>], layout: &BatchLayout<'_>) -> Result<TargetTensors> {
        let (bs, n) = (labels.len(), layout.seq_len);
        let num_predicates = self.predicates.len();
        let mut entity = DenseTarget::<i64>::zeros(&[bs, 2, n, n]);
        let mut head = DenseTarget::<i64>::zeros(&[bs, num_predicates, n, n]);
        let mut tail = DenseTarget::<i64>::zeros(&[bs, num_predicates, n, n]);

        for (b, (triples, &length)) in labels.iter().zip(layout.lengths).enumerate() {
            for t in encodable(triples, num_predicates, length) {
                entity.set(&[b, 0, t.subject_head, t.subject_tail], 1);
                entity.set(&[b, 1, t.object_head, t.object_tail], 1);
                head.set(&[b, t.predicate, t.subject_head, t.object_head], 1);
                tail.set(&[b, t.predicate, t.subject_tail, t.object_tail], 1);
            }
        }

        Ok(TargetTensors::new()
            .with("entity_labels", entity.into_tensor(layout.device)?)
            .with("head_labels", head.into_tensor(layout.device)?)
            .with("tail_labels", tail.into_tensor(layout.device)?))
    }
}

impl SchemeDecoder for Pfn {
    type Scores = PairScores;
    type Output = TripleSet;

    fn decode(&self, scores: &PairScores, batch: &DecodeBatch<'_>) -> Result<Vec<TripleSet>> {
        decode_pair_tables(scores, &self.predicates, self.decode.threshold, batch)
    }
}
