//! TPLinker-plus for relations: one multi-label shaking sequence.
//!
//! For `P` predicates there are `4P + 1` tags per upper-triangular pair:
//!
//! | tag          | cell       | meaning                    |
//! |--------------|------------|----------------------------|
//! | `p`          | `(sh, oh)` | subject head → object head |
//! | `p + P`      | `(oh, sh)` | object head → subject head |
//! | `p + 2P`     | `(st, ot)` | subject tail → object tail |
//! | `p + 3P`     | `(ot, st)` | object tail → subject tail |
//! | `4P`         | `(h, t)`   | entity span                |
//!
//! Only cells with row <= column exist, so of every directional pair exactly
//! the one pointing down the triangle is stored.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use candle_core::Tensor;

use crate::config::DecodeConfig;
use crate::labels::{LabelRegistry, LabelSpace};
use crate::schemes::gplinker::encodable;
use crate::schemes::{is_valid_span, BatchLayout, DecodeBatch, SchemeCollator, SchemeDecoder, TargetTensors};
use crate::tensor::{above_threshold, expect_leading, shaking_index, shaking_len, shaking_pairs, DenseTarget};
use crate::types::{DecodedTriple, RelationTriple, TripleSet};
use crate::Result;

#[derive(Debug, Clone)]
pub struct TpLinkerPlus {
    predicates: LabelSpace,
    decode: DecodeConfig,
}

impl TpLinkerPlus {
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

    pub fn num_tags(&self) -> usize {
        self.predicates.len() * 4 + 1
    }

    fn entity_tag(&self) -> usize {
        self.predicates.len() * 4
    }

    /// `(seq * (seq + 1) / 2, 4P + 1)` shaking target for one example.
    pub fn encode(&self, triples: &[RelationTriple], seq_len: usize) -> DenseTarget<i64> {
        let mut shaking = DenseTarget::zeros(&[shaking_len(seq_len), self.num_tags()]);
        self.write(&mut shaking, &[], triples, seq_len, seq_len);
        shaking
    }

    /// Triples must fit in `length` real tokens; cells are indexed against the
    /// padded `seq_len`.
    fn write(
        &self,
        target: &mut DenseTarget<i64>,
        prefix: &[usize],
        triples: &[RelationTriple],
        length: usize,
        seq_len: usize,
    ) {
        let num_predicates = self.predicates.len();
        let mut put = |i: usize, j: usize, tag: usize| {
            if let Some(pos) = shaking_index(seq_len, i, j) {
                let mut index = prefix.to_vec();
                index.extend([pos, tag]);
                target.set(&index, 1);
            }
        };
        for t in encodable(triples, num_predicates, length) {
            let p = t.predicate;
            put(t.subject_head, t.object_head, p);
            put(t.object_head, t.subject_head, p + num_predicates);
            put(t.subject_tail, t.object_tail, p + 2 * num_predicates);
            put(t.object_tail, t.subject_tail, p + 3 * num_predicates);
            put(t.subject_head, t.subject_tail, 4 * num_predicates);
            put(t.object_head, t.object_tail, 4 * num_predicates);
        }
    }
}

impl SchemeCollator for TpLinkerPlus {
    type Labels = Vec<RelationTriple>;

    fn targets(&self, labels: &[&Vec<RelationTriple>], layout: &BatchLayout<'_>) -> Result<TargetTensors> {
        let n = layout.seq_len;
        let mut batch = DenseTarget::<i64>::zeros(&[labels.len(), shaking_len(n), self.num_tags()]);
        for (b, (triples, &length)) in labels.iter().zip(layout.lengths).enumerate() {
            self.write(&mut batch, &[b], triples, length, n);
        }
        Ok(TargetTensors::new().with("labels", batch.into_tensor(layout.device)?))
    }
}

/// Links and entity spans found in one example.
#[derive(Default)]
struct Spots {
    /// entity head -> entity tails
    entities: BTreeMap<usize, BTreeSet<usize>>,
    /// `(subject_head, object_head, predicate)`
    head_links: BTreeSet<(usize, usize, usize)>,
    /// `(subject_tail, object_tail, predicate)`
    tail_links: HashSet<(usize, usize, usize)>,
}

impl SchemeDecoder for TpLinkerPlus {
    type Scores = Tensor;
    type Output = TripleSet;

    fn decode(&self, scores: &Tensor, batch: &DecodeBatch<'_>) -> Result<Vec<TripleSet>> {
        let lengths = batch.lengths()?;
        let seq_len = batch.seq_len()?;
        let bs = batch.batch_size();
        expect_leading(scores, &[bs, shaking_len(seq_len), self.num_tags()])?;

        let num_predicates = self.predicates.len();
        let pairs = shaking_pairs(seq_len);
        let mut spots: Vec<Spots> = (0..bs).map(|_| Spots::default()).collect();
        for ix in above_threshold(scores, self.decode.threshold)? {
            let (b, (i, j), tag) = (ix[0], pairs[ix[1]], ix[2]);
            let s = &mut spots[b];
            if tag == self.entity_tag() {
                if is_valid_span(i, j, lengths[b]) {
                    s.entities.entry(i).or_default().insert(j);
                }
                continue;
            }
            let p = tag % num_predicates;
            match tag / num_predicates {
                0 => s.head_links.insert((i, j, p)),
                1 => s.head_links.insert((j, i, p)),
                2 => s.tail_links.insert((i, j, p)),
                _ => s.tail_links.insert((j, i, p)),
            };
        }

        let mut results = vec![TripleSet::new(); bs];
        for (b, s) in spots.iter().enumerate() {
            for &(sh, oh, p) in &s.head_links {
                let (Some(subject_tails), Some(object_tails)) = (s.entities.get(&sh), s.entities.get(&oh)) else {
                    continue;
                };
                for &st in subject_tails {
                    for &ot in object_tails {
                        if !s.tail_links.contains(&(st, ot, p)) {
                            continue;
                        }
                        if let (Some(subject), Some(object), Some(predicate)) =
                            (batch.text_span(b, sh, st), batch.text_span(b, oh, ot), self.predicates.name(p))
                        {
                            results[b].insert(DecodedTriple {
                                subject,
                                predicate: predicate.to_string(),
                                object,
                            });
                        }
                    }
                }
            }
        }
        Ok(results)
    }
}
