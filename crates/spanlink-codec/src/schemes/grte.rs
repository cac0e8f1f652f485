//! GRTE: one categorical table per predicate.
//!
//! Cell `[i, j, p]` of the `(seq, seq, predicates)` table holds one of eight
//! codes telling whether subject token `i` and object token `j` open or
//! close a single- or multi-token span of a triple with predicate `p`.

use std::fmt;

use candle_core::{DType, Tensor, D};
use tracing::debug;

use crate::labels::{LabelRegistry, LabelSpace};
use crate::schemes::gplinker::encodable;
use crate::schemes::{is_valid_span, BatchLayout, DecodeBatch, SchemeCollator, SchemeDecoder, TargetTensors};
use crate::tensor::{expect_leading, DenseTarget};
use crate::types::{DecodedTriple, RelationTriple, TripleSet};
use crate::{CodecError, Result};

/// Category codes, in table order.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GrteTag {
    None,
    /// single-token subject, single-token object
    SS,
    /// multi-token subject head, single-token object
    MSH,
    /// multi-token subject tail, single-token object
    MST,
    /// single-token subject, multi-token object head
    SMH,
    /// single-token subject, multi-token object tail
    SMT,
    /// multi/multi head pair
    MMH,
    /// multi/multi tail pair
    MMT,
}

impl GrteTag {
    pub const ALL: [GrteTag; 8] = [
        GrteTag::None,
        GrteTag::SS,
        GrteTag::MSH,
        GrteTag::MST,
        GrteTag::SMH,
        GrteTag::SMT,
        GrteTag::MMH,
        GrteTag::MMT,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        usize::try_from(code).ok().and_then(|c| Self::ALL.get(c).copied())
    }

    pub fn name(self) -> &'static str {
        match self {
            GrteTag::None => "N/A",
            GrteTag::SS => "SS",
            GrteTag::MSH => "MSH",
            GrteTag::MST => "MST",
            GrteTag::SMH => "SMH",
            GrteTag::SMT => "SMT",
            GrteTag::MMH => "MMH",
            GrteTag::MMT => "MMT",
        }
    }
}

impl fmt::Display for GrteTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cells a triple occupies: one for SS, a head and a tail cell otherwise.
pub fn cells(t: &RelationTriple) -> Vec<([usize; 3], GrteTag)> {
    let (sh, st, p, oh, ot) = (t.subject_head, t.subject_tail, t.predicate, t.object_head, t.object_tail);
    match (sh == st, oh == ot) {
        (true, true) => vec![([sh, oh, p], GrteTag::SS)],
        (false, true) => vec![([sh, oh, p], GrteTag::MSH), ([st, oh, p], GrteTag::MST)],
        (true, false) => vec![([sh, oh, p], GrteTag::SMH), ([sh, ot, p], GrteTag::SMT)],
        (false, false) => vec![([sh, oh, p], GrteTag::MMH), ([st, ot, p], GrteTag::MMT)],
    }
}

#[derive(Debug, Clone)]
pub struct Grte {
    predicates: LabelSpace,
}

impl Grte {
    pub fn new(registry: &LabelRegistry) -> Result<Self> {
        Ok(Self::from_space(registry.get()?.clone()))
    }

    pub fn from_space(predicates: LabelSpace) -> Self {
        Self { predicates }
    }

    pub fn predicates(&self) -> &LabelSpace {
        &self.predicates
    }

    /// The category table names, in code order.
    pub fn tag_names(&self) -> [&'static str; 8] {
        GrteTag::ALL.map(GrteTag::name)
    }

    /// `(seq_len, seq_len, predicates)` code table for one example.
    pub fn encode(&self, triples: &[RelationTriple], seq_len: usize) -> DenseTarget<i64> {
        let mut table = DenseTarget::zeros(&[seq_len, seq_len, self.predicates.len()]);
        for t in encodable(triples, self.predicates.len(), seq_len) {
            for (index, tag) in cells(t) {
                table.set(&index, tag.code());
            }
        }
        table
    }

    /// Per-example `(seq, seq, predicates)` code tables: the argmax of
    /// `(bs, seq, seq, predicates, 8)` logits, or already-categorical input.
    fn tables(&self, scores: &Tensor, bs: usize, seq_len: usize) -> Result<Vec<Vec<u32>>> {
        let num_predicates = self.predicates.len();
        let codes = match scores.rank() {
            5 => {
                expect_leading(scores, &[bs, seq_len, seq_len, num_predicates, GrteTag::ALL.len()])?;
                scores.argmax(D::Minus1)?
            }
            4 => {
                expect_leading(scores, &[bs, seq_len, seq_len, num_predicates])?;
                scores.to_dtype(DType::U32)?
            }
            _ => {
                return Err(CodecError::shape(
                    "(bs, seq, seq, predicates, 8) or (bs, seq, seq, predicates)",
                    scores.dims(),
                ))
            }
        };
        Ok(codes.flatten_from(1)?.to_vec2::<u32>()?)
    }
}

impl SchemeCollator for Grte {
    type Labels = Vec<RelationTriple>;

    fn targets(&self, labels: &[&Vec<RelationTriple>], layout: &BatchLayout<'_>) -> Result<TargetTensors> {
        let n = layout.seq_len;
        let num_predicates = self.predicates.len();
        let mut batch = DenseTarget::<i64>::zeros(&[labels.len(), n, n, num_predicates]);
        for (b, (triples, &length)) in labels.iter().zip(layout.lengths).enumerate() {
            for t in encodable(triples, num_predicates, length) {
                for ([i, j, p], tag) in cells(t) {
                    batch.set(&[b, i, j, p], tag.code());
                }
            }
        }
        Ok(TargetTensors::new().with("labels", batch.into_tensor(layout.device)?))
    }
}

/// Read-only view of one example's code table.
struct Table<'a> {
    codes: &'a [u32],
    seq_len: usize,
    num_predicates: usize,
}

impl Table<'_> {
    fn tag(&self, i: usize, j: usize, p: usize) -> GrteTag {
        let code = self.codes[(i * self.seq_len + j) * self.num_predicates + p];
        GrteTag::from_code(code as i64).unwrap_or(GrteTag::None)
    }

    /// Token spans `((sh, st), (oh, ot))` recovered for predicate `p`,
    /// looking only at the first `limit` positions.
    fn spans(&self, p: usize, limit: usize) -> Vec<((usize, usize), (usize, usize))> {
        let mut found = Vec::new();
        let mut unmatched = 0;
        for i in 0..limit {
            for j in 0..limit {
                match self.tag(i, j, p) {
                    GrteTag::SS => found.push(((i, i), (j, j))),
                    GrteTag::MSH => match (i + 1..limit).find(|&k| self.tag(k, j, p) == GrteTag::MST) {
                        Some(k) => found.push(((i, k), (j, j))),
                        None => unmatched += 1,
                    },
                    GrteTag::SMH => match (j + 1..limit).find(|&l| self.tag(i, l, p) == GrteTag::SMT) {
                        Some(l) => found.push(((i, i), (j, l))),
                        None => unmatched += 1,
                    },
                    GrteTag::MMH => {
                        let tail = (i + 1..limit)
                            .flat_map(|k| (j + 1..limit).map(move |l| (k, l)))
                            .find(|&(k, l)| self.tag(k, l, p) == GrteTag::MMT);
                        match tail {
                            Some((k, l)) => found.push(((i, k), (j, l))),
                            None => unmatched += 1,
                        }
                    }
                    _ => {}
                }
            }
        }
        if unmatched > 0 {
            debug!("{} GRTE head cells had no matching tail", unmatched);
        }
        found
    }
}

impl SchemeDecoder for Grte {
    type Scores = Tensor;
    type Output = TripleSet;

    fn decode(&self, scores: &Tensor, batch: &DecodeBatch<'_>) -> Result<Vec<TripleSet>> {
        let lengths = batch.lengths()?;
        let seq_len = batch.seq_len()?;
        let tables = self.tables(scores, batch.batch_size(), seq_len)?;
        let num_predicates = self.predicates.len();

        let mut results = vec![TripleSet::new(); batch.batch_size()];
        for (b, codes) in tables.iter().enumerate() {
            let table = Table {
                codes,
                seq_len,
                num_predicates,
            };
            let length = lengths[b];
            for (p, predicate) in self.predicates.names().iter().enumerate() {
                for ((sh, st), (oh, ot)) in table.spans(p, length) {
                    if !is_valid_span(sh, st, length) || !is_valid_span(oh, ot, length) {
                        continue;
                    }
                    if let (Some(subject), Some(object)) = (batch.text_span(b, sh, st), batch.text_span(b, oh, ot)) {
                        results[b].insert(DecodedTriple {
                            subject,
                            predicate: predicate.clone(),
                            object,
                        });
                    }
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemes::testing::{char_offsets, full_mask};
    use candle_core::Device;
    use pretty_assertions::assert_eq;

    fn codec() -> Grte {
        Grte::from_space(LabelSpace::from_labels(["p0", "p1"]))
    }

    #[test]
    fn test_tag_table_order() {
        assert_eq!(codec().tag_names(), ["N/A", "SS", "MSH", "MST", "SMH", "SMT", "MMH", "MMT"]);
        assert_eq!(GrteTag::from_code(5), Some(GrteTag::SMT));
        assert_eq!(GrteTag::from_code(8), None);
    }

    #[test]
    fn test_single_subject_multi_object() {
        let table = codec().encode(&[RelationTriple::new(2, 2, 0, 5, 7)], 10);
        assert_eq!(table.get(&[2, 5, 0]), Some(GrteTag::SMH.code()));
        assert_eq!(table.get(&[2, 7, 0]), Some(GrteTag::SMT.code()));
        assert_eq!(table.count_nonzero(), 2);
    }

    #[test]
    fn test_every_shape_case() {
        let c = codec();
        let ss = c.encode(&[RelationTriple::new(1, 1, 1, 3, 3)], 8);
        assert_eq!(ss.get(&[1, 3, 1]), Some(GrteTag::SS.code()));
        assert_eq!(ss.count_nonzero(), 1);

        let ms = c.encode(&[RelationTriple::new(1, 2, 0, 4, 4)], 8);
        assert_eq!(ms.get(&[1, 4, 0]), Some(GrteTag::MSH.code()));
        assert_eq!(ms.get(&[2, 4, 0]), Some(GrteTag::MST.code()));

        let mm = c.encode(&[RelationTriple::new(1, 2, 0, 4, 6)], 8);
        assert_eq!(mm.get(&[1, 4, 0]), Some(GrteTag::MMH.code()));
        assert_eq!(mm.get(&[2, 6, 0]), Some(GrteTag::MMT.code()));
    }

    #[test]
    fn test_empty_example_is_all_none() {
        let table = codec().encode(&[], 6);
        assert_eq!(table.shape(), &[6, 6, 2]);
        assert_eq!(table.count_nonzero(), 0);
    }

    #[test]
    fn test_decode_round_trip_from_codes() {
        let text = "甲乙丙丁戊己庚";
        let seq = 9;
        let triples = vec![
            RelationTriple::new(1, 2, 0, 4, 6),
            RelationTriple::new(3, 3, 1, 7, 7),
            RelationTriple::new(1, 2, 1, 5, 5),
        ];
        let layout = BatchLayout {
            lengths: &[seq],
            seq_len: seq,
            label_pad_value: -100,
            device: &Device::Cpu,
        };
        let c = codec();
        let targets = c.targets(&[&triples], &layout).unwrap();

        let mask = full_mask(1, seq);
        let texts = vec![text.to_string()];
        let offsets = vec![char_offsets(text)];
        let decoded = c
            .decode(targets.get("labels").unwrap(), &DecodeBatch::new(&mask, &texts, &offsets))
            .unwrap();

        let found: Vec<(String, String, String)> = decoded[0]
            .iter()
            .map(|t| (t.subject.text.clone(), t.predicate.clone(), t.object.text.clone()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("甲乙".to_string(), "p0".to_string(), "丁戊己".to_string()),
                ("甲乙".to_string(), "p1".to_string(), "戊".to_string()),
                ("丙".to_string(), "p1".to_string(), "庚".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_from_logits() {
        let seq = 5;
        let mut logits = DenseTarget::<f32>::zeros(&[1, seq, seq, 2, 8]);
        logits.set(&[0, 1, 3, 0, GrteTag::SS.code() as usize], 5.0);
        let scores = logits.into_tensor(&Device::Cpu).unwrap();

        let mask = full_mask(1, seq);
        let texts = vec!["abc".to_string()];
        let offsets = vec![char_offsets("abc")];
        let decoded = codec().decode(&scores, &DecodeBatch::new(&mask, &texts, &offsets)).unwrap();
        // object token 3 is the last text token before [SEP]: still valid
        assert_eq!(decoded[0].len(), 1);
    }
}
