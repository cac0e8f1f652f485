//! Start/end pointers over a `(prompt, content)` pair, UIE style.
//!
//! The prompt names what to extract; the answer spans live in the content.
//! Offsets of content tokens are rebiased (see
//! [`OffsetMapping::rebias_pair`](crate::align::OffsetMapping::rebias_pair)),
//! so decoding reads them back through `content_chars`.

use std::collections::{BTreeMap, BTreeSet};

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::config::DecodeConfig;
use crate::schemes::{BatchLayout, DecodeBatch, SchemeCollator, SchemeDecoder, TargetTensors};
use crate::tensor::{expect_leading, DenseTarget};
use crate::types::{slice_chars, DecodedEntity, EntitySet, TextSpan};
use crate::Result;

/// Token positions of the answer spans of one example.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerLabels {
    pub starts: Vec<usize>,
    pub ends: Vec<usize>,
}

/// Start and end probabilities, each `(bs, seq)`.
#[derive(Debug, Clone)]
pub struct PointerScores {
    pub start: Tensor,
    pub end: Tensor,
}

#[derive(Debug, Clone)]
pub struct Pointer {
    decode: DecodeConfig,
}

impl Default for Pointer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pointer {
    /// Pointer heads emit sigmoid probabilities; decoding cuts at 0.5.
    pub fn new() -> Self {
        Self {
            decode: DecodeConfig::probabilities(),
        }
    }

    pub fn with_decode_config(mut self, decode: DecodeConfig) -> Self {
        self.decode = decode;
        self
    }

    /// One-hot start and end vectors of length `seq_len`.
    pub fn encode(&self, labels: &PointerLabels, seq_len: usize) -> (DenseTarget<f32>, DenseTarget<f32>) {
        let mut start = DenseTarget::zeros(&[seq_len]);
        let mut end = DenseTarget::zeros(&[seq_len]);
        for &s in &labels.starts {
            start.set(&[s], 1.0);
        }
        for &e in &labels.ends {
            end.set(&[e], 1.0);
        }
        (start, end)
    }
}

/// Pair sorted start and end positions; every position is used once.
///
/// An end takes the closest start at or before it; starts with no later end
/// and ends with no earlier start are discarded.
pub fn get_span(starts: &[usize], ends: &[usize]) -> BTreeSet<(usize, usize)> {
    let mut starts = starts.to_vec();
    let mut ends = ends.to_vec();
    starts.sort_unstable();
    ends.sort_unstable();

    let mut couples: BTreeMap<usize, usize> = BTreeMap::new();
    let (mut si, mut ei) = (0, 0);
    while si < starts.len() && ei < ends.len() {
        let (s, e) = (starts[si], ends[ei]);
        if s == e {
            couples.insert(e, s);
            si += 1;
            ei += 1;
        } else if s < e {
            couples.insert(e, s);
            si += 1;
        } else {
            ei += 1;
        }
    }
    couples.into_iter().map(|(e, s)| (s, e)).collect()
}

/// Attach the prompt as label to decoded spans.
pub fn label_spans(spans: &BTreeSet<TextSpan>, prompt: &str) -> EntitySet {
    spans
        .iter()
        .map(|s| DecodedEntity {
            label: prompt.to_string(),
            start: s.start,
            end: s.end,
            text: s.text.clone(),
        })
        .collect()
}

impl SchemeCollator for Pointer {
    type Labels = PointerLabels;

    fn targets(&self, labels: &[&PointerLabels], layout: &BatchLayout<'_>) -> Result<TargetTensors> {
        let n = layout.seq_len;
        let mut starts = DenseTarget::<f32>::zeros(&[labels.len(), n]);
        let mut ends = DenseTarget::<f32>::zeros(&[labels.len(), n]);
        for (b, l) in labels.iter().enumerate() {
            let (start, end) = self.encode(l, n);
            for i in 0..n {
                starts.set(&[b, i], start.get(&[i]).unwrap_or(0.0));
                ends.set(&[b, i], end.get(&[i]).unwrap_or(0.0));
            }
        }
        Ok(TargetTensors::new()
            .with("start_positions", starts.into_tensor(layout.device)?)
            .with("end_positions", ends.into_tensor(layout.device)?))
    }
}

impl SchemeDecoder for Pointer {
    type Scores = PointerScores;
    type Output = BTreeSet<TextSpan>;

    fn decode(&self, scores: &PointerScores, batch: &DecodeBatch<'_>) -> Result<Vec<BTreeSet<TextSpan>>> {
        let lengths = batch.lengths()?;
        let seq_len = batch.seq_len()?;
        let bs = batch.batch_size();
        expect_leading(&scores.start, &[bs, seq_len])?;
        expect_leading(&scores.end, &[bs, seq_len])?;
        let start_probs = scores.start.to_dtype(candle_core::DType::F32)?.to_vec2::<f32>()?;
        let end_probs = scores.end.to_dtype(candle_core::DType::F32)?.to_vec2::<f32>()?;

        let above = |probs: &[f32], length: usize| -> Vec<usize> {
            probs
                .iter()
                .take(length)
                .enumerate()
                .filter(|(_, p)| **p > self.decode.threshold)
                .map(|(i, _)| i)
                .collect()
        };

        let mut results = Vec::with_capacity(bs);
        for b in 0..bs {
            let mapping = &batch.offset_mappings[b];
            let mut spans = BTreeSet::new();
            for (s, e) in get_span(&above(&start_probs[b], lengths[b]), &above(&end_probs[b], lengths[b])) {
                let (Some((start, _)), Some((_, end))) = (mapping.content_chars(s), mapping.content_chars(e)) else {
                    continue;
                };
                if end <= start {
                    continue;
                }
                spans.insert(TextSpan {
                    start,
                    end,
                    text: slice_chars(&batch.texts[b], start, end),
                });
            }
            results.push(spans);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::OffsetMapping;
    use crate::schemes::testing::full_mask;
    use candle_core::Device;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_get_span_pairs_nearest_start() {
        assert_eq!(get_span(&[1, 3], &[2, 5]), BTreeSet::from([(1, 2), (3, 5)]));
        assert_eq!(get_span(&[2, 1], &[4]), BTreeSet::from([(2, 4)]));
        assert_eq!(get_span(&[4], &[4]), BTreeSet::from([(4, 4)]));
        assert!(get_span(&[5], &[2]).is_empty());
    }

    #[test]
    fn test_targets_are_one_hot() {
        let labels = PointerLabels { starts: vec![4], ends: vec![5] };
        let layout = BatchLayout {
            lengths: &[7],
            seq_len: 8,
            label_pad_value: -100,
            device: &Device::Cpu,
        };
        let targets = Pointer::new().targets(&[&labels], &layout).unwrap();
        let start = targets.get("start_positions").unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(start[0], vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
        let end = targets.get("end_positions").unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(end[0].iter().sum::<f32>(), 1.0);
    }

    #[test]
    fn test_decode_reads_content_offsets() {
        // [CLS] 时 间 [SEP] 今 天 下 雨 [SEP]
        let offsets = OffsetMapping::rebias_pair(vec![
            (0, 0),
            (0, 1),
            (1, 2),
            (0, 0),
            (0, 1),
            (1, 2),
            (2, 3),
            (3, 4),
            (0, 0),
        ]);
        let p = Pointer::new();
        let (start, end) = p.encode(&PointerLabels { starts: vec![4, 1], ends: vec![5, 2] }, 9);
        let scores = PointerScores {
            start: start.into_tensor(&Device::Cpu).unwrap().unsqueeze(0).unwrap(),
            end: end.into_tensor(&Device::Cpu).unwrap().unsqueeze(0).unwrap(),
        };

        let mask = full_mask(1, 9);
        let texts = vec!["今天下雨".to_string()];
        let offsets = vec![offsets];
        let decoded = p.decode(&scores, &DecodeBatch::new(&mask, &texts, &offsets)).unwrap();

        // the prompt span (1, 2) is ignored
        let expected = TextSpan { start: 0, end: 2, text: "今天".into() };
        assert_eq!(decoded, vec![BTreeSet::from([expected])]);

        let labelled = label_spans(&decoded[0], "时间");
        assert_eq!(labelled.iter().next().unwrap().label, "时间");
    }
}
