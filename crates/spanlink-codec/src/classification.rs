//! Sentence (and sentence-pair) classification labels.

use std::collections::BTreeSet;

use candle_core::{DType, Tensor, D};

use crate::config::DecodeConfig;
use crate::labels::{LabelRegistry, LabelSpace};
use crate::schemes::{BatchLayout, DecodeBatch, SchemeCollator, SchemeDecoder, TargetTensors};
use crate::tensor::expect_leading;
use crate::Result;

#[derive(Debug, Clone)]
pub struct Classification {
    labels: LabelSpace,
    multi_label: bool,
    decode: DecodeConfig,
}

impl Classification {
    pub fn new(registry: &LabelRegistry) -> Result<Self> {
        Ok(Self::from_space(registry.get()?.clone()))
    }

    pub fn from_space(labels: LabelSpace) -> Self {
        Self {
            labels,
            multi_label: false,
            decode: DecodeConfig::default(),
        }
    }

    /// Decode every class scoring above the threshold instead of the argmax.
    pub fn multi_label(mut self, decode: DecodeConfig) -> Self {
        self.multi_label = true;
        self.decode = decode;
        self
    }

    pub fn labels(&self) -> &LabelSpace {
        &self.labels
    }

    pub fn encode(&self, label: &str) -> Result<usize> {
        self.labels.require_id(label)
    }

    /// Argmax class name per row of `(bs, classes)` logits.
    pub fn decode_single(&self, logits: &Tensor) -> Result<Vec<String>> {
        let ids = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;
        Ok(ids
            .into_iter()
            .filter_map(|id| self.labels.name(id as usize).map(str::to_string))
            .collect())
    }

    /// Every class above threshold, per row.
    pub fn decode_multi(&self, logits: &Tensor) -> Result<Vec<BTreeSet<String>>> {
        let rows = logits.to_dtype(DType::F32)?.to_vec2::<f32>()?;
        Ok(rows
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .filter(|(_, s)| **s > self.decode.threshold)
                    .filter_map(|(id, _)| self.labels.name(id).map(str::to_string))
                    .collect()
            })
            .collect())
    }
}

impl SchemeCollator for Classification {
    type Labels = usize;

    fn targets(&self, labels: &[&usize], layout: &BatchLayout<'_>) -> Result<TargetTensors> {
        let ids: Vec<i64> = labels.iter().map(|l| **l as i64).collect();
        let n = ids.len();
        Ok(TargetTensors::new().with("labels", Tensor::from_vec(ids, n, layout.device)?))
    }
}

impl SchemeDecoder for Classification {
    type Scores = Tensor;
    type Output = BTreeSet<String>;

    fn decode(&self, logits: &Tensor, batch: &DecodeBatch<'_>) -> Result<Vec<BTreeSet<String>>> {
        expect_leading(logits, &[batch.batch_size(), self.labels.len()])?;
        if self.multi_label {
            return self.decode_multi(logits);
        }
        Ok(self
            .decode_single(logits)?
            .into_iter()
            .map(|name| BTreeSet::from([name]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemes::testing::{char_offsets, full_mask};
    use candle_core::Device;

    fn codec() -> Classification {
        Classification::from_space(LabelSpace::from_labels(["体育", "财经", "科技"]))
    }

    fn logits() -> Tensor {
        Tensor::from_vec(vec![0.1f32, 2.0, -1.0, 1.5, -0.5, 0.7], (2, 3), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_targets_are_label_ids() {
        let c = codec();
        let (a, b) = (c.encode("科技").unwrap(), c.encode("体育").unwrap());
        let layout = BatchLayout {
            lengths: &[5, 5],
            seq_len: 5,
            label_pad_value: -100,
            device: &Device::Cpu,
        };
        let targets = c.targets(&[&a, &b], &layout).unwrap();
        assert_eq!(targets.get("labels").unwrap().to_vec1::<i64>().unwrap(), vec![a as i64, b as i64]);
        assert!(c.encode("娱乐").is_err());
    }

    #[test]
    fn test_single_and_multi_label_decoding() {
        let c = codec();
        let names = c.labels().names().to_vec();
        assert_eq!(c.decode_single(&logits()).unwrap(), vec![names[1].clone(), names[0].clone()]);

        let multi = c.multi_label(DecodeConfig::default());
        let mask = full_mask(2, 3);
        let texts = vec!["a".to_string(), "b".to_string()];
        let offsets = vec![char_offsets("a"), char_offsets("b")];
        let decoded = multi.decode(&logits(), &DecodeBatch::new(&mask, &texts, &offsets)).unwrap();
        assert_eq!(decoded[0], BTreeSet::from([names[0].clone(), names[1].clone()]));
        assert_eq!(decoded[1], BTreeSet::from([names[0].clone(), names[2].clone()]));
    }
}
