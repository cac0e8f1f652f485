//! Batch collation: pad features into model inputs and, for training
//! batches, build the scheme's target tensors.

use candle_core::{Device, Tensor};
use tracing::debug;

use crate::align::OffsetMapping;
use crate::config::{CollatorConfig, PaddingStrategy};
use crate::features::Feature;
use crate::schemes::{BatchLayout, DecodeBatch, SchemeCollator, TargetTensors};
use crate::{CodecError, Result};

/// Padded `(bs, seq)` `U32` encoder inputs.
#[derive(Debug, Clone)]
pub struct ModelInputs {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

impl ModelInputs {
    pub fn batch_size(&self) -> Result<usize> {
        Ok(self.input_ids.dims2()?.0)
    }

    pub fn seq_len(&self) -> Result<usize> {
        Ok(self.input_ids.dims2()?.1)
    }
}

/// Inputs plus scheme targets. Texts and offsets never enter a training batch.
#[derive(Debug, Clone)]
pub struct TrainBatch {
    pub inputs: ModelInputs,
    pub targets: TargetTensors,
}

/// Inputs plus what the decoder needs to map scores back to text.
#[derive(Debug, Clone)]
pub struct InferenceBatch {
    pub inputs: ModelInputs,
    pub texts: Vec<String>,
    pub offset_mappings: Vec<OffsetMapping>,
}

impl InferenceBatch {
    pub fn decode_batch(&self) -> DecodeBatch<'_> {
        DecodeBatch::new(&self.inputs.attention_mask, &self.texts, &self.offset_mappings)
    }
}

#[derive(Debug, Clone)]
pub enum Collated {
    Train(TrainBatch),
    Inference(InferenceBatch),
}

impl Collated {
    pub fn inputs(&self) -> &ModelInputs {
        match self {
            Collated::Train(b) => &b.inputs,
            Collated::Inference(b) => &b.inputs,
        }
    }

    pub fn into_train(self) -> Option<TrainBatch> {
        match self {
            Collated::Train(b) => Some(b),
            Collated::Inference(_) => None,
        }
    }

    pub fn into_inference(self) -> Option<InferenceBatch> {
        match self {
            Collated::Inference(b) => Some(b),
            Collated::Train(_) => None,
        }
    }
}

/// Collator for one tagging scheme.
///
/// The first feature decides the mode: labelled features give a
/// [`TrainBatch`], unlabelled ones an [`InferenceBatch`]. Mixing the two
/// is an error.
pub struct DataCollator<S: SchemeCollator> {
    scheme: S,
    config: CollatorConfig,
    device: Device,
}

impl<S: SchemeCollator> DataCollator<S> {
    pub fn new(scheme: S, config: CollatorConfig) -> Self {
        Self {
            scheme,
            config,
            device: Device::Cpu,
        }
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn scheme(&self) -> &S {
        &self.scheme
    }

    pub fn config(&self) -> &CollatorConfig {
        &self.config
    }

    pub fn collate(&self, features: Vec<Feature<S::Labels>>) -> Result<Collated> {
        let first = features.first().ok_or(CodecError::EmptyBatch)?;
        let train = first.is_labelled();
        if features.iter().any(|f| f.is_labelled() != train) {
            return Err(CodecError::MixedBatch);
        }

        let lengths: Vec<usize> = features.iter().map(Feature::len).collect();
        let longest = lengths.iter().copied().max().unwrap_or(0);
        if self.config.padding == PaddingStrategy::DoNotPad && lengths.iter().any(|&l| l != longest) {
            return Err(CodecError::InvalidInput(format!(
                "padding is disabled but sequence lengths differ: {:?}",
                lengths
            )));
        }
        let seq_len = self.config.padded_length(longest);
        debug!(
            "Collating {} {} features to length {}",
            features.len(),
            if train { "training" } else { "inference" },
            seq_len
        );
        let inputs = self.pad_inputs(&features, seq_len)?;

        if train {
            let labels: Vec<&S::Labels> = features.iter().filter_map(|f| f.labels.as_ref()).collect();
            let layout = BatchLayout {
                lengths: &lengths,
                seq_len,
                label_pad_value: self.config.label_pad_value,
                device: &self.device,
            };
            let targets = self.scheme.targets(&labels, &layout)?;
            return Ok(Collated::Train(TrainBatch { inputs, targets }));
        }

        let (texts, offset_mappings) = features
            .into_iter()
            .map(|f| (f.text, f.offset_mapping))
            .unzip();
        Ok(Collated::Inference(InferenceBatch {
            inputs,
            texts,
            offset_mappings,
        }))
    }

    fn pad_inputs(&self, features: &[Feature<S::Labels>], seq_len: usize) -> Result<ModelInputs> {
        let bs = features.len();
        let pad = |pick: fn(&Feature<S::Labels>) -> &[u32], value: u32| -> Result<Tensor> {
            let mut flat = Vec::with_capacity(bs * seq_len);
            for f in features {
                let row = pick(f);
                flat.extend_from_slice(&row[..row.len().min(seq_len)]);
                flat.extend(std::iter::repeat(value).take(seq_len.saturating_sub(row.len())));
            }
            Ok(Tensor::from_vec(flat, (bs, seq_len), &self.device)?)
        };
        Ok(ModelInputs {
            input_ids: pad(|f| f.input_ids.as_slice(), self.config.pad_token_id)?,
            attention_mask: pad(|f| f.attention_mask.as_slice(), 0)?,
            token_type_ids: pad(|f| f.token_type_ids.as_slice(), 0)?,
        })
    }
}
