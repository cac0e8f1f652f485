//! The pretrained encoder the scheme heads sit on.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use tracing::{debug, info};

use crate::collate::ModelInputs;
use crate::{CodecError, Result};

/// Produces `(bs, seq, hidden)` token representations.
pub trait Encoder {
    fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor, token_type_ids: &Tensor) -> Result<Tensor>;

    fn encode(&self, inputs: &ModelInputs) -> Result<Tensor> {
        self.forward(&inputs.input_ids, &inputs.attention_mask, &inputs.token_type_ids)
    }
}

impl Encoder for BertModel {
    fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor, token_type_ids: &Tensor) -> Result<Tensor> {
        let attention_mask = attention_mask.to_dtype(DType::F32)?;
        Ok(BertModel::forward(self, input_ids, token_type_ids, Some(&attention_mask))?)
    }
}

/// Select the best available device.
pub fn select_device(use_gpu: bool) -> Device {
    if !use_gpu {
        return Device::Cpu;
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("CUDA device available");
                return device;
            }
            Err(e) => debug!("CUDA not available: {}, falling back to CPU", e),
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Metal device available");
                return device;
            }
            Err(e) => debug!("Metal not available: {}, falling back to CPU", e),
        }
    }

    debug!("Using CPU device");
    Device::Cpu
}

pub fn load_bert_config(path: impl AsRef<Path>) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Load a BERT-family encoder from `config.json` and safetensors or `.bin` weights.
pub fn load_bert(config_path: impl AsRef<Path>, weights_path: impl AsRef<Path>, device: &Device) -> Result<BertModel> {
    let config = load_bert_config(config_path)?;
    let weights_path = weights_path.as_ref();
    let vb = if weights_path.extension().is_some_and(|e| e == "safetensors") {
        // SAFETY: the weights file must not be modified while mapped.
        unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)? }
    } else {
        VarBuilder::from_pth(weights_path, DType::F32, device)?
    };
    let model = BertModel::load(vb, &config).map_err(|e| CodecError::ModelLoad(e.to_string()))?;
    info!(
        "Loaded encoder from {:?} ({} layers, hidden size {})",
        weights_path, config.num_hidden_layers, config.hidden_size
    );
    Ok(model)
}
