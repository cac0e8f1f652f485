//! Configuration loading for spanlink.
//! Reads spanlink.toml from the current directory or the path in the
//! SPANLINK_CONFIG env var; `.yaml` / `.yml` files are read as YAML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use spanlink_codec::{
    CollatorConfig, DecodeConfig, FeatureConfig, HfTokenizer, LabelRegistry, SegmenterConfig,
};
use tracing::info;

pub mod error;
pub mod model;

pub use error::{ConfigError, Result};
pub use model::{ModelType, Scheme, TokenizerFamily};

/// Env var holding the config path.
pub const CONFIG_ENV: &str = "SPANLINK_CONFIG";

/// Config file read when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "spanlink.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelSection,
    #[serde(default)]
    pub data: DataSection,
    #[serde(default)]
    pub collator: CollatorConfig,
    /// Falls back to the scheme's default when absent.
    #[serde(default)]
    pub decode: Option<DecodeConfig>,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default)]
    pub model_type: ModelType,
    pub model_name_or_path: PathBuf,
    #[serde(default)]
    pub scheme: Scheme,
    /// `tokenizer.json`; defaults to one inside `model_name_or_path`.
    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,
    #[serde(default)]
    pub use_gpu: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSection {
    #[serde(default)]
    pub train_file: Option<PathBuf>,
    #[serde(default)]
    pub validation_file: Option<PathBuf>,
    #[serde(default)]
    pub test_file: Option<PathBuf>,
    /// Explicit label names; collected from the training set when absent.
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub features: FeatureConfig,
}

impl Config {
    /// Load configuration from spanlink.toml.
    /// Checks SPANLINK_CONFIG env var first, then current directory.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_path(path)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content)?,
            Some("yaml") | Some("yml") => Self::from_yaml(&content)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };
        info!(
            "Loaded config from {} ({} / {:?})",
            path.display(),
            config.model.model_type,
            config.model.scheme
        );
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn decode(&self) -> DecodeConfig {
        self.decode.unwrap_or_else(|| self.model.scheme.default_decode())
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model
            .tokenizer_path
            .clone()
            .unwrap_or_else(|| self.model.model_name_or_path.join("tokenizer.json"))
    }

    pub fn tokenizer(&self) -> Result<HfTokenizer> {
        Ok(HfTokenizer::from_file(self.tokenizer_path(), self.data.features.max_length)?)
    }

    /// A registry prepared from the configured labels, if any were given.
    pub fn label_registry(&self) -> Option<LabelRegistry> {
        let labels = self.data.labels.as_ref()?;
        let mut registry = LabelRegistry::new();
        registry.prepare(labels.iter().cloned());
        Some(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use spanlink_codec::PaddingStrategy;

    const MINIMAL: &str = r#"
[model]
model_name_or_path = "models/bert-base-chinese"
"#;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.model.model_type, ModelType::Bert);
        assert_eq!(config.model.scheme, Scheme::HandshakingNer);
        assert_eq!(config.collator.padding, PaddingStrategy::Longest);
        assert_eq!(config.collator.label_pad_value, -100);
        assert_eq!(config.segmenter.max_length, 512);
        assert!(config.data.features.is_chinese);
        assert_eq!(config.decode().threshold, 0.0);
        assert!(config.label_registry().is_none());
        assert_eq!(
            config.tokenizer_path(),
            PathBuf::from("models/bert-base-chinese/tokenizer.json")
        );
    }

    #[test]
    fn test_full_toml() {
        let config = Config::from_toml(
            r#"
[model]
model_type = "chinese-bert"
model_name_or_path = "models/chinese-bert"
scheme = "pointer"

[data]
train_file = "data/train.json"
labels = ["时间", "地点"]

[data.features]
max_length = 256
is_chinese = true

[collator]
padding = "max_length"
max_length = 256
pad_to_multiple_of = 8

[segmenter]
max_length = 200
split_sentence = true
"#,
        )
        .unwrap();
        assert_eq!(config.model.model_type, ModelType::ChineseBert);
        assert_eq!(config.model.scheme, Scheme::Pointer);
        assert_eq!(config.decode().threshold, 0.5);
        assert_eq!(config.collator.padded_length(100), 256);
        assert!(config.segmenter.split_sentence);
        assert_eq!(config.data.features.max_length, 256);

        let registry = config.label_registry().unwrap();
        assert_eq!(registry.get().unwrap().names(), &["地点", "时间"]);
    }

    #[test]
    fn test_unknown_model_type_is_rejected() {
        let err = Config::from_toml(
            r#"
[model]
model_type = "gpt"
model_name_or_path = "m"
"#,
        );
        assert!(matches!(err, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_yaml() {
        let config = Config::from_yaml(
            r#"
model:
  model_type: roformer
  model_name_or_path: models/roformer
  scheme: grte
decode:
  threshold: 0.3
"#,
        )
        .unwrap();
        assert_eq!(config.model.model_type, ModelType::Roformer);
        assert_eq!(config.model.scheme, Scheme::Grte);
        assert_eq!(config.decode().threshold, 0.3);
    }
}
