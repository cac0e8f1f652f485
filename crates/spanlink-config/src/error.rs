//! Error types for configuration loading.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Unknown model type: {0}")]
    UnknownModelType(String),

    #[error("Unsupported config format: {0} (expected .toml, .yaml or .yml)")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Codec(#[from] spanlink_codec::CodecError),
}
