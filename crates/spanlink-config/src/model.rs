//! Encoder families and tagging schemes selectable from a config file.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use spanlink_codec::DecodeConfig;

use crate::ConfigError;

/// Pretrained encoder family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModelType {
    #[default]
    Bert,
    Ernie,
    Roformer,
    Nezha,
    Albert,
    Xlnet,
    ChineseBert,
}

/// Tokenizer a model family is trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenizerFamily {
    WordPiece,
    SentencePiece,
    /// Char-level fast tokenizer shipped with ChineseBERT checkpoints.
    ChineseBert,
}

impl ModelType {
    pub const ALL: [ModelType; 7] = [
        ModelType::Bert,
        ModelType::Ernie,
        ModelType::Roformer,
        ModelType::Nezha,
        ModelType::Albert,
        ModelType::Xlnet,
        ModelType::ChineseBert,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelType::Bert => "bert",
            ModelType::Ernie => "ernie",
            ModelType::Roformer => "roformer",
            ModelType::Nezha => "nezha",
            ModelType::Albert => "albert",
            ModelType::Xlnet => "xlnet",
            ModelType::ChineseBert => "chinese-bert",
        }
    }

    pub fn tokenizer_family(self) -> TokenizerFamily {
        match self {
            ModelType::Bert | ModelType::Ernie | ModelType::Roformer | ModelType::Nezha => TokenizerFamily::WordPiece,
            ModelType::Albert | ModelType::Xlnet => TokenizerFamily::SentencePiece,
            ModelType::ChineseBert => TokenizerFamily::ChineseBert,
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ModelType::ALL
            .into_iter()
            .find(|m| m.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownModelType(s.to_string()))
    }
}

/// Tagging scheme of the task head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Scheme {
    #[default]
    #[serde(rename = "handshaking")]
    HandshakingNer,
    #[serde(rename = "gplinker")]
    GpLinker,
    #[serde(rename = "grte")]
    Grte,
    #[serde(rename = "pfn")]
    Pfn,
    #[serde(rename = "tplinker_plus")]
    TpLinkerPlus,
    #[serde(rename = "gplinker_event")]
    GpLinkerEvent,
    #[serde(rename = "pointer")]
    Pointer,
    #[serde(rename = "classification")]
    Classification,
}

impl Scheme {
    /// Decode threshold a scheme uses when the config sets none.
    ///
    /// Pointer and PFN heads emit probabilities, the rest emit logits.
    pub fn default_decode(self) -> DecodeConfig {
        match self {
            Scheme::Pointer | Scheme::Pfn => DecodeConfig::probabilities(),
            _ => DecodeConfig::default(),
        }
    }

    pub fn is_relation(self) -> bool {
        matches!(self, Scheme::GpLinker | Scheme::Grte | Scheme::Pfn | Scheme::TpLinkerPlus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_parsing() {
        assert_eq!("bert".parse::<ModelType>().unwrap(), ModelType::Bert);
        assert_eq!("Chinese-Bert".parse::<ModelType>().unwrap(), ModelType::ChineseBert);
        assert!(matches!("gpt".parse::<ModelType>(), Err(ConfigError::UnknownModelType(_))));
        for m in ModelType::ALL {
            assert_eq!(m.to_string().parse::<ModelType>().unwrap(), m);
        }
    }

    #[test]
    fn test_tokenizer_families() {
        assert_eq!(ModelType::Nezha.tokenizer_family(), TokenizerFamily::WordPiece);
        assert_eq!(ModelType::Xlnet.tokenizer_family(), TokenizerFamily::SentencePiece);
        assert_eq!(ModelType::ChineseBert.tokenizer_family(), TokenizerFamily::ChineseBert);
    }

    #[test]
    fn test_pointer_decodes_probabilities() {
        assert_eq!(Scheme::Pointer.default_decode().threshold, 0.5);
        assert_eq!(Scheme::Grte.default_decode().threshold, 0.0);
        assert!(Scheme::TpLinkerPlus.is_relation());
        assert!(!Scheme::GpLinkerEvent.is_relation());
    }
}
