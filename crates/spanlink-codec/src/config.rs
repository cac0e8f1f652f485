//! Configuration for feature conversion, collation, decoding and segmentation.

use serde::{Deserialize, Serialize};

/// How token sequences are padded when a batch is collated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaddingStrategy {
    /// Pad to the longest sequence in the batch
    #[default]
    Longest,

    /// Pad to `CollatorConfig::max_length` (falls back to the longest sequence when unset)
    MaxLength,

    /// No padding; every sequence in the batch must already have the same length
    DoNotPad,
}

/// Configuration for the batch collators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollatorConfig {
    /// Padding strategy (default: longest)
    #[serde(default)]
    pub padding: PaddingStrategy,

    /// Target length for `PaddingStrategy::MaxLength` (default: none)
    #[serde(default)]
    pub max_length: Option<usize>,

    /// Round the padded length up to a multiple of this value (default: none)
    #[serde(default)]
    pub pad_to_multiple_of: Option<usize>,

    /// Token id written into padded `input_ids` positions (default: 0)
    #[serde(default)]
    pub pad_token_id: u32,

    /// Value written outside each example's region of an eagerly built
    /// handshaking matrix (default: -100, ignored by the loss)
    #[serde(default = "default_label_pad_value")]
    pub label_pad_value: i64,
}

fn default_label_pad_value() -> i64 { -100 }

impl Default for CollatorConfig {
    fn default() -> Self {
        Self {
            padding: PaddingStrategy::Longest,
            max_length: None,
            pad_to_multiple_of: None,
            pad_token_id: 0,
            label_pad_value: default_label_pad_value(),
        }
    }
}

impl CollatorConfig {
    /// Pad every batch to a fixed length.
    pub fn fixed(max_length: usize) -> Self {
        Self {
            padding: PaddingStrategy::MaxLength,
            max_length: Some(max_length),
            ..Default::default()
        }
    }

    pub fn with_pad_to_multiple_of(mut self, multiple: usize) -> Self {
        self.pad_to_multiple_of = Some(multiple);
        self
    }

    pub fn with_pad_token_id(mut self, id: u32) -> Self {
        self.pad_token_id = id;
        self
    }

    /// Length every sequence of a batch is padded to, given the longest one.
    pub fn padded_length(&self, longest: usize) -> usize {
        let base = match self.padding {
            PaddingStrategy::Longest | PaddingStrategy::DoNotPad => longest,
            PaddingStrategy::MaxLength => self.max_length.unwrap_or(longest).max(longest),
        };
        match self.pad_to_multiple_of {
            Some(m) if m > 0 && self.padding != PaddingStrategy::DoNotPad => base.div_ceil(m) * m,
            _ => base,
        }
    }
}

/// Configuration for score-to-annotation decoding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Scores strictly above this value count as positive (default: 0.0, i.e. logits)
    #[serde(default)]
    pub threshold: f32,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self { threshold: 0.0 }
    }
}

impl DecodeConfig {
    /// Threshold suited to sigmoid probabilities.
    pub fn probabilities() -> Self {
        Self { threshold: 0.5 }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

/// Configuration for long-document segmentation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Maximum chunk length in characters (default: 512)
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Split on Chinese sentence-terminal punctuation first (default: false)
    #[serde(default)]
    pub split_sentence: bool,
}

fn default_max_length() -> usize { 512 }

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            split_sentence: false,
        }
    }
}

/// Configuration for turning annotated examples into token-aligned features.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Maximum tokenized length including special tokens (default: 512)
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Replace spaces with `-` before tokenizing so char offsets stay aligned (default: true)
    #[serde(default = "default_true")]
    pub is_chinese: bool,

    /// Entity annotations carry explicit token `indices` (default: false)
    #[serde(default)]
    pub with_indices: bool,
}

fn default_true() -> bool { true }

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            is_chinese: true,
            with_indices: false,
        }
    }
}

impl FeatureConfig {
    pub fn with_max_length(mut self, length: usize) -> Self {
        self.max_length = length;
        self
    }

    pub fn english(mut self) -> Self {
        self.is_chinese = false;
        self
    }
}
