//! Char ↔ token alignment.
//!
//! Offsets are char positions (not bytes) into the text that was tokenized.
//! Special tokens carry the `(0, 0)` sentinel.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokenizers::{Encoding, Tokenizer, TruncationParams};

use crate::Result;

/// Per-token `(char_start, char_end)` ranges, end exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetMapping {
    offsets: Vec<(usize, usize)>,
    /// Char shift applied to the second segment of a paired encoding.
    #[serde(default)]
    bias: usize,
}

impl OffsetMapping {
    pub fn new(offsets: Vec<(usize, usize)>) -> Self {
        Self { offsets, bias: 0 }
    }

    /// Offsets that were already rebiased by `bias`.
    pub fn with_bias(offsets: Vec<(usize, usize)>, bias: usize) -> Self {
        Self { offsets, bias }
    }

    /// Offsets of a `(prompt, content)` pair whose content offsets restart at zero.
    ///
    /// Every non-sentinel entry after the first sentinel that follows prompt
    /// text is shifted by `bias = end of last prompt token + 1`, so content
    /// char `c` lands at `c + bias`.
    pub fn rebias_pair(mut offsets: Vec<(usize, usize)>) -> Self {
        let mut bias = 0;
        let mut seen_text = false;
        for index in 0..offsets.len() {
            let (start, end) = offsets[index];
            if start == 0 && end == 0 {
                if seen_text && bias == 0 && index > 0 {
                    bias = offsets[index - 1].1 + 1;
                }
                continue;
            }
            seen_text = true;
            if bias > 0 {
                offsets[index] = (start + bias, end + bias);
            }
        }
        Self { offsets, bias }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[(usize, usize)] {
        &self.offsets
    }

    pub fn bias(&self) -> usize {
        self.bias
    }

    pub fn is_sentinel(&self, token: usize) -> bool {
        matches!(self.offsets.get(token), Some((0, 0)))
    }

    /// Token whose char range contains `char_offset`; `None` when unmappable.
    pub fn char_to_token(&self, char_offset: usize) -> Option<usize> {
        self.offsets
            .iter()
            .position(|&(start, end)| !(start == 0 && end == 0) && start <= char_offset && char_offset < end)
    }

    /// Direct lookup of a token's char range.
    pub fn token_to_chars(&self, token: usize) -> Option<(usize, usize)> {
        self.offsets.get(token).copied()
    }

    /// Char range covered by the inclusive token range `[start, end]`.
    pub fn char_span(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        Some((self.offsets.get(start)?.0, self.offsets.get(end)?.1))
    }

    /// Char range of a second-segment token in the second segment's own
    /// coordinates; `None` for sentinels and first-segment tokens.
    pub fn content_chars(&self, token: usize) -> Option<(usize, usize)> {
        let (start, end) = *self.offsets.get(token)?;
        if (start == 0 && end == 0) || start < self.bias || self.bias == 0 {
            return None;
        }
        Some((start - self.bias, end - self.bias))
    }
}

/// Output of the external tokenizer for one example.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedText {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
    pub offset_mapping: OffsetMapping,
}

impl TokenizedText {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    pub fn char_to_token(&self, char_offset: usize) -> Option<usize> {
        self.offset_mapping.char_to_token(char_offset)
    }

    fn from_encoding(encoding: &Encoding) -> (Self, Vec<(usize, usize)>) {
        let tokenized = Self {
            input_ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
            token_type_ids: encoding.get_type_ids().to_vec(),
            offset_mapping: OffsetMapping::default(),
        };
        (tokenized, encoding.get_offsets().to_vec())
    }
}

/// Seam to the external tokenizer: truncating, special-token-adding,
/// char-offset-reporting encoding of single texts and text pairs.
pub trait TextTokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<TokenizedText>;

    /// Encode `(first, second)`; the second segment's offsets come back rebiased.
    fn tokenize_pair(&self, first: &str, second: &str) -> Result<TokenizedText>;
}

/// [`TextTokenizer`] backed by a Hugging Face `tokenizers` tokenizer.
pub struct HfTokenizer {
    inner: Tokenizer,
}

impl HfTokenizer {
    /// Wrap a tokenizer, truncating every encoding to `max_length` tokens.
    pub fn new(mut tokenizer: Tokenizer, max_length: usize) -> Result<Self> {
        tokenizer.with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))?;
        tokenizer.with_padding(None);
        Ok(Self { inner: tokenizer })
    }

    /// Load `tokenizer.json` from disk.
    pub fn from_file(path: impl AsRef<Path>, max_length: usize) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)?;
        Self::new(tokenizer, max_length)
    }

    pub fn inner(&self) -> &Tokenizer {
        &self.inner
    }
}

impl TextTokenizer for HfTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenizedText> {
        let encoding = self.inner.encode_char_offsets(text, true)?;
        let (mut tokenized, offsets) = TokenizedText::from_encoding(&encoding);
        tokenized.offset_mapping = OffsetMapping::new(offsets);
        Ok(tokenized)
    }

    fn tokenize_pair(&self, first: &str, second: &str) -> Result<TokenizedText> {
        let encoding = self.inner.encode_char_offsets((first, second), true)?;
        let (mut tokenized, offsets) = TokenizedText::from_encoding(&encoding);
        tokenized.offset_mapping = OffsetMapping::rebias_pair(offsets);
        Ok(tokenized)
    }
}
