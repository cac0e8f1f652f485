//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use spanlink_codec::{OffsetMapping, TextTokenizer, TokenizedText};

/// One token per char, `[CLS]` before and `[SEP]` after every segment.
pub struct CharTokenizer;

fn encode(segments: &[&str]) -> (TokenizedText, Vec<(usize, usize)>) {
    let mut tokenized = TokenizedText::default();
    let mut offsets = vec![(0, 0)];
    tokenized.input_ids.push(101);
    tokenized.token_type_ids.push(0);
    for (segment, text) in segments.iter().enumerate() {
        for (i, c) in text.chars().enumerate() {
            tokenized.input_ids.push(c as u32);
            tokenized.token_type_ids.push(segment as u32);
            offsets.push((i, i + 1));
        }
        tokenized.input_ids.push(102);
        tokenized.token_type_ids.push(segment as u32);
        offsets.push((0, 0));
    }
    tokenized.attention_mask = vec![1; tokenized.input_ids.len()];
    (tokenized, offsets)
}

impl TextTokenizer for CharTokenizer {
    fn tokenize(&self, text: &str) -> spanlink_codec::Result<TokenizedText> {
        let (mut tokenized, offsets) = encode(&[text]);
        tokenized.offset_mapping = OffsetMapping::new(offsets);
        Ok(tokenized)
    }

    fn tokenize_pair(&self, first: &str, second: &str) -> spanlink_codec::Result<TokenizedText> {
        let (mut tokenized, offsets) = encode(&[first, second]);
        tokenized.offset_mapping = OffsetMapping::rebias_pair(offsets);
        Ok(tokenized)
    }
}

/// Parse a JSON-lines dataset.
pub fn load_jsonl<T: serde::de::DeserializeOwned>(lines: &str) -> Vec<T> {
    lines
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}
