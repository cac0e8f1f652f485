//! Long-document segmentation.
//!
//! Documents longer than the model window are cut into chunks of at most
//! `max_length` characters. A [`SegmentMapping`] remembers which chunks came
//! from which document so per-chunk decode results can be folded back.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SegmenterConfig;
use crate::types::{DecodedEntity, EntitySet};
use crate::{CodecError, Result};

/// Separator cascade for [`text_segmentate`], coarsest first.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n", "。", "！", "？", "；", "，", " "];

/// One chunk of a segmented document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Index of the source document.
    pub doc_index: usize,
    /// Char position of the chunk's first char in the source document.
    pub char_offset: usize,
}

/// `mapping[doc_index] = [chunk_index, ...]`, chunk indices in document order.
///
/// Documents that produced no chunks have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMapping(BTreeMap<usize, Vec<usize>>);

impl SegmentMapping {
    pub fn get(&self, doc_index: usize) -> Option<&[usize]> {
        self.0.get(&doc_index).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[usize])> {
        self.0.iter().map(|(d, c)| (*d, c.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, doc_index: usize, chunk_index: usize) {
        self.0.entry(doc_index).or_default().push(chunk_index);
    }
}

/// Result of [`segment`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    pub chunks: Vec<Chunk>,
    pub mapping: SegmentMapping,
    num_documents: usize,
}

impl Segmentation {
    pub fn texts(&self) -> Vec<&str> {
        self.chunks.iter().map(|c| c.text.as_str()).collect()
    }

    pub fn num_documents(&self) -> usize {
        self.num_documents
    }

    pub fn into_parts(self) -> (Vec<String>, SegmentMapping) {
        (self.chunks.into_iter().map(|c| c.text).collect(), self.mapping)
    }

    /// Fold per-chunk results into one list per document, preserving chunk order.
    pub fn regroup<T>(&self, per_chunk: Vec<Vec<T>>) -> Result<Vec<Vec<T>>> {
        if per_chunk.len() != self.chunks.len() {
            return Err(CodecError::BatchLength {
                expected: self.chunks.len(),
                actual: per_chunk.len(),
            });
        }
        let mut grouped: Vec<Vec<T>> = (0..self.num_documents).map(|_| Vec::new()).collect();
        for (chunk, results) in self.chunks.iter().zip(per_chunk) {
            grouped[chunk.doc_index].extend(results);
        }
        Ok(grouped)
    }

    /// Merge per-chunk entity sets into per-document sets, shifting offsets
    /// from chunk coordinates to document coordinates.
    pub fn remap_entities(&self, per_chunk: Vec<EntitySet>) -> Result<Vec<EntitySet>> {
        if per_chunk.len() != self.chunks.len() {
            return Err(CodecError::BatchLength {
                expected: self.chunks.len(),
                actual: per_chunk.len(),
            });
        }
        let mut grouped: Vec<EntitySet> = vec![EntitySet::new(); self.num_documents];
        for (chunk, entities) in self.chunks.iter().zip(per_chunk) {
            grouped[chunk.doc_index].extend(entities.into_iter().map(|e| DecodedEntity {
                start: e.start + chunk.char_offset,
                end: e.end + chunk.char_offset,
                ..e
            }));
        }
        Ok(grouped)
    }
}

fn sentence_rules() -> &'static [Regex] {
    static RULES: OnceLock<Vec<Regex>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            r"([。！？?])([^”’])",
            r"(\.{6})([^”’])",
            r"(…{2})([^”’])",
            r"([。！？?][”’])([^，。！？?])",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("sentence boundary pattern"))
        .collect()
    })
}

/// Cut a paragraph into sentences at Chinese sentence-terminal punctuation.
///
/// Closing quotes stay attached to the sentence they end. Existing newlines
/// also act as boundaries.
pub fn cut_chinese_sent(para: &str) -> Vec<String> {
    let mut text = para.to_string();
    for rule in sentence_rules() {
        text = rule.replace_all(&text, "${1}\n${2}").into_owned();
    }
    text.trim_end().split('\n').map(str::to_string).collect()
}

/// Split `documents` into chunks of at most `config.max_length` chars.
pub fn segment<S: AsRef<str>>(documents: &[S], config: &SegmenterConfig) -> Segmentation {
    let max_length = config.max_length.max(1);
    let mut out = Segmentation {
        num_documents: documents.len(),
        ..Default::default()
    };

    for (doc_index, document) in documents.iter().enumerate() {
        let document = document.as_ref();
        let units = if config.split_sentence {
            cut_chinese_sent(document)
        } else {
            vec![document.to_string()]
        };

        let mut byte_cursor = 0;
        for unit in units.iter().filter(|u| !u.is_empty()) {
            let byte_pos = document[byte_cursor..]
                .find(unit.as_str())
                .map(|p| p + byte_cursor)
                .unwrap_or(byte_cursor);
            let unit_offset = document[..byte_pos].chars().count();
            byte_cursor = byte_pos + unit.len();

            let chars: Vec<char> = unit.chars().collect();
            for (window, piece) in chars.chunks(max_length).enumerate() {
                out.mapping.push(doc_index, out.chunks.len());
                out.chunks.push(Chunk {
                    text: piece.iter().collect(),
                    doc_index,
                    char_offset: unit_offset + window * max_length,
                });
            }
        }
    }

    info!(
        "Segmented {} documents into {} chunks (max_length={})",
        out.num_documents,
        out.chunks.len(),
        max_length
    );
    out
}

/// `segment` in its `(chunks, mapping)` form.
pub fn auto_split<S: AsRef<str>>(
    documents: &[S],
    max_length: usize,
    split_sentence: bool,
) -> (Vec<String>, SegmentMapping) {
    segment(documents, &SegmenterConfig { max_length, split_sentence }).into_parts()
}

/// Recursively split `text` on a cascade of separators, re-merging adjacent
/// pieces while they fit in `max_len` chars.
///
/// Pieces that still exceed `max_len` once the cascade is exhausted are
/// returned as they are.
pub fn text_segmentate(text: &str, max_len: usize, seps: &[&str], strips: Option<&str>) -> Vec<String> {
    let text = match strips {
        Some(chars) => text.trim().trim_matches(|c| chars.contains(c)),
        None => text.trim(),
    };
    if seps.is_empty() || text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let sep = seps[0];
    let pieces: Vec<&str> = text.split(sep).collect();
    let mut texts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for (i, piece) in pieces.iter().enumerate() {
        let piece_len = piece.chars().count();
        if current_len > 0 && piece_len > 0 && current_len + piece_len > max_len.saturating_sub(1) {
            texts.extend(text_segmentate(&current, max_len, &seps[1..], strips));
            current.clear();
            current_len = 0;
        }
        current.push_str(piece);
        current_len += piece_len;
        if i + 1 != pieces.len() {
            current.push_str(sep);
            current_len += sep.chars().count();
        }
    }
    if !current.is_empty() {
        texts.extend(text_segmentate(&current, max_len, &seps[1..], strips));
    }
    texts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hard_slicing_without_sentence_split() {
        let doc = "a".repeat(250);
        let seg = segment(&[doc], &SegmenterConfig { max_length: 100, split_sentence: false });
        let lengths: Vec<usize> = seg.chunks.iter().map(|c| c.text.chars().count()).collect();
        assert_eq!(lengths, vec![100, 100, 50]);
        assert_eq!(seg.mapping.get(0), Some(&[0, 1, 2][..]));
        assert_eq!(seg.chunks[2].char_offset, 200);
    }

    #[test]
    fn test_empty_document_has_no_chunks() {
        let docs = ["", "北京欢迎你"];
        let seg = segment(&docs, &SegmenterConfig { max_length: 10, split_sentence: false });
        assert_eq!(seg.chunks.len(), 1);
        assert_eq!(seg.mapping.get(0), None);
        assert_eq!(seg.mapping.get(1), Some(&[0][..]));
    }

    #[test]
    fn test_cut_chinese_sent() {
        let sents = cut_chinese_sent("今天天气很好。我们去公园吧！你去吗？“好的。”他说");
        assert_eq!(sents, vec!["今天天气很好。", "我们去公园吧！", "你去吗？", "“好的。”", "他说"]);
    }

    #[test]
    fn test_sentence_split_keeps_document_order_and_offsets() {
        let docs = ["第一句。第二句很长很长很长。", "短。"];
        let seg = segment(&docs, &SegmenterConfig { max_length: 5, split_sentence: true });
        assert_eq!(seg.texts(), vec!["第一句。", "第二句很长", "很长很长。", "短。"]);
        assert_eq!(seg.mapping.get(0), Some(&[0, 1, 2][..]));
        assert_eq!(seg.mapping.get(1), Some(&[3][..]));
        assert_eq!(seg.chunks[1].char_offset, 4);
        assert_eq!(seg.chunks[2].char_offset, 9);
    }

    #[test]
    fn test_every_chunk_within_limit() {
        let doc = "一二三四五六七。八九十。".repeat(13);
        for split_sentence in [false, true] {
            let seg = segment(&[doc.as_str()], &SegmenterConfig { max_length: 7, split_sentence });
            assert!(seg.chunks.iter().all(|c| c.text.chars().count() <= 7));
            let total: usize = seg.chunks.iter().map(|c| c.text.chars().count()).sum();
            assert_eq!(total, doc.chars().count());
        }
    }

    #[test]
    fn test_remap_entities_shifts_offsets() {
        let doc = "a".repeat(12);
        let seg = segment(&[doc], &SegmenterConfig { max_length: 5, split_sentence: false });
        let mut second = EntitySet::new();
        second.insert(DecodedEntity { label: "X".into(), start: 1, end: 3, text: "aa".into() });
        let remapped = seg
            .remap_entities(vec![EntitySet::new(), second, EntitySet::new()])
            .unwrap();
        let entity = remapped[0].iter().next().unwrap();
        assert_eq!((entity.start, entity.end), (6, 8));
    }

    #[test]
    fn test_regroup_rejects_wrong_length() {
        let seg = segment(&["abc"], &SegmenterConfig { max_length: 2, split_sentence: false });
        assert!(seg.regroup(vec![vec![1]]).is_err());
        assert_eq!(seg.regroup(vec![vec![1], vec![2, 3]]).unwrap(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_text_segmentate_merges_pieces() {
        let pieces = text_segmentate("ab,cd,ef,gh", 5, &[","], None);
        assert_eq!(pieces, vec!["ab,", "cd,", "ef,", "gh"]);

        let merged = text_segmentate("ab,cd,ef,gh", 7, &[","], None);
        assert_eq!(merged, vec!["ab,cd,", "ef,gh"]);
    }

    #[test]
    fn test_text_segmentate_short_text_untouched() {
        assert_eq!(text_segmentate("  短文本 ", 10, DEFAULT_SEPARATORS, None), vec!["短文本"]);
    }
}
