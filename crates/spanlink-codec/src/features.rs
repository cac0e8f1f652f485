//! Annotated examples to token-aligned features.
//!
//! Each task has a serde example type matching its JSON-lines dataset
//! format, a label collector for preparing a [`LabelRegistry`], and a
//! conversion on [`FeatureConverter`] that tokenizes the text and maps char
//! annotations onto token positions. Annotations that cannot be mapped are
//! dropped and logged, never errors.
//!
//! [`LabelRegistry`]: crate::labels::LabelRegistry

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::align::{OffsetMapping, TextTokenizer, TokenizedText};
use crate::config::FeatureConfig;
use crate::labels::{event_role_label, LabelSpace, TRIGGER_ROLE};
use crate::schemes::PointerLabels;
use crate::types::{slice_chars, DecodedEntity, EntitySet, EventArgument, EventRecord, RelationTriple, Span};
use crate::Result;

/// Dataset split a feature is built for; only training features carry labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl Split {
    pub fn is_train(self) -> bool {
        matches!(self, Split::Train)
    }
}

/// One tokenized example, ready for the collator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature<L> {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
    pub offset_mapping: OffsetMapping,
    /// Text that decoded offsets refer to.
    pub text: String,
    pub labels: Option<L>,
}

impl<L> Feature<L> {
    pub fn new(tokenized: TokenizedText, text: impl Into<String>, labels: Option<L>) -> Self {
        Self {
            input_ids: tokenized.input_ids,
            attention_mask: tokenized.attention_mask,
            token_type_ids: tokenized.token_type_ids,
            offset_mapping: tokenized.offset_mapping,
            text: text.into(),
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    pub fn is_labelled(&self) -> bool {
        self.labels.is_some()
    }
}

// ---------------------------------------------------------------------------
// Examples
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAnnotation {
    pub label: String,
    pub start_offset: usize,
    /// Exclusive.
    pub end_offset: usize,
    #[serde(default)]
    pub entity: String,
    /// Explicit token positions, used when [`FeatureConfig::with_indices`] is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NerExample {
    pub text: String,
    #[serde(default)]
    pub entities: Vec<EntityAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoAnnotation {
    pub predicate: String,
    pub subject: String,
    pub subject_start_index: usize,
    pub object: String,
    pub object_start_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationExample {
    pub text: String,
    #[serde(default)]
    pub spo_list: Vec<SpoAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentAnnotation {
    pub role: String,
    pub argument: String,
    pub argument_start_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAnnotation {
    pub event_type: String,
    pub trigger: String,
    pub trigger_start_index: usize,
    #[serde(default)]
    pub arguments: Vec<ArgumentAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventExample {
    pub text: String,
    #[serde(default)]
    pub event_list: Vec<EventAnnotation>,
}

/// An answer span inside the content of a prompt example, end exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptResult {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptExample {
    pub prompt: String,
    pub content: String,
    #[serde(default)]
    pub result_list: Vec<PromptResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationExample {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_pair: Option<String>,
    pub label: String,
}

// ---------------------------------------------------------------------------
// Label collection
// ---------------------------------------------------------------------------

pub fn ner_labels(examples: &[NerExample]) -> BTreeSet<String> {
    examples
        .iter()
        .flat_map(|e| e.entities.iter().map(|a| a.label.clone()))
        .collect()
}

pub fn relation_labels(examples: &[RelationExample]) -> BTreeSet<String> {
    examples
        .iter()
        .flat_map(|e| e.spo_list.iter().map(|s| s.predicate.clone()))
        .collect()
}

/// `event_type + "+" + role` for every role seen, the trigger role included.
pub fn event_labels(examples: &[EventExample]) -> BTreeSet<String> {
    let mut labels = BTreeSet::new();
    for event in examples.iter().flat_map(|e| &e.event_list) {
        labels.insert(event_role_label(&event.event_type, TRIGGER_ROLE));
        for argument in &event.arguments {
            labels.insert(event_role_label(&event.event_type, &argument.role));
        }
    }
    labels
}

pub fn classification_labels(examples: &[ClassificationExample]) -> BTreeSet<String> {
    examples.iter().map(|e| e.label.clone()).collect()
}

// ---------------------------------------------------------------------------
// Evaluation targets
// ---------------------------------------------------------------------------

/// Ground-truth entities of an example in char space, for evaluation.
///
/// With `with_indices` the range is `indices[0] .. indices[last] + 1`.
pub fn ner_targets(example: &NerExample, with_indices: bool) -> EntitySet {
    example
        .entities
        .iter()
        .filter_map(|a| {
            let (start, end) = if with_indices {
                let indices = a.indices.as_ref()?;
                (*indices.first()?, indices.last()? + 1)
            } else {
                (a.start_offset, a.end_offset)
            };
            let text = if a.entity.is_empty() {
                slice_chars(&example.text, start, end)
            } else {
                a.entity.clone()
            };
            Some(DecodedEntity {
                label: a.label.clone(),
                start,
                end,
                text,
            })
        })
        .collect()
}

/// Ground-truth events as `(role label, argument text)` lists, trigger first.
pub fn event_targets(example: &EventExample) -> Vec<Vec<(String, String)>> {
    example
        .event_list
        .iter()
        .map(|e| {
            let mut event = vec![(event_role_label(&e.event_type, TRIGGER_ROLE), e.trigger.clone())];
            event.extend(
                e.arguments
                    .iter()
                    .map(|a| (event_role_label(&e.event_type, &a.role), a.argument.clone())),
            );
            event
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Converts examples into [`Feature`]s with a shared tokenizer.
pub struct FeatureConverter<'a, T: TextTokenizer + ?Sized> {
    tokenizer: &'a T,
    config: FeatureConfig,
}

impl<'a, T: TextTokenizer + ?Sized> FeatureConverter<'a, T> {
    pub fn new(tokenizer: &'a T, config: FeatureConfig) -> Self {
        Self { tokenizer, config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Spaces become `-` for Chinese text; char count is unchanged.
    fn prepare<'t>(&self, text: &'t str) -> std::borrow::Cow<'t, str> {
        if self.config.is_chinese && text.contains(' ') {
            text.replace(' ', "-").into()
        } else {
            text.into()
        }
    }

    fn tokenize(&self, text: &str) -> Result<TokenizedText> {
        let tokenized = self.tokenizer.tokenize(&self.prepare(text))?;
        Ok(self.truncate(tokenized))
    }

    fn tokenize_pair(&self, first: &str, second: &str) -> Result<TokenizedText> {
        let tokenized = self
            .tokenizer
            .tokenize_pair(&self.prepare(first), &self.prepare(second))?;
        Ok(self.truncate(tokenized))
    }

    /// Cut encodings the tokenizer left longer than `max_length`.
    fn truncate(&self, mut tokenized: TokenizedText) -> TokenizedText {
        let max = self.config.max_length;
        if tokenized.len() <= max {
            return tokenized;
        }
        debug!("Truncating {} tokens to {}", tokenized.len(), max);
        tokenized.input_ids.truncate(max);
        tokenized.attention_mask.truncate(max);
        tokenized.token_type_ids.truncate(max);
        let bias = tokenized.offset_mapping.bias();
        let mut offsets = tokenized.offset_mapping.offsets().to_vec();
        offsets.truncate(max);
        tokenized.offset_mapping = OffsetMapping::with_bias(offsets, bias);
        tokenized
    }

    /// Token span of the inclusive char range `[start, end]`.
    fn token_span(mapping: &OffsetMapping, start: usize, end: usize) -> Option<(usize, usize)> {
        Some((mapping.char_to_token(start)?, mapping.char_to_token(end)?))
    }

    pub fn ner(&self, example: &NerExample, labels: &LabelSpace, split: Split) -> Result<Feature<Vec<Span>>> {
        let tokenized = self.tokenize(&example.text)?;
        if !split.is_train() {
            return Ok(Feature::new(tokenized, &example.text, None));
        }

        let mut spans = Vec::with_capacity(example.entities.len());
        for a in &example.entities {
            let label_id = labels.require_id(&a.label)?;
            let span = if self.config.with_indices {
                a.indices
                    .as_ref()
                    .and_then(|ix| Some((*ix.first()?, *ix.last()?)))
            } else {
                a.end_offset
                    .checked_sub(1)
                    .and_then(|last| Self::token_span(&tokenized.offset_mapping, a.start_offset, last))
            };
            match span {
                Some((start, end)) => spans.push(Span::new(label_id, start, end)),
                None => debug!("Dropped unmappable entity {:?} at {}", a.entity, a.start_offset),
            }
        }
        Ok(Feature::new(tokenized, &example.text, Some(spans)))
    }

    pub fn relation(
        &self,
        example: &RelationExample,
        predicates: &LabelSpace,
        split: Split,
    ) -> Result<Feature<Vec<RelationTriple>>> {
        let tokenized = self.tokenize(&example.text)?;
        if !split.is_train() {
            return Ok(Feature::new(tokenized, &example.text, None));
        }

        let mapping = &tokenized.offset_mapping;
        let locate = |start: usize, mention: &str| {
            let last = start + mention.chars().count().max(1) - 1;
            Self::token_span(mapping, start, last)
        };
        let mut triples = Vec::with_capacity(example.spo_list.len());
        for spo in &example.spo_list {
            let predicate = predicates.require_id(&spo.predicate)?;
            match (
                locate(spo.subject_start_index, &spo.subject),
                locate(spo.object_start_index, &spo.object),
            ) {
                (Some((sh, st)), Some((oh, ot))) => triples.push(RelationTriple::new(sh, st, predicate, oh, ot)),
                _ => debug!("Dropped unmappable triple ({}, {}, {})", spo.subject, spo.predicate, spo.object),
            }
        }
        Ok(Feature::new(tokenized, &example.text, Some(triples)))
    }

    pub fn event(&self, example: &EventExample, roles: &LabelSpace, split: Split) -> Result<Feature<Vec<EventRecord>>> {
        let tokenized = self.tokenize(&example.text)?;
        if !split.is_train() {
            return Ok(Feature::new(tokenized, &example.text, None));
        }

        let mapping = &tokenized.offset_mapping;
        let mut events = Vec::with_capacity(example.event_list.len());
        let mut dropped = 0;
        for e in &example.event_list {
            let mentions = std::iter::once((TRIGGER_ROLE, e.trigger.as_str(), e.trigger_start_index)).chain(
                e.arguments
                    .iter()
                    .map(|a| (a.role.as_str(), a.argument.as_str(), a.argument_start_index)),
            );
            let mut arguments = Vec::new();
            for (role, mention, start) in mentions {
                let role = roles.require_id(&event_role_label(&e.event_type, role))?;
                let last = start + mention.chars().count().max(1) - 1;
                match Self::token_span(mapping, start, last) {
                    Some((start, end)) => arguments.push(EventArgument { role, start, end }),
                    None => dropped += 1,
                }
            }
            events.push(EventRecord::new(arguments));
        }
        if dropped > 0 {
            debug!("Dropped {} unmappable event arguments", dropped);
        }
        Ok(Feature::new(tokenized, &example.text, Some(events)))
    }

    /// Paired `(prompt, content)` encoding; answers are located in the content.
    pub fn prompt(&self, example: &PromptExample, split: Split) -> Result<Feature<PointerLabels>> {
        let tokenized = self.tokenize_pair(&example.prompt, &example.content)?;
        if !split.is_train() {
            return Ok(Feature::new(tokenized, &example.content, None));
        }

        let mapping = &tokenized.offset_mapping;
        let bias = mapping.bias();
        let mut labels = PointerLabels::default();
        for r in &example.result_list {
            let span = r
                .end
                .checked_sub(1)
                .and_then(|last| Self::token_span(mapping, r.start + bias, last + bias));
            match span {
                Some((start, end)) => {
                    labels.starts.push(start);
                    labels.ends.push(end);
                }
                None => debug!("Dropped unmappable answer {:?} for prompt {:?}", r.text, example.prompt),
            }
        }
        Ok(Feature::new(tokenized, &example.content, Some(labels)))
    }

    pub fn classification(
        &self,
        example: &ClassificationExample,
        labels: &LabelSpace,
        split: Split,
    ) -> Result<Feature<usize>> {
        let tokenized = match &example.text_pair {
            Some(pair) => self.tokenize_pair(&example.text, pair)?,
            None => self.tokenize(&example.text)?,
        };
        let label = if split.is_train() {
            Some(labels.require_id(&example.label)?)
        } else {
            None
        };
        Ok(Feature::new(tokenized, &example.text, label))
    }

    /// Convert a whole dataset split.
    /// Uses parallel processing for more than 10 examples.
    pub fn convert_all<E, L, F>(&self, examples: &[E], convert: F) -> Result<Vec<Feature<L>>>
    where
        E: Sync,
        L: Send,
        F: Fn(&Self, &E) -> Result<Feature<L>> + Sync,
    {
        #[cfg(feature = "parallel")]
        {
            if examples.len() > 10 {
                use rayon::prelude::*;
                return examples.par_iter().map(|e| convert(self, e)).collect();
            }
        }
        examples.iter().map(|e| convert(self, e)).collect()
    }
}
