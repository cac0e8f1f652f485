//! Label spaces and their explicit two-phase preparation.
//!
//! A [`LabelRegistry`] starts empty and must be prepared from a dataset (or
//! an explicit label list) before any encoder or decoder is built from it.
//! Reading an unprepared registry is an error, never a silent recovery.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{CodecError, Result};

/// Role name reserved for event triggers.
pub const TRIGGER_ROLE: &str = "触发词";

/// Separator between event type and role in event role labels.
pub const ROLE_SEPARATOR: char = '+';

/// Build the namespaced role label `event_type + "+" + role`.
pub fn event_role_label(event_type: &str, role: &str) -> String {
    format!("{event_type}{ROLE_SEPARATOR}{role}")
}

/// Split a namespaced role label back into `(event_type, role)`.
pub fn split_event_role(label: &str) -> (&str, &str) {
    label.split_once(ROLE_SEPARATOR).unwrap_or((label, ""))
}

/// A sorted, deduplicated set of label names with dense ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelSpace {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelSpace {
    /// Build a label space; names are sorted and deduplicated so ids are stable.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        labels.sort();
        labels.dedup();
        let index = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i))
            .collect();
        Self { labels, index }
    }

    pub fn id(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn require_id(&self, label: &str) -> Result<usize> {
        self.id(label)
            .ok_or_else(|| CodecError::UnknownLabel(label.to_string()))
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.labels
    }

    /// `label -> id` map, as handed to model configs.
    pub fn label_to_id(&self) -> HashMap<String, usize> {
        self.index.clone()
    }
}

impl From<Vec<String>> for LabelSpace {
    fn from(labels: Vec<String>) -> Self {
        Self::from_labels(labels)
    }
}

impl From<LabelSpace> for Vec<String> {
    fn from(space: LabelSpace) -> Self {
        space.labels
    }
}

/// Holder of a label space that has to be prepared before use.
#[derive(Debug, Clone, Default)]
pub struct LabelRegistry {
    space: Option<LabelSpace>,
}

impl LabelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare the label space from label names collected from a dataset.
    pub fn prepare<I, S>(&mut self, labels: I) -> &LabelSpace
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let space = LabelSpace::from_labels(labels);
        info!("Prepared label space with {} labels", space.len());
        self.space.insert(space)
    }

    /// Prepare from an already-built space.
    pub fn prepare_with(&mut self, space: LabelSpace) -> &LabelSpace {
        info!("Prepared label space with {} labels", space.len());
        self.space.insert(space)
    }

    pub fn is_prepared(&self) -> bool {
        self.space.is_some()
    }

    /// The prepared space; fails with [`CodecError::LabelsNotPrepared`] otherwise.
    pub fn get(&self) -> Result<&LabelSpace> {
        self.space.as_ref().ok_or(CodecError::LabelsNotPrepared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_space_is_sorted_and_deduplicated() {
        let space = LabelSpace::from_labels(["PER", "LOC", "PER", "ORG"]);
        assert_eq!(space.names(), &["LOC", "ORG", "PER"]);
        assert_eq!(space.id("ORG"), Some(1));
        assert_eq!(space.name(2), Some("PER"));
        assert!(space.require_id("MISC").is_err());
    }

    #[test]
    fn test_unprepared_registry_is_an_error() {
        let mut registry = LabelRegistry::new();
        assert!(matches!(registry.get(), Err(CodecError::LabelsNotPrepared)));

        registry.prepare(vec!["b".to_string(), "a".to_string()]);
        assert_eq!(registry.get().unwrap().id("a"), Some(0));
    }

    #[test]
    fn test_event_role_labels() {
        let label = event_role_label("地震", TRIGGER_ROLE);
        assert_eq!(label, "地震+触发词");
        assert_eq!(split_event_role(&label), ("地震", TRIGGER_ROLE));
    }

    #[test]
    fn test_label_space_serde_as_list() {
        let space = LabelSpace::from_labels(["b", "a"]);
        let json = serde_json::to_string(&space).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
        let back: LabelSpace = serde_json::from_str(&json).unwrap();
        assert_eq!(back, space);
    }
}
