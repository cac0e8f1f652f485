//! Token-space annotations fed to the encoders and char-space results
//! recovered by the decoders.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A labelled token range, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub label_id: usize,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(label_id: usize, start: usize, end: usize) -> Self {
        Self { label_id, start, end }
    }

    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }
}

/// `(subject_head, subject_tail, predicate, object_head, object_tail)` in token indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationTriple {
    pub subject_head: usize,
    pub subject_tail: usize,
    pub predicate: usize,
    pub object_head: usize,
    pub object_tail: usize,
}

impl RelationTriple {
    pub fn new(sh: usize, st: usize, p: usize, oh: usize, ot: usize) -> Self {
        Self {
            subject_head: sh,
            subject_tail: st,
            predicate: p,
            object_head: oh,
            object_tail: ot,
        }
    }

    /// Largest token index the triple touches.
    pub fn max_position(&self) -> usize {
        self.subject_head
            .max(self.subject_tail)
            .max(self.object_head)
            .max(self.object_tail)
    }
}

/// One role-filling argument of an event, token indices inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventArgument {
    pub role: usize,
    pub start: usize,
    pub end: usize,
}

/// An event mention: the trigger first (paired with the trigger role), then the arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub arguments: Vec<EventArgument>,
}

impl EventRecord {
    pub fn new(arguments: Vec<EventArgument>) -> Self {
        Self { arguments }
    }

    pub fn trigger(&self) -> Option<&EventArgument> {
        self.arguments.first()
    }
}

/// A decoded entity: `(label, char_start, char_end, text)`, end exclusive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DecodedEntity {
    pub label: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Char range of a decoded argument or relation endpoint, end exclusive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// A decoded `(subject, predicate, object)` relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DecodedTriple {
    pub subject: TextSpan,
    pub predicate: String,
    pub object: TextSpan,
}

/// A decoded argument of an event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DecodedArgument {
    pub role: String,
    pub span: TextSpan,
}

/// A decoded event: its type and the arguments (trigger included) it groups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub event_type: String,
    pub arguments: BTreeSet<DecodedArgument>,
}

/// Deduplicating, order-independent decode results for one example.
pub type EntitySet = BTreeSet<DecodedEntity>;
pub type TripleSet = BTreeSet<DecodedTriple>;
pub type EventSet = BTreeSet<DecodedEvent>;

/// Slice `text` by char positions `[start, end)`, clamping to the text.
pub fn slice_chars(text: &str, start: usize, end: usize) -> String {
    if end <= start {
        return String::new();
    }
    text.chars().skip(start).take(end - start).collect()
}
