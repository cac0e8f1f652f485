//! GPLinker for events: argument pointers plus pairwise head/tail links.
//!
//! Every `(role, start, end)` of an event is an argument, the trigger
//! included under the reserved trigger role. Two arguments of the same event
//! are linked through the unordered pair of their heads and the unordered
//! pair of their tails. Decoding rebuilds events as maximal cliques of linked
//! arguments within one event type.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use candle_core::Tensor;
use tracing::debug;

use crate::config::DecodeConfig;
use crate::labels::{split_event_role, LabelRegistry, LabelSpace, TRIGGER_ROLE};
use crate::schemes::{fits, is_valid_span, max_count, BatchLayout, DecodeBatch, SchemeCollator, SchemeDecoder, TargetTensors};
use crate::tensor::{above_threshold, expect_leading, DenseTarget, ScoreGrid};
use crate::types::{DecodedArgument, DecodedEvent, EventRecord, EventSet};
use crate::Result;

/// `argu (bs, roles, seq, seq)`, `head` and `tail (bs, 1, seq, seq)`.
#[derive(Debug, Clone)]
pub struct EventScores {
    pub argu: Tensor,
    pub head: Tensor,
    pub tail: Tensor,
}

#[derive(Debug, Clone)]
pub struct GpLinkerEvent {
    roles: LabelSpace,
    decode: DecodeConfig,
}

/// Sorted, deduplicated pointer sets of one example.
#[derive(Debug, Default)]
struct EventPointers {
    argu: Vec<BTreeSet<(usize, usize)>>,
    heads: BTreeSet<(usize, usize)>,
    tails: BTreeSet<(usize, usize)>,
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

impl GpLinkerEvent {
    /// Build from a registry prepared with `event_type + "+" + role` labels.
    pub fn new(registry: &LabelRegistry) -> Result<Self> {
        Ok(Self::from_space(registry.get()?.clone()))
    }

    pub fn from_space(roles: LabelSpace) -> Self {
        Self {
            roles,
            decode: DecodeConfig::default(),
        }
    }

    pub fn with_decode_config(mut self, decode: DecodeConfig) -> Self {
        self.decode = decode;
        self
    }

    pub fn roles(&self) -> &LabelSpace {
        &self.roles
    }

    fn pointers(&self, events: &[EventRecord], seq_len: usize) -> EventPointers {
        let mut out = EventPointers {
            argu: vec![BTreeSet::new(); self.roles.len()],
            ..Default::default()
        };
        let mut dropped = 0;
        for event in events {
            let arguments: Vec<_> = event
                .arguments
                .iter()
                .filter(|a| a.role < self.roles.len() && fits(a.start, a.end, seq_len))
                .collect();
            dropped += event.arguments.len() - arguments.len();
            for (i, a1) in arguments.iter().enumerate() {
                out.argu[a1.role].insert((a1.start, a1.end));
                for a2 in &arguments[i + 1..] {
                    out.heads.insert(ordered(a1.start, a2.start));
                    out.tails.insert(ordered(a1.end, a2.end));
                }
            }
        }
        if dropped > 0 {
            debug!("Dropped {} event arguments outside a {}-token sequence", dropped, seq_len);
        }
        out
    }
}

impl SchemeCollator for GpLinkerEvent {
    type Labels = Vec<EventRecord>;

    fn targets(&self, labels: &[&Vec<EventRecord>], layout: &BatchLayout<'_>) -> Result<TargetTensors> {
        let bs = labels.len();
        let pointers: Vec<EventPointers> = labels
            .iter()
            .zip(layout.lengths)
            .map(|(events, &length)| self.pointers(events, length))
            .collect();
        let max_argu = max_count(pointers.iter().flat_map(|p| p.argu.iter().map(BTreeSet::len)));
        let max_head = max_count(pointers.iter().map(|p| p.heads.len()));
        let max_tail = max_count(pointers.iter().map(|p| p.tails.len()));

        let mut argu = DenseTarget::<i64>::zeros(&[bs, self.roles.len(), max_argu, 2]);
        let mut head = DenseTarget::<i64>::zeros(&[bs, 1, max_head, 2]);
        let mut tail = DenseTarget::<i64>::zeros(&[bs, 1, max_tail, 2]);

        let put = |target: &mut DenseTarget<i64>, prefix: [usize; 2], pairs: &BTreeSet<(usize, usize)>| {
            for (slot, &(a, b)) in pairs.iter().enumerate() {
                target.set(&[prefix[0], prefix[1], slot, 0], a as i64);
                target.set(&[prefix[0], prefix[1], slot, 1], b as i64);
            }
        };
        for (b, p) in pointers.iter().enumerate() {
            for (role, spans) in p.argu.iter().enumerate() {
                put(&mut argu, [b, role], spans);
            }
            put(&mut head, [b, 0], &p.heads);
            put(&mut tail, [b, 0], &p.tails);
        }

        Ok(TargetTensors::new()
            .with("argu_labels", argu.into_tensor(layout.device)?)
            .with("head_labels", head.into_tensor(layout.device)?)
            .with("tail_labels", tail.into_tensor(layout.device)?))
    }
}

/// A decoded argument candidate; field order drives the sort order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate<'a> {
    event_type: &'a str,
    role: &'a str,
    head: usize,
    tail: usize,
}

type Links = HashSet<(usize, usize, usize, usize)>;

fn linked(a: &Candidate<'_>, b: &Candidate<'_>, links: &Links) -> bool {
    links.contains(&(a.head, a.tail, b.head, b.tail))
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, item: T) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// `host` plus every candidate linked to it, sorted.
fn neighbors<'a>(host: &Candidate<'a>, candidates: &[Candidate<'a>], links: &Links) -> Vec<Candidate<'a>> {
    let mut out = vec![host.clone()];
    out.extend(
        candidates
            .iter()
            .filter(|c| *c != host && linked(host, c, links))
            .cloned(),
    );
    out.sort();
    out
}

/// Maximal groups of pairwise-linked candidates.
///
/// Each unlinked pair splits the search into the neighbourhoods of its two
/// ends; a set with no unlinked pair is itself a clique.
fn clique_search<'a>(candidates: &[Candidate<'a>], links: &Links) -> Vec<Vec<Candidate<'a>>> {
    let mut splits = Vec::new();
    for (i, a) in candidates.iter().enumerate() {
        for b in &candidates[i + 1..] {
            if !linked(a, b, links) {
                push_unique(&mut splits, neighbors(a, candidates, links));
                push_unique(&mut splits, neighbors(b, candidates, links));
            }
        }
    }
    if splits.is_empty() {
        let mut clique = candidates.to_vec();
        clique.sort();
        return vec![clique];
    }
    let mut results = Vec::new();
    for split in &splits {
        for clique in clique_search(split, links) {
            push_unique(&mut results, clique);
        }
    }
    results
}

impl SchemeDecoder for GpLinkerEvent {
    type Scores = EventScores;
    type Output = EventSet;

    fn decode(&self, scores: &EventScores, batch: &DecodeBatch<'_>) -> Result<Vec<EventSet>> {
        let lengths = batch.lengths()?;
        let seq_len = batch.seq_len()?;
        let bs = batch.batch_size();
        let threshold = self.decode.threshold;
        expect_leading(&scores.argu, &[bs, self.roles.len(), seq_len, seq_len])?;
        expect_leading(&scores.head, &[bs, 1, seq_len, seq_len])?;
        expect_leading(&scores.tail, &[bs, 1, seq_len, seq_len])?;

        let mut candidates: Vec<BTreeSet<Candidate<'_>>> = vec![BTreeSet::new(); bs];
        for ix in above_threshold(&scores.argu, threshold)? {
            let (b, role, head, tail) = (ix[0], ix[1], ix[2], ix[3]);
            let Some(label) = self.roles.name(role) else { continue };
            if !is_valid_span(head, tail, lengths[b]) {
                continue;
            }
            let (event_type, role) = split_event_role(label);
            candidates[b].insert(Candidate {
                event_type,
                role,
                head,
                tail,
            });
        }

        let head_grid = ScoreGrid::from_tensor(&scores.head)?;
        let tail_grid = ScoreGrid::from_tensor(&scores.tail)?;
        let mut results = vec![EventSet::new(); bs];
        for (b, found) in candidates.iter().enumerate() {
            let found: Vec<&Candidate<'_>> = found.iter().collect();
            let mut links = Links::new();
            for (i, a) in found.iter().enumerate() {
                for c in &found[i + 1..] {
                    let (h1, h2) = ordered(a.head, c.head);
                    let (t1, t2) = ordered(a.tail, c.tail);
                    if head_grid.get(&[b, 0, h1, h2]) > threshold && tail_grid.get(&[b, 0, t1, t2]) > threshold {
                        links.insert((a.head, a.tail, c.head, c.tail));
                        links.insert((c.head, c.tail, a.head, a.tail));
                    }
                }
            }

            let mut by_type: BTreeMap<&str, Vec<Candidate<'_>>> = BTreeMap::new();
            for c in found {
                by_type.entry(c.event_type).or_default().push(c.clone());
            }
            for (event_type, group) in by_type {
                for clique in clique_search(&group, &links) {
                    if !clique.iter().any(|c| c.role == TRIGGER_ROLE) {
                        continue;
                    }
                    let arguments = clique
                        .iter()
                        .filter_map(|c| {
                            batch.text_span(b, c.head, c.tail).map(|span| DecodedArgument {
                                role: c.role.to_string(),
                                span,
                            })
                        })
                        .collect();
                    results[b].insert(DecodedEvent {
                        event_type: event_type.to_string(),
                        arguments,
                    });
                }
            }
        }
        Ok(results)
    }
}
