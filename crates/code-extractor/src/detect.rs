// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Duplicate commit detection
//!
//! Decides which source commits are already present in the target history
//! and which of them is the most recent (the boundary). Detection is pure:
//! it works on commit lists that the caller obtained from the plumbing.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use extractor_git::CommitRecord;

use crate::transfer_tag::TransferTag;

/// Which strategy produced the detection result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Transfer tags present in either history
    Tags,
    /// Author, subject and message comparison
    Fallback,
    /// Nothing matched
    None,
}

/// How a single source commit was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// A target commit carries a tag naming this source commit
    Tag,
    /// This source commit carries a tag naming a target commit
    Lineage,
    /// Same author and message as a target commit
    Message,
}

/// Outcome of duplicate detection
#[derive(Debug, Clone)]
pub struct Detection {
    /// Most recent transferred source commit
    pub boundary: Option<String>,
    /// How the boundary was matched
    pub boundary_kind: Option<MatchKind>,
    /// Strategy that produced the matches
    pub strategy: Strategy,
    /// Every transferred source commit (current ids)
    pub transferred: HashMap<String, MatchKind>,
    /// Ambiguities and other findings worth reporting
    pub warnings: Vec<String>,
}

impl Detection {
    /// Whether a source commit is already present in the target
    #[must_use]
    pub fn is_transferred(&self, id: &str) -> bool {
        self.transferred.contains_key(id)
    }

    /// Whether the boundary should be re-grafted as the synthetic root
    ///
    /// A boundary matched by a tag already present in the target has been
    /// grafted before and only serves as the replay base.
    #[must_use]
    pub fn regraft_boundary(&self) -> bool {
        self.boundary_kind != Some(MatchKind::Tag)
    }
}

fn message_key(message: &str) -> &str {
    TransferTag::strip(message)
}

/// Find the source commits already present in the target
///
/// `source` and `target` are newest first. `origins` maps the current id of a
/// rewritten source commit to the id it had before rewriting. `identity` is
/// the upstream identity carried by transfer tags.
#[must_use]
pub fn detect(
    source: &[CommitRecord],
    target: &[CommitRecord],
    origins: &HashMap<String, String>,
    identity: &str,
) -> Detection {
    let mut transferred = HashMap::new();
    let mut warnings = Vec::new();

    let tagged: HashSet<String> = target
        .iter()
        .filter_map(|c| TransferTag::find_for(&c.message, identity))
        .map(|tag| tag.commit)
        .collect();
    let target_ids: HashSet<&str> = target.iter().map(|c| c.id.as_str()).collect();

    for commit in source {
        let original = origins.get(&commit.id).unwrap_or(&commit.id);
        if tagged.contains(original) || tagged.contains(&commit.id) {
            transferred.insert(commit.id.clone(), MatchKind::Tag);
        } else if TransferTag::find_for(&commit.message, identity)
            .is_some_and(|tag| target_ids.contains(tag.commit.as_str()))
        {
            transferred.insert(commit.id.clone(), MatchKind::Lineage);
        }
    }

    let mut strategy = Strategy::Tags;
    if transferred.is_empty() {
        strategy = Strategy::Fallback;
        let mut by_subject: HashMap<&str, Vec<&CommitRecord>> = HashMap::new();
        for candidate in target {
            by_subject.entry(candidate.subject()).or_default().push(candidate);
        }

        for commit in source {
            let Some(candidates) = by_subject.get(commit.subject()) else {
                continue;
            };
            let matches: Vec<&&CommitRecord> = candidates
                .iter()
                .filter(|c| {
                    c.author.same_person(&commit.author)
                        && message_key(&c.message) == message_key(&commit.message)
                })
                .collect();
            if let Some(first) = matches.first() {
                if matches.len() > 1 {
                    let warning = format!(
                        "{} target commits match {} ({}); using {}",
                        matches.len(),
                        commit.short_id(),
                        commit.subject(),
                        first.short_id()
                    );
                    warn!("{warning}");
                    warnings.push(warning);
                }
                debug!(
                    source = commit.short_id(),
                    target = first.short_id(),
                    "Matched by message"
                );
                transferred.insert(commit.id.clone(), MatchKind::Message);
            }
        }
    }

    if transferred.is_empty() {
        strategy = Strategy::None;
        let warning =
            "No transferred commits found; treating entire history as new".to_string();
        warn!("{warning}");
        warnings.push(warning);
    }

    let boundary = source
        .iter()
        .find(|c| transferred.contains_key(&c.id))
        .map(|c| c.id.clone());
    let boundary_kind = boundary.as_ref().and_then(|id| transferred.get(id).copied());

    Detection {
        boundary,
        boundary_kind,
        strategy,
        transferred,
        warnings,
    }
}
