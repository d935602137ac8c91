// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Commit graph filter
//!
//! Rewrites a branch so that every commit holds only the extraction paths,
//! dropping commits that become empty and merges that become redundant.

use bstr::BString;
use tracing::{info, warn};

use extractor_git::{LogQuery, Oid, Plumbing};

use crate::error::Result;
use crate::rewrite::{RestrictPaths, RewriteMap, Rewriter};
use crate::transfer_tag::TransferTag;

/// Prefix under which rewritten refs keep their previous tip
pub const ORIGINAL_REFS: &str = "refs/original/";

/// Result of filtering a branch
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    /// The reference that was written
    pub output_ref: String,
    /// New tip, `None` when no commit touched the path set
    pub tip: Option<Oid>,
    /// Number of commits written
    pub commits_written: usize,
    /// Old to new commit ids
    pub map: RewriteMap,
    /// Where the previous tip of `output_ref` was saved, if it existed
    pub backup: Option<String>,
}

/// Save the current tip of `reference` under `refs/original/`
///
/// Returns the backup ref name when `reference` existed.
///
/// # Errors
///
/// Returns an error if the backup ref cannot be written.
pub fn backup_ref(plumbing: &dyn Plumbing, reference: &str) -> Result<Option<String>> {
    match plumbing.resolve(reference) {
        Ok(previous) => {
            let backup = format!("{ORIGINAL_REFS}{reference}");
            plumbing.update_ref(&backup, Some(previous), "code-extractor: backup")?;
            Ok(Some(backup))
        }
        Err(_) => Ok(None),
    }
}

/// Filter the history of `source` down to `paths`, writing it to `output_ref`
///
/// Every written commit is tagged with `upstream_name` and its original id.
///
/// # Errors
///
/// Returns an error if the history cannot be read or a commit written.
pub fn filter_branch(
    plumbing: &dyn Plumbing,
    source: &str,
    paths: &[String],
    output_ref: &str,
    upstream_name: &str,
) -> Result<FilterOutcome> {
    let commits = plumbing.log_query(&LogQuery::of(source).oldest_first())?;
    info!(
        source,
        commits = commits.len(),
        paths = ?paths,
        "Filtering history"
    );

    let map = Rewriter::new(plumbing)
        .with_tree(RestrictPaths(
            paths.iter().map(|p| BString::from(p.as_str())).collect(),
        ))
        .prune_empty(true)
        .simplify_merges(true)
        .with_edit(|original, draft| {
            draft.message = TransferTag::new(upstream_name, original.id.as_str())
                .append_to(&original.message);
        })
        .run(&commits)?;

    let source_tip = plumbing.resolve(source)?;
    let tip = map.mapped(source_tip);
    let backup = backup_ref(plumbing, output_ref)?;

    match tip {
        Some(tip) => plumbing.update_ref(output_ref, Some(tip), "code-extractor: filter")?,
        None => {
            warn!(
                source,
                paths = ?paths,
                "No commit touches the extraction paths; leaving {output_ref} absent"
            );
            if backup.is_some() {
                plumbing.update_ref(output_ref, None, "code-extractor: filter")?;
            }
        }
    }

    Ok(FilterOutcome {
        output_ref: output_ref.to_string(),
        tip,
        commits_written: map.written(),
        map,
        backup,
    })
}
