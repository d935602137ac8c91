// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Prune scripts
//!
//! A [`PruneScript`] relocates every path the extraction set ever occupied
//! into a private keep directory. Applied to each commit's tree it isolates
//! the extraction; re-rooting the keep directory afterwards (see
//! [`crate::rewrite::Subtree`]) makes the paths read as if they had always
//! lived at the top of the repository.

use std::collections::BTreeSet;

use bstr::{BString, ByteSlice};
use chrono::{DateTime, Utc};
use tracing::debug;

use extractor_git::tree::{normalize_path_bytes, parent_path, path_matches};
use extractor_git::{GitError, LogQuery, Plumbing, TreeSnapshot};

use crate::error::Result;
use crate::rewrite::TreeTransform;

/// Prefix of the keep directory; a UTC timestamp is appended per run
pub const KEEP_DIR_PREFIX: &str = ".code_extractor_keep_";

/// A single tree operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOp {
    /// Ensure a directory can exist at this path
    MakeDir(BString),
    /// Move a file or directory, if present
    Move {
        /// Current path
        from: BString,
        /// New path
        to: BString,
    },
}

/// Ordered operations relocating the extraction into a keep directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneScript {
    keep_dir: String,
    ops: Vec<PruneOp>,
}

/// Name of the keep directory for a run started at `now`
#[must_use]
pub fn keep_dir_name(now: DateTime<Utc>) -> String {
    format!("{KEEP_DIR_PREFIX}{}", now.format("%Y%m%d%H%M%S"))
}

fn in_keep_dir(keep_dir: &str, path: &[u8]) -> BString {
    let mut target = BString::from(keep_dir);
    target.push(b'/');
    target.extend_from_slice(path);
    target
}

impl PruneScript {
    /// Build a script moving `paths` under `keep_dir`
    ///
    /// Paths are normalized and deduplicated; paths nested under another path
    /// in the set are dropped since moving the outer path carries them along.
    #[must_use]
    pub fn from_paths<P: AsRef<[u8]>>(keep_dir: &str, paths: &[P]) -> Self {
        let sorted: BTreeSet<BString> = paths
            .iter()
            .map(|p| normalize_path_bytes(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();

        let mut outer: Vec<BString> = Vec::with_capacity(sorted.len());
        for path in sorted {
            if !outer.iter().any(|kept| path_matches(&path, kept)) {
                outer.push(path);
            }
        }

        let mut dirs: BTreeSet<BString> = BTreeSet::new();
        for path in &outer {
            let target = in_keep_dir(keep_dir, path);
            let mut dir = parent_path(&target);
            while let Some(d) = dir {
                if d.len() <= keep_dir.len() {
                    break;
                }
                dirs.insert(BString::from(d));
                dir = parent_path(d);
            }
        }

        let mut ops = vec![PruneOp::MakeDir(BString::from(keep_dir))];
        ops.extend(dirs.into_iter().map(PruneOp::MakeDir));
        ops.extend(outer.into_iter().map(|path| PruneOp::Move {
            to: in_keep_dir(keep_dir, &path),
            from: path,
        }));

        Self {
            keep_dir: keep_dir.to_string(),
            ops,
        }
    }

    /// Build a script for every path the extraction set occupied in the
    /// history of `tip`, following renames
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be walked.
    pub fn build(
        plumbing: &dyn Plumbing,
        tip: &str,
        extractions: &[String],
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let paths = historical_paths(plumbing, tip, extractions)?;
        Ok(Self::from_paths(&keep_dir_name(now), &paths))
    }

    /// The keep directory
    #[must_use]
    pub fn keep_dir(&self) -> &str {
        &self.keep_dir
    }

    /// The operations, in execution order
    #[must_use]
    pub fn ops(&self) -> &[PruneOp] {
        &self.ops
    }

    /// Apply every operation to a snapshot
    ///
    /// # Errors
    ///
    /// Returns `GitError::PathCollision` when a directory to create is
    /// occupied by a file, or a move would overwrite an entry.
    pub fn apply_to(&self, mut tree: TreeSnapshot) -> Result<TreeSnapshot> {
        for op in &self.ops {
            match op {
                PruneOp::MakeDir(dir) => {
                    let mut prefix = Some(dir.as_slice());
                    while let Some(p) = prefix {
                        if tree.is_file(p) {
                            return Err(GitError::PathCollision {
                                path: p.to_str_lossy().into_owned(),
                            }
                            .into());
                        }
                        prefix = parent_path(p);
                    }
                }
                PruneOp::Move { from, to } => {
                    tree.move_path(from, to)?;
                }
            }
        }
        Ok(tree)
    }
}

impl TreeTransform for PruneScript {
    fn apply(&self, tree: TreeSnapshot) -> Result<TreeSnapshot> {
        self.apply_to(tree)
    }
}

/// Every path the extraction set occupied in the history of `tip`
///
/// Walks newest to oldest; whenever a commit renamed a file into a tracked
/// path, the file's previous path is tracked from then on.
///
/// # Errors
///
/// Returns an error if the history cannot be walked.
pub fn historical_paths(
    plumbing: &dyn Plumbing,
    tip: &str,
    extractions: &[String],
) -> Result<Vec<BString>> {
    let mut tracked: BTreeSet<BString> = extractions
        .iter()
        .map(|p| normalize_path_bytes(p.as_bytes()))
        .filter(|p| !p.is_empty())
        .collect();

    for commit in plumbing.log_query(&LogQuery::of(tip))? {
        for (old, new) in plumbing.show_commit(&commit.id)?.renames {
            if tracked.iter().any(|prefix| path_matches(&new, prefix)) && tracked.insert(old.clone())
            {
                debug!(commit = commit.short_id(), from = %old, to = %new, "Following rename");
            }
        }
    }

    Ok(tracked.into_iter().collect())
}
