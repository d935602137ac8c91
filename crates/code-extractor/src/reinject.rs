// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Reinjection engine
//!
//! Takes the history of an extracted repository and splices the commits made
//! since the extraction back on top of the original (target) repository.
//!
//! The engine moves through a fixed sequence of stages:
//!
//! 1. [`Stage::Pruned`]: isolate the extraction paths, re-root them and run
//!    any configured extra commands.
//! 2. [`Stage::RemoteLinked`]: fetch the target branch.
//! 3. [`Stage::HistoryFiltered`]: drop commits the target already has and
//!    rewrite the boundary into a synthetic root commit.
//! 4. [`Stage::Rebased`]: replay what is left onto the target tip, merges
//!    included.
//! 5. [`Stage::Complete`]: point the source branch at the result.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use extractor_git::{CommitRecord, Identity, LogQuery, NewCommit, Oid, Plumbing};

use crate::config::{ExtractionConfig, ReinsertTarget};
use crate::detect::{self, Detection};
use crate::error::{ExtractError, Result};
use crate::filter::backup_ref;
use crate::pipeline::invoking_identity;
use crate::prune::PruneScript;
use crate::rewrite::{RewriteMap, Rewriter, Subtree, oid};
use crate::transfer_tag::TransferTag;

/// Name of the remote pointing at the target repository
pub const TARGET_REMOTE: &str = "target";

/// Progress of a reinjection run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Nothing done yet
    NotStarted,
    /// Extraction paths isolated and extra commands run
    Pruned,
    /// Target branch fetched
    RemoteLinked,
    /// Already transferred commits removed
    HistoryFiltered,
    /// Remaining commits replayed onto the target
    Rebased,
    /// Source branch updated
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::NotStarted => "not started",
            Stage::Pruned => "pruned",
            Stage::RemoteLinked => "remote linked",
            Stage::HistoryFiltered => "history filtered",
            Stage::Rebased => "rebased",
            Stage::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// What is about to be spliced onto the target
#[derive(Debug, Clone)]
pub struct InjectionPlan {
    /// Most recent source commit already in the target
    pub boundary: Option<String>,
    /// Source commit rewritten as the synthetic root, if any
    pub root: Option<String>,
    /// Message of the synthetic root
    pub root_message: String,
    /// Tip of the target branch the history is replayed onto
    pub target_tip: Oid,
    /// Whether the boundary itself becomes the synthetic root
    pub regraft_boundary: bool,
}

/// Result of a reinjection run
#[derive(Debug, Clone)]
pub struct ReinjectOutcome {
    /// Last stage reached
    pub stage: Stage,
    /// The plan that was executed
    pub plan: InjectionPlan,
    /// Duplicate detection result
    pub detection: Detection,
    /// Number of commits written on top of the target tip
    pub commits_injected: usize,
    /// New tip of the source branch
    pub tip: Oid,
}

/// Paths of the two files written beside the working copy
#[must_use]
pub fn side_channel_paths(destination: &Path) -> (PathBuf, PathBuf) {
    let with_suffix = |suffix: &str| {
        let mut path = destination.as_os_str().to_owned();
        path.push(suffix);
        PathBuf::from(path)
    };
    (
        with_suffix(".reinsert_message"),
        with_suffix(".boundary_commit"),
    )
}

/// Message of the commit that re-grafts the extraction onto the target
#[must_use]
pub fn root_message(target_name: &str, boundary: &CommitRecord) -> String {
    format!(
        "Re-insert extractions from {target_name}\n\n{}\n\nOriginal-Author: {} {}\nOriginal-Committer: {} {}",
        TransferTag::strip(&boundary.message),
        boundary.author.name_and_email(),
        boundary.author.git_date(),
        boundary.committer.name_and_email(),
        boundary.committer.git_date(),
    )
}

/// Drives a reinjection through its stages
pub struct Reinjector<'a> {
    plumbing: &'a dyn Plumbing,
    config: &'a ExtractionConfig,
    target: &'a ReinsertTarget,
    identity: Identity,
    stage: Stage,
}

impl<'a> Reinjector<'a> {
    /// Create a reinjector for `config`
    ///
    /// # Errors
    ///
    /// Returns `ExtractError::MissingTarget` if the config has no target.
    pub fn new(plumbing: &'a dyn Plumbing, config: &'a ExtractionConfig) -> Result<Self> {
        let target = config.target.as_ref().ok_or(ExtractError::MissingTarget)?;
        Ok(Self {
            plumbing,
            config,
            target,
            identity: invoking_identity(plumbing),
            stage: Stage::NotStarted,
        })
    }

    /// Current stage
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, stage: Stage) {
        self.stage = stage;
        info!(stage = %stage, "Reinjection stage reached");
    }

    /// Run every stage
    ///
    /// # Errors
    ///
    /// Returns an error if any stage fails; replay conflicts surface as
    /// `GitError::MergeConflict` with the conflicting paths.
    pub fn run(&mut self) -> Result<ReinjectOutcome> {
        let branch = self.config.upstream_branch.clone();

        let origins = self.prune(&branch)?;
        self.advance(Stage::Pruned);

        let target_tip = self.link_remote()?;
        self.advance(Stage::RemoteLinked);

        let source = self.plumbing.log_query(&LogQuery::of(&branch))?;
        let target_ref = format!("refs/remotes/{TARGET_REMOTE}/{}", self.target.base_branch);
        let target = self.plumbing.log_query(&LogQuery::of(&target_ref))?;
        let detection = detect::detect(&source, &target, &origins, &self.config.upstream_name);

        let (plan, filtered) = self.filter_history(&source, &origins, &detection, target_tip)?;
        self.advance(Stage::HistoryFiltered);

        let (tip, commits_injected) = match filtered {
            Some((filtered_tip, map)) => self.replay(filtered_tip, &map, &source, &plan)?,
            None => {
                warn!(
                    branch = %branch,
                    "No new commits to re-inject; resetting to target tip"
                );
                (target_tip, 0)
            }
        };
        self.advance(Stage::Rebased);

        self.plumbing
            .reset_hard(&branch, tip, "code-extractor: reinsert")?;
        self.advance(Stage::Complete);
        info!(
            branch = %branch,
            tip = %tip,
            commits = commits_injected,
            "Re-injected history"
        );

        Ok(ReinjectOutcome {
            stage: self.stage,
            plan,
            detection,
            commits_injected,
            tip,
        })
    }

    /// Isolate the extraction paths and run the extra commands
    ///
    /// Returns the current id to original id map of the pruned history.
    fn prune(&self, branch: &str) -> Result<HashMap<String, String>> {
        let script = PruneScript::build(
            self.plumbing,
            branch,
            &self.config.extractions,
            Utc::now(),
        )?;
        let keep_dir = script.keep_dir().to_string();
        debug!(keep_dir = %keep_dir, ops = script.ops().len(), "Built prune script");

        let commits = self
            .plumbing
            .log_query(&LogQuery::of(branch).oldest_first())?;
        let moved = Rewriter::new(self.plumbing).with_tree(script).run(&commits)?;

        let source_tip = self.plumbing.resolve(branch)?;
        let empty = || ExtractError::EmptyHistory {
            branch: branch.to_string(),
        };
        let moved_tip = moved.mapped(source_tip).ok_or_else(empty)?;

        let moved_commits = self
            .plumbing
            .log_query(&LogQuery::of(&moved_tip.to_string()).oldest_first())?;
        let rerooted = Rewriter::new(self.plumbing)
            .with_tree(Subtree(keep_dir))
            .prune_empty(true)
            .run(&moved_commits)?;

        let pruned = moved.then(&rerooted);
        let pruned_tip = pruned.mapped(source_tip).ok_or_else(empty)?;

        backup_ref(self.plumbing, &format!("refs/heads/{branch}"))?;
        self.plumbing
            .reset_hard(branch, pruned_tip, "code-extractor: prune")?;
        info!(
            branch,
            commits = pruned.written(),
            tip = %pruned_tip,
            "Pruned history"
        );

        for command in &self.config.extra_cmds {
            info!(command = %command, "Running extra command");
            self.plumbing.run_shell(command)?;
        }

        Ok(pruned.origin_ids())
    }

    /// Point the `target` remote at the target repository and fetch it
    fn link_remote(&self) -> Result<Oid> {
        if self.plumbing.has_remote(TARGET_REMOTE) {
            debug!(remote = TARGET_REMOTE, "Replacing stale remote");
            self.plumbing.remove_remote(TARGET_REMOTE)?;
        }
        self.plumbing.set_remote(TARGET_REMOTE, &self.target.remote)?;

        let base = &self.target.base_branch;
        let refspec = format!("+refs/heads/{base}:refs/remotes/{TARGET_REMOTE}/{base}");
        self.plumbing.fetch(TARGET_REMOTE, &[refspec.as_str()])?;
        let tip = self
            .plumbing
            .resolve(&format!("refs/remotes/{TARGET_REMOTE}/{base}"))?;
        info!(remote = %self.target.remote, branch = %base, tip = %tip, "Fetched target");
        Ok(tip)
    }

    /// Remove transferred commits and rewrite the synthetic root
    ///
    /// Returns the plan and, when anything is left, the filtered tip with the
    /// rewrite map of the pass.
    fn filter_history(
        &self,
        source: &[CommitRecord],
        origins: &HashMap<String, String>,
        detection: &Detection,
        target_tip: Oid,
    ) -> Result<(InjectionPlan, Option<(Oid, RewriteMap)>)> {
        let regraft = detection.regraft_boundary();
        let root = match (&detection.boundary, regraft) {
            (Some(boundary), true) => source.iter().find(|c| &c.id == boundary),
            (Some(_), false) => None,
            (None, _) => source.iter().rev().find(|c| c.is_root()),
        };

        let root_message = match root {
            Some(record) => {
                let original = origins.get(&record.id).unwrap_or(&record.id);
                TransferTag::new(self.config.upstream_name.as_str(), original.as_str())
                    .append_to(&root_message(&self.target.name, record))
            }
            None => String::new(),
        };

        let (message_path, boundary_path) = side_channel_paths(&self.config.destination);
        fs::write(&message_path, &root_message)?;
        fs::write(
            &boundary_path,
            detection.boundary.as_deref().unwrap_or_default(),
        )?;
        debug!(
            message = %message_path.display(),
            boundary = %boundary_path.display(),
            "Wrote side-channel files"
        );

        let root_id = root.map(|c| c.id.clone());
        let mut skip: HashSet<String> = HashSet::new();
        if let Some(boundary) = &detection.boundary {
            let boundary = oid(boundary)?;
            for commit in source {
                if root_id.as_deref() == Some(commit.id.as_str()) {
                    continue;
                }
                if detection.is_transferred(&commit.id)
                    || self.plumbing.is_ancestor(oid(&commit.id)?, boundary)?
                {
                    skip.insert(commit.id.clone());
                }
            }
        }
        debug!(skipped = skip.len(), "Selected commits already in target");

        let plan = InjectionPlan {
            boundary: detection.boundary.clone(),
            root: root_id.clone(),
            root_message: root_message.clone(),
            target_tip,
            regraft_boundary: regraft && detection.boundary.is_some(),
        };

        let oldest_first: Vec<CommitRecord> = source.iter().rev().cloned().collect();
        let upstream_name = self.config.upstream_name.as_str();
        let identity = self.identity.clone();
        let map = Rewriter::new(self.plumbing)
            .with_skip(|c| skip.contains(&c.id))
            .with_edit(|original, draft| {
                if root_id.as_deref() == Some(original.id.as_str()) {
                    draft.message = root_message.clone();
                    draft.author = identity.clone();
                    draft.committer = identity.clone();
                } else {
                    let origin = origins.get(&original.id).unwrap_or(&original.id);
                    draft.message = TransferTag::new(upstream_name, origin.as_str())
                        .append_to(&original.message);
                }
            })
            .run(&oldest_first)?;

        let source_tip = match source.first() {
            Some(tip) => oid(&tip.id)?,
            None => return Ok((plan, None)),
        };
        Ok((plan, map.mapped(source_tip).map(|tip| (tip, map))))
    }

    /// Replay the filtered history onto the target tip
    ///
    /// Each commit's tree is the three-way merge of its own tree onto its
    /// rewritten first parent. Returns the new tip and the number of commits
    /// written.
    fn replay(
        &self,
        filtered_tip: Oid,
        filtered_map: &RewriteMap,
        source: &[CommitRecord],
        plan: &InjectionPlan,
    ) -> Result<(Oid, usize)> {
        let commits = self
            .plumbing
            .log_query(&LogQuery::of(&filtered_tip.to_string()).oldest_first())?;
        let by_id: HashMap<&str, &CommitRecord> =
            source.iter().map(|c| (c.id.as_str(), c)).collect();
        let empty_tree = self.plumbing.empty_tree()?;

        let mut replayed = RewriteMap::new();
        for commit in &commits {
            let old = oid(&commit.id)?;
            let origin = filtered_map.origin(old).map(|id| id.to_string());
            let is_root = origin.is_some() && origin == plan.root;

            let mut parents: Vec<Oid> = Vec::with_capacity(commit.parents.len().max(1));
            for parent in &commit.parents {
                if let Some(new) = replayed.mapped(oid(parent)?) {
                    if !parents.contains(&new) {
                        parents.push(new);
                    }
                }
            }
            if parents.is_empty() {
                parents.push(plan.target_tip);
            }

            let ancestor = match commit.parents.first() {
                Some(parent) => self.plumbing.tree_of(oid(parent)?)?,
                None if is_root => empty_tree,
                None => {
                    // parent was dropped as already transferred; diff against it
                    let previous = origin
                        .as_deref()
                        .and_then(|id| by_id.get(id))
                        .and_then(|c| c.parents.first());
                    match previous {
                        Some(parent) => self.plumbing.tree_of(oid(parent)?)?,
                        None => empty_tree,
                    }
                }
            };
            let ours = self.plumbing.tree_of(parents[0])?;
            let theirs = oid(&commit.tree)?;
            let tree = self
                .plumbing
                .merge_trees(ancestor, ours, theirs, &commit.id)?;

            if !is_root && parents.len() == 1 && !commit.is_merge() && tree == ours {
                debug!(commit = commit.short_id(), "Dropping commit emptied by replay");
                replayed.drop_commit(old, Some(parents[0]));
                continue;
            }

            let new = self.plumbing.create_commit(&NewCommit {
                tree,
                parents,
                author: commit.author.clone(),
                committer: commit.committer.clone(),
                message: commit.message.clone(),
            })?;
            debug!(commit = commit.short_id(), new = %new, "Replayed commit");
            replayed.record(old, new);
        }

        let tip = replayed.mapped(filtered_tip).unwrap_or(plan.target_tip);
        Ok((tip, replayed.written()))
    }
}
