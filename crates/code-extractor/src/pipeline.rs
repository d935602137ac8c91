// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! The extraction pipeline
//!
//! One invocation acquires the working copy, syncs the source branch with
//! upstream, strips remotes and tags, and then either extracts the configured
//! paths or hands off to the [`Reinjector`].

use std::fmt;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use extractor_git::{GitRepo, Identity, NewCommit, Plumbing};

use crate::config::ExtractionConfig;
use crate::detect::Strategy;
use crate::error::{ExtractError, Result};
use crate::filter::{ORIGINAL_REFS, filter_branch};
use crate::reinject::{Reinjector, Stage};

/// Name given to the remote the working copy was cloned from
pub const UPSTREAM_REMOTE: &str = "upstream";

/// Summary of a reinjection run
#[derive(Debug, Clone, Serialize)]
pub struct ReinsertReport {
    /// Last stage reached
    pub stage: Stage,
    /// Most recent source commit already in the target
    pub boundary: Option<String>,
    /// Detection strategy that found the boundary
    pub strategy: Strategy,
    /// Source commit rewritten as the synthetic root
    pub regrafted_root: Option<String>,
    /// Tip of the target branch the history was replayed onto
    pub target_tip: String,
    /// Commits written on top of the target tip
    pub commits_injected: usize,
}

/// Summary of a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Extraction name
    pub name: String,
    /// Working copy
    pub destination: PathBuf,
    /// Whether the working copy was cloned by this run
    pub cloned: bool,
    /// Branch holding the extracted (or re-injected) history
    pub source_branch: String,
    /// Branch with the extraction paths removed, for plain extractions
    pub extract_branch: Option<String>,
    /// Final tip of the source branch
    pub source_tip: Option<String>,
    /// Commits written by the history rewrite
    pub commits_written: usize,
    /// Tags deleted from the working copy
    pub tags_removed: Vec<String>,
    /// Reinjection details when `reinsert` was requested
    pub reinsert: Option<ReinsertReport>,
    /// Warnings raised along the way
    pub warnings: Vec<String>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Extraction: {}", self.name)?;
        writeln!(f, "Destination: {}", self.destination.display())?;
        writeln!(
            f,
            "Branch {}: {}",
            self.source_branch,
            self.source_tip.as_deref().unwrap_or("(empty)")
        )?;
        if let Some(branch) = &self.extract_branch {
            writeln!(f, "Extract branch: {branch}")?;
        }
        writeln!(f, "Commits written: {}", self.commits_written)?;
        if let Some(reinsert) = &self.reinsert {
            writeln!(
                f,
                "Re-injected {} commit(s) onto {} (boundary: {})",
                reinsert.commits_injected,
                reinsert.target_tip,
                reinsert.boundary.as_deref().unwrap_or("none")
            )?;
        }
        for warning in &self.warnings {
            writeln!(f, "warning: {warning}")?;
        }
        Ok(())
    }
}

/// Identity of the user running the tool, for commits it authors
///
/// Falls back to a fixed identity when the repository has none configured.
pub fn invoking_identity(plumbing: &dyn Plumbing) -> Identity {
    match plumbing.default_identity() {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "No user identity configured; committing as code-extractor");
            Identity {
                name: "code-extractor".to_string(),
                email: "code-extractor@localhost".to_string(),
                timestamp: Utc::now(),
                offset_minutes: 0,
            }
        }
    }
}

/// Run the pipeline for `config`
///
/// # Errors
///
/// Returns `ExtractError::NotARepository` if the destination exists but holds
/// no repository, or any error raised by the git engine.
pub fn run(config: &ExtractionConfig) -> Result<RunReport> {
    let destination = &config.destination;
    let (repo, cloned) = if destination.exists() {
        if !GitRepo::is_repository(destination) {
            return Err(ExtractError::NotARepository {
                path: destination.display().to_string(),
            });
        }
        debug!(destination = %destination.display(), "Reusing working copy");
        (GitRepo::open(destination)?, false)
    } else {
        info!(
            upstream = %config.upstream,
            destination = %destination.display(),
            "Cloning…"
        );
        (
            GitRepo::clone_from(&config.upstream, destination, UPSTREAM_REMOTE)?,
            true,
        )
    };

    let mut report = run_in(&repo, config)?;
    report.cloned = cloned;
    Ok(report)
}

/// Run the pipeline against an already acquired working copy
///
/// # Errors
///
/// Returns any error raised by the git engine.
pub fn run_in(plumbing: &dyn Plumbing, config: &ExtractionConfig) -> Result<RunReport> {
    sync_source(plumbing, config)?;
    let tags_removed = sanitize(plumbing, config)?;

    let mut report = RunReport {
        name: config.name.clone(),
        destination: config.destination.clone(),
        cloned: false,
        source_branch: config.upstream_branch.clone(),
        extract_branch: None,
        source_tip: None,
        commits_written: 0,
        tags_removed,
        reinsert: None,
        warnings: Vec::new(),
    };

    if config.is_reinsert() {
        let mut reinjector = Reinjector::new(plumbing, config)?;
        let outcome = reinjector.run()?;
        report.source_tip = Some(outcome.tip.to_string());
        report.commits_written = outcome.commits_injected;
        report.warnings.extend(outcome.detection.warnings.iter().cloned());
        report.reinsert = Some(ReinsertReport {
            stage: outcome.stage,
            boundary: outcome.plan.boundary.clone(),
            strategy: outcome.detection.strategy,
            regrafted_root: outcome.plan.root.clone(),
            target_tip: outcome.plan.target_tip.to_string(),
            commits_injected: outcome.commits_injected,
        });
    } else {
        let extract_branch = extract(plumbing, config)?;
        let outcome = filter_branch(
            plumbing,
            &config.upstream_branch,
            &config.extractions,
            &format!("refs/heads/{}", config.upstream_branch),
            &config.upstream_name,
        )?;
        if outcome.tip.is_none() {
            report.warnings.push(format!(
                "No commit on {} touches {}",
                config.upstream_branch,
                config.extractions.join(", ")
            ));
        }
        report.extract_branch = Some(extract_branch);
        report.source_tip = outcome.tip.map(|tip| tip.to_string());
        report.commits_written = outcome.commits_written;
    }

    info!(
        name = %report.name,
        commits = report.commits_written,
        "Extraction finished"
    );
    Ok(report)
}

/// Check out the source branch and bring it up to date with upstream
fn sync_source(plumbing: &dyn Plumbing, config: &ExtractionConfig) -> Result<()> {
    let branch = config.upstream_branch.as_str();
    let upstream_ref = format!("{UPSTREAM_REMOTE}/{branch}");

    plumbing.set_remote(UPSTREAM_REMOTE, &config.upstream)?;
    plumbing.fetch(UPSTREAM_REMOTE, &[])?;

    let backup = format!("{ORIGINAL_REFS}refs/heads/{branch}");
    if !plumbing.branch_exists(branch) {
        plumbing.create_branch(branch, Some(&upstream_ref))?;
    } else if plumbing.resolve(&backup).is_ok() {
        // rewritten by an earlier run; start over from upstream
        let upstream_tip = plumbing.resolve(&upstream_ref)?;
        debug!(branch, tip = %upstream_tip, "Resetting previously rewritten branch");
        plumbing.reset_hard(branch, upstream_tip, "code-extractor: reset to upstream")?;
        plumbing.update_ref(&backup, None, "code-extractor: drop backup")?;
    }

    plumbing.checkout(branch)?;
    let tip = plumbing.rebase(branch, &upstream_ref)?;
    info!(branch, tip = %tip, "Synced with upstream");
    Ok(())
}

/// Delete the stale extract branch, the upstream remote and every tag
fn sanitize(plumbing: &dyn Plumbing, config: &ExtractionConfig) -> Result<Vec<String>> {
    let extract_branch = config.extract_branch();
    if plumbing.branch_exists(&extract_branch) {
        debug!(branch = %extract_branch, "Deleting stale extract branch");
        plumbing.delete_branch(&extract_branch)?;
    }

    plumbing.remove_remote(UPSTREAM_REMOTE)?;

    let tags = plumbing.tags()?;
    for tag in &tags {
        info!("Removing tag {tag}");
        plumbing.delete_tag(tag)?;
    }
    Ok(tags)
}

/// Create the extract branch: the source tip minus the extraction paths
fn extract(plumbing: &dyn Plumbing, config: &ExtractionConfig) -> Result<String> {
    let branch = config.extract_branch();
    info!(branch = %branch, "Extracting Branch…");

    let head = plumbing.create_branch(&branch, None)?;
    plumbing.checkout(&branch)?;

    let remaining = plumbing
        .read_tree(plumbing.tree_of(head)?)?
        .without(&config.extractions);
    let tree = plumbing.write_tree(&remaining)?;
    let identity = invoking_identity(plumbing);
    let commit = plumbing.create_commit(&NewCommit {
        tree,
        parents: vec![head],
        author: identity.clone(),
        committer: identity,
        message: format!("Extract {}\n", config.name),
    })?;
    plumbing.reset_hard(&branch, commit, "code-extractor: extract")?;
    debug!(branch = %branch, commit = %commit, "Committed extraction");
    Ok(branch)
}
