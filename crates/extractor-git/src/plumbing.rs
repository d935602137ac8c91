// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! The typed version-control interface consumed by the extraction core
//!
//! Everything the extraction and reinjection logic needs from a repository is
//! expressed through [`Plumbing`]. [`crate::GitRepo`] implements it on top of
//! `git2`; tests may substitute their own implementation.

use std::path::Path;

use bstr::BString;
use git2::Oid;

use crate::commit::{CommitDetails, CommitRecord, Identity};
use crate::error::Result;
use crate::tree::TreeSnapshot;

/// Options for listing commits reachable from a reference
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    /// Start from this reference (defaults to HEAD)
    pub from_ref: Option<String>,
    /// Return oldest commits first (parents before children)
    pub reverse: bool,
}

impl LogQuery {
    /// Query the history of a single reference, newest first
    #[must_use]
    pub fn of(reference: &str) -> Self {
        Self {
            from_ref: Some(reference.to_string()),
            ..Default::default()
        }
    }

    /// Return parents before children
    #[must_use]
    pub fn oldest_first(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// A commit to be written to the object database
#[derive(Debug, Clone)]
pub struct NewCommit {
    /// Tree id of the commit
    pub tree: Oid,
    /// Parent ids, in order
    pub parents: Vec<Oid>,
    /// Author identity
    pub author: Identity,
    /// Committer identity
    pub committer: Identity,
    /// Full message
    pub message: String,
}

/// Version-control operations used by extraction and reinjection
pub trait Plumbing {
    /// Working directory of the repository
    fn workdir(&self) -> Result<&Path>;

    /// Resolve a branch, tag or id to a commit id
    fn resolve(&self, reference: &str) -> Result<Oid>;

    /// Whether a local branch exists
    fn branch_exists(&self, name: &str) -> bool;

    /// Create a local branch at `start` (defaults to HEAD), returning its tip
    fn create_branch(&self, name: &str, start: Option<&str>) -> Result<Oid>;

    /// Delete a local branch
    fn delete_branch(&self, name: &str) -> Result<()>;

    /// Point HEAD at a local branch and force the working tree to match it
    fn checkout(&self, branch: &str) -> Result<()>;

    /// Move a local branch to `tip`, check it out and force the working tree to match
    fn reset_hard(&self, branch: &str, tip: Oid, log_message: &str) -> Result<()>;

    /// Point a full reference name at `tip`, or delete it when `tip` is `None`
    fn update_ref(&self, reference: &str, tip: Option<Oid>, log_message: &str) -> Result<()>;

    /// Whether a remote with this name is configured
    fn has_remote(&self, name: &str) -> bool;

    /// Add a remote, replacing the URL when the remote already exists
    fn set_remote(&self, name: &str, url: &str) -> Result<()>;

    /// Remove a remote and its tracking branches
    fn remove_remote(&self, name: &str) -> Result<()>;

    /// Fetch refspecs from a remote without following tags
    fn fetch(&self, remote: &str, refspecs: &[&str]) -> Result<()>;

    /// Replay `branch` onto `upstream`, returning the new tip
    fn rebase(&self, branch: &str, upstream: &str) -> Result<Oid>;

    /// All tag names
    fn tags(&self) -> Result<Vec<String>>;

    /// Delete a tag
    fn delete_tag(&self, name: &str) -> Result<()>;

    /// List commits according to the query
    fn log_query(&self, query: &LogQuery) -> Result<Vec<CommitRecord>>;

    /// A single commit with the paths it changed and the renames it records
    fn show_commit(&self, reference: &str) -> Result<CommitDetails>;

    /// Whether `ancestor` is reachable from `descendant` (a commit is its own ancestor)
    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool>;

    /// Tree id of a commit
    fn tree_of(&self, commit: Oid) -> Result<Oid>;

    /// Write a tree holding only the entries of `commit` at or under `paths`
    fn reset_index_to_paths(&self, commit: Oid, paths: &[BString]) -> Result<Oid>;

    /// Read a tree as a flat snapshot
    fn read_tree(&self, tree: Oid) -> Result<TreeSnapshot>;

    /// Write a snapshot as a tree
    fn write_tree(&self, snapshot: &TreeSnapshot) -> Result<Oid>;

    /// Id of the empty tree
    fn empty_tree(&self) -> Result<Oid>;

    /// Three-way merge of trees; conflicts are reported as `GitError::MergeConflict`
    fn merge_trees(&self, ancestor: Oid, ours: Oid, theirs: Oid, label: &str) -> Result<Oid>;

    /// Write a commit object without moving any reference
    fn create_commit(&self, commit: &NewCommit) -> Result<Oid>;

    /// Identity of the invoking user, from repository configuration
    fn default_identity(&self) -> Result<Identity>;

    /// Run a shell command inside the working copy, returning its stdout
    fn run_shell(&self, command: &str) -> Result<String>;
}
