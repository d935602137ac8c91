// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! `git2` implementation of the plumbing interface
//!
//! [`GitRepo`] wraps a `git2::Repository` that has a working copy and exposes
//! the operations extraction needs: cloning, branch and remote management,
//! history listing, tree snapshots, three-way tree merges and commit writing.

use std::path::Path;
use std::process::Command;

use bstr::BString;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    AutotagOption, BranchType, Delta, DiffFindOptions, ErrorCode, FetchOptions, Index, Oid,
    Repository, Sort,
};
use tracing::{debug, info};

use crate::commit::{CommitDetails, CommitRecord, Identity};
use crate::error::{GitError, Result};
use crate::plumbing::{LogQuery, NewCommit, Plumbing};
use crate::tree::TreeSnapshot;

/// A git repository with a working copy
pub struct GitRepo {
    repo: Repository,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl GitRepo {
    /// Open a git repository at the given path
    ///
    /// # Errors
    ///
    /// Returns `GitError::RepositoryNotFound` if the path is not a git repository.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|_| GitError::RepositoryNotFound {
            path: path.display().to_string(),
        })?;
        Ok(Self { repo })
    }

    /// Whether `path` holds a git repository
    #[must_use]
    pub fn is_repository(path: impl AsRef<Path>) -> bool {
        Repository::open(path.as_ref()).is_ok()
    }

    /// Clone `url` into `dest`, naming the remote `remote_name`
    ///
    /// # Errors
    ///
    /// Returns `GitError::Git2` if the clone fails.
    pub fn clone_from(url: &str, dest: impl AsRef<Path>, remote_name: &str) -> Result<Self> {
        let dest = dest.as_ref();
        info!(url, dest = %dest.display(), remote = remote_name, "Cloning repository");
        let remote_name = remote_name.to_string();
        let repo = RepoBuilder::new()
            .remote_create(move |repo, _name, url| repo.remote(&remote_name, url))
            .clone(url, dest)?;
        Ok(Self { repo })
    }

    /// The wrapped `git2` repository
    #[must_use]
    pub fn inner(&self) -> &Repository {
        &self.repo
    }

    /// Force the working tree and index to `commit`, using HEAD as the baseline
    fn checkout_commit(&self, commit: &git2::Commit<'_>) -> Result<()> {
        let mut opts = CheckoutBuilder::new();
        opts.force();
        self.repo.checkout_tree(commit.as_object(), Some(&mut opts))?;
        Ok(())
    }
}

fn conflict_paths(index: &Index) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    for conflict in index.conflicts()? {
        let conflict = conflict?;
        if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
            paths.push(String::from_utf8_lossy(&entry.path).into_owned());
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

impl Plumbing for GitRepo {
    fn workdir(&self) -> Result<&Path> {
        self.repo.workdir().ok_or_else(|| GitError::RepositoryNotFound {
            path: self.repo.path().display().to_string(),
        })
    }

    fn resolve(&self, reference: &str) -> Result<Oid> {
        let invalid = || GitError::InvalidReference {
            reference: reference.to_string(),
        };
        let object = self.repo.revparse_single(reference).map_err(|_| invalid())?;
        let commit = object.peel_to_commit().map_err(|_| invalid())?;
        Ok(commit.id())
    }

    fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    fn create_branch(&self, name: &str, start: Option<&str>) -> Result<Oid> {
        let commit = match start {
            Some(reference) => self.repo.find_commit(self.resolve(reference)?)?,
            None => self.repo.head()?.peel_to_commit()?,
        };
        self.repo.branch(name, &commit, false)?;
        debug!(branch = name, tip = %commit.id(), "Created branch");
        Ok(commit.id())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.repo.find_branch(name, BranchType::Local)?.delete()?;
        debug!(branch = name, "Deleted branch");
        Ok(())
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        let reference = format!("refs/heads/{branch}");
        let commit = self.repo.find_reference(&reference)?.peel_to_commit()?;
        self.checkout_commit(&commit)?;
        self.repo.set_head(&reference)?;
        debug!(branch, "Checked out branch");
        Ok(())
    }

    fn reset_hard(&self, branch: &str, tip: Oid, log_message: &str) -> Result<()> {
        let commit = self.repo.find_commit(tip)?;
        self.checkout_commit(&commit)?;
        let reference = format!("refs/heads/{branch}");
        self.repo.reference(&reference, tip, true, log_message)?;
        self.repo.set_head(&reference)?;
        debug!(branch, tip = %tip, "Reset branch");
        Ok(())
    }

    fn update_ref(&self, reference: &str, tip: Option<Oid>, log_message: &str) -> Result<()> {
        match tip {
            Some(id) => {
                self.repo.reference(reference, id, true, log_message)?;
            }
            None => {
                if let Ok(mut existing) = self.repo.find_reference(reference) {
                    existing.delete()?;
                }
            }
        }
        Ok(())
    }

    fn has_remote(&self, name: &str) -> bool {
        self.repo.find_remote(name).is_ok()
    }

    fn set_remote(&self, name: &str, url: &str) -> Result<()> {
        if self.has_remote(name) {
            self.repo.remote_set_url(name, url)?;
        } else {
            self.repo.remote(name, url)?;
        }
        Ok(())
    }

    fn remove_remote(&self, name: &str) -> Result<()> {
        self.repo.remote_delete(name)?;
        Ok(())
    }

    fn fetch(&self, remote: &str, refspecs: &[&str]) -> Result<()> {
        let mut remote = self.repo.find_remote(remote)?;
        let mut opts = FetchOptions::new();
        opts.download_tags(AutotagOption::None);
        remote.fetch(refspecs, Some(&mut opts), None)?;
        Ok(())
    }

    fn rebase(&self, branch: &str, upstream: &str) -> Result<Oid> {
        let tip = self.resolve(branch)?;
        let onto = self.resolve(upstream)?;
        if self.is_ancestor(onto, tip)? {
            debug!(branch, upstream, "Branch already contains upstream");
            return Ok(tip);
        }
        if self.is_ancestor(tip, onto)? {
            debug!(branch, upstream, "Fast-forwarding branch");
            self.reset_hard(branch, onto, "fast-forward")?;
            return Ok(onto);
        }

        let branch_ref = self.repo.find_reference(&format!("refs/heads/{branch}"))?;
        let branch_commit = self.repo.reference_to_annotated_commit(&branch_ref)?;
        let onto_commit = self.repo.find_annotated_commit(onto)?;
        let committer = self.default_identity()?.to_signature()?;

        let mut rebase = self
            .repo
            .rebase(Some(&branch_commit), Some(&onto_commit), None, None)?;
        while let Some(operation) = rebase.next() {
            let id = operation?.id();
            let index = self.repo.index()?;
            if index.has_conflicts() {
                let paths = conflict_paths(&index)?;
                rebase.abort()?;
                return Err(GitError::MergeConflict {
                    commit: id.to_string(),
                    paths,
                });
            }
            if let Err(e) = rebase.commit(None, &committer, None) {
                if e.code() != ErrorCode::Applied {
                    return Err(e.into());
                }
            }
        }
        rebase.finish(Some(&committer))?;
        self.resolve(branch)
    }

    fn tags(&self) -> Result<Vec<String>> {
        let names = self.repo.tag_names(None)?;
        Ok(names.iter().flatten().map(str::to_string).collect())
    }

    fn delete_tag(&self, name: &str) -> Result<()> {
        self.repo.tag_delete(name)?;
        Ok(())
    }

    fn log_query(&self, query: &LogQuery) -> Result<Vec<CommitRecord>> {
        let mut revwalk = self.repo.revwalk()?;
        let mut sorting = Sort::TOPOLOGICAL | Sort::TIME;
        if query.reverse {
            sorting |= Sort::REVERSE;
        }
        revwalk.set_sorting(sorting)?;

        match &query.from_ref {
            Some(reference) => revwalk.push(self.resolve(reference)?)?,
            None => revwalk.push_head()?,
        }

        let mut commits = Vec::new();
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            commits.push(CommitRecord::from_git2(&commit));
        }
        Ok(commits)
    }

    fn show_commit(&self, reference: &str) -> Result<CommitDetails> {
        let commit = self.repo.find_commit(self.resolve(reference)?)?;
        let tree = commit.tree()?;

        let mut changed_paths = Vec::new();
        let mut renames = Vec::new();
        let parents: Vec<git2::Commit<'_>> = commit.parents().collect();
        if parents.is_empty() {
            let diff = self.repo.diff_tree_to_tree(None, Some(&tree), None)?;
            changed_paths.extend(
                diff.deltas()
                    .filter_map(|d| d.new_file().path_bytes().map(BString::from)),
            );
        }
        for (i, parent) in parents.iter().enumerate() {
            let parent_tree = parent.tree()?;
            let mut diff = self
                .repo
                .diff_tree_to_tree(Some(&parent_tree), Some(&tree), None)?;
            let mut find = DiffFindOptions::new();
            find.renames(true);
            diff.find_similar(Some(&mut find))?;

            for delta in diff.deltas() {
                let old = delta.old_file().path_bytes();
                let new = delta.new_file().path_bytes();
                if i == 0 {
                    if let Some(path) = new.or(old) {
                        changed_paths.push(BString::from(path));
                    }
                }
                if delta.status() == Delta::Renamed {
                    if let (Some(old), Some(new)) = (old, new) {
                        renames.push((BString::from(old), BString::from(new)));
                    }
                }
            }
        }
        Ok(CommitDetails {
            record: CommitRecord::from_git2(&commit),
            changed_paths,
            renames,
        })
    }

    fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool> {
        Ok(ancestor == descendant || self.repo.graph_descendant_of(descendant, ancestor)?)
    }

    fn tree_of(&self, commit: Oid) -> Result<Oid> {
        Ok(self.repo.find_commit(commit)?.tree_id())
    }

    fn reset_index_to_paths(&self, commit: Oid, paths: &[BString]) -> Result<Oid> {
        let snapshot = self.read_tree(self.tree_of(commit)?)?;
        self.write_tree(&snapshot.restrict_to(paths))
    }

    fn read_tree(&self, tree: Oid) -> Result<TreeSnapshot> {
        TreeSnapshot::read(&self.repo, tree)
    }

    fn write_tree(&self, snapshot: &TreeSnapshot) -> Result<Oid> {
        snapshot.write(&self.repo)
    }

    fn empty_tree(&self) -> Result<Oid> {
        Ok(self.repo.treebuilder(None)?.write()?)
    }

    fn merge_trees(&self, ancestor: Oid, ours: Oid, theirs: Oid, label: &str) -> Result<Oid> {
        let ancestor = self.repo.find_tree(ancestor)?;
        let ours = self.repo.find_tree(ours)?;
        let theirs = self.repo.find_tree(theirs)?;

        let mut index = self.repo.merge_trees(&ancestor, &ours, &theirs, None)?;
        if index.has_conflicts() {
            return Err(GitError::MergeConflict {
                commit: label.to_string(),
                paths: conflict_paths(&index)?,
            });
        }
        Ok(index.write_tree_to(&self.repo)?)
    }

    fn create_commit(&self, commit: &NewCommit) -> Result<Oid> {
        let tree = self.repo.find_tree(commit.tree)?;
        let parents = commit
            .parents
            .iter()
            .map(|id| self.repo.find_commit(*id))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let author = commit.author.to_signature()?;
        let committer = commit.committer.to_signature()?;
        Ok(self.repo.commit(
            None,
            &author,
            &committer,
            &commit.message,
            &tree,
            &parent_refs,
        )?)
    }

    fn default_identity(&self) -> Result<Identity> {
        let sig = self.repo.signature()?;
        Ok(Identity::from_signature(&sig))
    }

    fn run_shell(&self, command: &str) -> Result<String> {
        let workdir = self.workdir()?;
        debug!(command, cwd = %workdir.display(), "Running shell command");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(workdir)
            .output()?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: command.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
