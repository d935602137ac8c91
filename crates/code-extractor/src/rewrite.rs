// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Generic history rewriting
//!
//! A [`Rewriter`] walks commits parents-first, maps each commit's tree through
//! a [`TreeTransform`], lets a caller edit the new commit's metadata, and
//! records the result in a [`RewriteMap`]. Commits that become empty may be
//! dropped ("prune-empty"); commits may also be skipped outright.

use std::collections::HashMap;

use bstr::BString;
use tracing::debug;

use extractor_git::{CommitRecord, NewCommit, Oid, Plumbing, TreeSnapshot};

use crate::error::Result;

/// Transformation applied to every commit's tree
pub trait TreeTransform {
    /// Produce the rewritten tree
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be transformed.
    fn apply(&self, tree: TreeSnapshot) -> Result<TreeSnapshot>;

    /// Whether `apply` leaves every tree unchanged
    fn is_identity(&self) -> bool {
        false
    }

    /// Write the rewritten tree of `commit`, whose current tree is `tree`
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be read, transformed or written.
    fn rewrite(&self, plumbing: &dyn Plumbing, _commit: Oid, tree: Oid) -> Result<Oid> {
        let snapshot = plumbing.read_tree(tree)?;
        Ok(plumbing.write_tree(&self.apply(snapshot)?)?)
    }
}

/// Leave trees untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepTree;

impl TreeTransform for KeepTree {
    fn apply(&self, tree: TreeSnapshot) -> Result<TreeSnapshot> {
        Ok(tree)
    }

    fn is_identity(&self) -> bool {
        true
    }
}

/// Reset each tree to exactly the given path set
#[derive(Debug, Clone)]
pub struct RestrictPaths(pub Vec<BString>);

impl TreeTransform for RestrictPaths {
    fn apply(&self, tree: TreeSnapshot) -> Result<TreeSnapshot> {
        Ok(tree.restrict_to(&self.0))
    }

    fn rewrite(&self, plumbing: &dyn Plumbing, commit: Oid, _tree: Oid) -> Result<Oid> {
        Ok(plumbing.reset_index_to_paths(commit, &self.0)?)
    }
}

/// Make a subdirectory the new root, dropping everything outside it
#[derive(Debug, Clone)]
pub struct Subtree(pub String);

impl TreeTransform for Subtree {
    fn apply(&self, tree: TreeSnapshot) -> Result<TreeSnapshot> {
        Ok(tree.subtree(&self.0))
    }
}

/// Old commit id to new commit id
///
/// A commit maps to `None` when it was dropped and has no surviving
/// ancestor. Commits dropped as empty map to their surviving parent.
#[derive(Debug, Clone, Default)]
pub struct RewriteMap {
    map: HashMap<Oid, Option<Oid>>,
    origins: HashMap<Oid, Oid>,
}

impl RewriteMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a commit written as `new` for `old`
    pub fn record(&mut self, old: Oid, new: Oid) {
        self.map.insert(old, Some(new));
        self.origins.insert(new, old);
    }

    /// Record a dropped commit, standing in for its surviving ancestor if any
    pub fn drop_commit(&mut self, old: Oid, stand_in: Option<Oid>) {
        self.map.insert(old, stand_in);
    }

    /// Look up a commit; `None` if it was never visited
    #[must_use]
    pub fn get(&self, old: Oid) -> Option<Option<Oid>> {
        self.map.get(&old).copied()
    }

    /// The rewritten id of a commit, if it has one
    #[must_use]
    pub fn mapped(&self, old: Oid) -> Option<Oid> {
        self.map.get(&old).copied().flatten()
    }

    /// The commit a rewritten commit was written for
    #[must_use]
    pub fn origin(&self, new: Oid) -> Option<Oid> {
        self.origins.get(&new).copied()
    }

    /// Number of commits actually written
    #[must_use]
    pub fn written(&self) -> usize {
        self.origins.len()
    }

    /// Number of commits visited
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no commit was visited
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Chain this map with a later pass over its output
    #[must_use]
    pub fn then(&self, next: &RewriteMap) -> RewriteMap {
        let map = self
            .map
            .iter()
            .map(|(old, mid)| {
                let new = mid.and_then(|mid| next.get(mid).unwrap_or(Some(mid)));
                (*old, new)
            })
            .collect();
        let origins = next
            .origins
            .iter()
            .map(|(new, mid)| (*new, self.origin(*mid).unwrap_or(*mid)))
            .collect();
        RewriteMap { map, origins }
    }

    /// Rewritten id to original id, as hex strings
    #[must_use]
    pub fn origin_ids(&self) -> HashMap<String, String> {
        self.origins
            .iter()
            .map(|(new, old)| (new.to_string(), old.to_string()))
            .collect()
    }
}

/// Parse a hex id produced by the plumbing layer
pub(crate) fn oid(id: &str) -> Result<Oid> {
    Ok(Oid::from_str(id)?)
}

type Edit<'a> = Box<dyn FnMut(&CommitRecord, &mut NewCommit) + 'a>;
type Skip<'a> = Box<dyn Fn(&CommitRecord) -> bool + 'a>;

/// Rewrites a list of commits into new commits
pub struct Rewriter<'a> {
    plumbing: &'a dyn Plumbing,
    transform: Box<dyn TreeTransform + 'a>,
    edit: Edit<'a>,
    skip: Skip<'a>,
    prune_empty: bool,
    simplify_merges: bool,
    tree_cache: HashMap<Oid, Oid>,
}

impl<'a> Rewriter<'a> {
    /// A rewriter that copies commits unchanged
    #[must_use]
    pub fn new(plumbing: &'a dyn Plumbing) -> Self {
        Self {
            plumbing,
            transform: Box::new(KeepTree),
            edit: Box::new(|_, _| {}),
            skip: Box::new(|_| false),
            prune_empty: false,
            simplify_merges: false,
            tree_cache: HashMap::new(),
        }
    }

    /// Transform every tree
    #[must_use]
    pub fn with_tree(mut self, transform: impl TreeTransform + 'a) -> Self {
        self.transform = Box::new(transform);
        self
    }

    /// Edit each new commit before it is written
    #[must_use]
    pub fn with_edit(mut self, edit: impl FnMut(&CommitRecord, &mut NewCommit) + 'a) -> Self {
        self.edit = Box::new(edit);
        self
    }

    /// Skip commits; children of skipped commits lose them as parents
    #[must_use]
    pub fn with_skip(mut self, skip: impl Fn(&CommitRecord) -> bool + 'a) -> Self {
        self.skip = Box::new(skip);
        self
    }

    /// Drop non-merge commits whose tree equals their parent's
    #[must_use]
    pub fn prune_empty(mut self, enabled: bool) -> Self {
        self.prune_empty = enabled;
        self
    }

    /// Drop merge parents that are ancestors of other parents
    #[must_use]
    pub fn simplify_merges(mut self, enabled: bool) -> Self {
        self.simplify_merges = enabled;
        self
    }

    /// Rewrite `commits`, which must be ordered parents before children
    ///
    /// # Errors
    ///
    /// Returns an error if a tree cannot be transformed or a commit written.
    pub fn run(&mut self, commits: &[CommitRecord]) -> Result<RewriteMap> {
        let mut map = RewriteMap::new();
        let empty_tree = self.plumbing.empty_tree()?;

        for record in commits {
            let old = oid(&record.id)?;
            if (self.skip)(record) {
                debug!(commit = record.short_id(), "Skipping commit");
                map.drop_commit(old, None);
                continue;
            }

            let parents = self.parents(record, &map)?;
            let tree = self.tree(old, oid(&record.tree)?)?;

            if self.prune_empty && parents.len() <= 1 {
                let base = match parents.first() {
                    Some(parent) => self.plumbing.tree_of(*parent)?,
                    None => empty_tree,
                };
                if base == tree {
                    debug!(commit = record.short_id(), "Pruning empty commit");
                    map.drop_commit(old, parents.first().copied());
                    continue;
                }
            }

            let mut draft = NewCommit {
                tree,
                parents,
                author: record.author.clone(),
                committer: record.committer.clone(),
                message: record.message.clone(),
            };
            (self.edit)(record, &mut draft);
            let new = self.plumbing.create_commit(&draft)?;
            map.record(old, new);
        }

        Ok(map)
    }

    fn tree(&mut self, commit: Oid, tree: Oid) -> Result<Oid> {
        if self.transform.is_identity() {
            return Ok(tree);
        }
        if let Some(cached) = self.tree_cache.get(&tree) {
            return Ok(*cached);
        }
        let rewritten = self.transform.rewrite(self.plumbing, commit, tree)?;
        self.tree_cache.insert(tree, rewritten);
        Ok(rewritten)
    }

    fn parents(&self, record: &CommitRecord, map: &RewriteMap) -> Result<Vec<Oid>> {
        let mut parents: Vec<Oid> = Vec::with_capacity(record.parents.len());
        for parent in &record.parents {
            let old = oid(parent)?;
            let new = map.get(old).unwrap_or(Some(old));
            if let Some(new) = new {
                if !parents.contains(&new) {
                    parents.push(new);
                }
            }
        }

        if self.simplify_merges && parents.len() > 1 {
            let mut kept = Vec::with_capacity(parents.len());
            for candidate in &parents {
                let mut redundant = false;
                for other in &parents {
                    if other != candidate && self.plumbing.is_ancestor(*candidate, *other)? {
                        redundant = true;
                        break;
                    }
                }
                if !redundant {
                    kept.push(*candidate);
                }
            }
            parents = kept;
        }
        Ok(parents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    fn id(n: u8) -> Oid {
        Oid::from_bytes(&[n; 20]).expect("20 bytes")
    }

    #[test]
    fn test_record_and_lookup() {
        let mut map = RewriteMap::new();
        map.record(id(1), id(11));
        map.drop_commit(id(2), Some(id(11)));
        map.drop_commit(id(3), None);

        assert_eq!(map.mapped(id(1)), Some(id(11)));
        assert_eq!(map.mapped(id(2)), Some(id(11)));
        assert_eq!(map.get(id(3)), Some(None));
        assert_eq!(map.get(id(4)), None);
        assert_eq!(map.origin(id(11)), Some(id(1)));
        assert_eq!(map.written(), 1);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_then_composes_and_inverts() {
        let mut first = RewriteMap::new();
        first.record(id(1), id(11));
        first.record(id(2), id(12));
        first.drop_commit(id(3), None);

        let mut second = RewriteMap::new();
        second.record(id(11), id(21));
        second.drop_commit(id(12), Some(id(21)));

        let both = first.then(&second);
        assert_eq!(both.mapped(id(1)), Some(id(21)));
        assert_eq!(both.mapped(id(2)), Some(id(21)));
        assert_eq!(both.get(id(3)), Some(None));
        assert_eq!(both.origin(id(21)), Some(id(1)));
        assert_eq!(both.written(), 1);
    }

    #[test]
    fn test_then_keeps_commits_not_revisited() {
        let mut first = RewriteMap::new();
        first.record(id(1), id(11));
        let second = RewriteMap::new();
        let both = first.then(&second);
        assert_eq!(both.mapped(id(1)), Some(id(11)));
    }

    #[test]
    fn test_origin_ids_are_hex() {
        let mut map = RewriteMap::new();
        map.record(id(1), id(11));
        let ids = map.origin_ids();
        assert_eq!(ids.get(&id(11).to_string()), Some(&id(1).to_string()));
    }

    #[test]
    fn test_restrict_and_subtree_transforms() {
        let mut snap = TreeSnapshot::new();
        let entry = extractor_git::TreeEntry {
            id: id(5),
            mode: 0o100644,
        };
        snap.insert("keep/foo/bar", entry);
        snap.insert("baz", entry);

        let restricted = RestrictPaths(vec!["keep".into()])
            .apply(snap.clone())
            .expect("restrict");
        assert_eq!(
            restricted.paths().map(|p| p.to_string()).collect::<Vec<_>>(),
            vec!["keep/foo/bar"]
        );

        let rerooted = Subtree("keep".into()).apply(snap).expect("subtree");
        assert_eq!(
            rerooted.paths().map(|p| p.to_string()).collect::<Vec<_>>(),
            vec!["foo/bar"]
        );
        assert!(KeepTree.is_identity());
    }
}
