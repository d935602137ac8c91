// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Flattened tree snapshots
//!
//! A [`TreeSnapshot`] maps every non-tree entry of a git tree to its full
//! slash-separated path. History rewriting edits snapshots (restrict to a
//! path set, move a directory, re-root a subtree) and writes them back as
//! nested git trees.

use std::collections::BTreeMap;

use bstr::{BStr, BString, ByteSlice};
use git2::{ObjectType, Oid, Repository, Tree};

use crate::error::{GitError, Result};

/// File mode git uses for tree entries
const TREE_MODE: i32 = 0o040000;

/// A blob, symlink or gitlink entry in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeEntry {
    /// Object id of the entry
    pub id: Oid,
    /// Git file mode
    pub mode: i32,
}

/// All leaf entries of a tree keyed by full path
///
/// Paths are kept as the raw bytes stored in the tree, so names that are not
/// valid UTF-8 survive a read/write cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    entries: BTreeMap<BString, TreeEntry>,
}

/// Normalize a user supplied path: strip `./`, leading and trailing slashes
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut path = path.trim();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.trim_matches('/').to_string()
}

/// [`normalize_path`] for raw tree paths
#[must_use]
pub fn normalize_path_bytes(path: &[u8]) -> BString {
    let mut path = path.trim_ascii();
    while let Some(rest) = path.strip_prefix(b"./") {
        path = rest;
    }
    let start = path.iter().position(|b| *b != b'/').unwrap_or(path.len());
    let end = path.iter().rposition(|b| *b != b'/').map_or(start, |i| i + 1);
    BString::from(&path[start..end])
}

/// Whether `path` equals `prefix` or lies underneath it
#[must_use]
pub fn path_matches(path: impl AsRef<[u8]>, prefix: impl AsRef<[u8]>) -> bool {
    let (path, prefix) = (path.as_ref(), prefix.as_ref());
    if prefix.is_empty() {
        return true;
    }
    path == prefix
        || (path.len() > prefix.len() && path.starts_with(prefix) && path[prefix.len()] == b'/')
}

/// The directory containing `path`, if it is not at the root
#[must_use]
pub fn parent_path(path: &[u8]) -> Option<&[u8]> {
    path.iter().rposition(|b| *b == b'/').map(|i| &path[..i])
}

fn collision(path: &[u8]) -> GitError {
    GitError::PathCollision {
        path: path.to_str_lossy().into_owned(),
    }
}

fn read_dir(
    repo: &Repository,
    tree: &Tree<'_>,
    prefix: &[u8],
    entries: &mut BTreeMap<BString, TreeEntry>,
) -> Result<()> {
    for entry in tree {
        let mut path = prefix.to_vec();
        if !path.is_empty() {
            path.push(b'/');
        }
        path.extend_from_slice(entry.name_bytes());

        if entry.kind() == Some(ObjectType::Tree) {
            let subtree = repo.find_tree(entry.id())?;
            read_dir(repo, &subtree, &path, entries)?;
        } else {
            entries.insert(
                BString::from(path),
                TreeEntry {
                    id: entry.id(),
                    mode: entry.filemode(),
                },
            );
        }
    }
    Ok(())
}

impl TreeSnapshot {
    /// Create an empty snapshot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a tree from the object database
    ///
    /// # Errors
    ///
    /// Returns `GitError` if the tree or one of its subtrees cannot be found.
    pub fn read(repo: &Repository, tree_id: Oid) -> Result<Self> {
        let tree = repo.find_tree(tree_id)?;
        let mut entries = BTreeMap::new();
        read_dir(repo, &tree, b"", &mut entries)?;
        Ok(Self { entries })
    }

    /// Write the snapshot as nested trees and return the root tree id
    ///
    /// # Errors
    ///
    /// Returns `GitError::PathCollision` if a file and a directory share a
    /// path, or `GitError::Git2` if a tree cannot be written.
    pub fn write(&self, repo: &Repository) -> Result<Oid> {
        let mut root: BTreeMap<BString, Node> = BTreeMap::new();
        for (path, entry) in &self.entries {
            let mut cursor = &mut root;
            let mut parts = path.split(|b| *b == b'/').peekable();
            while let Some(part) = parts.next() {
                if parts.peek().is_none() {
                    if cursor.insert(BString::from(part), Node::Leaf(*entry)).is_some() {
                        return Err(collision(path));
                    }
                    break;
                }
                let node = cursor
                    .entry(BString::from(part))
                    .or_insert_with(|| Node::Dir(BTreeMap::new()));
                cursor = match node {
                    Node::Dir(children) => children,
                    Node::Leaf(_) => return Err(collision(path)),
                };
            }
        }
        write_dir(repo, &root)
    }

    /// Number of leaf entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace an entry
    pub fn insert(&mut self, path: impl Into<BString>, entry: TreeEntry) {
        self.entries.insert(path.into(), entry);
    }

    /// Look up a leaf entry
    #[must_use]
    pub fn get(&self, path: impl AsRef<[u8]>) -> Option<&TreeEntry> {
        self.entries.get(path.as_ref().as_bstr())
    }

    /// Iterate over all paths in order
    pub fn paths(&self) -> impl Iterator<Item = &BStr> {
        self.entries.keys().map(|p| p.as_bstr())
    }

    /// Whether a file exists at exactly `path`
    #[must_use]
    pub fn is_file(&self, path: impl AsRef<[u8]>) -> bool {
        self.entries.contains_key(path.as_ref().as_bstr())
    }

    /// Whether `path` exists as a file or as a directory
    #[must_use]
    pub fn contains(&self, path: impl AsRef<[u8]>) -> bool {
        let path = path.as_ref();
        self.entries.keys().any(|p| path_matches(p, path))
    }

    /// Keep only entries at or under one of `paths`
    #[must_use]
    pub fn restrict_to<P: AsRef<[u8]>>(&self, paths: &[P]) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(path, _)| paths.iter().any(|prefix| path_matches(path, prefix)))
            .map(|(path, entry)| (path.clone(), *entry))
            .collect();
        Self { entries }
    }

    /// Drop every entry at or under one of `paths`
    #[must_use]
    pub fn without<P: AsRef<[u8]>>(&self, paths: &[P]) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(path, _)| !paths.iter().any(|prefix| path_matches(path, prefix)))
            .map(|(path, entry)| (path.clone(), *entry))
            .collect();
        Self { entries }
    }

    /// Entries under `prefix` with the prefix stripped, everything else dropped
    #[must_use]
    pub fn subtree(&self, prefix: impl AsRef<[u8]>) -> Self {
        let prefix = prefix.as_ref();
        let entries = self
            .entries
            .iter()
            .filter_map(|(path, entry)| {
                path.strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix(b"/"))
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (BString::from(rest), *entry))
            })
            .collect();
        Self { entries }
    }

    /// Move a file or directory to a new location
    ///
    /// Returns `Ok(false)` when nothing exists at `from`.
    ///
    /// # Errors
    ///
    /// Returns `GitError::PathCollision` if a moved entry would overwrite an
    /// existing one.
    pub fn move_path(&mut self, from: impl AsRef<[u8]>, to: impl AsRef<[u8]>) -> Result<bool> {
        let (from, to) = (from.as_ref(), to.as_ref());
        let moving: Vec<BString> = self
            .entries
            .keys()
            .filter(|p| path_matches(p, from))
            .cloned()
            .collect();
        if moving.is_empty() {
            return Ok(false);
        }

        let mut relocated = Vec::with_capacity(moving.len());
        for path in moving {
            if let Some(entry) = self.entries.remove(&path) {
                let mut target = to.to_vec();
                target.extend_from_slice(&path[from.len()..]);
                relocated.push((BString::from(target), entry));
            }
        }
        for (target, entry) in relocated {
            if self.entries.insert(target.clone(), entry).is_some() {
                return Err(collision(&target));
            }
        }
        Ok(true)
    }
}

enum Node {
    Leaf(TreeEntry),
    Dir(BTreeMap<BString, Node>),
}

fn write_dir(repo: &Repository, dir: &BTreeMap<BString, Node>) -> Result<Oid> {
    let mut builder = repo.treebuilder(None)?;
    for (name, node) in dir {
        match node {
            Node::Leaf(entry) => {
                builder.insert(name.to_vec(), entry.id, entry.mode)?;
            }
            Node::Dir(children) => {
                let id = write_dir(repo, children)?;
                builder.insert(name.to_vec(), id, TREE_MODE)?;
            }
        }
    }
    Ok(builder.write()?)
}
