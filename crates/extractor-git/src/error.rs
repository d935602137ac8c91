// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Error types for extractor-git

use thiserror::Error;

/// Errors that can occur during git operations
#[derive(Debug, Error)]
pub enum GitError {
    /// Error from git2 library
    #[error("Git error: {0}")]
    Git2(#[from] git2::Error),

    /// IO error while touching the working copy
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Repository not found at the specified path
    #[error("Repository not found: {path}")]
    RepositoryNotFound {
        /// The path that was searched for a repository
        path: String,
    },

    /// Invalid commit reference (branch, tag, or SHA)
    #[error("Invalid commit reference: {reference}")]
    InvalidReference {
        /// The reference string that could not be resolved
        reference: String,
    },

    /// A three-way tree merge produced conflicts
    #[error("Merge conflict while replaying {commit}: {}", paths.join(", "))]
    MergeConflict {
        /// The commit being replayed
        commit: String,
        /// Paths left in conflict
        paths: Vec<String>,
    },

    /// A path in a tree snapshot collides with an existing entry
    #[error("Path collision in tree: {path}")]
    PathCollision {
        /// The colliding path
        path: String,
    },

    /// An external command run inside the working copy failed
    #[error("Command `{command}` failed: {stderr}")]
    CommandFailed {
        /// The command line that was run
        command: String,
        /// Raw diagnostic output
        stderr: String,
    },
}

/// Result alias for git operations
pub type Result<T> = std::result::Result<T, GitError>;
