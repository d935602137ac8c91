// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Error types for code-extractor

use thiserror::Error;

use crate::config::ConfigError;
use extractor_git::GitError;

/// Errors that can occur while extracting or re-injecting history
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Error from the git plumbing layer
    #[error(transparent)]
    Git(#[from] GitError),

    /// Error from git2 raised directly by the core
    #[error("Git error: {0}")]
    Git2(#[from] git2::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO error while writing side-channel files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The destination exists but does not hold a repository
    #[error("Destination {path} exists but is not a git repository")]
    NotARepository {
        /// The destination path
        path: String,
    },

    /// Re-injection was requested without target settings
    #[error("Re-injection requires target_name and target_remote")]
    MissingTarget,

    /// Pruning left no history to re-inject
    #[error("No history touches the extraction paths on branch {branch}")]
    EmptyHistory {
        /// The branch that was pruned
        branch: String,
    },
}

/// Result alias for extraction operations
pub type Result<T> = std::result::Result<T, ExtractError>;
