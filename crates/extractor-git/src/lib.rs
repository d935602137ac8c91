// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! extractor-git: typed git plumbing for code-extractor
//!
//! This library crate exposes the version-control operations that history
//! extraction and reinjection are built from, behind the [`Plumbing`] trait,
//! together with a `git2` backed implementation.

#![warn(missing_docs)]

//! # Example
//!
//! ```no_run
//! use extractor_git::{GitRepo, LogQuery, Plumbing};
//!
//! let repo = GitRepo::open(".").expect("open repo");
//! let commits = repo.log_query(&LogQuery::of("HEAD").oldest_first())
//!     .expect("list commits");
//!
//! for c in commits {
//!     println!("{} - {}", c.short_id(), c.subject());
//! }
//! ```

pub mod commit;
pub mod error;
pub mod plumbing;
pub mod repo;
pub mod tree;

pub use commit::{CommitDetails, CommitRecord, Identity};
pub use error::GitError;
pub use git2::Oid;
pub use plumbing::{LogQuery, NewCommit, Plumbing};
pub use repo::GitRepo;
pub use tree::{TreeEntry, TreeSnapshot};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::commit::{CommitRecord, Identity};
    pub use crate::error::GitError;
    pub use crate::plumbing::{LogQuery, NewCommit, Plumbing};
    pub use crate::repo::GitRepo;
    pub use crate::tree::TreeSnapshot;
}
