// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! code-extractor library
//!
//! Extracts a subset of a repository's paths, with their history, into a
//! standalone repository, and re-injects commits made there back into the
//! original history. The binary drives [`pipeline::run`]; the modules are
//! exported for integration tests and as a library.

pub mod config;
pub mod detect;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod prune;
pub mod reinject;
pub mod rewrite;
pub mod transfer_tag;

pub use config::{Cli, ExtractionConfig};
pub use error::{ExtractError, Result};
pub use pipeline::RunReport;
pub use transfer_tag::TransferTag;
