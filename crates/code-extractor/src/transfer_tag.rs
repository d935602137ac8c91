// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Transfer tags
//!
//! Every commit that crosses between the source and the extracted repository
//! carries a trailing line `(transferred from <identity>@<commit-id>)`. The tag
//! is the last non-blank line of the message and a message never carries more
//! than one.

use std::fmt;

use serde::{Deserialize, Serialize};

use extractor_git::CommitRecord;

const PREFIX: &str = "(transferred from ";
const SUFFIX: &str = ")";

/// A parsed transfer tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferTag {
    /// Identity of the repository the commit came from, e.g. `MyOrg/repo`
    pub identity: String,
    /// Id of the commit in that repository
    pub commit: String,
}

impl TransferTag {
    /// Create a tag
    #[must_use]
    pub fn new(identity: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            commit: commit.into(),
        }
    }

    /// Parse a single line
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let inner = line.trim().strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
        let (identity, commit) = inner.rsplit_once('@')?;
        if identity.is_empty() || !CommitRecord::is_valid_id(commit) {
            return None;
        }
        Some(Self::new(identity, commit))
    }

    /// Find the tag carried by a message, if any
    #[must_use]
    pub fn find(message: &str) -> Option<Self> {
        message
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(Self::parse_line)
    }

    /// Find the tag carried by a message when it names `identity`
    #[must_use]
    pub fn find_for(message: &str, identity: &str) -> Option<Self> {
        Self::find(message).filter(|tag| tag.identity == identity)
    }

    /// The message without its tag and without trailing whitespace
    #[must_use]
    pub fn strip(message: &str) -> &str {
        let trimmed = message.trim_end();
        match trimmed.rfind('\n') {
            Some(pos) if Self::parse_line(&trimmed[pos + 1..]).is_some() => {
                trimmed[..pos].trim_end()
            }
            None if Self::parse_line(trimmed).is_some() => "",
            _ => trimmed,
        }
    }

    /// Append this tag to a message, replacing any tag it already carries
    #[must_use]
    pub fn append_to(&self, message: &str) -> String {
        let body = Self::strip(message);
        if body.is_empty() {
            format!("{self}\n")
        } else {
            format!("{body}\n\n{self}\n")
        }
    }
}

impl fmt::Display for TransferTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}@{}{SUFFIX}", self.identity, self.commit)
    }
}
