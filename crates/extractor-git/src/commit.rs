//! Commit records produced by the plumbing layer

use bstr::BString;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

/// A name, email and point in time attached to a commit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
    /// When the identity signed the commit
    pub timestamp: DateTime<Utc>,
    /// Timezone offset of the original signature, in minutes east of UTC
    pub offset_minutes: i32,
}

impl Identity {
    /// Build an identity from a git2 signature
    #[must_use]
    pub fn from_signature(sig: &git2::Signature<'_>) -> Self {
        let when = sig.when();
        let timestamp = DateTime::from_timestamp(when.seconds(), 0).unwrap_or_default();
        Self {
            name: String::from_utf8_lossy(sig.name_bytes()).into_owned(),
            email: String::from_utf8_lossy(sig.email_bytes()).into_owned(),
            timestamp,
            offset_minutes: when.offset_minutes(),
        }
    }

    /// Convert back into a git2 signature, preserving time and offset
    ///
    /// # Errors
    ///
    /// Returns an error if the name or email contain characters git rejects.
    pub fn to_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        let time = git2::Time::new(self.timestamp.timestamp(), self.offset_minutes);
        git2::Signature::new(&self.name, &self.email, &time)
    }

    /// `Name <email>` form used in commit bodies
    #[must_use]
    pub fn name_and_email(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    /// Date rendered the way `git log` prints it, in the original offset
    #[must_use]
    pub fn git_date(&self) -> String {
        let offset = FixedOffset::east_opt(self.offset_minutes * 60).unwrap_or(Utc.fix());
        self.timestamp
            .with_timezone(&offset)
            .format("%a %b %-d %H:%M:%S %Y %z")
            .to_string()
    }

    /// Whether two identities belong to the same person (time ignored)
    #[must_use]
    pub fn same_person(&self, other: &Identity) -> bool {
        self.name == other.name && self.email == other.email
    }
}

/// Represents a commit as seen through the plumbing interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// The commit id (40 hex characters)
    pub id: String,
    /// Parent commit ids, in order
    pub parents: Vec<String>,
    /// Tree id
    pub tree: String,
    /// Author identity
    pub author: Identity,
    /// Committer identity
    pub committer: Identity,
    /// Full commit message
    pub message: String,
}

impl CommitRecord {
    /// Build a record from a git2 commit
    #[must_use]
    pub fn from_git2(commit: &git2::Commit<'_>) -> Self {
        Self {
            id: commit.id().to_string(),
            parents: commit.parent_ids().map(|id| id.to_string()).collect(),
            tree: commit.tree_id().to_string(),
            author: Identity::from_signature(&commit.author()),
            committer: Identity::from_signature(&commit.committer()),
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
        }
    }

    /// Validate that an id is a valid 40-character hex string
    #[must_use]
    pub fn is_valid_id(id: &str) -> bool {
        id.len() == 40 && id.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Get the short id (first 7 characters)
    #[must_use]
    pub fn short_id(&self) -> &str {
        &self.id[..7.min(self.id.len())]
    }

    /// Check if this is a merge commit (has multiple parents)
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// Check if this is a root commit (has no parents)
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Get the first line of the commit message (subject)
    #[must_use]
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// A commit together with the paths it touched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDetails {
    /// The commit data
    #[serde(flatten)]
    pub record: CommitRecord,
    /// Paths added, modified, deleted or renamed relative to the first parent
    pub changed_paths: Vec<BString>,
    /// Paths renamed relative to each parent, as `(old, new)`
    pub renames: Vec<(BString, BString)>,
}
