//! Ticket-tracker boundary.
//!
//! The store never talks HTTP directly. Every read and write goes through
//! the [`Tracker`] trait, which models the handful of issue-tracker calls the
//! store needs: issues, comments, reactions, labels, team membership, and raw
//! repository files.
//!
//! Two implementations ship with the crate:
//!
//! - [`github::GitHubTracker`]: blocking REST client for api.github.com.
//! - [`memory::MemoryTracker`]: in-process tracker with a deterministic
//!   clock and failure injection, used by tests and local tooling.
//!
//! Rate limiting is handled one layer up by [`retry::RetryPolicy`].

pub mod github;
pub mod memory;
pub mod retry;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use retry::RetryPolicy;

/// Open/closed state of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State filter for issue listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateFilter {
    Open,
    Closed,
    #[default]
    All,
}

impl StateFilter {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }

    /// Returns `true` if an issue in `state` passes this filter.
    #[must_use]
    pub fn matches(self, state: IssueState) -> bool {
        match self {
            Self::Open => state == IssueState::Open,
            Self::Closed => state == IssueState::Closed,
            Self::All => true,
        }
    }
}

/// A ticket as returned by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: IssueState,
    pub labels: Vec<String>,
    /// Login of the user who opened the ticket.
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// A comment on a ticket, with the reaction contents currently present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub body: String,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reactions: Vec<String>,
}

impl Comment {
    #[must_use]
    pub fn has_reaction(&self, content: &str) -> bool {
        self.reactions.iter().any(|r| r == content)
    }
}

/// Parameters for listing issues. Every label in `labels` must be present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueQuery {
    pub labels: Vec<String>,
    pub state: StateFilter,
    pub since: Option<DateTime<Utc>>,
}

impl IssueQuery {
    #[must_use]
    pub fn labeled<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn state(mut self, state: StateFilter) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub const fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }
}

/// Fields for a new ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Partial edit of a ticket; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueEdit {
    pub body: Option<String>,
    pub state: Option<IssueState>,
}

/// Errors from the tracker transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    /// The tracker refused the call because the API rate limit is exhausted.
    #[error("rate limited during {operation}")]
    RateLimited {
        operation: String,
        retry_after: Option<Duration>,
    },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{operation} failed with status {status}: {message}")]
    Api {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("{operation} request failed: {message}")]
    Transport { operation: String, message: String },

    #[error("failed to decode {operation} response: {message}")]
    Decode { operation: String, message: String },
}

impl TrackerError {
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// The issue-tracker operations the store depends on.
///
/// Implementations are synchronous; each call runs to completion before
/// returning. Rate-limit responses must surface as
/// [`TrackerError::RateLimited`] so the caller's [`RetryPolicy`] can back off.
pub trait Tracker {
    /// Login of the repository owner.
    fn repository_owner(&self) -> Result<String, TrackerError>;

    fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>, TrackerError>;

    fn get_issue(&self, number: u64) -> Result<Issue, TrackerError>;

    fn create_issue(&self, issue: &NewIssue) -> Result<Issue, TrackerError>;

    fn edit_issue(&self, number: u64, edit: &IssueEdit) -> Result<Issue, TrackerError>;

    /// All comments on a ticket, oldest first.
    fn list_comments(&self, number: u64) -> Result<Vec<Comment>, TrackerError>;

    fn create_comment(&self, number: u64, body: &str) -> Result<Comment, TrackerError>;

    fn add_reaction(&self, comment_id: u64, content: &str) -> Result<(), TrackerError>;

    /// Names of every label defined in the repository.
    fn list_labels(&self) -> Result<Vec<String>, TrackerError>;

    fn create_label(
        &self,
        name: &str,
        color: &str,
        description: Option<&str>,
    ) -> Result<(), TrackerError>;

    fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), TrackerError>;

    fn remove_label(&self, number: u64, label: &str) -> Result<(), TrackerError>;

    /// Member logins of `org/team`.
    fn team_members(&self, org: &str, team: &str) -> Result<Vec<String>, TrackerError>;

    /// Raw content of a repository file, or `None` if it does not exist.
    fn file_contents(&self, path: &str) -> Result<Option<String>, TrackerError>;
}
