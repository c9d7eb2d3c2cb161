use std::fmt;
use std::path::PathBuf;

use crate::tracker::TrackerError;

/// Machine-readable error codes for scripts and automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigurationError,
    ObjectNotFound,
    DuplicateUid,
    RoleConflict,
    MissingUid,
    InvalidBody,
    InvalidUpdate,
    ConcurrentUpdate,
    AccessDenied,
    AlreadyAlias,
    SelfReference,
    RateLimited,
    TrackerFailure,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigurationError => "E1001",
            Self::ObjectNotFound => "E2001",
            Self::DuplicateUid => "E2002",
            Self::RoleConflict => "E2003",
            Self::MissingUid => "E2004",
            Self::InvalidBody => "E2005",
            Self::InvalidUpdate => "E3001",
            Self::ConcurrentUpdate => "E3002",
            Self::AccessDenied => "E4001",
            Self::AlreadyAlias => "E5001",
            Self::SelfReference => "E5002",
            Self::RateLimited => "E6001",
            Self::TrackerFailure => "E6002",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigurationError => "Configuration error",
            Self::ObjectNotFound => "Object not found",
            Self::DuplicateUid => "Duplicate UID",
            Self::RoleConflict => "Conflicting ticket roles",
            Self::MissingUid => "Ticket has no UID label",
            Self::InvalidBody => "Ticket body is not valid JSON",
            Self::InvalidUpdate => "Invalid update payload",
            Self::ConcurrentUpdate => "Object is being processed",
            Self::AccessDenied => "Access denied",
            Self::AlreadyAlias => "Object is already an alias",
            Self::SelfReference => "Object references itself",
            Self::RateLimited => "Tracker rate limit exhausted",
            Self::TrackerFailure => "Tracker request failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigurationError => {
                Some("Fix the TOML in the ghstore config file, or remove it to use defaults.")
            }
            Self::ObjectNotFound => None,
            Self::DuplicateUid => Some("Run `ghs find-duplicates` and `ghs dedup` to repair."),
            Self::RoleConflict => {
                Some("Remove the alias or deprecation labels that do not belong on the ticket.")
            }
            Self::MissingUid => Some("Add the `UID:<object-id>` label to the ticket."),
            Self::InvalidBody => Some("Run `ghs process-updates` to rewrite the ticket body."),
            Self::InvalidUpdate => Some("Edit or delete the offending comment on the ticket."),
            Self::ConcurrentUpdate => {
                Some("Retry after the pending updates on the ticket have been processed.")
            }
            Self::AccessDenied => {
                Some("Only the repository owner and CODEOWNERS entries may submit changes.")
            }
            Self::AlreadyAlias => None,
            Self::SelfReference => Some("Pick a different target object."),
            Self::RateLimited => Some("Wait for the API rate limit window to reset and retry."),
            Self::TrackerFailure => Some("Check the token, repository name, and network."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by the object store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no object found with ID '{object_id}'")]
    ObjectNotFound { object_id: String },

    #[error("invalid update in comment {comment_id} on issue #{issue_number}: {reason}")]
    InvalidUpdate {
        issue_number: u64,
        comment_id: u64,
        reason: String,
    },

    #[error("object '{object_id}' is currently being processed (issue #{issue_number} is open)")]
    ConcurrentUpdate { object_id: String, issue_number: u64 },

    #[error("configuration error in {}: {reason}", display_path(.path))]
    Configuration {
        path: Option<PathBuf>,
        reason: String,
    },

    #[error("found multiple issues {issue_numbers:?} for object '{object_id}'")]
    DuplicateUid {
        object_id: String,
        issue_numbers: Vec<u64>,
    },

    #[error("{actor} is not authorized to modify issue #{issue_number}{}", comment_suffix(.comment_id))]
    AccessDenied {
        actor: String,
        issue_number: u64,
        comment_id: Option<u64>,
    },

    #[error("object '{object_id}' is already an alias of '{target_id}'")]
    AlreadyAlias { object_id: String, target_id: String },

    #[error("object '{object_id}' cannot reference itself (issue #{issue_number})")]
    SelfReference { object_id: String, issue_number: u64 },

    #[error("issue #{issue_number} carries conflicting roles: {roles}")]
    RoleConflict { issue_number: u64, roles: String },

    #[error("issue #{issue_number} has no UID label")]
    MissingUid { issue_number: u64 },

    #[error("body of issue #{issue_number} is not valid JSON: {reason}")]
    InvalidBody { issue_number: u64, reason: String },

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl StoreError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ObjectNotFound { .. } => ErrorCode::ObjectNotFound,
            Self::InvalidUpdate { .. } => ErrorCode::InvalidUpdate,
            Self::ConcurrentUpdate { .. } => ErrorCode::ConcurrentUpdate,
            Self::Configuration { .. } => ErrorCode::ConfigurationError,
            Self::DuplicateUid { .. } => ErrorCode::DuplicateUid,
            Self::AccessDenied { .. } => ErrorCode::AccessDenied,
            Self::AlreadyAlias { .. } => ErrorCode::AlreadyAlias,
            Self::SelfReference { .. } => ErrorCode::SelfReference,
            Self::RoleConflict { .. } => ErrorCode::RoleConflict,
            Self::MissingUid { .. } => ErrorCode::MissingUid,
            Self::InvalidBody { .. } => ErrorCode::InvalidBody,
            Self::Tracker(TrackerError::RateLimited { .. }) => ErrorCode::RateLimited,
            Self::Tracker(_) => ErrorCode::TrackerFailure,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    pub(crate) fn config(path: Option<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            path,
            reason: reason.into(),
        }
    }
}

#[allow(clippy::ref_option)]
fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref().map_or_else(|| "<defaults>".to_string(), |p| p.display().to_string())
}

#[allow(clippy::ref_option)]
fn comment_suffix(comment_id: &Option<u64>) -> String {
    comment_id.map_or_else(String::new, |id| format!(" (comment {id})"))
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigurationError,
            ErrorCode::ObjectNotFound,
            ErrorCode::DuplicateUid,
            ErrorCode::RoleConflict,
            ErrorCode::MissingUid,
            ErrorCode::InvalidBody,
            ErrorCode::InvalidUpdate,
            ErrorCode::ConcurrentUpdate,
            ErrorCode::AccessDenied,
            ErrorCode::AlreadyAlias,
            ErrorCode::SelfReference,
            ErrorCode::RateLimited,
            ErrorCode::TrackerFailure,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::ConcurrentUpdate.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn errors_carry_diagnostic_context() {
        let err = StoreError::InvalidUpdate {
            issue_number: 12,
            comment_id: 345,
            reason: "not JSON".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("#12"));
        assert!(text.contains("345"));

        let denied = StoreError::AccessDenied {
            actor: "mallory".to_string(),
            issue_number: 7,
            comment_id: Some(99),
        };
        assert_eq!(
            denied.to_string(),
            "mallory is not authorized to modify issue #7 (comment 99)"
        );
        assert_eq!(denied.code(), ErrorCode::AccessDenied);
    }

    #[test]
    fn rate_limit_errors_have_their_own_code() {
        let err = StoreError::from(TrackerError::RateLimited {
            operation: "list_issues".to_string(),
            retry_after: None,
        });
        assert_eq!(err.code(), ErrorCode::RateLimited);
        assert!(err.hint().is_some());
    }
}
