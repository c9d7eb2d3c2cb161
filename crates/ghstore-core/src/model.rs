//! Records returned by the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::UpdateMode;
use crate::tracker::Comment;

/// Metadata about a stored object, derived from its ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub object_id: String,
    pub issue_number: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Consumed updates + 1.
    pub version: u64,
    /// Set when the object was reached through an alias chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
}

/// An object's materialized state plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub meta: ObjectMeta,
    pub data: Value,
}

/// A decoded, authorized, not-yet-consumed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub issue_number: u64,
    pub comment_id: u64,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
    pub mode: UpdateMode,
}

/// One entry of [`crate::store::ObjectStore::get_object_history`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub comment_id: u64,
    pub metadata: Value,
}

/// A comment gathered from any ticket contributing to a canonical object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedComment {
    pub comment: Comment,
    pub source_issue: u64,
    pub source_object_id: String,
}

impl CollectedComment {
    /// Sort key: creation time, then source issue, then comment ID.
    #[must_use]
    pub const fn order_key(&self) -> (DateTime<Utc>, u64, u64) {
        (self.comment.created_at, self.source_issue, self.comment.id)
    }
}

/// Why an object was folded into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeprecationReason {
    #[default]
    Duplicate,
    Merged,
    Replaced,
}

impl DeprecationReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Merged => "merged",
            Self::Replaced => "replaced",
        }
    }
}

impl fmt::Display for DeprecationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeprecationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "duplicate" => Ok(Self::Duplicate),
            "merged" => Ok(Self::Merged),
            "replaced" => Ok(Self::Replaced),
            other => Err(format!(
                "unknown deprecation reason '{other}' (expected duplicate, merged, or replaced)"
            )),
        }
    }
}

/// Tickets sharing one UID label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub object_id: String,
    /// Issue numbers, oldest ticket first.
    pub issue_numbers: Vec<u64>,
}

/// An alias ticket and the object it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub alias_id: String,
    pub target_id: String,
    pub issue_number: u64,
}

/// Outcome of [`crate::store::ObjectStore::create_alias`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasLink {
    pub source_id: String,
    pub target_id: String,
    pub source_issue: u64,
    pub target_issue: u64,
}

/// Outcome of deprecating one ticket into another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprecationOutcome {
    pub source_issue: u64,
    pub source_object_id: String,
    pub target_issue: u64,
    pub target_object_id: String,
    pub reason: DeprecationReason,
}

/// Outcome of collapsing one duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupOutcome {
    pub object_id: String,
    pub canonical_issue: u64,
    pub deprecated_issues: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deprecation_reason_parses_known_values() {
        for reason in [
            DeprecationReason::Duplicate,
            DeprecationReason::Merged,
            DeprecationReason::Replaced,
        ] {
            assert_eq!(reason.as_str().parse::<DeprecationReason>(), Ok(reason));
        }
        assert!("obsolete".parse::<DeprecationReason>().is_err());
    }

    #[test]
    fn canonical_id_is_omitted_when_absent() {
        let meta = ObjectMeta {
            object_id: "m".to_string(),
            issue_number: 1,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            version: 1,
            canonical_id: None,
        };
        let json = serde_json::to_value(&meta).expect("serialize");
        assert!(json.get("canonical_id").is_none());
        assert_eq!(json["version"], 1);
    }
}
