//! Label vocabulary and ticket roles.
//!
//! Object metadata lives in ticket labels, never in the body. A managed
//! ticket plays exactly one role:
//!
//! | Role         | Labels                                                     |
//! |--------------|------------------------------------------------------------|
//! | `Stored`     | base label, `UID:<id>`                                     |
//! | `Alias`      | `UID:<id>`, `ALIAS-TO:<target>` (base label may remain)    |
//! | `Deprecated` | `deprecated-object`, `MERGED-INTO:<id>`, `DEPRECATED-BY:<n>`|
//! | `Archived`   | `archived`, `UID:<id>`                                     |
//!
//! Mixing stored, alias, and deprecated markers on one ticket is a
//! [`StoreError::RoleConflict`].

use std::fmt;

use crate::config::StoreSection;
use crate::error::{Result, StoreError};
use crate::tracker::Issue;

/// Label colors used when the store creates labels.
pub const STORED_COLOR: &str = "0366d6";
pub const ALIAS_COLOR: &str = "fbca04";
pub const DEPRECATED_COLOR: &str = "999999";
pub const MERGED_COLOR: &str = "d73a49";

/// The exact label strings in use, derived from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVocabulary {
    pub base: String,
    pub uid_prefix: String,
    pub alias_prefix: String,
    pub merged_prefix: String,
    pub deprecated_by_prefix: String,
    pub deprecated: String,
    pub archived: String,
}

impl Default for LabelVocabulary {
    fn default() -> Self {
        Self::from_config(&StoreSection::default())
    }
}

/// The role a ticket plays, decoded from its labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketRole {
    /// Canonical holder of an object's state.
    Stored,
    /// Redirects reads and writes to `target`.
    Alias { target: String },
    /// Former canonical ticket merged into another object.
    Deprecated {
        merged_into: Option<String>,
        deprecated_by: Option<u64>,
    },
    /// Deleted object; kept for history.
    Archived,
    /// Not managed by the store.
    Unmanaged,
}

impl TicketRole {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Alias { .. } => "alias",
            Self::Deprecated { .. } => "deprecated",
            Self::Archived => "archived",
            Self::Unmanaged => "unmanaged",
        }
    }
}

impl fmt::Display for TicketRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias { target } => write!(f, "alias of {target}"),
            Self::Deprecated {
                merged_into: Some(target),
                ..
            } => write!(f, "deprecated into {target}"),
            other => f.write_str(other.name()),
        }
    }
}

impl LabelVocabulary {
    #[must_use]
    pub fn from_config(config: &StoreSection) -> Self {
        Self {
            base: config.base_label.clone(),
            uid_prefix: config.uid_prefix.clone(),
            alias_prefix: config.alias_prefix.clone(),
            merged_prefix: config.merged_prefix.clone(),
            deprecated_by_prefix: config.deprecated_by_prefix.clone(),
            deprecated: config.deprecated_label.clone(),
            archived: config.archived_label.clone(),
        }
    }

    #[must_use]
    pub fn uid_label(&self, object_id: &str) -> String {
        format!("{}{object_id}", self.uid_prefix)
    }

    #[must_use]
    pub fn alias_label(&self, target_id: &str) -> String {
        format!("{}{target_id}", self.alias_prefix)
    }

    #[must_use]
    pub fn merged_label(&self, target_id: &str) -> String {
        format!("{}{target_id}", self.merged_prefix)
    }

    #[must_use]
    pub fn deprecated_by_label(&self, issue_number: u64) -> String {
        format!("{}{issue_number}", self.deprecated_by_prefix)
    }

    /// Object ID carried by the first `UID:` label, prefix stripped.
    #[must_use]
    pub fn object_id<'a>(&self, labels: &'a [String]) -> Option<&'a str> {
        labels
            .iter()
            .find_map(|l| l.strip_prefix(self.uid_prefix.as_str()))
    }

    /// Target of the `ALIAS-TO:` label, if any.
    #[must_use]
    pub fn alias_target<'a>(&self, labels: &'a [String]) -> Option<&'a str> {
        labels
            .iter()
            .find_map(|l| l.strip_prefix(self.alias_prefix.as_str()))
    }

    /// Object ID this ticket was merged into, if deprecated.
    #[must_use]
    pub fn merged_into<'a>(&self, labels: &'a [String]) -> Option<&'a str> {
        labels
            .iter()
            .find_map(|l| l.strip_prefix(self.merged_prefix.as_str()))
    }

    /// Object ID of an issue, or [`StoreError::MissingUid`].
    ///
    /// # Errors
    ///
    /// Fails when the issue has no UID label.
    pub fn require_object_id<'a>(&self, issue: &'a Issue) -> Result<&'a str> {
        self.object_id(&issue.labels)
            .ok_or(StoreError::MissingUid {
                issue_number: issue.number,
            })
    }

    /// Decode the role of `issue` from its labels.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RoleConflict`] when the labels claim more than
    /// one role, more than one UID, or more than one alias target.
    pub fn role(&self, issue: &Issue) -> Result<TicketRole> {
        let labels = &issue.labels;
        let uids = count_prefixed(labels, &self.uid_prefix);
        let alias_targets: Vec<&str> = labels
            .iter()
            .filter_map(|l| l.strip_prefix(self.alias_prefix.as_str()))
            .collect();
        let has_base = issue.has_label(&self.base);
        let merged_into = self.merged_into(labels);
        let deprecated_by = labels
            .iter()
            .find_map(|l| l.strip_prefix(self.deprecated_by_prefix.as_str()))
            .and_then(|n| n.parse::<u64>().ok());
        let deprecated = issue.has_label(&self.deprecated) || merged_into.is_some();

        let mut claimed = Vec::new();
        if uids > 1 {
            claimed.push(format!("{uids} UID labels"));
        }
        if alias_targets.len() > 1 {
            claimed.push(format!("{} alias targets", alias_targets.len()));
        }
        if deprecated && !alias_targets.is_empty() {
            claimed.push("deprecated+alias".to_string());
        }
        if deprecated && has_base {
            claimed.push("deprecated+stored".to_string());
        }
        if !claimed.is_empty() {
            return Err(StoreError::RoleConflict {
                issue_number: issue.number,
                roles: claimed.join(", "),
            });
        }

        let role = if let Some(target) = alias_targets.first() {
            TicketRole::Alias {
                target: (*target).to_string(),
            }
        } else if deprecated {
            TicketRole::Deprecated {
                merged_into: merged_into.map(str::to_string),
                deprecated_by,
            }
        } else if has_base {
            TicketRole::Stored
        } else if issue.has_label(&self.archived) {
            TicketRole::Archived
        } else {
            TicketRole::Unmanaged
        };
        Ok(role)
    }
}

fn count_prefixed(labels: &[String], prefix: &str) -> usize {
    labels.iter().filter(|l| l.starts_with(prefix)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::IssueState;
    use chrono::Utc;

    fn issue(labels: &[&str]) -> Issue {
        Issue {
            number: 7,
            title: "Stored Object: m".to_string(),
            body: Some("{}".to_string()),
            state: IssueState::Closed,
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
            author: Some("owner".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn formats_reference_labels() {
        let v = LabelVocabulary::default();
        assert_eq!(v.uid_label("metrics"), "UID:metrics");
        assert_eq!(v.alias_label("metrics"), "ALIAS-TO:metrics");
        assert_eq!(v.merged_label("metrics"), "MERGED-INTO:metrics");
        assert_eq!(v.deprecated_by_label(12), "DEPRECATED-BY:12");
    }

    #[test]
    fn extracts_object_id_without_prefix() {
        let v = LabelVocabulary::default();
        let i = issue(&["stored-object", "UID:daily-metrics"]);
        assert_eq!(v.object_id(&i.labels), Some("daily-metrics"));
        assert_eq!(v.require_object_id(&i).expect("uid"), "daily-metrics");
    }

    #[test]
    fn missing_uid_is_reported() {
        let v = LabelVocabulary::default();
        let i = issue(&["stored-object"]);
        assert!(matches!(
            v.require_object_id(&i),
            Err(StoreError::MissingUid { issue_number: 7 })
        ));
    }

    #[test]
    fn decodes_each_role() {
        let v = LabelVocabulary::default();
        assert_eq!(
            v.role(&issue(&["stored-object", "UID:m"])).expect("role"),
            TicketRole::Stored
        );
        assert_eq!(
            v.role(&issue(&["stored-object", "UID:dup", "ALIAS-TO:m"]))
                .expect("role"),
            TicketRole::Alias {
                target: "m".to_string()
            }
        );
        assert_eq!(
            v.role(&issue(&[
                "UID:m",
                "deprecated-object",
                "MERGED-INTO:m",
                "DEPRECATED-BY:3"
            ]))
            .expect("role"),
            TicketRole::Deprecated {
                merged_into: Some("m".to_string()),
                deprecated_by: Some(3),
            }
        );
        assert_eq!(
            v.role(&issue(&["archived", "UID:m"])).expect("role"),
            TicketRole::Archived
        );
        assert_eq!(v.role(&issue(&["bug"])).expect("role"), TicketRole::Unmanaged);
    }

    #[test]
    fn conflicting_roles_are_errors() {
        let v = LabelVocabulary::default();
        for labels in [
            &["stored-object", "UID:m", "deprecated-object"][..],
            &["UID:m", "ALIAS-TO:x", "MERGED-INTO:y"][..],
            &["stored-object", "UID:m", "UID:n"][..],
            &["UID:m", "ALIAS-TO:x", "ALIAS-TO:y"][..],
        ] {
            let err = v.role(&issue(labels)).expect_err("conflict expected");
            assert!(
                matches!(err, StoreError::RoleConflict { issue_number: 7, .. }),
                "labels {labels:?} gave {err}"
            );
        }
    }
}
