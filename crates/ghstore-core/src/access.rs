//! Who may change stored objects.
//!
//! The authorized set is the repository owner plus every user listed in the
//! first CODEOWNERS file found at [`CODEOWNERS_PATHS`]. `@org/team` entries
//! expand to the team's members; a team that cannot be resolved contributes
//! nobody. A CODEOWNERS file that cannot be read leaves the owner as the only
//! authorized actor.
//!
//! Both lookups are cached per [`AccessControl`] instance until
//! [`AccessControl::invalidate`] is called.

use std::cell::RefCell;
use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::tracker::{Comment, Issue, RetryPolicy, Tracker};

/// Locations searched for a CODEOWNERS file, in order.
pub const CODEOWNERS_PATHS: [&str; 3] = [".github/CODEOWNERS", "docs/CODEOWNERS", "CODEOWNERS"];

/// Owners named in a CODEOWNERS file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeOwners {
    pub users: BTreeSet<String>,
    /// `(org, team)` pairs.
    pub teams: BTreeSet<(String, String)>,
}

/// Parse CODEOWNERS text. Lines are `<pattern> @owner...`; blank lines,
/// `#` comments, and tokens without `@` are ignored.
#[must_use]
pub fn parse_codeowners(content: &str) -> CodeOwners {
    let mut owners = CodeOwners::default();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for token in line.split_whitespace().skip(1) {
            let Some(name) = token.strip_prefix('@') else {
                continue;
            };
            match name.split_once('/') {
                Some((org, team)) if !org.is_empty() && !team.is_empty() => {
                    owners.teams.insert((org.to_string(), team.to_string()));
                }
                Some(_) => {}
                None if !name.is_empty() => {
                    owners.users.insert(name.to_string());
                }
                None => {}
            }
        }
    }
    owners
}

/// Authorization decisions with per-instance caching.
#[derive(Debug, Default)]
pub struct AccessControl {
    owner: RefCell<Option<String>>,
    codeowners: RefCell<Option<BTreeSet<String>>>,
}

impl AccessControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop cached owner and CODEOWNERS data.
    pub fn invalidate(&self) {
        self.owner.borrow_mut().take();
        self.codeowners.borrow_mut().take();
    }

    /// Whether `actor` may submit changes. A missing actor never may.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures while looking up the repository owner.
    /// CODEOWNERS failures are not errors.
    pub fn is_authorized<T: Tracker>(
        &self,
        tracker: &T,
        retry: &RetryPolicy,
        actor: Option<&str>,
    ) -> Result<bool> {
        let Some(actor) = actor.filter(|a| !a.is_empty()) else {
            return Ok(false);
        };
        if self.owner(tracker, retry)? == actor {
            return Ok(true);
        }
        Ok(self.with_codeowners(tracker, retry, |set| set.contains(actor)))
    }

    /// Check the ticket's author.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures from [`Self::is_authorized`].
    pub fn validate_issue_creator<T: Tracker>(
        &self,
        tracker: &T,
        retry: &RetryPolicy,
        issue: &Issue,
    ) -> Result<bool> {
        let ok = self.is_authorized(tracker, retry, issue.author.as_deref())?;
        if !ok {
            warn!(
                issue = issue.number,
                author = issue.author.as_deref().unwrap_or("<unknown>"),
                "unauthorized issue creator"
            );
        }
        Ok(ok)
    }

    /// Check a comment's author.
    ///
    /// # Errors
    ///
    /// Propagates tracker failures from [`Self::is_authorized`].
    pub fn validate_comment_author<T: Tracker>(
        &self,
        tracker: &T,
        retry: &RetryPolicy,
        comment: &Comment,
    ) -> Result<bool> {
        let ok = self.is_authorized(tracker, retry, comment.author.as_deref())?;
        if !ok {
            warn!(
                comment_id = comment.id,
                author = comment.author.as_deref().unwrap_or("<unknown>"),
                "unauthorized comment author"
            );
        }
        Ok(ok)
    }

    /// Fail with [`StoreError::AccessDenied`] unless the ticket's author is
    /// authorized.
    ///
    /// # Errors
    ///
    /// `AccessDenied`, or tracker failures.
    pub fn require_issue_creator<T: Tracker>(
        &self,
        tracker: &T,
        retry: &RetryPolicy,
        issue: &Issue,
    ) -> Result<()> {
        if self.validate_issue_creator(tracker, retry, issue)? {
            Ok(())
        } else {
            Err(StoreError::AccessDenied {
                actor: issue
                    .author
                    .clone()
                    .unwrap_or_else(|| "<unknown>".to_string()),
                issue_number: issue.number,
                comment_id: None,
            })
        }
    }

    fn owner<T: Tracker>(&self, tracker: &T, retry: &RetryPolicy) -> Result<String> {
        if let Some(owner) = self.owner.borrow().as_ref() {
            return Ok(owner.clone());
        }
        let owner = retry.run("repository_owner", || tracker.repository_owner())?;
        *self.owner.borrow_mut() = Some(owner.clone());
        Ok(owner)
    }

    fn with_codeowners<T: Tracker, R>(
        &self,
        tracker: &T,
        retry: &RetryPolicy,
        f: impl FnOnce(&BTreeSet<String>) -> R,
    ) -> R {
        if let Some(set) = self.codeowners.borrow().as_ref() {
            return f(set);
        }
        let set = load_codeowners(tracker, retry);
        let result = f(&set);
        *self.codeowners.borrow_mut() = Some(set);
        result
    }
}

fn load_codeowners<T: Tracker>(tracker: &T, retry: &RetryPolicy) -> BTreeSet<String> {
    for path in CODEOWNERS_PATHS {
        match retry.run("file_contents", || tracker.file_contents(path)) {
            Ok(Some(content)) => {
                debug!(path, "loaded CODEOWNERS");
                return expand(tracker, retry, parse_codeowners(&content));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(path, error = %err, "could not read CODEOWNERS; only the owner is authorized");
                return BTreeSet::new();
            }
        }
    }
    debug!("no CODEOWNERS file found");
    BTreeSet::new()
}

fn expand<T: Tracker>(tracker: &T, retry: &RetryPolicy, owners: CodeOwners) -> BTreeSet<String> {
    let mut users = owners.users;
    for (org, team) in owners.teams {
        match retry.run("team_members", || tracker.team_members(&org, &team)) {
            Ok(members) => users.extend(members),
            Err(err) => {
                warn!(team = %format!("{org}/{team}"), error = %err, "could not resolve team members");
            }
        }
    }
    users
}
