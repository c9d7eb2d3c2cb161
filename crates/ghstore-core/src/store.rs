//! Object store facade.
//!
//! [`ObjectStore`] ties the tracker, the label vocabulary, access control,
//! and the reconciliation engine together. The public surface is split over
//! three files: CRUD and listing live here, update processing in
//! [`crate::reconcile`], alias and deprecation handling in
//! [`crate::canonical`].
//!
//! Two advisory caches live on each store instance: the set of repository
//! labels known to exist, and an `object_id -> issue number` map. Either may
//! be dropped at any time with [`ObjectStore::invalidate_caches`].

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::access::AccessControl;
use crate::codec::{self, CommentKind, CommentMeta, DecodedComment, UpdateMode};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::labels::{LabelVocabulary, STORED_COLOR, TicketRole};
use crate::model::{HistoryEntry, ObjectMeta, StoredObject};
use crate::tracker::{
    Comment, Issue, IssueEdit, IssueQuery, IssueState, NewIssue, RetryPolicy, StateFilter,
    Tracker, TrackerError,
};

/// Title prefix of every object ticket.
pub const TITLE_PREFIX: &str = "Stored Object: ";

/// A label the store may need to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LabelSpec<'a> {
    pub name: String,
    pub color: &'a str,
    pub description: Option<&'a str>,
}

/// Key-value object store over a ticket tracker.
#[derive(Debug)]
pub struct ObjectStore<T: Tracker> {
    pub(crate) tracker: T,
    pub(crate) config: StoreConfig,
    pub(crate) labels: LabelVocabulary,
    pub(crate) retry: RetryPolicy,
    pub(crate) access: AccessControl,
    known_labels: RefCell<Option<HashSet<String>>>,
    issue_numbers: RefCell<HashMap<String, u64>>,
}

impl<T: Tracker> ObjectStore<T> {
    /// Build a store over `tracker`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Configuration`] if `config` fails validation.
    pub fn new(tracker: T, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let labels = LabelVocabulary::from_config(&config.store);
        let retry = RetryPolicy::from_config(&config.store.retries);
        Ok(Self {
            tracker,
            config,
            labels,
            retry,
            access: AccessControl::new(),
            known_labels: RefCell::new(None),
            issue_numbers: RefCell::new(HashMap::new()),
        })
    }

    /// Replace the retry policy derived from configuration.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn tracker(&self) -> &T {
        &self.tracker
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub const fn labels(&self) -> &LabelVocabulary {
        &self.labels
    }

    #[must_use]
    pub const fn access(&self) -> &AccessControl {
        &self.access
    }

    /// Drop every advisory cache: labels, issue numbers, and authorization.
    pub fn invalidate_caches(&self) {
        self.known_labels.borrow_mut().take();
        self.issue_numbers.borrow_mut().clear();
        self.access.invalidate();
    }

    // -----------------------------------------------------------------------
    // Facade
    // -----------------------------------------------------------------------

    /// Create an object and its ticket.
    ///
    /// The ticket is opened with the state in its body, receives an
    /// `initial_state` comment marked processed, and is closed.
    ///
    /// # Errors
    ///
    /// Tracker failures.
    pub fn create(&self, object_id: &str, data: Value) -> Result<StoredObject> {
        info!(object_id, "creating object");
        let uid = self.labels.uid_label(object_id);
        self.ensure_labels(&[
            LabelSpec {
                name: self.labels.base.clone(),
                color: STORED_COLOR,
                description: Some("Ticket backs a stored object"),
            },
            LabelSpec {
                name: uid.clone(),
                color: STORED_COLOR,
                description: None,
            },
        ])?;

        let new_issue = NewIssue {
            title: format!("{TITLE_PREFIX}{object_id}"),
            body: pretty(&data),
            labels: vec![self.labels.base.clone(), uid],
        };
        let issue = self.call("create_issue", |t| t.create_issue(&new_issue))?;

        let envelope = codec::encode_at(
            &data,
            &CommentKind::InitialState,
            UpdateMode::Append,
            Utc::now(),
            Some(issue.number),
        );
        let comment = self.post_comment(issue.number, &envelope)?;
        let reactions = &self.config.store.reactions;
        for content in [&reactions.processed, &reactions.initial_state] {
            self.call("add_reaction", |t| t.add_reaction(comment.id, content))?;
        }

        let closed = self.set_state(issue.number, IssueState::Closed)?;
        self.remember(object_id, issue.number);
        Ok(StoredObject {
            meta: ObjectMeta {
                object_id: object_id.to_string(),
                issue_number: issue.number,
                created_at: issue.created_at,
                updated_at: closed.updated_at,
                version: 1,
                canonical_id: None,
            },
            data,
        })
    }

    /// Read an object, following aliases and merging related tickets.
    ///
    /// # Errors
    ///
    /// `ObjectNotFound`, `DuplicateUid`, `RoleConflict`, or tracker failures.
    pub fn get(&self, object_id: &str) -> Result<StoredObject> {
        self.get_object(object_id, true)
    }

    /// Append an update for `object_id` and reopen its ticket.
    ///
    /// Fails with [`StoreError::ConcurrentUpdate`] while the target ticket is
    /// still open from an earlier update. The check and the write are two
    /// separate tracker calls; a concurrent writer can slip in between.
    ///
    /// # Errors
    ///
    /// `ConcurrentUpdate`, `ObjectNotFound`, or tracker failures.
    pub fn update(&self, object_id: &str, changes: Value) -> Result<StoredObject> {
        let (target, _) = self.write_target(object_id)?;
        if target.state == IssueState::Open {
            return Err(StoreError::ConcurrentUpdate {
                object_id: object_id.to_string(),
                issue_number: target.number,
            });
        }
        self.update_object(object_id, changes)
    }

    /// Archive an object: close the ticket, add the archive label, and drop
    /// the base label so listings skip it.
    ///
    /// # Errors
    ///
    /// `ObjectNotFound` or tracker failures.
    pub fn delete(&self, object_id: &str) -> Result<()> {
        info!(object_id, "deleting object");
        let issue = self.find_stored_issue(object_id)?;
        self.ensure_labels(&[LabelSpec {
            name: self.labels.archived.clone(),
            color: crate::labels::DEPRECATED_COLOR,
            description: Some("Deleted stored object"),
        }])?;
        if issue.state != IssueState::Closed {
            self.set_state(issue.number, IssueState::Closed)?;
        }
        let archived = vec![self.labels.archived.clone()];
        self.call("add_labels", |t| t.add_labels(issue.number, &archived))?;
        self.call("remove_label", |t| t.remove_label(issue.number, &self.labels.base))?;
        self.forget(object_id);
        Ok(())
    }

    /// Every live object, keyed by object ID.
    ///
    /// Only closed, canonical tickets are listed: archived, alias, and
    /// deprecated tickets are skipped, as are tickets with broken labels or
    /// bodies (logged at `warn`).
    ///
    /// # Errors
    ///
    /// Tracker failures.
    pub fn list_all(&self) -> Result<BTreeMap<String, StoredObject>> {
        let query = IssueQuery::labeled([self.labels.base.as_str()]).state(StateFilter::Closed);
        let objects = self.list_objects(&query, None)?;
        info!(count = objects.len(), "listed stored objects");
        Ok(objects)
    }

    /// Objects whose ticket changed strictly after `since`.
    ///
    /// # Errors
    ///
    /// Tracker failures.
    pub fn list_updated_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<BTreeMap<String, StoredObject>> {
        let query = IssueQuery::labeled([self.labels.base.as_str()])
            .state(StateFilter::Closed)
            .since(since);
        let objects = self.list_objects(&query, Some(since))?;
        info!(count = objects.len(), %since, "listed updated objects");
        Ok(objects)
    }

    /// Every decodable comment on the object's ticket, oldest first.
    ///
    /// Comments without an envelope get `client_version = "legacy"`
    /// metadata.
    ///
    /// # Errors
    ///
    /// `ObjectNotFound` or tracker failures.
    pub fn get_object_history(&self, object_id: &str) -> Result<Vec<HistoryEntry>> {
        let issue = self.find_stored_issue(object_id)?;
        let comments = self.call("list_comments", |t| t.list_comments(issue.number))?;
        let mut history = Vec::with_capacity(comments.len());
        for comment in comments {
            let decoded = match Self::decode_comment(issue.number, &comment) {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!(error = %err, "skipping undecodable comment in history");
                    continue;
                }
            };
            let meta = decoded
                .meta
                .unwrap_or_else(|| CommentMeta::legacy(comment.created_at));
            history.push(HistoryEntry {
                timestamp: comment.created_at,
                kind: decoded.kind.as_str().to_string(),
                data: decoded.data,
                comment_id: comment.id,
                metadata: serde_json::to_value(meta).unwrap_or(Value::Null),
            });
        }
        Ok(history)
    }

    // -----------------------------------------------------------------------
    // Shared helpers
    // -----------------------------------------------------------------------

    /// Run one tracker call under the retry policy.
    pub(crate) fn call<R>(
        &self,
        operation: &str,
        mut f: impl FnMut(&T) -> std::result::Result<R, TrackerError>,
    ) -> Result<R> {
        Ok(self.retry.run(operation, || f(&self.tracker))?)
    }

    /// The single non-archived ticket carrying `UID:<object_id>` and the base
    /// label. This is the object's own ticket, which may be an alias.
    pub(crate) fn find_stored_issue(&self, object_id: &str) -> Result<Issue> {
        let uid = self.labels.uid_label(object_id);
        if let Some(number) = self.cached_number(object_id) {
            match self.call("get_issue", |t| t.get_issue(number)) {
                Ok(issue) if issue.has_label(&uid) && issue.has_label(&self.labels.base) => {
                    return Ok(issue);
                }
                Ok(_) | Err(StoreError::Tracker(TrackerError::NotFound { .. })) => {
                    debug!(object_id, issue = number, "discarding stale issue cache entry");
                    self.forget(object_id);
                }
                Err(err) => return Err(err),
            }
        }

        let query = IssueQuery::labeled([self.labels.base.as_str(), uid.as_str()]);
        let mut issues = self.call("list_issues", |t| t.list_issues(&query))?;
        match issues.len() {
            0 => Err(StoreError::ObjectNotFound {
                object_id: object_id.to_string(),
            }),
            1 => {
                let issue = issues.remove(0);
                self.remember(object_id, issue.number);
                Ok(issue)
            }
            _ => Err(StoreError::DuplicateUid {
                object_id: object_id.to_string(),
                issue_numbers: issues.iter().map(|i| i.number).collect(),
            }),
        }
    }

    /// The ticket an update for `object_id` is written to, and the object ID
    /// that ticket belongs to. Canonical tickets are used directly; aliases
    /// and unknown IDs go through alias resolution.
    pub(crate) fn write_target(&self, object_id: &str) -> Result<(Issue, String)> {
        match self.find_stored_issue(object_id) {
            Ok(issue) => match self.labels.role(&issue)? {
                TicketRole::Stored => return Ok((issue, object_id.to_string())),
                role => debug!(object_id, %role, "object is not canonical, resolving"),
            },
            Err(StoreError::ObjectNotFound { .. }) => {}
            Err(err) => return Err(err),
        }
        let canonical = self.resolve_canonical_object_id(object_id)?;
        let issue = self.find_stored_issue(&canonical)?;
        Ok((issue, canonical))
    }

    /// Parse a ticket body. An empty body is an empty object.
    pub(crate) fn parse_body(issue: &Issue) -> Result<Value> {
        let body = issue.body.as_deref().unwrap_or("").trim();
        if body.is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(body).map_err(|e| StoreError::InvalidBody {
            issue_number: issue.number,
            reason: e.to_string(),
        })
    }

    /// Number of consumed update comments: processed, not the initial state.
    pub(crate) fn consumed_count(&self, comments: &[Comment]) -> u64 {
        let reactions = &self.config.store.reactions;
        let count = comments
            .iter()
            .filter(|c| c.has_reaction(&reactions.processed))
            .filter(|c| !c.has_reaction(&reactions.initial_state))
            .count();
        u64::try_from(count).unwrap_or(u64::MAX)
    }

    /// The ticket's own state, without alias resolution.
    pub(crate) fn literal_object(&self, issue: &Issue) -> Result<StoredObject> {
        let object_id = self.labels.require_object_id(issue)?.to_string();
        let data = Self::parse_body(issue)?;
        let comments = self.call("list_comments", |t| t.list_comments(issue.number))?;
        Ok(StoredObject {
            meta: ObjectMeta {
                object_id,
                issue_number: issue.number,
                created_at: issue.created_at,
                updated_at: issue.updated_at,
                version: self.consumed_count(&comments) + 1,
                canonical_id: None,
            },
            data,
        })
    }

    /// Decode one comment, attributing codec failures to its ticket.
    pub(crate) fn decode_comment(issue_number: u64, comment: &Comment) -> Result<DecodedComment> {
        codec::decode(&comment.body).map_err(|e| StoreError::InvalidUpdate {
            issue_number,
            comment_id: comment.id,
            reason: e.to_string(),
        })
    }

    pub(crate) fn post_comment(&self, issue_number: u64, envelope: &Value) -> Result<Comment> {
        let body = codec::to_body(envelope);
        self.call("create_comment", |t| t.create_comment(issue_number, &body))
    }

    pub(crate) fn set_state(&self, issue_number: u64, state: IssueState) -> Result<Issue> {
        let edit = IssueEdit {
            state: Some(state),
            ..IssueEdit::default()
        };
        self.call("edit_issue", |t| t.edit_issue(issue_number, &edit))
    }

    /// Create any of `specs` missing from the repository.
    pub(crate) fn ensure_labels(&self, specs: &[LabelSpec<'_>]) -> Result<()> {
        if self.known_labels.borrow().is_none() {
            let existing = self.call("list_labels", |t| t.list_labels())?;
            *self.known_labels.borrow_mut() = Some(existing.into_iter().collect());
        }
        for spec in specs {
            let known = self
                .known_labels
                .borrow()
                .as_ref()
                .is_some_and(|set| set.contains(&spec.name));
            if known {
                continue;
            }
            info!(label = %spec.name, "creating label");
            match self.call("create_label", |t| {
                t.create_label(&spec.name, spec.color, spec.description)
            }) {
                Ok(()) | Err(StoreError::Tracker(TrackerError::Api { status: 422, .. })) => {}
                Err(err) => return Err(err),
            }
            if let Some(set) = self.known_labels.borrow_mut().as_mut() {
                set.insert(spec.name.clone());
            }
        }
        Ok(())
    }

    pub(crate) fn remember(&self, object_id: &str, issue_number: u64) {
        self.issue_numbers
            .borrow_mut()
            .insert(object_id.to_string(), issue_number);
    }

    pub(crate) fn forget(&self, object_id: &str) {
        self.issue_numbers.borrow_mut().remove(object_id);
    }

    fn cached_number(&self, object_id: &str) -> Option<u64> {
        self.issue_numbers.borrow().get(object_id).copied()
    }

    fn list_objects(
        &self,
        query: &IssueQuery,
        changed_after: Option<DateTime<Utc>>,
    ) -> Result<BTreeMap<String, StoredObject>> {
        let issues = self.call("list_issues", |t| t.list_issues(query))?;
        let mut objects = BTreeMap::new();
        for issue in issues {
            if issue.has_label(&self.labels.archived) {
                continue;
            }
            if changed_after.is_some_and(|since| issue.updated_at <= since) {
                continue;
            }
            match self.labels.role(&issue) {
                Ok(TicketRole::Stored) => {}
                Ok(role) => {
                    debug!(issue = issue.number, %role, "skipping non-canonical ticket");
                    continue;
                }
                Err(err) => {
                    warn!(issue = issue.number, error = %err, "skipping ticket");
                    continue;
                }
            }
            match self.literal_object(&issue) {
                Ok(object) => {
                    self.remember(&object.meta.object_id, issue.number);
                    objects.insert(object.meta.object_id.clone(), object);
                }
                Err(err @ (StoreError::MissingUid { .. } | StoreError::InvalidBody { .. })) => {
                    warn!(issue = issue.number, error = %err, "skipping ticket");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(objects)
    }
}

/// Pretty-printed JSON, the ticket body format.
pub(crate) fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
