//! Update reconciliation.
//!
//! # Algorithm
//!
//! [`ObjectStore::process_updates`] folds a ticket's pending comments into
//! its body:
//!
//! 1. Reject the pass if the ticket's author is not authorized.
//! 2. Skip every comment carrying the processed reaction.
//! 3. Decode the rest. Undecodable comments and comments by unauthorized
//!    authors are logged and skipped; they are not marked, so they are
//!    reconsidered on every later pass.
//! 4. Keep plain updates only (initial-state and `system_*` comments never
//!    change state) and order them by `(created_at, comment id)`.
//! 5. Starting from the body, apply each update: deep merge for `append`,
//!    wholesale replacement for `replace`.
//! 6. Write the body, mark every consumed comment processed, close the
//!    ticket.
//!
//! A pass with nothing to consume writes nothing, except closing a ticket
//! left open.

use tracing::{debug, info, warn};

use crate::codec::CommentKind;
use crate::error::Result;
use crate::merge;
use crate::model::{ObjectMeta, StoredObject, Update};
use crate::store::{ObjectStore, pretty};
use crate::tracker::{Comment, Issue, IssueEdit, IssueState, Tracker};

impl<T: Tracker> ObjectStore<T> {
    /// Apply every pending authorized update on ticket `issue_number`.
    ///
    /// Idempotent: a second call with no new comments returns the same
    /// state and version without writing.
    ///
    /// # Errors
    ///
    /// `AccessDenied` if the ticket's creator is not authorized,
    /// `MissingUid` / `RoleConflict` / `InvalidBody` for a malformed ticket,
    /// and tracker failures once retries are exhausted.
    pub fn process_updates(&self, issue_number: u64) -> Result<StoredObject> {
        info!(issue = issue_number, "processing updates");
        let issue = self.call("get_issue", |t| t.get_issue(issue_number))?;
        self.access
            .require_issue_creator(&self.tracker, &self.retry, &issue)?;
        self.labels.role(&issue)?;
        let object_id = self.labels.require_object_id(&issue)?.to_string();

        let comments = self.call("list_comments", |t| t.list_comments(issue_number))?;
        let previous_version = self.consumed_count(&comments) + 1;
        let updates = self.pending_updates(&issue, &comments)?;

        if updates.is_empty() {
            debug!(issue = issue_number, "nothing to process");
            let mut object = self.literal_object(&issue)?;
            if issue.state == IssueState::Open {
                let closed = self.set_state(issue_number, IssueState::Closed)?;
                object.meta.updated_at = closed.updated_at;
            }
            return Ok(object);
        }

        let mut state = Self::parse_body(&issue)?;
        for update in &updates {
            merge::apply(&mut state, update.data.clone(), update.mode);
        }

        let edit = IssueEdit {
            body: Some(pretty(&state)),
            state: None,
        };
        self.call("edit_issue", |t| t.edit_issue(issue_number, &edit))?;
        let processed = &self.config.store.reactions.processed;
        for update in &updates {
            self.call("add_reaction", |t| t.add_reaction(update.comment_id, processed))?;
        }
        let closed = self.set_state(issue_number, IssueState::Closed)?;

        let consumed = u64::try_from(updates.len()).unwrap_or(u64::MAX);
        info!(
            issue = issue_number,
            object_id = %object_id,
            consumed,
            "applied updates"
        );
        self.remember(&object_id, issue_number);
        Ok(StoredObject {
            meta: ObjectMeta {
                object_id,
                issue_number,
                created_at: issue.created_at,
                updated_at: closed.updated_at,
                version: previous_version + consumed,
                canonical_id: None,
            },
            data: state,
        })
    }

    /// Decoded, authorized, unprocessed updates on `issue`, in apply order.
    ///
    /// # Errors
    ///
    /// Tracker failures during the authorization lookup.
    pub fn pending_updates(&self, issue: &Issue, comments: &[Comment]) -> Result<Vec<Update>> {
        let processed = &self.config.store.reactions.processed;
        let mut updates = Vec::new();
        for comment in comments.iter().filter(|c| !c.has_reaction(processed)) {
            let decoded = match Self::decode_comment(issue.number, comment) {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!(error = %err, "skipping undecodable comment");
                    continue;
                }
            };
            if decoded.kind != CommentKind::Update {
                debug!(
                    issue = issue.number,
                    comment_id = comment.id,
                    kind = %decoded.kind,
                    "skipping non-update comment"
                );
                continue;
            }
            if !self
                .access
                .validate_comment_author(&self.tracker, &self.retry, comment)?
            {
                continue;
            }
            updates.push(Update {
                issue_number: issue.number,
                comment_id: comment.id,
                timestamp: comment.created_at,
                data: decoded.data,
                mode: decoded.mode,
            });
        }
        updates.sort_by_key(|u| (u.timestamp, u.comment_id));
        Ok(updates)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use crate::codec::{CommentKind, UpdateMode, encode, to_body};
    use crate::config::StoreConfig;
    use crate::error::StoreError;
    use crate::store::ObjectStore;
    use crate::tracker::memory::MemoryTracker;
    use crate::tracker::{IssueEdit, IssueState, RetryPolicy, Tracker};

    fn store() -> ObjectStore<MemoryTracker> {
        ObjectStore::new(MemoryTracker::new("owner"), StoreConfig::default())
            .expect("store")
            .with_retry_policy(RetryPolicy::immediate(3))
    }

    fn post(store: &ObjectStore<MemoryTracker>, issue: u64, data: Value, mode: UpdateMode) -> u64 {
        let body = to_body(&encode(&data, &CommentKind::Update, mode));
        let comment = store
            .tracker()
            .create_comment(issue, &body)
            .expect("comment");
        store
            .tracker()
            .edit_issue(
                issue,
                &IssueEdit {
                    state: Some(IssueState::Open),
                    ..IssueEdit::default()
                },
            )
            .expect("reopen");
        comment.id
    }

    #[test]
    fn applies_updates_and_bumps_version() {
        let store = store();
        let n = store.create("m", json!({"count": 0})).expect("create").meta.issue_number;
        post(&store, n, json!({"count": 1}), UpdateMode::Append);

        let obj = store.process_updates(n).expect("process");
        assert_eq!(obj.data, json!({"count": 1}));
        assert_eq!(obj.meta.version, 2);
        assert_eq!(
            store.tracker().issue(n).expect("issue").state,
            IssueState::Closed
        );
    }

    #[test]
    fn legacy_bare_comments_are_appended() {
        let store = store();
        let n = store.create("m", json!({"a": {"x": 1}})).expect("create").meta.issue_number;
        store
            .tracker()
            .create_comment(n, r#"{"a": {"y": 2}}"#)
            .expect("comment");
        let obj = store.process_updates(n).expect("process");
        assert_eq!(obj.data, json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let store = store();
        let n = store.create("m", json!({})).expect("create").meta.issue_number;
        post(&store, n, json!({"a": 1}), UpdateMode::Append);
        let first = store.process_updates(n).expect("first");
        let edits = store.tracker().calls("edit_issue");
        let second = store.process_updates(n).expect("second");
        assert_eq!(first, second);
        assert_eq!(store.tracker().calls("edit_issue"), edits);
    }

    #[test]
    fn bad_comments_are_skipped_but_left_unmarked() {
        let store = store();
        let n = store.create("m", json!({})).expect("create").meta.issue_number;
        let junk = store.tracker().create_comment(n, "not json").expect("comment");
        post(&store, n, json!({"ok": true}), UpdateMode::Append);

        let obj = store.process_updates(n).expect("process");
        assert_eq!(obj.data, json!({"ok": true}));
        let junk_now = store
            .tracker()
            .comments(n)
            .into_iter()
            .find(|c| c.id == junk.id)
            .expect("junk comment");
        assert!(junk_now.reactions.is_empty());
    }

    #[test]
    fn unauthorized_creator_is_rejected() {
        let store = store();
        store.tracker().set_actor("mallory");
        let issue = store
            .tracker()
            .create_issue(&crate::tracker::NewIssue {
                title: "Stored Object: evil".to_string(),
                body: "{}".to_string(),
                labels: vec!["stored-object".to_string(), "UID:evil".to_string()],
            })
            .expect("issue");
        let err = store.process_updates(issue.number).expect_err("denied");
        assert!(matches!(
            err,
            StoreError::AccessDenied { ref actor, issue_number, comment_id: None }
                if actor == "mallory" && issue_number == issue.number
        ));
    }

    #[test]
    fn updates_apply_in_creation_order() {
        let store = store();
        let n = store.create("m", json!({})).expect("create").meta.issue_number;
        post(&store, n, json!({"v": 1}), UpdateMode::Append);
        post(&store, n, json!({"v": 2}), UpdateMode::Append);
        post(&store, n, json!({"v": 3, "w": 1}), UpdateMode::Replace);
        let obj = store.process_updates(n).expect("process");
        assert_eq!(obj.data, json!({"v": 3, "w": 1}));
        assert_eq!(obj.meta.version, 4);
    }

    #[test]
    fn open_ticket_without_updates_is_closed() {
        let store = store();
        let n = store.create("m", json!({"a": 1})).expect("create").meta.issue_number;
        store
            .tracker()
            .edit_issue(
                n,
                &IssueEdit {
                    state: Some(IssueState::Open),
                    ..IssueEdit::default()
                },
            )
            .expect("reopen");
        let obj = store.process_updates(n).expect("process");
        assert_eq!(obj.data, json!({"a": 1}));
        assert_eq!(obj.meta.version, 1);
        assert_eq!(
            store.tracker().issue(n).expect("issue").state,
            IssueState::Closed
        );
    }
}
