//! Aliases, deprecation, and virtual merge.
//!
//! One logical object may be spread over several tickets:
//!
//! - the **canonical** ticket, which holds the merged state;
//! - **alias** tickets labelled `ALIAS-TO:<canonical>`, which redirect reads
//!   and writes;
//! - **deprecated** tickets labelled `MERGED-INTO:<canonical>`, former
//!   canonical tickets kept for their history.
//!
//! # Algorithm
//!
//! Resolution walks alias labels from the requested ID (and `MERGED-INTO:`
//! labels of IDs with no live ticket left), tracking the IDs seen on this
//! walk. It stops at an ID without an alias label, at the depth
//! limit, or right before revisiting an ID; in the last two cases the last
//! distinct ID reached is returned.
//!
//! Virtual merge gathers the comments of the canonical ticket and every
//! alias and deprecated ticket pointing at it, orders them by creation time,
//! and replays every authorized update over the canonical ticket's initial
//! state (or its body when no initial-state comment exists). Processed
//! markers are ignored: the replay always starts from the initial state.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::codec::{self, CommentKind, UpdateMode};
use crate::error::{Result, StoreError};
use crate::labels::{ALIAS_COLOR, DEPRECATED_COLOR, MERGED_COLOR, TicketRole};
use crate::merge;
use crate::model::{
    AliasEntry, AliasLink, CollectedComment, DedupOutcome, DeprecationOutcome,
    DeprecationReason, DuplicateGroup, ObjectMeta, StoredObject,
};
use crate::store::{LabelSpec, ObjectStore, pretty};
use crate::tracker::{Issue, IssueEdit, IssueQuery, IssueState, Tracker};

impl<T: Tracker> ObjectStore<T> {
    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Resolve `object_id` with the configured alias depth limit.
    ///
    /// # Errors
    ///
    /// `RoleConflict` on a malformed ticket, or tracker failures.
    pub fn resolve_canonical_object_id(&self, object_id: &str) -> Result<String> {
        self.resolve_canonical_id(object_id, self.config.store.aliases.max_depth)
    }

    /// Follow alias labels from `object_id` for at most `max_depth` hops.
    ///
    /// An ID with no alias label, including an unknown ID, is its own
    /// canonical form.
    ///
    /// # Errors
    ///
    /// `RoleConflict` on a malformed ticket, or tracker failures.
    pub fn resolve_canonical_id(&self, object_id: &str, max_depth: u32) -> Result<String> {
        let mut current = object_id.to_string();
        let mut visited = HashSet::from([current.clone()]);
        let mut remaining = max_depth;
        loop {
            if remaining == 0 {
                warn!(object_id, reached = %current, max_depth, "alias depth limit reached");
                return Ok(current);
            }
            let Some(next) = self.alias_target_of(&current)? else {
                return Ok(current);
            };
            if !visited.insert(next.clone()) {
                warn!(object_id, reached = %current, next = %next, "alias cycle detected");
                return Ok(current);
            }
            debug!(from = %current, to = %next, "following alias");
            current = next;
            remaining -= 1;
        }
    }

    /// Next hop from `object_id`: its alias target, or the merge target when
    /// every ticket carrying the ID has been deprecated into another object.
    fn alias_target_of(&self, object_id: &str) -> Result<Option<String>> {
        let query = IssueQuery::labeled([self.labels.uid_label(object_id)]);
        let issues = self.call("list_issues", |t| t.list_issues(&query))?;
        let mut live = false;
        let mut merged = None;
        for issue in &issues {
            match self.labels.role(issue)? {
                TicketRole::Alias { target } => return Ok(Some(target)),
                TicketRole::Stored => live = true,
                TicketRole::Deprecated {
                    merged_into: Some(target),
                    ..
                } if target != object_id => {
                    merged.get_or_insert(target);
                }
                _ => {}
            }
        }
        Ok(if live { None } else { merged })
    }

    // -----------------------------------------------------------------------
    // Virtual merge
    // -----------------------------------------------------------------------

    /// Comments of the canonical ticket for `object_id` and of every alias
    /// or deprecated ticket pointing at it, oldest first.
    ///
    /// # Errors
    ///
    /// `ObjectNotFound` when the canonical ticket is missing, or tracker
    /// failures.
    pub fn collect_all_comments(&self, object_id: &str) -> Result<Vec<CollectedComment>> {
        let canonical = self.resolve_canonical_object_id(object_id)?;
        let issue = self.find_stored_issue(&canonical)?;
        self.collect_for(&canonical, &issue)
    }

    fn collect_for(&self, canonical_id: &str, canonical: &Issue) -> Result<Vec<CollectedComment>> {
        let mut seen = BTreeSet::from([canonical.number]);
        let mut sources = vec![(canonical.number, canonical_id.to_string())];
        for label in [
            self.labels.alias_label(canonical_id),
            self.labels.merged_label(canonical_id),
        ] {
            let query = IssueQuery::labeled([label]);
            for related in self.call("list_issues", |t| t.list_issues(&query))? {
                if !seen.insert(related.number) {
                    continue;
                }
                match self.labels.object_id(&related.labels) {
                    Some(id) => sources.push((related.number, id.to_string())),
                    None => warn!(issue = related.number, "related ticket has no UID label"),
                }
            }
        }

        let mut collected = Vec::new();
        for (number, source_object_id) in sources {
            let comments = self.call("list_comments", |t| t.list_comments(number))?;
            collected.extend(comments.into_iter().map(|comment| CollectedComment {
                comment,
                source_issue: number,
                source_object_id: source_object_id.clone(),
            }));
        }
        collected.sort_by_key(CollectedComment::order_key);
        Ok(collected)
    }

    /// Rebuild the canonical state of `object_id` from every related
    /// ticket's comments and store it in the canonical ticket's body.
    ///
    /// The body is only rewritten while the canonical ticket is closed and
    /// the merged state differs from it.
    ///
    /// `version` counts only the authorized `update` comments applied, plus
    /// one; initial-state, `system_*`, undecodable and unauthorized comments
    /// do not count, matching [`Self::process_updates`].
    ///
    /// # Errors
    ///
    /// `ObjectNotFound`, `InvalidBody`, or tracker failures.
    pub fn process_with_virtual_merge(&self, object_id: &str) -> Result<StoredObject> {
        let canonical = self.resolve_canonical_object_id(object_id)?;
        self.merge_canonical(&canonical)
    }

    fn merge_canonical(&self, canonical_id: &str) -> Result<StoredObject> {
        let issue = self.find_stored_issue(canonical_id)?;
        self.merge_into(canonical_id, &issue)
    }

    /// Virtual merge onto a known canonical ticket, without a UID lookup.
    fn merge_into(&self, canonical_id: &str, issue: &Issue) -> Result<StoredObject> {
        let collected = self.collect_for(canonical_id, issue)?;

        let initial = collected
            .iter()
            .filter(|c| c.source_issue == issue.number)
            .filter_map(|c| codec::decode(&c.comment.body).ok())
            .find(|d| d.kind == CommentKind::InitialState);
        let mut state = match initial {
            Some(decoded) => decoded.data,
            None => {
                debug!(issue = issue.number, "no initial state comment, starting from body");
                Self::parse_body(issue)?
            }
        };

        let mut applied = 0_u64;
        let mut updated_at = issue.updated_at;
        for entry in &collected {
            let comment = &entry.comment;
            let decoded = match Self::decode_comment(entry.source_issue, comment) {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!(error = %err, "skipping undecodable comment");
                    continue;
                }
            };
            if decoded.kind != CommentKind::Update {
                continue;
            }
            if !self
                .access
                .validate_comment_author(&self.tracker, &self.retry, comment)?
            {
                continue;
            }
            merge::apply(&mut state, decoded.data, decoded.mode);
            applied += 1;
            updated_at = updated_at.max(comment.created_at);
        }

        let stale = Self::parse_body(issue).ok().as_ref() != Some(&state);
        if stale && issue.state == IssueState::Closed {
            debug!(issue = issue.number, "writing merged state");
            let edit = IssueEdit {
                body: Some(pretty(&state)),
                state: None,
            };
            let edited = self.call("edit_issue", |t| t.edit_issue(issue.number, &edit))?;
            updated_at = edited.updated_at;
        }

        Ok(StoredObject {
            meta: ObjectMeta {
                object_id: canonical_id.to_string(),
                issue_number: issue.number,
                created_at: issue.created_at,
                updated_at,
                version: applied + 1,
                canonical_id: None,
            },
            data: state,
        })
    }

    // -----------------------------------------------------------------------
    // Reads and writes through aliases
    // -----------------------------------------------------------------------

    /// Read an object.
    ///
    /// With `canonicalize`, aliases are followed and the state is the
    /// virtual merge of the canonical object; `meta.object_id` stays the
    /// requested ID and `meta.canonical_id` names the canonical one. Without
    /// it, the ticket carrying the requested ID is returned as stored.
    ///
    /// # Errors
    ///
    /// `ObjectNotFound`, `DuplicateUid`, `RoleConflict`, `InvalidBody`, or
    /// tracker failures.
    pub fn get_object(&self, object_id: &str, canonicalize: bool) -> Result<StoredObject> {
        if !canonicalize {
            let issue = self.find_stored_issue(object_id)?;
            return self.literal_object(&issue);
        }
        let canonical = self.resolve_canonical_object_id(object_id)?;
        let mut object = self.merge_canonical(&canonical)?;
        if canonical != object_id {
            info!(object_id, canonical = %canonical, "resolved alias");
            object.meta.object_id = object_id.to_string();
            object.meta.canonical_id = Some(canonical);
        }
        Ok(object)
    }

    /// Append an update comment and reopen the ticket. Updates addressed to
    /// an alias land on the canonical ticket.
    ///
    /// # Errors
    ///
    /// `ObjectNotFound` or tracker failures.
    pub fn update_object(&self, object_id: &str, changes: Value) -> Result<StoredObject> {
        let (issue, target_id) = self.write_target(object_id)?;
        if target_id == object_id {
            info!(object_id, issue = issue.number, "appending update");
        } else {
            info!(object_id, canonical = %target_id, issue = issue.number, "redirecting update to canonical ticket");
        }
        let envelope = codec::encode_at(
            &changes,
            &CommentKind::Update,
            UpdateMode::Append,
            Utc::now(),
            Some(issue.number),
        );
        self.post_comment(issue.number, &envelope)?;
        self.set_state(issue.number, IssueState::Open)?;
        self.get_object(object_id, true)
    }

    // -----------------------------------------------------------------------
    // Aliases
    // -----------------------------------------------------------------------

    /// Make `source_id` an alias of `target_id`.
    ///
    /// # Errors
    ///
    /// `ObjectNotFound` if either object is missing, `AlreadyAlias` if the
    /// source already redirects, `SelfReference` if both IDs name the same
    /// ticket, or tracker failures. When writing the audit comments fails,
    /// the alias label is removed again before the error is returned.
    pub fn create_alias(&self, source_id: &str, target_id: &str) -> Result<AliasLink> {
        let source = self.find_stored_issue(source_id)?;
        if let TicketRole::Alias { target } = self.labels.role(&source)? {
            return Err(StoreError::AlreadyAlias {
                object_id: source_id.to_string(),
                target_id: target,
            });
        }
        let target = self.find_stored_issue(target_id)?;
        if source.number == target.number {
            return Err(StoreError::SelfReference {
                object_id: source_id.to_string(),
                issue_number: source.number,
            });
        }

        let alias_label = self.labels.alias_label(target_id);
        self.ensure_labels(&[LabelSpec {
            name: alias_label.clone(),
            color: ALIAS_COLOR,
            description: Some("Alias of another stored object"),
        }])?;
        info!(source_id, target_id, "creating alias");
        let added = vec![alias_label.clone()];
        self.call("add_labels", |t| t.add_labels(source.number, &added))?;

        let audit = self
            .post_system(
                source.number,
                "alias",
                json!({ "alias_to": target_id }),
            )
            .and_then(|()| {
                self.post_system(
                    target.number,
                    "alias_reference",
                    json!({ "aliased_by": source_id }),
                )
            });
        if let Err(err) = audit {
            warn!(source_id, error = %err, "alias audit failed, removing alias label");
            if let Err(rollback) =
                self.call("remove_label", |t| t.remove_label(source.number, &alias_label))
            {
                warn!(source_id, error = %rollback, "could not remove alias label");
            }
            return Err(err);
        }

        Ok(AliasLink {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            source_issue: source.number,
            target_issue: target.number,
        })
    }

    /// Alias tickets, optionally only those pointing at `target_id`.
    ///
    /// # Errors
    ///
    /// `RoleConflict` on a malformed ticket, or tracker failures.
    pub fn find_aliases(&self, target_id: Option<&str>) -> Result<Vec<AliasEntry>> {
        let query = match target_id {
            Some(target) => IssueQuery::labeled([self.labels.alias_label(target)]),
            None => IssueQuery::labeled([self.labels.base.clone()]),
        };
        let issues = self.call("list_issues", |t| t.list_issues(&query))?;
        let mut aliases = Vec::new();
        for issue in issues {
            let TicketRole::Alias { target } = self.labels.role(&issue)? else {
                continue;
            };
            let Some(alias_id) = self.labels.object_id(&issue.labels) else {
                warn!(issue = issue.number, "alias ticket has no UID label");
                continue;
            };
            aliases.push(AliasEntry {
                alias_id: alias_id.to_string(),
                target_id: target,
                issue_number: issue.number,
            });
        }
        aliases.sort_by(|a, b| a.alias_id.cmp(&b.alias_id));
        Ok(aliases)
    }

    // -----------------------------------------------------------------------
    // Deprecation
    // -----------------------------------------------------------------------

    /// Fold object `object_id` into `target_id`.
    ///
    /// `target_id` is resolved through aliases first, so the history lands on
    /// the ticket that holds the target's state.
    ///
    /// # Errors
    ///
    /// `SelfReference` when both IDs name the same ticket, `ObjectNotFound`,
    /// or whatever [`Self::deprecate_issue`] reports.
    pub fn deprecate_object(
        &self,
        object_id: &str,
        target_id: &str,
        reason: DeprecationReason,
    ) -> Result<DeprecationOutcome> {
        let source = self.find_stored_issue(object_id)?;
        let target_id = self.resolve_canonical_object_id(target_id)?;
        let target = self.find_stored_issue(&target_id)?;
        if source.number == target.number {
            return Err(StoreError::SelfReference {
                object_id: object_id.to_string(),
                issue_number: source.number,
            });
        }
        self.deprecate_issue(source.number, target.number, reason)
    }

    /// Fold ticket `issue_number` into ticket `target_issue`.
    ///
    /// Both tickets must be plain stored tickets. The source loses the base
    /// label and gains the deprecated, `MERGED-INTO:` and `DEPRECATED-BY:`
    /// labels. If adding those fails, the base label is put back (best
    /// effort) and the error returned. Both tickets get an audit comment and
    /// the target is re-merged.
    ///
    /// # Errors
    ///
    /// `SelfReference`, `AlreadyAlias` if the source is an alias,
    /// `ObjectNotFound` if either ticket is not a stored ticket, `MissingUid`,
    /// `RoleConflict`, or tracker failures.
    pub fn deprecate_issue(
        &self,
        issue_number: u64,
        target_issue: u64,
        reason: DeprecationReason,
    ) -> Result<DeprecationOutcome> {
        let outcome = self.retire_issue(issue_number, target_issue, reason)?;
        let target = self.call("get_issue", |t| t.get_issue(target_issue))?;
        self.merge_into(&outcome.target_object_id, &target)?;
        Ok(outcome)
    }

    /// Label and audit half of [`Self::deprecate_issue`]; does not merge.
    fn retire_issue(
        &self,
        issue_number: u64,
        target_issue: u64,
        reason: DeprecationReason,
    ) -> Result<DeprecationOutcome> {
        let source = self.call("get_issue", |t| t.get_issue(issue_number))?;
        let source_id = self.labels.require_object_id(&source)?.to_string();
        if issue_number == target_issue {
            return Err(StoreError::SelfReference {
                object_id: source_id,
                issue_number,
            });
        }
        self.require_stored(&source, &source_id)?;
        let target = self.call("get_issue", |t| t.get_issue(target_issue))?;
        let target_id = self.labels.require_object_id(&target)?.to_string();
        self.require_stored(&target, &target_id)?;

        let merged = self.labels.merged_label(&target_id);
        let deprecated_by = self.labels.deprecated_by_label(target_issue);
        self.ensure_labels(&[
            LabelSpec {
                name: self.labels.deprecated.clone(),
                color: DEPRECATED_COLOR,
                description: Some("Deprecated objects that have been merged into others"),
            },
            LabelSpec {
                name: merged.clone(),
                color: MERGED_COLOR,
                description: None,
            },
            LabelSpec {
                name: deprecated_by.clone(),
                color: DEPRECATED_COLOR,
                description: None,
            },
        ])?;

        info!(
            issue = issue_number,
            target = target_issue,
            %reason,
            "deprecating ticket"
        );
        self.call("remove_label", |t| t.remove_label(issue_number, &self.labels.base))?;
        let markers = vec![self.labels.deprecated.clone(), merged, deprecated_by];
        if let Err(err) = self.call("add_labels", |t| t.add_labels(issue_number, &markers)) {
            let base = vec![self.labels.base.clone()];
            if let Err(rollback) = self.call("add_labels", |t| t.add_labels(issue_number, &base)) {
                warn!(issue = issue_number, error = %rollback, "could not restore base label");
            }
            return Err(err);
        }
        self.forget(&source_id);

        self.post_system(
            issue_number,
            "deprecation",
            json!({
                "status": "deprecated",
                "canonical_object_id": target_id,
                "deprecated_by": target_issue,
                "reason": reason,
            }),
        )?;
        self.post_system(
            target_issue,
            "reference",
            json!({
                "status": "merged_reference",
                "merged_object_id": source_id,
                "source_issue": issue_number,
                "reason": reason,
            }),
        )?;

        Ok(DeprecationOutcome {
            source_issue: issue_number,
            source_object_id: source_id,
            target_issue,
            target_object_id: target_id,
            reason,
        })
    }

    /// Only plain stored tickets may be deprecated or absorb another ticket.
    fn require_stored(&self, issue: &Issue, object_id: &str) -> Result<()> {
        match self.labels.role(issue)? {
            TicketRole::Stored => Ok(()),
            TicketRole::Alias { target } => Err(StoreError::AlreadyAlias {
                object_id: object_id.to_string(),
                target_id: target,
            }),
            role => {
                debug!(issue = issue.number, %role, "ticket is not a stored object");
                Err(StoreError::ObjectNotFound {
                    object_id: format!("{object_id} (issue #{})", issue.number),
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Duplicates
    // -----------------------------------------------------------------------

    /// Groups of live tickets sharing one UID label, oldest ticket first.
    ///
    /// # Errors
    ///
    /// Tracker failures.
    pub fn find_duplicates(&self) -> Result<Vec<DuplicateGroup>> {
        let query = IssueQuery::labeled([self.labels.base.clone()]);
        let issues = self.call("list_issues", |t| t.list_issues(&query))?;
        let mut groups: BTreeMap<String, Vec<Issue>> = BTreeMap::new();
        for issue in issues {
            match self.labels.object_id(&issue.labels) {
                Some(id) => groups.entry(id.to_string()).or_default().push(issue),
                None => warn!(issue = issue.number, "stored ticket has no UID label"),
            }
        }
        Ok(groups
            .into_iter()
            .filter(|(_, issues)| issues.len() > 1)
            .map(|(object_id, mut issues)| {
                issues.sort_by_key(|i| (i.created_at, i.number));
                DuplicateGroup {
                    object_id,
                    issue_numbers: issues.iter().map(|i| i.number).collect(),
                }
            })
            .collect())
    }

    /// Collapse the tickets sharing `object_id` into one.
    ///
    /// The oldest ticket is kept unless `canonical_issue` picks another
    /// member of the group; every other member is deprecated into it as a
    /// duplicate, then the kept ticket is merged once. Every member is
    /// checked before any label changes. A tracker failure part way leaves
    /// the members retired so far deprecated; running again finishes the job.
    ///
    /// # Errors
    ///
    /// `ObjectNotFound` if no ticket carries the ID or `canonical_issue` is
    /// not in the group, `AlreadyAlias` if a member is an alias ticket, plus
    /// anything [`Self::deprecate_issue`] reports.
    pub fn deduplicate_object(
        &self,
        object_id: &str,
        canonical_issue: Option<u64>,
    ) -> Result<DedupOutcome> {
        let query = IssueQuery::labeled([
            self.labels.base.clone(),
            self.labels.uid_label(object_id),
        ]);
        let mut issues = self.call("list_issues", |t| t.list_issues(&query))?;
        issues.sort_by_key(|i| (i.created_at, i.number));
        let not_found = || StoreError::ObjectNotFound {
            object_id: object_id.to_string(),
        };

        let canonical = match canonical_issue {
            Some(number) => issues
                .iter()
                .find(|i| i.number == number)
                .map(|i| i.number)
                .ok_or_else(|| StoreError::ObjectNotFound {
                    object_id: format!("{object_id} (issue #{number})"),
                })?,
            None => issues.first().map(|i| i.number).ok_or_else(not_found)?,
        };

        for issue in &issues {
            self.require_stored(issue, object_id)?;
        }

        let mut deprecated = Vec::new();
        for issue in issues.iter().filter(|i| i.number != canonical) {
            self.retire_issue(issue.number, canonical, DeprecationReason::Duplicate)?;
            deprecated.push(issue.number);
        }
        if deprecated.is_empty() {
            debug!(object_id, "no duplicates to collapse");
        } else {
            info!(object_id, canonical, count = deprecated.len(), "collapsed duplicates");
            let target = self.call("get_issue", |t| t.get_issue(canonical))?;
            self.merge_into(object_id, &target)?;
        }
        self.remember(object_id, canonical);
        Ok(DedupOutcome {
            object_id: object_id.to_string(),
            canonical_issue: canonical,
            deprecated_issues: deprecated,
        })
    }

    /// Run [`Self::deduplicate_object`] for every duplicate group.
    ///
    /// # Errors
    ///
    /// The first failure stops the run.
    pub fn deduplicate_all(&self) -> Result<Vec<DedupOutcome>> {
        self.find_duplicates()?
            .into_iter()
            .map(|group| self.deduplicate_object(&group.object_id, None))
            .collect()
    }

    fn post_system(&self, issue_number: u64, name: &str, data: Value) -> Result<()> {
        let envelope = codec::encode_at(
            &data,
            &CommentKind::system(name),
            UpdateMode::Append,
            Utc::now(),
            Some(issue_number),
        );
        self.post_comment(issue_number, &envelope).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::tracker::RetryPolicy;
    use crate::tracker::memory::MemoryTracker;

    fn store() -> ObjectStore<MemoryTracker> {
        ObjectStore::new(MemoryTracker::new("owner"), StoreConfig::default())
            .expect("store")
            .with_retry_policy(RetryPolicy::immediate(3))
    }

    #[test]
    fn plain_object_is_its_own_canonical_form() {
        let store = store();
        store.create("a", json!({})).expect("create");
        assert_eq!(store.resolve_canonical_object_id("a").expect("resolve"), "a");
        assert_eq!(store.resolve_canonical_object_id("unknown").expect("resolve"), "unknown");
    }

    #[test]
    fn chains_resolve_to_the_end() {
        let store = store();
        for id in ["a", "b", "c"] {
            store.create(id, json!({})).expect("create");
        }
        store.create_alias("a", "b").expect("alias");
        store.create_alias("b", "c").expect("alias");
        assert_eq!(store.resolve_canonical_object_id("a").expect("resolve"), "c");
        assert_eq!(store.resolve_canonical_id("a", 1).expect("resolve"), "b");
        assert_eq!(store.resolve_canonical_id("a", 0).expect("resolve"), "a");
    }

    #[test]
    fn already_alias_is_rejected() {
        let store = store();
        for id in ["a", "b", "c"] {
            store.create(id, json!({})).expect("create");
        }
        store.create_alias("a", "b").expect("alias");
        match store.create_alias("a", "c") {
            Err(StoreError::AlreadyAlias { object_id, target_id }) => {
                assert_eq!(object_id, "a");
                assert_eq!(target_id, "b");
            }
            other => panic!("expected AlreadyAlias, got {other:?}"),
        }
    }

    #[test]
    fn alias_to_missing_object_is_not_found() {
        let store = store();
        store.create("a", json!({})).expect("create");
        assert!(matches!(
            store.create_alias("a", "ghost"),
            Err(StoreError::ObjectNotFound { object_id }) if object_id == "ghost"
        ));
        assert!(matches!(
            store.create_alias("ghost", "a"),
            Err(StoreError::ObjectNotFound { .. })
        ));
    }

    #[test]
    fn alias_writes_audit_comments() {
        let store = store();
        let a = store.create("a", json!({})).expect("create").meta.issue_number;
        let b = store.create("b", json!({})).expect("create").meta.issue_number;
        let link = store.create_alias("a", "b").expect("alias");
        assert_eq!((link.source_issue, link.target_issue), (a, b));

        let kinds = |n: u64| -> Vec<String> {
            store
                .tracker()
                .comments(n)
                .iter()
                .filter_map(|c| codec::decode(&c.body).ok())
                .map(|d| d.kind.as_str().to_string())
                .collect()
        };
        assert_eq!(kinds(a), vec!["initial_state", "system_alias"]);
        assert_eq!(kinds(b), vec!["initial_state", "system_alias_reference"]);

        let aliases = store.find_aliases(None).expect("aliases");
        assert_eq!(
            aliases,
            vec![AliasEntry {
                alias_id: "a".to_string(),
                target_id: "b".to_string(),
                issue_number: a,
            }]
        );
        assert_eq!(store.find_aliases(Some("b")).expect("aliases").len(), 1);
        assert!(store.find_aliases(Some("a")).expect("aliases").is_empty());
    }

    #[test]
    fn literal_get_keeps_alias_record() {
        let store = store();
        store.create("orig", json!({"v": "orig"})).expect("create");
        store.create("dup", json!({"v": "dup"})).expect("create");
        store.create_alias("dup", "orig").expect("alias");

        let literal = store.get_object("dup", false).expect("literal");
        assert_eq!(literal.data, json!({"v": "dup"}));
        assert_eq!(literal.meta.object_id, "dup");
        assert!(literal.meta.canonical_id.is_none());

        let merged = store.get_object("dup", true).expect("merged");
        assert_eq!(merged.data, json!({"v": "orig"}));
        assert_eq!(merged.meta.object_id, "dup");
        assert_eq!(merged.meta.canonical_id.as_deref(), Some("orig"));
    }

    #[test]
    fn find_duplicates_groups_by_uid() {
        let store = store();
        let first = store.create("x", json!({})).expect("create").meta.issue_number;
        let second = store.create("x", json!({})).expect("create").meta.issue_number;
        store.create("y", json!({})).expect("create");
        assert_eq!(
            store.find_duplicates().expect("dups"),
            vec![DuplicateGroup {
                object_id: "x".to_string(),
                issue_numbers: vec![first, second],
            }]
        );
    }

    #[test]
    fn explicit_canonical_must_belong_to_the_group() {
        let store = store();
        store.create("x", json!({})).expect("create");
        store.create("x", json!({})).expect("create");
        assert!(matches!(
            store.deduplicate_object("x", Some(999)),
            Err(StoreError::ObjectNotFound { .. })
        ));
    }
}
