//! Reconciliation scenarios driven through the store facade.
//!
//! Every test runs against the in-memory tracker, acting as the repository
//! owner unless it switches actors to exercise authorization.

use ghstore_core::codec::{CommentKind, UpdateMode, encode, to_body};
use ghstore_core::config::StoreConfig;
use ghstore_core::tracker::memory::MemoryTracker;
use ghstore_core::tracker::{IssueEdit, IssueState, RetryPolicy, Tracker, TrackerError};
use ghstore_core::{ObjectStore, StoreError};
use serde_json::{Value, json};

fn store() -> ObjectStore<MemoryTracker> {
    ObjectStore::new(MemoryTracker::new("owner"), StoreConfig::default())
        .expect("store")
        .with_retry_policy(RetryPolicy::immediate(3))
}

/// Comment an update on `issue` as the tracker's current actor and reopen it.
fn submit(store: &ObjectStore<MemoryTracker>, issue: u64, data: Value, mode: UpdateMode) -> u64 {
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

fn rate_limited(op: &str) -> TrackerError {
    TrackerError::RateLimited {
        operation: op.to_string(),
        retry_after: None,
    }
}

#[test]
fn counter_scenario() {
    let store = store();
    store.create("m", json!({"count": 0})).expect("create");
    let updated = store.update("m", json!({"count": 1})).expect("update");
    let n = updated.meta.issue_number;
    assert_eq!(
        store.tracker().issue(n).expect("issue").state,
        IssueState::Open
    );

    let processed = store.process_updates(n).expect("process");
    assert_eq!(processed.data, json!({"count": 1}));
    assert_eq!(processed.meta.version, 2);
    assert_eq!(store.get("m").expect("get").data, json!({"count": 1}));
}

#[test]
fn processing_twice_changes_nothing() {
    let store = store();
    let n = store.create("m", json!({"a": {"b": 1}})).expect("create").meta.issue_number;
    submit(&store, n, json!({"a": {"c": 2}}), UpdateMode::Append);

    let first = store.process_updates(n).expect("first");
    let body = store.tracker().issue(n).expect("issue").body;
    let second = store.process_updates(n).expect("second");

    assert_eq!(first, second);
    assert_eq!(store.tracker().issue(n).expect("issue").body, body);
    assert_eq!(second.meta.version, 2);
}

#[test]
fn processed_comments_are_never_reapplied() {
    let store = store();
    let n = store.create("m", json!({"count": 0})).expect("create").meta.issue_number;
    submit(&store, n, json!({"count": 1}), UpdateMode::Append);
    store.process_updates(n).expect("process");

    store
        .tracker()
        .edit_issue(
            n,
            &IssueEdit {
                body: Some("{\"count\": 5}".to_string()),
                ..IssueEdit::default()
            },
        )
        .expect("manual edit");

    let again = store.process_updates(n).expect("process");
    assert_eq!(again.data, json!({"count": 5}));
}

#[test]
fn append_merges_in_order() {
    let store = store();
    let n = store.create("m", json!({})).expect("create").meta.issue_number;
    submit(&store, n, json!({"a": 1}), UpdateMode::Append);
    submit(&store, n, json!({"a": 2, "b": 3}), UpdateMode::Append);
    let obj = store.process_updates(n).expect("process");
    assert_eq!(obj.data, json!({"a": 2, "b": 3}));
    assert_eq!(obj.meta.version, 3);
}

#[test]
fn replace_discards_earlier_state() {
    let store = store();
    let n = store
        .create("m", json!({"keep": true, "list": [1, 2, 3]}))
        .expect("create")
        .meta
        .issue_number;
    submit(&store, n, json!({"a": 1}), UpdateMode::Replace);
    submit(&store, n, json!({"a": 2, "b": 3}), UpdateMode::Replace);
    let obj = store.process_updates(n).expect("process");
    assert_eq!(obj.data, json!({"a": 2, "b": 3}));
}

#[test]
fn arrays_are_replaced_not_merged() {
    let store = store();
    let n = store
        .create("m", json!({"tags": ["a", "b"], "nested": {"xs": [1, 2], "y": 1}}))
        .expect("create")
        .meta
        .issue_number;
    submit(&store, n, json!({"tags": ["c"], "nested": {"xs": []}}), UpdateMode::Append);
    let obj = store.process_updates(n).expect("process");
    assert_eq!(
        obj.data,
        json!({"tags": ["c"], "nested": {"xs": [], "y": 1}})
    );
}

#[test]
fn unauthorized_comments_are_skipped_and_left_unmarked() {
    let store = store();
    let n = store.create("m", json!({})).expect("create").meta.issue_number;

    store.tracker().set_actor("mallory");
    let evil = submit(&store, n, json!({"evil": true}), UpdateMode::Append);
    store.tracker().set_actor("owner");
    submit(&store, n, json!({"ok": 1}), UpdateMode::Append);

    let obj = store.process_updates(n).expect("process");
    assert_eq!(obj.data, json!({"ok": 1}));
    assert_eq!(obj.meta.version, 2);

    let comments = store.tracker().comments(n);
    let evil = comments.iter().find(|c| c.id == evil).expect("still listed");
    assert!(evil.reactions.is_empty());

    let again = store.process_updates(n).expect("process again");
    assert_eq!(again.data, json!({"ok": 1}));
}

#[test]
fn codeowners_and_teams_are_authorized() {
    let store = store();
    store
        .tracker()
        .set_file(".github/CODEOWNERS", "* @alice @acme/core\n");
    store.tracker().set_team("acme", "core", ["carol"]);
    let n = store.create("m", json!({})).expect("create").meta.issue_number;

    for (actor, key) in [("alice", "a"), ("carol", "c"), ("dave", "d")] {
        store.tracker().set_actor(actor);
        let mut change = serde_json::Map::new();
        change.insert(key.to_string(), json!(actor));
        submit(&store, n, Value::Object(change), UpdateMode::Append);
    }
    store.tracker().set_actor("owner");

    let obj = store.process_updates(n).expect("process");
    assert_eq!(obj.data, json!({"a": "alice", "c": "carol"}));
}

#[test]
fn unresolvable_team_grants_nothing() {
    let store = store();
    store
        .tracker()
        .set_file("CODEOWNERS", "* @acme/ghosts\n");
    let n = store.create("m", json!({})).expect("create").meta.issue_number;
    store.tracker().set_actor("carol");
    submit(&store, n, json!({"x": 1}), UpdateMode::Append);
    store.tracker().set_actor("owner");

    assert_eq!(store.process_updates(n).expect("process").data, json!({}));
}

#[test]
fn ticket_from_unauthorized_creator_is_rejected() {
    let store = store();
    store.tracker().set_actor("mallory");
    let issue = store
        .tracker()
        .create_issue(&ghstore_core::tracker::NewIssue {
            title: "Stored Object: x".to_string(),
            body: "{}".to_string(),
            labels: vec!["stored-object".to_string(), "UID:x".to_string()],
        })
        .expect("issue");
    store.tracker().set_actor("owner");

    let err = store.process_updates(issue.number).expect_err("denied");
    assert_eq!(err.code().code(), "E4001");
}

#[test]
fn rate_limits_are_retried() {
    let store = store();
    let n = store.create("m", json!({})).expect("create").meta.issue_number;
    submit(&store, n, json!({"a": 1}), UpdateMode::Append);

    store.tracker().fail_next("list_comments", rate_limited("list_comments"));
    store.tracker().fail_next("edit_issue", rate_limited("edit_issue"));
    store.tracker().fail_next("edit_issue", rate_limited("edit_issue"));

    let obj = store.process_updates(n).expect("process");
    assert_eq!(obj.data, json!({"a": 1}));
}

#[test]
fn exhausted_rate_limit_propagates() {
    let store = store();
    let n = store.create("m", json!({})).expect("create").meta.issue_number;
    for _ in 0..3 {
        store.tracker().fail_next("get_issue", rate_limited("get_issue"));
    }
    let before = store.tracker().calls("get_issue");
    let err = store.process_updates(n).expect_err("rate limited");
    assert!(matches!(
        err,
        StoreError::Tracker(TrackerError::RateLimited { .. })
    ));
    assert_eq!(store.tracker().calls("get_issue") - before, 3);
}

#[test]
fn other_failures_are_not_retried() {
    let store = store();
    let n = store.create("m", json!({})).expect("create").meta.issue_number;
    store.tracker().fail_next(
        "list_comments",
        TrackerError::Api {
            operation: "list_comments".to_string(),
            status: 500,
            message: "boom".to_string(),
        },
    );
    let before = store.tracker().calls("list_comments");
    let err = store.process_updates(n).expect_err("fails");
    assert!(matches!(
        err,
        StoreError::Tracker(TrackerError::Api { status: 500, .. })
    ));
    assert_eq!(store.tracker().calls("list_comments") - before, 1);
}

#[test]
fn update_while_open_is_a_concurrent_update() {
    let store = store();
    let n = store.create("m", json!({})).expect("create").meta.issue_number;
    store.update("m", json!({"a": 1})).expect("first update");
    match store.update("m", json!({"a": 2})) {
        Err(StoreError::ConcurrentUpdate {
            object_id,
            issue_number,
        }) => {
            assert_eq!(object_id, "m");
            assert_eq!(issue_number, n);
        }
        other => panic!("expected ConcurrentUpdate, got {other:?}"),
    }

    store.process_updates(n).expect("process");
    store.update("m", json!({"a": 2})).expect("update after processing");
    assert_eq!(store.process_updates(n).expect("process").data, json!({"a": 2}));
}

#[test]
fn listing_since_uses_strict_comparison() {
    let store = store();
    store.create("a", json!({})).expect("create");
    let cutoff = store.tracker().now();
    store.tracker().advance(5);
    store.create("b", json!({})).expect("create");

    let changed = store.list_updated_since(cutoff).expect("list");
    assert_eq!(changed.keys().collect::<Vec<_>>(), vec!["b"]);
    assert_eq!(store.list_all().expect("all").len(), 2);
}

#[test]
fn history_lists_every_comment_kind() {
    let store = store();
    let n = store.create("h", json!({"v": 0})).expect("create").meta.issue_number;
    submit(&store, n, json!({"v": 1}), UpdateMode::Replace);
    store.process_updates(n).expect("process");

    let history = store.get_object_history("h").expect("history");
    let kinds: Vec<&str> = history.iter().map(|h| h.kind.as_str()).collect();
    assert_eq!(kinds, vec!["initial_state", "update"]);
    assert_eq!(history[1].metadata["update_mode"], "replace");
}
