//! In-process tracker.
//!
//! Keeps issues, comments, labels, and reactions in memory. Timestamps come
//! from a logical clock that starts at a fixed instant and advances one
//! second per mutation, so runs are reproducible. Reactions do not advance
//! an issue's `updated_at`, matching the hosted tracker.
//!
//! Failures can be queued per operation name with [`MemoryTracker::fail_next`];
//! the next call of that operation returns the queued error instead of
//! running.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::{Comment, Issue, IssueEdit, IssueQuery, IssueState, NewIssue, Tracker, TrackerError};

#[derive(Debug, Clone)]
struct LabelDef {
    color: String,
    description: Option<String>,
}

#[derive(Debug)]
struct State {
    owner: String,
    actor: String,
    clock: DateTime<Utc>,
    next_issue: u64,
    next_comment: u64,
    issues: BTreeMap<u64, Issue>,
    comments: BTreeMap<u64, Vec<Comment>>,
    labels: BTreeMap<String, LabelDef>,
    files: HashMap<String, String>,
    teams: HashMap<(String, String), Vec<String>>,
    failures: HashMap<String, VecDeque<TrackerError>>,
    calls: HashMap<String, usize>,
}

impl State {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += Duration::seconds(1);
        self.clock
    }

    fn enter(&mut self, op: &str) -> Result<(), TrackerError> {
        *self.calls.entry(op.to_string()).or_default() += 1;
        match self.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn issue_mut(&mut self, number: u64) -> Result<&mut Issue, TrackerError> {
        self.issues
            .get_mut(&number)
            .ok_or_else(|| not_found(format!("issue #{number}")))
    }

    fn register_labels(&mut self, labels: &[String]) {
        for label in labels {
            self.labels.entry(label.clone()).or_insert_with(|| LabelDef {
                color: "ededed".to_string(),
                description: None,
            });
        }
    }
}

fn not_found(resource: String) -> TrackerError {
    TrackerError::NotFound { resource }
}

/// A tracker that lives entirely in memory.
#[derive(Debug)]
pub struct MemoryTracker {
    state: RefCell<State>,
}

impl MemoryTracker {
    /// Empty repository owned by `owner`. Calls act as the owner until
    /// [`Self::set_actor`] says otherwise.
    #[must_use]
    pub fn new(owner: impl Into<String>) -> Self {
        let owner = owner.into();
        let clock = Utc
            .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self {
            state: RefCell::new(State {
                actor: owner.clone(),
                owner,
                clock,
                next_issue: 1,
                next_comment: 1000,
                issues: BTreeMap::new(),
                comments: BTreeMap::new(),
                labels: BTreeMap::new(),
                files: HashMap::new(),
                teams: HashMap::new(),
                failures: HashMap::new(),
                calls: HashMap::new(),
            }),
        }
    }

    /// Login used as author for issues and comments created from now on.
    pub fn set_actor(&self, login: impl Into<String>) {
        self.state.borrow_mut().actor = login.into();
    }

    pub fn set_file(&self, path: impl Into<String>, content: impl Into<String>) {
        self.state
            .borrow_mut()
            .files
            .insert(path.into(), content.into());
    }

    pub fn set_team<I, S>(&self, org: &str, team: &str, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.borrow_mut().teams.insert(
            (org.to_string(), team.to_string()),
            members.into_iter().map(Into::into).collect(),
        );
    }

    /// Queue `err` for the next call of `operation` (a [`Tracker`] method name).
    pub fn fail_next(&self, operation: &str, err: TrackerError) {
        self.state
            .borrow_mut()
            .failures
            .entry(operation.to_string())
            .or_default()
            .push_back(err);
    }

    /// Number of times `operation` has been called, including failed calls.
    #[must_use]
    pub fn calls(&self, operation: &str) -> usize {
        self.state
            .borrow()
            .calls
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Move the clock forward without mutating anything.
    pub fn advance(&self, seconds: i64) {
        self.state.borrow_mut().clock += Duration::seconds(seconds);
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.state.borrow().clock
    }

    /// Current copy of an issue, bypassing failure injection.
    #[must_use]
    pub fn issue(&self, number: u64) -> Option<Issue> {
        self.state.borrow().issues.get(&number).cloned()
    }

    /// Current comments on an issue, bypassing failure injection.
    #[must_use]
    pub fn comments(&self, number: u64) -> Vec<Comment> {
        self.state
            .borrow()
            .comments
            .get(&number)
            .cloned()
            .unwrap_or_default()
    }

    /// Color and description of a repository label, if defined.
    #[must_use]
    pub fn label_definition(&self, name: &str) -> Option<(String, Option<String>)> {
        self.state
            .borrow()
            .labels
            .get(name)
            .map(|def| (def.color.clone(), def.description.clone()))
    }
}

impl Tracker for MemoryTracker {
    fn repository_owner(&self) -> Result<String, TrackerError> {
        let mut s = self.state.borrow_mut();
        s.enter("repository_owner")?;
        Ok(s.owner.clone())
    }

    fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>, TrackerError> {
        let mut s = self.state.borrow_mut();
        s.enter("list_issues")?;
        Ok(s.issues
            .values()
            .filter(|i| query.state.matches(i.state))
            .filter(|i| query.labels.iter().all(|l| i.has_label(l)))
            .filter(|i| query.since.is_none_or(|since| i.updated_at >= since))
            .cloned()
            .collect())
    }

    fn get_issue(&self, number: u64) -> Result<Issue, TrackerError> {
        let mut s = self.state.borrow_mut();
        s.enter("get_issue")?;
        s.issues
            .get(&number)
            .cloned()
            .ok_or_else(|| not_found(format!("issue #{number}")))
    }

    fn create_issue(&self, issue: &NewIssue) -> Result<Issue, TrackerError> {
        let mut s = self.state.borrow_mut();
        s.enter("create_issue")?;
        let now = s.tick();
        let number = s.next_issue;
        s.next_issue += 1;
        s.register_labels(&issue.labels);
        let created = Issue {
            number,
            title: issue.title.clone(),
            body: Some(issue.body.clone()),
            state: IssueState::Open,
            labels: issue.labels.clone(),
            author: Some(s.actor.clone()),
            created_at: now,
            updated_at: now,
        };
        s.issues.insert(number, created.clone());
        s.comments.insert(number, Vec::new());
        Ok(created)
    }

    fn edit_issue(&self, number: u64, edit: &IssueEdit) -> Result<Issue, TrackerError> {
        let mut s = self.state.borrow_mut();
        s.enter("edit_issue")?;
        let now = s.tick();
        let issue = s.issue_mut(number)?;
        if let Some(body) = &edit.body {
            issue.body = Some(body.clone());
        }
        if let Some(state) = edit.state {
            issue.state = state;
        }
        issue.updated_at = now;
        Ok(issue.clone())
    }

    fn list_comments(&self, number: u64) -> Result<Vec<Comment>, TrackerError> {
        let mut s = self.state.borrow_mut();
        s.enter("list_comments")?;
        s.comments
            .get(&number)
            .cloned()
            .ok_or_else(|| not_found(format!("issue #{number}")))
    }

    fn create_comment(&self, number: u64, body: &str) -> Result<Comment, TrackerError> {
        let mut s = self.state.borrow_mut();
        s.enter("create_comment")?;
        let now = s.tick();
        s.issue_mut(number)?.updated_at = now;
        let id = s.next_comment;
        s.next_comment += 1;
        let comment = Comment {
            id,
            body: body.to_string(),
            author: Some(s.actor.clone()),
            created_at: now,
            reactions: Vec::new(),
        };
        s.comments.entry(number).or_default().push(comment.clone());
        Ok(comment)
    }

    fn add_reaction(&self, comment_id: u64, content: &str) -> Result<(), TrackerError> {
        let mut s = self.state.borrow_mut();
        s.enter("add_reaction")?;
        let comment = s
            .comments
            .values_mut()
            .flat_map(|c| c.iter_mut())
            .find(|c| c.id == comment_id)
            .ok_or_else(|| not_found(format!("comment {comment_id}")))?;
        if !comment.has_reaction(content) {
            comment.reactions.push(content.to_string());
        }
        Ok(())
    }

    fn list_labels(&self) -> Result<Vec<String>, TrackerError> {
        let mut s = self.state.borrow_mut();
        s.enter("list_labels")?;
        Ok(s.labels.keys().cloned().collect())
    }

    fn create_label(
        &self,
        name: &str,
        color: &str,
        description: Option<&str>,
    ) -> Result<(), TrackerError> {
        let mut s = self.state.borrow_mut();
        s.enter("create_label")?;
        if s.labels.contains_key(name) {
            return Err(TrackerError::Api {
                operation: "create_label".to_string(),
                status: 422,
                message: format!("label '{name}' already exists"),
            });
        }
        s.labels.insert(
            name.to_string(),
            LabelDef {
                color: color.to_string(),
                description: description.map(str::to_string),
            },
        );
        Ok(())
    }

    fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), TrackerError> {
        let mut s = self.state.borrow_mut();
        s.enter("add_labels")?;
        let now = s.tick();
        s.register_labels(labels);
        let issue = s.issue_mut(number)?;
        for label in labels {
            if !issue.has_label(label) {
                issue.labels.push(label.clone());
            }
        }
        issue.updated_at = now;
        Ok(())
    }

    fn remove_label(&self, number: u64, label: &str) -> Result<(), TrackerError> {
        let mut s = self.state.borrow_mut();
        s.enter("remove_label")?;
        let now = s.tick();
        let issue = s.issue_mut(number)?;
        let before = issue.labels.len();
        issue.labels.retain(|l| l != label);
        if issue.labels.len() == before {
            return Err(not_found(format!("label '{label}' on issue #{number}")));
        }
        issue.updated_at = now;
        Ok(())
    }

    fn team_members(&self, org: &str, team: &str) -> Result<Vec<String>, TrackerError> {
        let mut s = self.state.borrow_mut();
        s.enter("team_members")?;
        s.teams
            .get(&(org.to_string(), team.to_string()))
            .cloned()
            .ok_or_else(|| not_found(format!("team {org}/{team}")))
    }

    fn file_contents(&self, path: &str) -> Result<Option<String>, TrackerError> {
        let mut s = self.state.borrow_mut();
        s.enter("file_contents")?;
        Ok(s.files.get(path).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::StateFilter;

    fn new_issue(labels: &[&str]) -> NewIssue {
        NewIssue {
            title: "t".to_string(),
            body: "{}".to_string(),
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
        }
    }

    #[test]
    fn clock_is_monotonic_and_reactions_do_not_touch_issues() {
        let t = MemoryTracker::new("owner");
        let issue = t.create_issue(&new_issue(&["a"])).expect("create");
        let comment = t.create_comment(issue.number, "{}").expect("comment");
        assert!(comment.created_at > issue.created_at);

        let before = t.issue(issue.number).expect("issue").updated_at;
        t.add_reaction(comment.id, "+1").expect("react");
        t.add_reaction(comment.id, "+1").expect("react twice");
        assert_eq!(t.issue(issue.number).expect("issue").updated_at, before);
        assert_eq!(t.comments(issue.number)[0].reactions, vec!["+1"]);
    }

    #[test]
    fn list_filters_by_labels_and_state() {
        let t = MemoryTracker::new("owner");
        let a = t.create_issue(&new_issue(&["x", "y"])).expect("create");
        t.create_issue(&new_issue(&["x"])).expect("create");
        t.edit_issue(
            a.number,
            &IssueEdit {
                state: Some(IssueState::Closed),
                ..IssueEdit::default()
            },
        )
        .expect("close");

        let both = t
            .list_issues(&IssueQuery::labeled(["x", "y"]))
            .expect("list");
        assert_eq!(both.len(), 1);
        let open = t
            .list_issues(&IssueQuery::labeled(["x"]).state(StateFilter::Open))
            .expect("list");
        assert_eq!(open.len(), 1);
        assert_ne!(open[0].number, a.number);
    }

    #[test]
    fn injected_failures_fire_once() {
        let t = MemoryTracker::new("owner");
        t.fail_next(
            "list_labels",
            TrackerError::RateLimited {
                operation: "list_labels".to_string(),
                retry_after: None,
            },
        );
        assert!(t.list_labels().expect_err("fails").is_rate_limited());
        assert!(t.list_labels().is_ok());
        assert_eq!(t.calls("list_labels"), 2);
    }

    #[test]
    fn removing_a_missing_label_is_not_found() {
        let t = MemoryTracker::new("owner");
        let issue = t.create_issue(&new_issue(&["a"])).expect("create");
        assert!(matches!(
            t.remove_label(issue.number, "b"),
            Err(TrackerError::NotFound { .. })
        ));
    }

    #[test]
    fn actor_controls_authorship() {
        let t = MemoryTracker::new("owner");
        let issue = t.create_issue(&new_issue(&[])).expect("create");
        t.set_actor("mallory");
        let comment = t.create_comment(issue.number, "{}").expect("comment");
        assert_eq!(issue.author.as_deref(), Some("owner"));
        assert_eq!(comment.author.as_deref(), Some("mallory"));
    }
}
