//! Blocking GitHub REST client.
//!
//! Speaks the v3 REST API over `ureq`. Listings are paged 100 at a time and
//! pull requests are filtered out of issue listings. Rate-limit responses
//! (429, or 403 with `x-ratelimit-remaining: 0` or a rate-limit message)
//! become [`TrackerError::RateLimited`] carrying `Retry-After` when the
//! server sent one.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::{Comment, Issue, IssueEdit, IssueQuery, IssueState, NewIssue, Tracker, TrackerError};
use crate::error::StoreError;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const PER_PAGE: usize = 100;
const USER_AGENT: &str = concat!("ghstore/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Repository slug
// ---------------------------------------------------------------------------

/// `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub repo: String,
}

impl RepoSlug {
    /// Parse `owner/repo`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Configuration`] if either half is missing.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let trimmed = raw.trim();
        match trimmed.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok(Self {
                    owner: owner.to_string(),
                    repo: repo.to_string(),
                })
            }
            _ => Err(StoreError::config(
                None,
                format!("invalid repository '{trimmed}': expected <owner>/<repo>"),
            )),
        }
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiRepository {
    owner: ApiUser,
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: IssueState,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    #[serde(default)]
    user: Option<ApiUser>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    pull_request: Option<Value>,
}

impl From<ApiIssue> for Issue {
    fn from(api: ApiIssue) -> Self {
        Self {
            number: api.number,
            title: api.title,
            body: api.body,
            state: api.state,
            labels: api.labels.into_iter().map(|l| l.name).collect(),
            author: api.user.map(|u| u.login),
            created_at: api.created_at,
            updated_at: api.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiComment {
    id: u64,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<ApiUser>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    reactions: Option<BTreeMap<String, Value>>,
}

impl From<ApiComment> for Comment {
    fn from(api: ApiComment) -> Self {
        Self {
            id: api.id,
            body: api.body.unwrap_or_default(),
            author: api.user.map(|u| u.login),
            created_at: api.created_at,
            reactions: api
                .reactions
                .as_ref()
                .map(reaction_contents)
                .unwrap_or_default(),
        }
    }
}

/// Reaction contents with a non-zero count in a comment's roll-up.
fn reaction_contents(rollup: &BTreeMap<String, Value>) -> Vec<String> {
    rollup
        .iter()
        .filter(|(key, _)| key.as_str() != "total_count" && key.as_str() != "url")
        .filter(|(_, count)| count.as_u64().is_some_and(|n| n > 0))
        .map(|(key, _)| key.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`Tracker`] backed by the GitHub REST API.
pub struct GitHubTracker {
    agent: ureq::Agent,
    api_base: String,
    slug: RepoSlug,
    token: Option<String>,
    requests: Cell<usize>,
}

impl fmt::Debug for GitHubTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubTracker")
            .field("api_base", &self.api_base)
            .field("slug", &self.slug)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl GitHubTracker {
    #[must_use]
    pub fn new(slug: RepoSlug, token: Option<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            api_base: DEFAULT_API_BASE.to_string(),
            slug,
            token,
            requests: Cell::new(0),
        }
    }

    /// Point the client at a different API root (GitHub Enterprise).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub const fn slug(&self) -> &RepoSlug {
        &self.slug
    }

    /// HTTP requests issued so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.get()
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{path}",
            self.api_base, self.slug.owner, self.slug.repo
        )
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let mut request = self
            .agent
            .request(method, url)
            .set("Accept", "application/vnd.github+json")
            .set("X-GitHub-Api-Version", "2022-11-28")
            .set("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        request
    }

    fn send(
        &self,
        operation: &str,
        request: ureq::Request,
        body: Option<&Value>,
    ) -> Result<ureq::Response, TrackerError> {
        self.requests.set(self.requests.get() + 1);
        debug!(operation, url = request.url(), "github request");
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        result.map_err(|err| match err {
            ureq::Error::Status(status, response) => classify_response(operation, status, response),
            ureq::Error::Transport(transport) => TrackerError::Transport {
                operation: operation.to_string(),
                message: transport.to_string(),
            },
        })
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: ureq::Request,
        body: Option<&Value>,
    ) -> Result<T, TrackerError> {
        self.send(operation, request, body)?
            .into_json::<T>()
            .map_err(|e| TrackerError::Decode {
                operation: operation.to_string(),
                message: e.to_string(),
            })
    }

    fn get_paged<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, TrackerError> {
        let mut items = Vec::new();
        let mut page = 1_u32;
        loop {
            let mut request = self
                .request("GET", url)
                .query("per_page", &PER_PAGE.to_string())
                .query("page", &page.to_string());
            for (key, value) in query {
                request = request.query(key, value);
            }
            let batch: Vec<T> = self.send_json(operation, request, None)?;
            let len = batch.len();
            items.extend(batch);
            if len < PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(items)
    }
}

impl Tracker for GitHubTracker {
    fn repository_owner(&self) -> Result<String, TrackerError> {
        let url = self.repo_url("");
        let repo: ApiRepository =
            self.send_json("repository_owner", self.request("GET", &url), None)?;
        Ok(repo.owner.login)
    }

    fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>, TrackerError> {
        let mut params = vec![("state", query.state.as_str().to_string())];
        if !query.labels.is_empty() {
            params.push(("labels", query.labels.join(",")));
        }
        if let Some(since) = query.since {
            params.push(("since", since.to_rfc3339()));
        }
        let issues: Vec<ApiIssue> =
            self.get_paged("list_issues", &self.repo_url("/issues"), &params)?;
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(Issue::from)
            .collect())
    }

    fn get_issue(&self, number: u64) -> Result<Issue, TrackerError> {
        let url = self.repo_url(&format!("/issues/{number}"));
        let issue: ApiIssue = self.send_json("get_issue", self.request("GET", &url), None)?;
        Ok(issue.into())
    }

    fn create_issue(&self, issue: &NewIssue) -> Result<Issue, TrackerError> {
        let url = self.repo_url("/issues");
        let body = json!({
            "title": issue.title,
            "body": issue.body,
            "labels": issue.labels,
        });
        let created: ApiIssue =
            self.send_json("create_issue", self.request("POST", &url), Some(&body))?;
        Ok(created.into())
    }

    fn edit_issue(&self, number: u64, edit: &IssueEdit) -> Result<Issue, TrackerError> {
        let url = self.repo_url(&format!("/issues/{number}"));
        let mut body = serde_json::Map::new();
        if let Some(text) = &edit.body {
            body.insert("body".to_string(), Value::String(text.clone()));
        }
        if let Some(state) = edit.state {
            body.insert("state".to_string(), Value::String(state.as_str().to_string()));
        }
        let edited: ApiIssue = self.send_json(
            "edit_issue",
            self.request("PATCH", &url),
            Some(&Value::Object(body)),
        )?;
        Ok(edited.into())
    }

    fn list_comments(&self, number: u64) -> Result<Vec<Comment>, TrackerError> {
        let url = self.repo_url(&format!("/issues/{number}/comments"));
        let comments: Vec<ApiComment> = self.get_paged("list_comments", &url, &[])?;
        Ok(comments.into_iter().map(Comment::from).collect())
    }

    fn create_comment(&self, number: u64, body: &str) -> Result<Comment, TrackerError> {
        let url = self.repo_url(&format!("/issues/{number}/comments"));
        let created: ApiComment = self.send_json(
            "create_comment",
            self.request("POST", &url),
            Some(&json!({ "body": body })),
        )?;
        Ok(created.into())
    }

    fn add_reaction(&self, comment_id: u64, content: &str) -> Result<(), TrackerError> {
        let url = self.repo_url(&format!("/issues/comments/{comment_id}/reactions"));
        self.send(
            "add_reaction",
            self.request("POST", &url),
            Some(&json!({ "content": content })),
        )?;
        Ok(())
    }

    fn list_labels(&self) -> Result<Vec<String>, TrackerError> {
        let labels: Vec<ApiLabel> = self.get_paged("list_labels", &self.repo_url("/labels"), &[])?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    fn create_label(
        &self,
        name: &str,
        color: &str,
        description: Option<&str>,
    ) -> Result<(), TrackerError> {
        let url = self.repo_url("/labels");
        let mut body = json!({ "name": name, "color": color });
        if let Some(description) = description {
            body["description"] = Value::String(description.to_string());
        }
        self.send("create_label", self.request("POST", &url), Some(&body))?;
        Ok(())
    }

    fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), TrackerError> {
        let url = self.repo_url(&format!("/issues/{number}/labels"));
        self.send(
            "add_labels",
            self.request("POST", &url),
            Some(&json!({ "labels": labels })),
        )?;
        Ok(())
    }

    fn remove_label(&self, number: u64, label: &str) -> Result<(), TrackerError> {
        let url = self.repo_url(&format!(
            "/issues/{number}/labels/{}",
            encode_path_segment(label)
        ));
        self.send("remove_label", self.request("DELETE", &url), None)?;
        Ok(())
    }

    fn team_members(&self, org: &str, team: &str) -> Result<Vec<String>, TrackerError> {
        let url = format!(
            "{}/orgs/{}/teams/{}/members",
            self.api_base,
            encode_path_segment(org),
            encode_path_segment(team)
        );
        let members: Vec<ApiUser> = self.get_paged("team_members", &url, &[])?;
        Ok(members.into_iter().map(|m| m.login).collect())
    }

    fn file_contents(&self, path: &str) -> Result<Option<String>, TrackerError> {
        let encoded: Vec<String> = path.split('/').map(encode_path_segment).collect();
        let url = self.repo_url(&format!("/contents/{}", encoded.join("/")));
        let request = self
            .request("GET", &url)
            .set("Accept", "application/vnd.github.raw+json");
        match self.send("file_contents", request, None) {
            Ok(response) => response.into_string().map(Some).map_err(|e| TrackerError::Decode {
                operation: "file_contents".to_string(),
                message: e.to_string(),
            }),
            Err(TrackerError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

fn classify_response(operation: &str, status: u16, response: ureq::Response) -> TrackerError {
    let remaining = response.header("x-ratelimit-remaining").map(str::to_string);
    let retry_after = response.header("retry-after").map(str::to_string);
    let url = response.get_url().to_string();
    let body = response.into_string().unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    classify_status(
        operation,
        status,
        remaining.as_deref(),
        retry_after.as_deref(),
        &message,
    )
    .with_resource(&url)
}

/// Map an HTTP error status to a [`TrackerError`].
#[must_use]
pub fn classify_status(
    operation: &str,
    status: u16,
    ratelimit_remaining: Option<&str>,
    retry_after: Option<&str>,
    message: &str,
) -> TrackerError {
    let exhausted = ratelimit_remaining.is_some_and(|r| r.trim() == "0");
    let mentions_limit = message.to_ascii_lowercase().contains("rate limit");
    if status == 429 || (status == 403 && (exhausted || mentions_limit)) {
        return TrackerError::RateLimited {
            operation: operation.to_string(),
            retry_after: retry_after
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        };
    }
    if status == 404 {
        return TrackerError::NotFound {
            resource: operation.to_string(),
        };
    }
    TrackerError::Api {
        operation: operation.to_string(),
        status,
        message: message.to_string(),
    }
}

impl TrackerError {
    fn with_resource(self, url: &str) -> Self {
        match self {
            Self::NotFound { .. } => Self::NotFound {
                resource: url.to_string(),
            },
            other => other,
        }
    }
}

/// Percent-encode one URL path segment.
#[must_use]
pub fn encode_path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_repo_slug_accepts_valid_input() {
        let slug = RepoSlug::parse(" acme/store ").expect("slug");
        assert_eq!(slug.owner, "acme");
        assert_eq!(slug.repo, "store");
        assert_eq!(slug.to_string(), "acme/store");
    }

    #[test]
    fn parse_repo_slug_rejects_invalid_input() {
        for raw in ["", "acme", "/store", "acme/", "a/b/c"] {
            assert!(RepoSlug::parse(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn rate_limits_are_classified() {
        assert!(classify_status("x", 429, None, None, "").is_rate_limited());
        assert!(classify_status("x", 403, Some("0"), None, "forbidden").is_rate_limited());
        assert!(
            classify_status("x", 403, Some("12"), None, "API rate limit exceeded").is_rate_limited()
        );
        assert!(!classify_status("x", 403, Some("12"), None, "Resource not accessible").is_rate_limited());

        let err = classify_status("x", 429, None, Some("7"), "");
        assert_eq!(
            err,
            TrackerError::RateLimited {
                operation: "x".to_string(),
                retry_after: Some(Duration::from_secs(7)),
            }
        );
    }

    #[test]
    fn not_found_and_other_statuses() {
        assert!(matches!(
            classify_status("get_issue", 404, None, None, "Not Found"),
            TrackerError::NotFound { .. }
        ));
        assert_eq!(
            classify_status("edit_issue", 422, None, None, "Validation Failed"),
            TrackerError::Api {
                operation: "edit_issue".to_string(),
                status: 422,
                message: "Validation Failed".to_string(),
            }
        );
    }

    #[test]
    fn reaction_rollup_keeps_nonzero_contents() {
        let rollup: BTreeMap<String, Value> = serde_json::from_value(json!({
            "url": "https://api.github.com/x",
            "total_count": 2,
            "+1": 1,
            "-1": 0,
            "rocket": 1,
            "eyes": 0
        }))
        .expect("rollup");
        assert_eq!(reaction_contents(&rollup), vec!["+1", "rocket"]);
    }

    #[test]
    fn decodes_issue_payload_and_marks_pull_requests() {
        let raw = json!({
            "number": 5,
            "title": "Stored Object: m",
            "body": "{}",
            "state": "closed",
            "labels": [{"name": "stored-object"}, {"name": "UID:m"}],
            "user": {"login": "owner"},
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-02T00:00:00Z"
        });
        let api: ApiIssue = serde_json::from_value(raw).expect("issue");
        assert!(api.pull_request.is_none());
        let issue = Issue::from(api);
        assert_eq!(issue.state, IssueState::Closed);
        assert_eq!(issue.labels, vec!["stored-object", "UID:m"]);
        assert_eq!(issue.author.as_deref(), Some("owner"));
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        assert_eq!(encode_path_segment("UID:my obj"), "UID%3Amy%20obj");
        assert_eq!(encode_path_segment("stored-object"), "stored-object");
    }
}
