//! Command handlers. Each module owns its clap arguments and a `run_*`
//! entry point; this module holds the repository connection shared by all
//! of them and the renderers for core records.

pub mod alias;
pub mod completions;
pub mod create;
pub mod dedup;
pub mod delete;
pub mod deprecate;
pub mod get;
pub mod history;
pub mod list;
pub mod process;
pub mod resolve;
pub mod snapshot;
pub mod update;

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use clap::Args;
use ghstore_core::model::{AliasEntry, DedupOutcome, DuplicateGroup, HistoryEntry};
use ghstore_core::tracker::github::{GitHubTracker, RepoSlug};
use ghstore_core::{ObjectStore, StoredObject, load_config};
use serde_json::Value;
use tracing::debug;

use crate::output::{CliError, Renderable, pretty_kv, pretty_rule, pretty_section};

/// Repository connection flags, accepted by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct RepoArgs {
    /// GitHub token used for API calls.
    #[arg(long, env = "GITHUB_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Repository holding the objects, as <owner>/<repo>.
    #[arg(long, env = "GITHUB_REPOSITORY", global = true)]
    pub repo: Option<String>,

    /// Config file (default: <config dir>/ghstore/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// GitHub API base URL, for GitHub Enterprise.
    #[arg(long, env = "GHSTORE_API_URL", global = true, value_name = "URL")]
    pub api_url: Option<String>,
}

impl RepoArgs {
    /// The `--repo` slug.
    pub fn repository(&self) -> anyhow::Result<RepoSlug> {
        let raw = self.repo.as_deref().ok_or_else(|| {
            CliError::with_details(
                "no repository given",
                "pass --repo <owner>/<repo> or set GITHUB_REPOSITORY",
                "missing_repository",
            )
        })?;
        Ok(RepoSlug::parse(raw)?)
    }

    /// Build a store over the GitHub repository.
    pub fn open_store(&self) -> anyhow::Result<ObjectStore<GitHubTracker>> {
        let token = self
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                CliError::with_details(
                    "no GitHub token given",
                    "pass --token or set GITHUB_TOKEN",
                    "missing_token",
                )
            })?;
        let slug = self.repository()?;
        let config = load_config(self.config.as_deref())?;
        debug!(repository = %slug, "opening store");

        let mut tracker = GitHubTracker::new(slug, Some(token));
        if let Some(api) = &self.api_url {
            tracker = tracker.with_api_base(api.as_str());
        }
        Ok(ObjectStore::new(tracker, config)?)
    }
}

/// Parse a JSON argument: a literal, `-` for stdin, or `@path` for a file.
pub fn read_json(raw: &str) -> anyhow::Result<Value> {
    let text = if raw == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else if let Some(path) = raw.strip_prefix('@') {
        fs::read_to_string(path)
            .map_err(|e| CliError::new(format!("failed to read {path}: {e}")))?
    } else {
        raw.to_string()
    };
    serde_json::from_str(&text).map_err(|e| {
        CliError::with_details(
            format!("invalid JSON: {e}"),
            "pass a JSON literal, - for stdin, or @file",
            "invalid_json",
        )
        .into()
    })
}

pub fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn pretty_json(w: &mut dyn Write, value: &Value) -> io::Result<()> {
    let text = serde_json::to_string_pretty(value).unwrap_or_default();
    writeln!(w, "{text}")
}

// ---------------------------------------------------------------------------
// Renderers for core records
// ---------------------------------------------------------------------------

impl Renderable for StoredObject {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let meta = &self.meta;
        pretty_section(w, &format!("{} (issue #{})", meta.object_id, meta.issue_number))?;
        if let Some(canonical) = &meta.canonical_id {
            pretty_kv(w, "Canonical", canonical)?;
        }
        pretty_kv(w, "Version", meta.version.to_string())?;
        pretty_kv(w, "Created", timestamp(meta.created_at))?;
        pretty_kv(w, "Updated", timestamp(meta.updated_at))?;
        writeln!(w)?;
        pretty_json(w, &self.data)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let meta = &self.meta;
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            meta.object_id,
            meta.issue_number,
            meta.version,
            timestamp(meta.updated_at),
            compact(&self.data)
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["object_id", "issue", "version", "updated_at", "data"]
    }
}

impl Renderable for HistoryEntry {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  comment {}",
            timestamp(self.timestamp),
            self.kind,
            self.comment_id
        )?;
        pretty_json(w, &self.data)?;
        pretty_rule(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            timestamp(self.timestamp),
            self.kind,
            self.comment_id,
            compact(&self.data)
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["timestamp", "type", "comment_id", "data"]
    }
}

impl Renderable for AliasEntry {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{} -> {}  (issue #{})",
            self.alias_id, self.target_id, self.issue_number
        )
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}\t{}\t{}", self.alias_id, self.target_id, self.issue_number)
    }

    fn table_headers() -> &'static [&'static str] {
        &["alias_id", "target_id", "issue"]
    }
}

fn issue_list(numbers: &[u64]) -> String {
    numbers
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl Renderable for DuplicateGroup {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let numbers: Vec<String> = self.issue_numbers.iter().map(|n| format!("#{n}")).collect();
        writeln!(w, "{}: {}", self.object_id, numbers.join(" "))
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}\t{}", self.object_id, issue_list(&self.issue_numbers))
    }

    fn table_headers() -> &'static [&'static str] {
        &["object_id", "issues"]
    }
}

impl Renderable for DedupOutcome {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        if self.deprecated_issues.is_empty() {
            return writeln!(
                w,
                "{}: no duplicates (issue #{})",
                self.object_id, self.canonical_issue
            );
        }
        let numbers: Vec<String> = self
            .deprecated_issues
            .iter()
            .map(|n| format!("#{n}"))
            .collect();
        writeln!(
            w,
            "{}: kept #{}, deprecated {}",
            self.object_id,
            self.canonical_issue,
            numbers.join(" ")
        )
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}",
            self.object_id,
            self.canonical_issue,
            issue_list(&self.deprecated_issues)
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["object_id", "canonical_issue", "deprecated_issues"]
    }
}
