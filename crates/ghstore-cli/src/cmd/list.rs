//! `ghs list`: every live object, optionally only those changed recently.

use chrono::{DateTime, Utc};
use clap::Args;
use ghstore_core::StoredObject;

use crate::cmd::RepoArgs;
use crate::output::{OutputMode, render_list};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only objects whose ticket changed strictly after this RFC 3339 instant.
    #[arg(long, value_parser = parse_since, value_name = "TIMESTAMP")]
    pub since: Option<DateTime<Utc>>,
}

fn parse_since(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

pub fn run_list(args: &ListArgs, repo: &RepoArgs, mode: OutputMode) -> anyhow::Result<()> {
    let store = repo.open_store()?;
    let objects = match args.since {
        Some(since) => store.list_updated_since(since)?,
        None => store.list_all()?,
    };
    let objects: Vec<StoredObject> = objects.into_values().collect();
    render_list(&objects, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_accepts_offsets() {
        let ts = parse_since("2025-01-01T02:00:00+02:00").expect("parse");
        assert_eq!(ts.to_rfc3339(), "2025-01-01T00:00:00+00:00");
        assert!(parse_since("yesterday").is_err());
    }
}
