//! `ghs find-duplicates` / `ghs dedup`: detect and collapse tickets that
//! share a UID label.

use clap::Args;
use ghstore_core::model::DedupOutcome;

use crate::cmd::RepoArgs;
use crate::output::{OutputMode, render_list};

#[derive(Args, Debug)]
pub struct DedupArgs {
    /// Only repair this object ID (default: every duplicate group).
    #[arg(long)]
    pub object_id: Option<String>,

    /// Issue number to keep as canonical (default: the oldest ticket).
    #[arg(long, requires = "object_id")]
    pub canonical_issue: Option<u64>,

    /// Report the groups without changing anything.
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run_find_duplicates(repo: &RepoArgs, mode: OutputMode) -> anyhow::Result<()> {
    let store = repo.open_store()?;
    let groups = store.find_duplicates()?;
    render_list(&groups, mode)
}

pub fn run_dedup(args: &DedupArgs, repo: &RepoArgs, mode: OutputMode) -> anyhow::Result<()> {
    let store = repo.open_store()?;
    if args.dry_run {
        let groups: Vec<_> = store
            .find_duplicates()?
            .into_iter()
            .filter(|g| args.object_id.as_ref().is_none_or(|id| *id == g.object_id))
            .collect();
        return render_list(&groups, mode);
    }

    let outcomes: Vec<DedupOutcome> = match &args.object_id {
        Some(id) => vec![store.deduplicate_object(id, args.canonical_issue)?],
        None => store.deduplicate_all()?,
    };
    render_list(&outcomes, mode)
}
