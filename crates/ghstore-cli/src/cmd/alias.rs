//! `ghs alias` / `ghs aliases`: link object IDs and list the links.

use clap::Args;
use std::io::Write;

use crate::cmd::RepoArgs;
use crate::output::{OutputMode, render, render_list};

#[derive(Args, Debug)]
pub struct AliasArgs {
    /// Object ID that becomes the alias.
    pub source: String,

    /// Object ID the alias points at.
    pub target: String,
}

#[derive(Args, Debug)]
pub struct AliasesArgs {
    /// Only aliases pointing at this object ID.
    #[arg(long)]
    pub target: Option<String>,
}

pub fn run_alias(args: &AliasArgs, repo: &RepoArgs, mode: OutputMode) -> anyhow::Result<()> {
    let store = repo.open_store()?;
    let link = store.create_alias(&args.source, &args.target)?;
    render(mode, &link, |l, w| {
        writeln!(
            w,
            "{} (issue #{}) -> {} (issue #{})",
            l.source_id, l.source_issue, l.target_id, l.target_issue
        )
    })
}

pub fn run_aliases(args: &AliasesArgs, repo: &RepoArgs, mode: OutputMode) -> anyhow::Result<()> {
    let store = repo.open_store()?;
    let aliases = store.find_aliases(args.target.as_deref())?;
    render_list(&aliases, mode)
}
