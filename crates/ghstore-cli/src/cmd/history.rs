//! `ghs history`: every decodable comment on an object's ticket.

use clap::Args;

use crate::cmd::RepoArgs;
use crate::output::{OutputMode, render_list};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Object ID.
    pub id: String,
}

pub fn run_history(args: &HistoryArgs, repo: &RepoArgs, mode: OutputMode) -> anyhow::Result<()> {
    let store = repo.open_store()?;
    let entries = store.get_object_history(&args.id)?;
    render_list(&entries, mode)
}
