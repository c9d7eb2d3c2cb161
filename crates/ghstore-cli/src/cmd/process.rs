//! `ghs process-updates`: fold pending update comments into a ticket.

use clap::Args;

use crate::cmd::RepoArgs;
use crate::output::{OutputMode, render_item};

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Issue number of the object's ticket.
    pub issue: u64,
}

pub fn run_process(args: &ProcessArgs, repo: &RepoArgs, mode: OutputMode) -> anyhow::Result<()> {
    let store = repo.open_store()?;
    let obj = store.process_updates(args.issue)?;
    render_item(&obj, mode)
}
