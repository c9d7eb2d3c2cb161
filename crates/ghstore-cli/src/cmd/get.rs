//! `ghs get`: read an object, following aliases unless told not to.

use clap::Args;

use crate::cmd::RepoArgs;
use crate::output::{OutputMode, render_item};

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Object ID.
    pub id: String,

    /// Read the ticket labelled with this ID as-is, without following
    /// aliases or merging deprecated history.
    #[arg(long)]
    pub no_canonical: bool,
}

pub fn run_get(args: &GetArgs, repo: &RepoArgs, mode: OutputMode) -> anyhow::Result<()> {
    let store = repo.open_store()?;
    let obj = store.get_object(&args.id, !args.no_canonical)?;
    render_item(&obj, mode)
}
