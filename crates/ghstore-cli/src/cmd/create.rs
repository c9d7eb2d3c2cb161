//! `ghs create`: store a new object.

use clap::Args;
use tracing::info;

use crate::cmd::{RepoArgs, read_json};
use crate::output::{OutputMode, render_item};

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Object ID (becomes the `UID:` label).
    pub id: String,

    /// Initial JSON data: a literal, `-` for stdin, or `@file`.
    #[arg(default_value = "{}")]
    pub data: String,
}

pub fn run_create(args: &CreateArgs, repo: &RepoArgs, mode: OutputMode) -> anyhow::Result<()> {
    let data = read_json(&args.data)?;
    let store = repo.open_store()?;
    let obj = store.create(&args.id, data)?;
    info!(object_id = %obj.meta.object_id, issue = obj.meta.issue_number, "created");
    render_item(&obj, mode)
}
