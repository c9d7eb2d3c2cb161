//! `ghs update`: queue a change for an object.
//!
//! The change is posted as an update comment on the canonical ticket and the
//! ticket is reopened; a later `ghs process-updates` folds it in.

use clap::Args;

use crate::cmd::{RepoArgs, read_json};
use crate::output::{OutputMode, render_item};

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Object ID (aliases resolve to their canonical object).
    pub id: String,

    /// JSON changes merged into the object: a literal, `-` for stdin, or `@file`.
    pub changes: String,
}

pub fn run_update(args: &UpdateArgs, repo: &RepoArgs, mode: OutputMode) -> anyhow::Result<()> {
    let changes = read_json(&args.changes)?;
    let store = repo.open_store()?;
    let obj = store.update(&args.id, changes)?;
    render_item(&obj, mode)
}
