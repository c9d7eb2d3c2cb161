//! `ghs delete`: archive an object's ticket.

use clap::Args;
use serde::Serialize;
use std::io::Write;

use crate::cmd::RepoArgs;
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Object ID.
    pub id: String,
}

#[derive(Debug, Serialize)]
struct DeleteResult<'a> {
    object_id: &'a str,
    archived: bool,
}

pub fn run_delete(args: &DeleteArgs, repo: &RepoArgs, mode: OutputMode) -> anyhow::Result<()> {
    let store = repo.open_store()?;
    store.delete(&args.id)?;
    let result = DeleteResult {
        object_id: &args.id,
        archived: true,
    };
    render(mode, &result, |r, w| writeln!(w, "archived {}", r.object_id))
}
