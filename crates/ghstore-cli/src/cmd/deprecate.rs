//! `ghs deprecate`: retire an object in favour of another.

use clap::Args;
use ghstore_core::DeprecationReason;
use std::io::Write;

use crate::cmd::RepoArgs;
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct DeprecateArgs {
    /// Object ID to retire.
    pub id: String,

    /// Object ID that absorbs its history.
    pub target: String,

    /// duplicate, merged, or replaced.
    #[arg(long, default_value = "merged")]
    pub reason: DeprecationReason,
}

pub fn run_deprecate(args: &DeprecateArgs, repo: &RepoArgs, mode: OutputMode) -> anyhow::Result<()> {
    let store = repo.open_store()?;
    let outcome = store.deprecate_object(&args.id, &args.target, args.reason)?;
    render(mode, &outcome, |o, w| {
        writeln!(
            w,
            "{} (issue #{}) deprecated into {} (issue #{}): {}",
            o.source_object_id, o.source_issue, o.target_object_id, o.target_issue, o.reason
        )
    })
}
