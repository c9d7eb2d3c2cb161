//! `ghs resolve`: print the canonical ID an object ID resolves to.

use clap::Args;
use serde::Serialize;
use std::io::Write;

use crate::cmd::RepoArgs;
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Object ID.
    pub id: String,

    /// Maximum alias hops to follow (default: `aliases.max_depth` from config).
    #[arg(long)]
    pub max_depth: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Resolution<'a> {
    object_id: &'a str,
    canonical_id: String,
}

pub fn run_resolve(args: &ResolveArgs, repo: &RepoArgs, mode: OutputMode) -> anyhow::Result<()> {
    let store = repo.open_store()?;
    let canonical_id = match args.max_depth {
        Some(depth) => store.resolve_canonical_id(&args.id, depth)?,
        None => store.resolve_canonical_object_id(&args.id)?,
    };
    let resolution = Resolution {
        object_id: &args.id,
        canonical_id,
    };
    render(mode, &resolution, |r, w| writeln!(w, "{}", r.canonical_id))
}
