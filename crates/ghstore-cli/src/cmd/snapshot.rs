//! `ghs snapshot`: export all objects to a JSON file and refresh it.

use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use ghstore_core::snapshot::Snapshot;
use serde::Serialize;
use tracing::info;

use crate::cmd::RepoArgs;
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotCommand,
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Export every live object.
    Create {
        /// Snapshot file to write.
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Pull objects changed since the snapshot was taken.
    Update {
        /// Existing snapshot file, rewritten in place.
        path: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct SnapshotSummary {
    path: PathBuf,
    repository: String,
    objects: usize,
    changed: usize,
}

pub fn run_snapshot(args: &SnapshotArgs, repo: &RepoArgs, mode: OutputMode) -> anyhow::Result<()> {
    let store = repo.open_store()?;
    let summary = match &args.command {
        SnapshotCommand::Create { output } => {
            let slug = repo.repository()?;
            let snapshot = Snapshot::create(&store, &slug.to_string())?;
            snapshot.save(output)?;
            SnapshotSummary {
                path: output.clone(),
                repository: snapshot.repository,
                objects: snapshot.objects.len(),
                changed: snapshot.objects.len(),
            }
        }
        SnapshotCommand::Update { path } => {
            let mut snapshot = Snapshot::load(path)?;
            let changed = snapshot.refresh(&store)?;
            snapshot.save(path)?;
            SnapshotSummary {
                path: path.clone(),
                repository: snapshot.repository,
                objects: snapshot.objects.len(),
                changed,
            }
        }
    };
    info!(path = %summary.path.display(), changed = summary.changed, "snapshot written");
    render(mode, &summary, |s, w| {
        writeln!(
            w,
            "{}: {} objects ({} changed) from {}",
            s.path.display(),
            s.objects,
            s.changed,
            s.repository
        )
    })
}
