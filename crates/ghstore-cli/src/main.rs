#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cmd::RepoArgs;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "ghs: a key-value object store backed by GitHub issues",
    long_about = None
)]
struct Cli {
    /// Output format (default: pretty on a TTY, text when piped).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(flatten)]
    repo: RepoArgs,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Objects",
        about = "Create a stored object",
        long_about = "Open a ticket for a new object, record its initial state, and close it.",
        after_help = "EXAMPLES:\n    # Create an object\n    ghs create settings '{\"theme\": \"dark\"}'\n\n    # Read the data from a file\n    ghs create settings @settings.json"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Objects",
        about = "Read a stored object",
        long_about = "Read an object's current state, following aliases and folding in deprecated history.",
        after_help = "EXAMPLES:\n    # Read an object\n    ghs get settings\n\n    # Read an alias ticket without following it\n    ghs get old-settings --no-canonical\n\n    # Emit machine-readable output\n    ghs get settings --format json"
    )]
    Get(cmd::get::GetArgs),

    #[command(
        next_help_heading = "Objects",
        about = "Queue a change to an object",
        long_about = "Post an update comment on the object's canonical ticket and reopen it for processing.",
        after_help = "EXAMPLES:\n    # Merge a change into an object\n    ghs update settings '{\"theme\": \"light\"}'\n\n    # Read the change from stdin\n    echo '{\"count\": 2}' | ghs update counter -"
    )]
    Update(cmd::update::UpdateArgs),

    #[command(
        next_help_heading = "Objects",
        about = "Archive an object",
        long_about = "Close an object's ticket and mark it archived so listings skip it.",
        after_help = "EXAMPLES:\n    # Archive an object\n    ghs delete settings"
    )]
    Delete(cmd::delete::DeleteArgs),

    #[command(
        next_help_heading = "Objects",
        about = "List stored objects",
        long_about = "List every live object, or only those whose ticket changed after a timestamp.",
        after_help = "EXAMPLES:\n    # List everything\n    ghs list\n\n    # Only objects changed after an instant\n    ghs list --since 2025-01-01T00:00:00Z"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Objects",
        about = "Show an object's comment history",
        after_help = "EXAMPLES:\n    # Show history\n    ghs history settings"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Reconciliation",
        about = "Apply pending updates to a ticket",
        long_about = "Fold authorized, unprocessed update comments into a ticket's body, mark them processed, and close the ticket.",
        after_help = "EXAMPLES:\n    # Process issue 42 (typically from a workflow on issue reopen)\n    ghs process-updates 42"
    )]
    ProcessUpdates(cmd::process::ProcessArgs),

    #[command(
        next_help_heading = "Reconciliation",
        about = "Export objects to a snapshot file",
        after_help = "EXAMPLES:\n    # Full export\n    ghs snapshot create --output snapshot.json\n\n    # Pull changes since the snapshot was taken\n    ghs snapshot update snapshot.json"
    )]
    Snapshot(cmd::snapshot::SnapshotArgs),

    #[command(
        next_help_heading = "Canonicalization",
        about = "Print the canonical ID for an object ID",
        after_help = "EXAMPLES:\n    # Follow aliases\n    ghs resolve old-settings\n\n    # Follow at most one hop\n    ghs resolve old-settings --max-depth 1"
    )]
    Resolve(cmd::resolve::ResolveArgs),

    #[command(
        next_help_heading = "Canonicalization",
        about = "Make one object ID an alias of another",
        after_help = "EXAMPLES:\n    # Reads and writes of old-settings go to settings\n    ghs alias old-settings settings"
    )]
    Alias(cmd::alias::AliasArgs),

    #[command(
        next_help_heading = "Canonicalization",
        about = "List alias links",
        after_help = "EXAMPLES:\n    # Every alias\n    ghs aliases\n\n    # Aliases of one object\n    ghs aliases --target settings"
    )]
    Aliases(cmd::alias::AliasesArgs),

    #[command(
        next_help_heading = "Canonicalization",
        about = "Retire an object into another",
        long_about = "Mark an object's ticket deprecated, point it at the target, and merge its history into the target.",
        after_help = "EXAMPLES:\n    # Merge legacy-config into settings\n    ghs deprecate legacy-config settings --reason replaced"
    )]
    Deprecate(cmd::deprecate::DeprecateArgs),

    #[command(
        next_help_heading = "Canonicalization",
        about = "List object IDs held by more than one ticket"
    )]
    FindDuplicates,

    #[command(
        next_help_heading = "Canonicalization",
        about = "Collapse duplicate tickets",
        long_about = "Keep one ticket per duplicated object ID (the oldest unless told otherwise) and deprecate the rest into it.",
        after_help = "EXAMPLES:\n    # Repair every duplicate group\n    ghs dedup\n\n    # Keep issue 12 for settings\n    ghs dedup --object-id settings --canonical-issue 12\n\n    # Preview\n    ghs dedup --dry-run"
    )]
    Dedup(cmd::dedup::DedupArgs),

    #[command(
        next_help_heading = "Shell",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    # Bash\n    ghs completions bash > ~/.local/share/bash-completion/completions/ghs"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("GHSTORE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "ghstore=debug,info"
        } else {
            "ghstore=info,warn"
        })
    });

    let format = env::var("GHSTORE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_ansi(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, mode: OutputMode) -> anyhow::Result<()> {
    let repo = &cli.repo;
    match &cli.command {
        Commands::Create(args) => cmd::create::run_create(args, repo, mode),
        Commands::Get(args) => cmd::get::run_get(args, repo, mode),
        Commands::Update(args) => cmd::update::run_update(args, repo, mode),
        Commands::Delete(args) => cmd::delete::run_delete(args, repo, mode),
        Commands::List(args) => cmd::list::run_list(args, repo, mode),
        Commands::History(args) => cmd::history::run_history(args, repo, mode),
        Commands::ProcessUpdates(args) => cmd::process::run_process(args, repo, mode),
        Commands::Snapshot(args) => cmd::snapshot::run_snapshot(args, repo, mode),
        Commands::Resolve(args) => cmd::resolve::run_resolve(args, repo, mode),
        Commands::Alias(args) => cmd::alias::run_alias(args, repo, mode),
        Commands::Aliases(args) => cmd::alias::run_aliases(args, repo, mode),
        Commands::Deprecate(args) => cmd::deprecate::run_deprecate(args, repo, mode),
        Commands::FindDuplicates => cmd::dedup::run_find_duplicates(repo, mode),
        Commands::Dedup(args) => cmd::dedup::run_dedup(args, repo, mode),
        Commands::Completions(args) => {
            cmd::completions::run_completions(args.shell, &mut Cli::command())
        }
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let mode = cli.output_mode();
    debug!(command = ?cli.command, ?mode, "starting");

    match run(&cli, mode) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Nothing left to report to if stderr is gone.
            let _ = render_error(mode, &CliError::from_anyhow(&err));
            ExitCode::FAILURE
        }
    }
}
