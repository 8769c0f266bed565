//! CLI struct definitions for the Cairn command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib::run`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(
    name = "cairn",
    version = env!("CARGO_PKG_VERSION"),
    about = "Durable, file-backed structured memory for long-running agents: ranked recall over a block corpus, and an atomic, snapshot-backed proposal apply pipeline."
)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Rank blocks in the corpus against a query.
    Recall(RecallCli),
    /// Apply a staged proposal, or roll one back.
    Apply(ApplyCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct RecallCli {
    /// Query text.
    #[clap(long)]
    pub query: String,
    /// Workspace root (defaults to the current directory).
    #[clap(long, short = 'w')]
    pub workspace: Option<PathBuf>,
    /// Maximum number of hits to return.
    #[clap(long, default_value_t = 10)]
    pub limit: usize,
    /// Only consider blocks with an active-family status.
    #[clap(long)]
    pub active_only: bool,
    /// Force two-hop graph boosting regardless of query classification.
    #[clap(long)]
    pub graph: bool,
    /// Emit results as JSON instead of a text table.
    #[clap(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub(crate) struct ApplyCli {
    /// ProposalId to apply. Omit when using `--rollback`.
    pub proposal_id: Option<String>,
    /// Workspace root (defaults to the current directory).
    pub workspace: Option<PathBuf>,
    /// Validate and run preconditions, but stop before mutating anything.
    #[clap(long)]
    pub dry_run: bool,
    /// Roll back a previously applied snapshot by its receipt timestamp.
    #[clap(long)]
    pub rollback: Option<String>,
}
