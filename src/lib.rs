//! Cairn: durable, file-backed structured memory for long-running agents.
//!
//! Two engines share one block model and one ID space:
//!
//! - **Recall** (`recall`) ranks blocks in a fixed corpus against a query,
//!   classifying the query, expanding it against a closed synonym table,
//!   scoring with BM25F plus bigram/chunk/recency/status/priority boosts,
//!   and optionally widening the result set across a two-hop
//!   cross-reference graph.
//! - **Apply** (`apply`) mutates that corpus. A staged proposal is located,
//!   validated, fingerprinted, gated (dedup/backlog/cooldown/no-touch),
//!   snapshotted, executed as a sequence of seven typed ops, post-checked,
//!   and either committed with a receipt + diff artifact or rolled back.
//!
//! `core` holds what both share: the block parser/emitter, the error type,
//! the path-safety resolver, and the intel-state store. `cli` and
//! [`run`] are the only pieces that touch stdout/stderr or `std::env`.

pub mod apply;
pub mod cli;
pub mod core;
pub mod recall;

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::cli::{ApplyCli, Cli, Command, RecallCli};
use crate::core::error::CairnError;
use crate::core::output;
use crate::recall::RecallOptions;

fn workspace_root(explicit: Option<PathBuf>) -> Result<PathBuf, CairnError> {
    let dir = match explicit {
        Some(p) => p,
        None => std::env::current_dir()?,
    };
    std::fs::canonicalize(&dir).map_err(CairnError::from)
}

fn run_recall(args: RecallCli) -> Result<i32, CairnError> {
    let root = workspace_root(args.workspace)?;
    let opts = RecallOptions {
        limit: args.limit,
        active_only: args.active_only,
        agent_id: None,
        acl: None,
        force_graph: args.graph,
    };
    let hits = recall::recall(&root, &args.query, &opts)?;

    if args.json {
        let json = serde_json::to_string_pretty(&hits.iter().map(hit_to_json).collect::<Vec<_>>())?;
        println!("{json}");
    } else if hits.is_empty() {
        output::info("no hits");
    } else {
        for hit in &hits {
            let graph_tag = if hit.via_graph { " [graph]" } else { "" };
            output::ok(&format!(
                "{:<24} {:>7.4}  {}{}",
                hit.id,
                hit.score,
                output::compact_line(&hit.excerpt, 80),
                graph_tag
            ));
        }
    }
    Ok(0)
}

fn hit_to_json(hit: &recall::Hit) -> serde_json::Value {
    serde_json::json!({
        "id": hit.id,
        "type": hit.block_type,
        "score": hit.score,
        "excerpt": hit.excerpt,
        "file": hit.file,
        "line": hit.line,
        "status": hit.status,
        "via_graph": hit.via_graph,
    })
}

fn run_apply(args: ApplyCli) -> Result<i32, CairnError> {
    let root = workspace_root(args.workspace)?;

    if let Some(ts) = args.rollback {
        apply::rollback(&root, &ts)?;
        output::ok(&format!("rolled back snapshot {ts}"));
        return Ok(0);
    }

    let Some(proposal_id) = args.proposal_id else {
        return Err(CairnError::Validation(
            "a ProposalId is required unless --rollback is given".to_string(),
        ));
    };

    match apply::apply_proposal(&root, &proposal_id, args.dry_run) {
        Ok(outcome) => {
            output::ok(&outcome.message);
            Ok(0)
        }
        Err(CairnError::Validation(msg)) => {
            output::fail(&format!("validation: {msg}"));
            Ok(2)
        }
        Err(e @ (CairnError::GateRefused(_) | CairnError::OpFailed(_) | CairnError::PreconditionFailed(_))) => {
            output::fail(&e.to_string());
            Ok(1)
        }
        Err(e) => Err(e),
    }
}

/// Parse `std::env::args()` and dispatch to the recall or apply subcommand.
/// Returns the process exit code (spec.md §6): `0` applied / dry-run OK /
/// rollback OK, `1` failed and rolled back, `2` validation error.
pub fn run() -> Result<i32, CairnError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Recall(args) => run_recall(args),
        Command::Apply(args) => run_apply(args),
    }
}

/// Used by integration tests that want the workspace-root resolution logic
/// without going through `Cli::parse()`.
pub fn resolve_workspace(explicit: Option<&Path>) -> Result<PathBuf, CairnError> {
    workspace_root(explicit.map(Path::to_path_buf))
}
