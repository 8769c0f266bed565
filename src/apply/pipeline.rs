//! Apply pipeline (spec.md §4.L): the ordered gate sequence from locating a
//! proposal through commit or rollback.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::core::block::{self, Block};
use crate::core::error::CairnError;
use crate::core::intel_state::IntelState;
use crate::core::safety;

use super::snapshot;
use super::validate::{self, Op, Proposal, STAGED};

const PROPOSED_FILES: &[&str] = &[
    "intelligence/proposed/DECISIONS_PROPOSED.md",
    "intelligence/proposed/TASKS_PROPOSED.md",
    "intelligence/proposed/EDITS_PROPOSED.md",
];
const PRECONDITION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    Applied,
    DryRun,
    RolledBack,
}

#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub receipt_path: Option<PathBuf>,
    pub status: ApplyStatus,
    pub message: String,
}

fn find_proposal(root: &Path, proposal_id: &str) -> Result<Option<(Proposal, String)>, CairnError> {
    for rel in PROPOSED_FILES {
        let Ok(path) = safety::resolve(root, rel) else {
            continue;
        };
        if !path.is_file() {
            continue;
        }
        let text = fs::read_to_string(&path)?;
        let blocks = block::parse_blocks(&text, rel, "proposed");
        for b in &blocks {
            let pid = b.field_str("ProposalId").unwrap_or(&b.id);
            if pid == proposal_id || b.id == proposal_id {
                return Ok(Some((Proposal::from_block(b), (*rel).to_string())));
            }
        }
    }
    Ok(None)
}

fn all_proposals(root: &Path) -> Result<Vec<Proposal>, CairnError> {
    let mut out = Vec::new();
    for rel in PROPOSED_FILES {
        let Ok(path) = safety::resolve(root, rel) else {
            continue;
        };
        if !path.is_file() {
            continue;
        }
        let text = fs::read_to_string(&path)?;
        let blocks = block::parse_blocks(&text, rel, "proposed");
        out.extend(blocks.iter().map(Proposal::from_block));
    }
    Ok(out)
}

fn compute_fingerprint(proposal: &Proposal) -> String {
    let ops: Vec<serde_json::Value> = proposal
        .ops
        .iter()
        .map(|op| {
            serde_json::json!({
                "op": op.op_name(),
                "file": op.file(),
                "target": op.target(),
            })
        })
        .collect();
    let canon = serde_json::json!({
        "type": proposal.proposal_type.clone().unwrap_or_default(),
        "target": proposal.target_block.clone().unwrap_or_default(),
        "ops": ops,
    });
    let text = serde_json::to_string(&canon).unwrap_or_default();
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

fn check_fingerprint_dedup(
    root: &Path,
    fingerprint: &str,
    self_id: Option<&str>,
) -> Result<Option<String>, CairnError> {
    for p in all_proposals(root)? {
        if p.id.as_deref() == self_id {
            continue;
        }
        let is_candidate = matches!(p.status.as_deref(), Some("staged") | Some("deferred"));
        if is_candidate && p.fingerprint.as_deref() == Some(fingerprint) {
            return Ok(Some(p.id.unwrap_or_else(|| "?".to_string())));
        }
    }
    Ok(None)
}

fn count_staged(root: &Path) -> Result<usize, CairnError> {
    Ok(all_proposals(root)?
        .iter()
        .filter(|p| p.status.as_deref() == Some(STAGED))
        .count())
}

fn check_deferred_cooldown(root: &Path, proposal: &Proposal, cooldown_days: u32) -> Result<Option<String>, CairnError> {
    let Some(target) = proposal.target_block.as_deref() else {
        return Ok(None);
    };
    let cutoff = Utc::now() - chrono::Duration::days(cooldown_days as i64);
    for p in all_proposals(root)? {
        let blocked_status = matches!(p.status.as_deref(), Some("rejected") | Some("deferred"));
        if blocked_status && p.target_block.as_deref() == Some(target) {
            if let Some(created) = p.created.as_deref() {
                if let Some(created_dt) = crate::core::intel_state::parse_iso(created) {
                    if created_dt > cutoff {
                        return Ok(Some(format!(
                            "target {target} has a {} proposal within {cooldown_days}d cooldown",
                            p.status.unwrap_or_default()
                        )));
                    }
                }
            }
        }
    }
    Ok(None)
}

fn run_checker(root: &Path, interpreter: &str, script_rel: &str) -> Result<(bool, String), CairnError> {
    let Ok(script) = safety::resolve(root, script_rel) else {
        return Ok((false, format!("{script_rel}: ERROR (not resolvable)")));
    };
    if !script.is_file() {
        return Ok((false, format!("{script_rel}: ERROR (not found)")));
    }

    let mut child = match Command::new(interpreter)
        .arg(&script)
        .arg(root)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => return Ok((false, format!("{script_rel}: ERROR ({e})"))),
    };

    let deadline = Instant::now() + PRECONDITION_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    return Ok((false, format!("{script_rel}: ERROR (timed out)")));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Ok((false, format!("{script_rel}: ERROR ({e})"))),
        }
    }

    let output = child.wait_with_output()?;
    Ok((true, String::from_utf8_lossy(&output.stdout).to_string()))
}

/// Run the validator + intel-scanner preconditions, parsing a `TOTAL` line
/// with `0 issues` / `0 critical` from each. Returns the report lines on
/// success, `Err` on the first failure (spec.md §4.L step 8 and §7).
fn run_preconditions(root: &Path) -> Result<Vec<String>, CairnError> {
    let mut report = Vec::new();

    let (spawned, stdout) = run_checker(root, "bash", "maintenance/validate.sh")?;
    let total_line = stdout
        .lines()
        .find(|l| l.contains("issues") && l.contains("TOTAL"))
        .unwrap_or_default();
    if spawned && total_line.contains("0 issues") {
        report.push(format!("validate: PASS ({total_line})"));
    } else {
        report.push(format!(
            "validate: FAIL ({})",
            if total_line.is_empty() { "no TOTAL line found" } else { total_line }
        ));
        return Err(CairnError::PreconditionFailed(report.join("; ")));
    }

    let (spawned, stdout) = run_checker(root, "python3", "maintenance/intel_scan.py")?;
    let total_line = stdout
        .lines()
        .find(|l| l.contains("critical") && l.contains("TOTAL"))
        .unwrap_or_default();
    if spawned && total_line.contains("0 critical") {
        report.push(format!("intel_scan: PASS ({total_line})"));
    } else {
        report.push(format!(
            "intel_scan: FAIL ({})",
            if total_line.is_empty() { "no TOTAL line found" } else { total_line }
        ));
        return Err(CairnError::PreconditionFailed(report.join("; ")));
    }

    Ok(report)
}

fn write_receipt(
    snap_dir: &Path,
    proposal: &Proposal,
    ts: &str,
    mode: &str,
    pre_checks: &[String],
) -> Result<PathBuf, CairnError> {
    let receipt_path = snap_dir.join("APPLY_RECEIPT.md");
    let mut lines = vec![
        format!("[AR-{ts}]"),
        format!("ProposalId: {}", proposal.id.as_deref().unwrap_or("?")),
        format!("Date: {}", Utc::now().format("%Y-%m-%d")),
        format!("Time: {ts}"),
        format!("Mode: {mode}"),
        format!("Risk: {}", proposal.risk.as_deref().unwrap_or("?")),
        format!("TargetBlock: {}", proposal.target_block.as_deref().unwrap_or("?")),
        "FilesTouched:".to_string(),
    ];
    for f in &proposal.files_touched {
        lines.push(format!("- {f}"));
    }
    lines.push("PreChecks:".to_string());
    for c in pre_checks {
        lines.push(format!("- {c}"));
    }
    lines.push(format!(
        "RollbackPlan: {}",
        proposal.rollback.first().map(String::as_str).unwrap_or("?")
    ));
    lines.push("Status: in_progress".to_string());
    lines.push(String::new());

    fs::write(&receipt_path, lines.join("\n"))?;
    Ok(receipt_path)
}

fn update_receipt(
    receipt_path: &Path,
    post_checks: &[String],
    created: &[String],
    modified: &[String],
    status: &str,
) -> Result<(), CairnError> {
    let mut out = String::new();
    out.push_str("PostChecks:\n");
    for c in post_checks {
        out.push_str(&format!("- {c}\n"));
    }
    out.push_str("Delta:\n");
    for c in created {
        out.push_str(&format!("- created: {c}\n"));
    }
    for m in modified {
        out.push_str(&format!("- modified: {m}\n"));
    }
    out.push_str(&format!("FinalStatus: {status}\n"));

    let mut existing = fs::read_to_string(receipt_path).unwrap_or_default();
    existing.push_str(&out);
    fs::write(receipt_path, existing)?;
    Ok(())
}

fn generate_diff_artifact(root: &Path, snap_dir: &Path, files_touched: &[String]) -> Result<(), CairnError> {
    let mut sections = Vec::new();
    for rel in files_touched {
        let old_path = snap_dir.join(rel);
        let new_path = root.join(rel);
        let old_text = fs::read_to_string(&old_path).unwrap_or_default();
        let new_text = fs::read_to_string(&new_path).unwrap_or_default();
        if old_text == new_text {
            continue;
        }
        let diff = similar::TextDiff::from_lines(&old_text, &new_text);
        let unified = diff
            .unified_diff()
            .header(&format!("a/{rel}"), &format!("b/{rel}"))
            .to_string();
        if !unified.is_empty() {
            sections.push(unified);
        }
    }
    let diff_path = snap_dir.join("DIFF.txt");
    if sections.is_empty() {
        fs::write(diff_path, "(no differences detected)\n")?;
    } else {
        fs::write(diff_path, sections.join("\n"))?;
    }
    Ok(())
}

/// Best-effort rewrite of `Status:` within the proposal's own block in its
/// source proposed-file, by reusing the `update_field` op primitive instead
/// of a bespoke line scanner. Failure here is non-critical — the receipt
/// remains the primary record of what happened.
fn mark_proposal_status(root: &Path, source_rel: &str, proposal_id: &str, new_status: &str) {
    let path = match safety::resolve(root, source_rel) {
        Ok(p) => p,
        Err(_) => return,
    };
    let Ok(text) = fs::read_to_string(&path) else {
        return;
    };
    let blocks = block::parse_blocks(&text, source_rel, "proposed");
    let Some(block) = find_block_by_proposal_id(&blocks, proposal_id) else {
        return;
    };
    let _ = super::ops::execute_op(
        root,
        &Op::UpdateField {
            file: source_rel.to_string(),
            target: block.id.clone(),
            field: "Status".to_string(),
            value: new_status.to_string(),
        },
    );
}

fn find_block_by_proposal_id<'a>(blocks: &'a [Block], proposal_id: &str) -> Option<&'a Block> {
    blocks
        .iter()
        .find(|b| b.field_str("ProposalId") == Some(proposal_id) || b.id == proposal_id)
}

/// Run the full apply pipeline for `proposal_id` (spec.md §4.L).
pub fn apply_proposal(root: &Path, proposal_id: &str, dry_run: bool) -> Result<ApplyOutcome, CairnError> {
    let (proposal, source_rel) = find_proposal(root, proposal_id)?
        .ok_or_else(|| CairnError::NotFound(format!("proposal {proposal_id}")))?;

    let errors = validate::validate_proposal(root, &proposal);
    if !errors.is_empty() {
        return Err(CairnError::Validation(errors.join("; ")));
    }

    let fingerprint = compute_fingerprint(&proposal);
    if let Some(dup_id) = check_fingerprint_dedup(root, &fingerprint, proposal.id.as_deref())? {
        return Err(CairnError::GateRefused(format!("duplicate proposal (matches {dup_id})")));
    }

    let mut state = IntelState::load(root)?;
    let backlog_count = count_staged(root)?;
    if backlog_count >= state.proposal_budget.backlog_limit as usize {
        return Err(CairnError::GateRefused(format!(
            "backlog limit exceeded ({backlog_count} staged)"
        )));
    }

    if let Some(reason) = check_deferred_cooldown(root, &proposal, state.defer_cooldown_days)? {
        return Err(CairnError::GateRefused(reason));
    }

    let now = Utc::now();
    if let Some(remaining) = state.no_touch_remaining(now) {
        if !dry_run {
            return Err(CairnError::GateRefused(format!(
                "No-touch window: {}m {}s remaining",
                remaining.num_minutes(),
                remaining.num_seconds() % 60
            )));
        }
    }

    let pre_report = run_preconditions(root)?;

    if dry_run {
        return Ok(ApplyOutcome {
            receipt_path: None,
            status: ApplyStatus::DryRun,
            message: "dry run OK".to_string(),
        });
    }

    let ts = now.format("%Y%m%d-%H%M%S").to_string();
    let snap_dir = snapshot::create_snapshot(root, &ts)?;
    let receipt_path = write_receipt(&snap_dir, &proposal, &ts, &state.self_correcting_mode, &pre_report)?;

    let mut created = Vec::new();
    let mut modified = Vec::new();
    for (i, op) in proposal.ops.iter().enumerate() {
        match super::ops::execute_op(root, op) {
            Ok(outcome) => {
                let label = op.target().unwrap_or("new").to_string();
                if outcome.created {
                    created.push(label);
                } else {
                    modified.push(label);
                }
            }
            Err(e) => {
                snapshot::restore_snapshot(root, &snap_dir)?;
                update_receipt(
                    &receipt_path,
                    &[format!("ABORTED: op {i} failure: {e}")],
                    &created,
                    &modified,
                    "rolled_back",
                )?;
                return Err(CairnError::OpFailed(format!("op {i} failed: {e}")));
            }
        }
    }

    let post_report = match run_preconditions(root) {
        Ok(report) => report,
        Err(e) => {
            snapshot::restore_snapshot(root, &snap_dir)?;
            update_receipt(&receipt_path, &[e.to_string()], &created, &modified, "rolled_back")?;
            mark_proposal_status(root, &source_rel, proposal_id, "rolled_back");
            return Err(CairnError::PreconditionFailed("post-checks failed, rolled back".to_string()));
        }
    };

    generate_diff_artifact(root, &snap_dir, &proposal.files_touched)?;
    update_receipt(&receipt_path, &post_report, &created, &modified, "applied")?;
    mark_proposal_status(root, &source_rel, proposal_id, "applied");
    state.record_apply(root, now)?;

    Ok(ApplyOutcome {
        receipt_path: Some(receipt_path),
        status: ApplyStatus::Applied,
        message: format!("applied successfully: {}", receipt_path.display()),
    })
}

/// Explicit rollback entry point: restore from a receipt timestamp and
/// finalize its receipt (spec.md §4.L tail).
pub fn rollback(root: &Path, receipt_ts: &str) -> Result<(), CairnError> {
    let snap_dir = root.join("intelligence").join("applied").join(receipt_ts);
    if !snap_dir.is_dir() {
        return Err(CairnError::NotFound(format!("snapshot {receipt_ts}")));
    }

    snapshot::restore_snapshot(root, &snap_dir)?;
    let _ = run_preconditions(root);

    let receipt_path = snap_dir.join("APPLY_RECEIPT.md");
    if receipt_path.is_file() {
        let mut text = fs::read_to_string(&receipt_path)?;
        text.push_str(&format!(
            "\nRolledBack: {}\nFinalStatus: rolled_back\n",
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
        ));
        fs::write(&receipt_path, text)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn staged_proposal(id: &str, target: &str) -> String {
        format!(
            concat!(
                "[{id}]\nProposalId: {id}\nType: decision\nRisk: low\nStatus: staged\n",
                "TargetBlock: {target}\nFilesTouched:\n- decisions/DECISIONS.md\n",
                "Evidence:\n- some evidence\nRollback:\n- revert manually\nOps:\n",
                r#"- {{"op":"append_block","file":"decisions/DECISIONS.md","patch":"[D-99]\nStatement: new fact"}}"#,
                "\n",
            ),
            id = id,
            target = target,
        )
    }

    #[test]
    fn fingerprint_is_stable_and_excludes_self_on_dedup() {
        let td = tempdir().unwrap();
        write(td.path(), "decisions/DECISIONS.md", "[D-1]\nStatement: x\nStatus: active\n");
        write(
            td.path(),
            "intelligence/proposed/DECISIONS_PROPOSED.md",
            &staged_proposal("P-1", "D-1"),
        );
        let (proposal, _) = find_proposal(td.path(), "P-1").unwrap().unwrap();
        let fp = compute_fingerprint(&proposal);
        let dup = check_fingerprint_dedup(td.path(), &fp, Some("P-1")).unwrap();
        assert!(dup.is_none());
    }

    #[test]
    fn dedup_flags_matching_fingerprint_on_other_proposal() {
        let td = tempdir().unwrap();
        write(
            td.path(),
            "intelligence/proposed/DECISIONS_PROPOSED.md",
            &format!("{}\n{}", staged_proposal("P-1", "D-1"), staged_proposal("P-2", "D-1")),
        );
        let (p1, _) = find_proposal(td.path(), "P-1").unwrap().unwrap();
        let fp = compute_fingerprint(&p1);

        // Manually stamp P-2 with the same fingerprint, as a real proposal would
        // carry from its own fingerprinting step.
        let path = td.path().join("intelligence/proposed/DECISIONS_PROPOSED.md");
        let mut text = fs::read_to_string(&path).unwrap();
        text = text.replace("[P-2]", &format!("[P-2]\nFingerprint: {fp}"));
        fs::write(&path, text).unwrap();

        let dup = check_fingerprint_dedup(td.path(), &fp, Some("P-1")).unwrap();
        assert_eq!(dup.as_deref(), Some("P-2"));
    }

    #[test]
    fn backlog_counts_only_staged() {
        let td = tempdir().unwrap();
        write(
            td.path(),
            "intelligence/proposed/DECISIONS_PROPOSED.md",
            &staged_proposal("P-1", "D-1"),
        );
        assert_eq!(count_staged(td.path()).unwrap(), 1);
    }

    #[test]
    fn missing_proposal_is_not_found() {
        let td = tempdir().unwrap();
        let result = find_proposal(td.path(), "P-none").unwrap();
        assert!(result.is_none());
    }
}
