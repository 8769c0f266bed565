//! Proposal data model and the structural/enum/path-safety validator
//! (spec.md §4.I).
//!
//! `Ops` doesn't fit the block format's `Text`/`List`/`Signatures` shape —
//! each of the seven op types carries a different set of fields. We encode
//! each op as one compact JSON object per `Ops:` list line. A useful side
//! effect: `serde_json`'s default map type is a `BTreeMap`, so serializing
//! an op back out for fingerprinting already yields sorted keys for free.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::block::{Block, FieldValue};
use crate::core::safety;

const VALID_RISKS: &[&str] = &["low", "medium", "high"];
const VALID_TYPES: &[&str] = &["decision", "task", "edit"];
pub const STAGED: &str = "staged";

/// A half-open marker range within a target block's body, used by
/// `replace_range`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeSpec {
    pub start: String,
    pub end: String,
}

/// One of the seven typed mutations a proposal's `Ops` field can carry
/// (spec.md §3, §4.K). `file` is always workspace-relative and passes
/// through [`safety::resolve`] before any op executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Op {
    #[serde(rename = "append_block")]
    AppendBlock { file: String, patch: String },
    #[serde(rename = "insert_after_block")]
    InsertAfterBlock {
        file: String,
        target: String,
        patch: String,
    },
    #[serde(rename = "update_field")]
    UpdateField {
        file: String,
        target: String,
        field: String,
        value: String,
    },
    #[serde(rename = "append_list_item")]
    AppendListItem {
        file: String,
        target: String,
        list: String,
        item: String,
    },
    #[serde(rename = "set_status")]
    SetStatus {
        file: String,
        target: String,
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        history: Option<String>,
    },
    #[serde(rename = "replace_range")]
    ReplaceRange {
        file: String,
        target: String,
        range: RangeSpec,
        patch: String,
    },
    #[serde(rename = "supersede_decision")]
    SupersedeDecision {
        file: String,
        target: String,
        new_block: String,
    },
}

impl Op {
    pub fn op_name(&self) -> &'static str {
        match self {
            Op::AppendBlock { .. } => "append_block",
            Op::InsertAfterBlock { .. } => "insert_after_block",
            Op::UpdateField { .. } => "update_field",
            Op::AppendListItem { .. } => "append_list_item",
            Op::SetStatus { .. } => "set_status",
            Op::ReplaceRange { .. } => "replace_range",
            Op::SupersedeDecision { .. } => "supersede_decision",
        }
    }

    pub fn file(&self) -> &str {
        match self {
            Op::AppendBlock { file, .. }
            | Op::InsertAfterBlock { file, .. }
            | Op::UpdateField { file, .. }
            | Op::AppendListItem { file, .. }
            | Op::SetStatus { file, .. }
            | Op::ReplaceRange { file, .. }
            | Op::SupersedeDecision { file, .. } => file,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            Op::AppendBlock { .. } => None,
            Op::InsertAfterBlock { target, .. }
            | Op::UpdateField { target, .. }
            | Op::AppendListItem { target, .. }
            | Op::SetStatus { target, .. }
            | Op::ReplaceRange { target, .. }
            | Op::SupersedeDecision { target, .. } => Some(target),
        }
    }
}

/// Parsed proposal fields, tolerant of missing or malformed data — the
/// validator reports each problem as a string rather than failing parse
/// itself, mirroring the original's dict-based `validate_proposal`.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub id: Option<String>,
    pub proposal_type: Option<String>,
    pub risk: Option<String>,
    pub status: Option<String>,
    pub evidence: Vec<String>,
    pub rollback: Vec<String>,
    pub ops: Vec<Op>,
    pub op_errors: Vec<String>,
    pub target_block: Option<String>,
    pub files_touched: Vec<String>,
    pub fingerprint: Option<String>,
    pub created: Option<String>,
}

fn field_list_or_text(block: &Block, name: &str) -> Vec<String> {
    match block.field(name) {
        Some(FieldValue::Text(s)) => vec![s.clone()],
        Some(FieldValue::List(items)) => items.clone(),
        _ => Vec::new(),
    }
}

impl Proposal {
    pub fn from_block(block: &Block) -> Proposal {
        let mut ops = Vec::new();
        let mut op_errors = Vec::new();
        if let Some(items) = block.field_list("Ops") {
            for (i, raw) in items.iter().enumerate() {
                match serde_json::from_str::<Op>(raw) {
                    Ok(op) => ops.push(op),
                    Err(e) => op_errors.push(format!("Ops[{i}]: invalid op encoding: {e}")),
                }
            }
        }

        Proposal {
            id: block.field_str("ProposalId").map(str::to_string),
            proposal_type: block.field_str("Type").map(str::to_string),
            risk: block.field_str("Risk").map(str::to_string),
            status: block.field_str("Status").map(str::to_string),
            evidence: field_list_or_text(block, "Evidence"),
            rollback: field_list_or_text(block, "Rollback"),
            ops,
            op_errors,
            target_block: block.field_str("TargetBlock").map(str::to_string),
            files_touched: field_list_or_text(block, "FilesTouched"),
            fingerprint: block.field_str("Fingerprint").map(str::to_string),
            created: block.field_str("Created").map(str::to_string),
        }
    }
}

fn path_safety_error(root: &Path, file: &str) -> Option<String> {
    match safety::resolve(root, file) {
        Ok(_) => None,
        Err(e) => Some(format!("{file}: {e}")),
    }
}

/// Validate `proposal` per spec.md §4.I. `root` is needed only to run the
/// path-safety check on every `op.file`; no file is read or written.
pub fn validate_proposal(root: &Path, proposal: &Proposal) -> Vec<String> {
    let mut errors = Vec::new();

    if proposal.id.is_none() {
        errors.push("Missing required field: ProposalId".to_string());
    }
    if proposal.proposal_type.is_none() {
        errors.push("Missing required field: Type".to_string());
    }
    if proposal.risk.is_none() {
        errors.push("Missing required field: Risk".to_string());
    }
    if proposal.status.is_none() {
        errors.push("Missing required field: Status".to_string());
    }
    if proposal.rollback.is_empty() {
        errors.push("Missing required field: Rollback".to_string());
    }

    if let Some(risk) = &proposal.risk {
        if !VALID_RISKS.contains(&risk.as_str()) {
            errors.push(format!("Invalid Risk: {risk} (must be one of {VALID_RISKS:?})"));
        }
    }
    if let Some(ty) = &proposal.proposal_type {
        if !VALID_TYPES.contains(&ty.as_str()) {
            errors.push(format!("Invalid Type: {ty} (must be one of {VALID_TYPES:?})"));
        }
    }
    match &proposal.status {
        Some(s) if s == STAGED => {}
        other => errors.push(format!(
            "Status must be 'staged' to apply (got {:?})",
            other.clone().unwrap_or_default()
        )),
    }

    if proposal.evidence.is_empty() || proposal.evidence.iter().all(|e| e.is_empty()) {
        errors.push("Evidence is empty".to_string());
    }

    errors.extend(proposal.op_errors.iter().cloned());
    if proposal.ops.is_empty() && proposal.op_errors.is_empty() {
        errors.push("No Ops defined".to_string());
    }

    for (i, op) in proposal.ops.iter().enumerate() {
        if op.file().is_empty() {
            errors.push(format!("Ops[{i}]: missing 'file'"));
        } else if let Some(e) = path_safety_error(root, op.file()) {
            errors.push(format!("Ops[{i}]: {e}"));
        }
        let needs_target = !matches!(op, Op::AppendBlock { .. });
        if needs_target && op.target().map(str::is_empty).unwrap_or(true) {
            errors.push(format!("Ops[{i}]: op '{}' requires 'target'", op.op_name()));
        }
    }

    if !proposal.files_touched.is_empty() {
        let ft: std::collections::HashSet<&str> =
            proposal.files_touched.iter().map(String::as_str).collect();
        let missing: Vec<&str> = proposal
            .ops
            .iter()
            .map(|op| op.file())
            .filter(|f| !ft.contains(f))
            .collect();
        if !missing.is_empty() {
            errors.push(format!("Ops reference files not in FilesTouched: {missing:?}"));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::parse_blocks;
    use tempfile::tempdir;

    fn proposal_from(text: &str) -> Proposal {
        let blocks = parse_blocks(text, "f", "l");
        Proposal::from_block(&blocks[0])
    }

    #[test]
    fn rejects_missing_required_fields() {
        let td = tempdir().unwrap();
        let p = proposal_from("[P-1]\nType: decision\n");
        let errors = validate_proposal(td.path(), &p);
        assert!(errors.iter().any(|e| e.contains("ProposalId")));
    }

    #[test]
    fn rejects_non_staged_status() {
        let td = tempdir().unwrap();
        let text = concat!(
            "[P-1]\nProposalId: P-1\nType: decision\nRisk: low\nStatus: applied\n",
            "Evidence:\n- x\nRollback:\n- y\nOps:\n",
            r#"- {"op":"append_block","file":"decisions/DECISIONS.md","patch":"[D-1]\nStatement: x"}"#,
            "\n",
        );
        let p = proposal_from(text);
        let errors = validate_proposal(td.path(), &p);
        assert!(errors.iter().any(|e| e.contains("staged")));
    }

    #[test]
    fn rejects_path_traversal_in_op_file() {
        let td = tempdir().unwrap();
        let text = concat!(
            "[P-1]\nProposalId: P-1\nType: decision\nRisk: low\nStatus: staged\n",
            "Evidence:\n- x\nRollback:\n- y\nOps:\n",
            r#"- {"op":"append_block","file":"../../../etc/shadow","patch":"x"}"#,
            "\n",
        );
        let p = proposal_from(text);
        let errors = validate_proposal(td.path(), &p);
        assert!(errors.iter().any(|e| e.contains("traversal") || e.contains("absolute")));
    }

    #[test]
    fn accepts_well_formed_proposal() {
        let td = tempdir().unwrap();
        std::fs::create_dir_all(td.path().join("decisions")).unwrap();
        std::fs::write(td.path().join("decisions/DECISIONS.md"), "").unwrap();
        let text = concat!(
            "[P-1]\nProposalId: P-1\nType: decision\nRisk: low\nStatus: staged\n",
            "Evidence:\n- some evidence\nRollback:\n- revert manually\nOps:\n",
            r#"- {"op":"append_block","file":"decisions/DECISIONS.md","patch":"[D-1]\nStatement: x"}"#,
            "\n",
        );
        let p = proposal_from(text);
        let errors = validate_proposal(td.path(), &p);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn rejects_op_requiring_target_without_one() {
        let td = tempdir().unwrap();
        std::fs::create_dir_all(td.path().join("decisions")).unwrap();
        std::fs::write(td.path().join("decisions/DECISIONS.md"), "").unwrap();
        let text = concat!(
            "[P-1]\nProposalId: P-1\nType: decision\nRisk: low\nStatus: staged\n",
            "Evidence:\n- x\nRollback:\n- y\nOps:\n",
            r#"- {"op":"update_field","file":"decisions/DECISIONS.md","target":"","field":"Status","value":"x"}"#,
            "\n",
        );
        let p = proposal_from(text);
        let errors = validate_proposal(td.path(), &p);
        assert!(errors.iter().any(|e| e.contains("requires 'target'")));
    }
}
