//! Op executors (spec.md §4.K). Each op reads its target file's lines,
//! mutates them in memory, and writes the file back whole — no partial
//! writes. Target-block lookup scans for `[<target>]` until the next block
//! header (any `[...]` line) or EOF, mirroring the original's loose
//! (non-anchored) header match.

use std::fs;
use std::path::Path;

use regex::Regex;

use crate::core::block::{self, is_block_header};
use crate::core::error::CairnError;
use crate::core::safety;

use super::validate::Op;

/// Whether an executed op created a new block (contributes to the
/// receipt's `Delta: created` list) or mutated an existing one (`modified`).
pub struct OpOutcome {
    pub message: String,
    pub created: bool,
}

fn read_lines(path: &Path) -> Result<Vec<String>, CairnError> {
    let text = fs::read_to_string(path)?;
    Ok(text.split('\n').map(str::to_string).collect())
}

fn write_lines(path: &Path, lines: &[String]) -> Result<(), CairnError> {
    fs::write(path, lines.join("\n"))?;
    Ok(())
}

fn is_target_header(line: &str, target: &str) -> bool {
    line.starts_with(&format!("[{target}]"))
}

/// Run `op` against `root`. Resolves `op.file()` through the shared
/// path-safety chokepoint before touching the filesystem.
pub fn execute_op(root: &Path, op: &Op) -> Result<OpOutcome, CairnError> {
    let path = safety::resolve(root, op.file())?;
    if !path.is_file() {
        return Err(CairnError::OpFailed(format!(
            "file not found: {}",
            op.file()
        )));
    }

    match op {
        Op::AppendBlock { patch, .. } => op_append_block(&path, patch),
        Op::InsertAfterBlock { target, patch, .. } => op_insert_after_block(&path, target, patch),
        Op::UpdateField {
            target,
            field,
            value,
            ..
        } => op_update_field(&path, target, field, value).map(|msg| OpOutcome {
            message: msg,
            created: false,
        }),
        Op::AppendListItem {
            target, list, item, ..
        } => op_append_list_item(&path, target, list, item).map(|msg| OpOutcome {
            message: msg,
            created: false,
        }),
        Op::SetStatus {
            target,
            status,
            history,
            ..
        } => op_set_status(&path, target, status, history.as_deref()),
        Op::ReplaceRange {
            target,
            range,
            patch,
            ..
        } => op_replace_range(&path, target, &range.start, &range.end, patch),
        Op::SupersedeDecision {
            target, new_block, ..
        } => op_supersede_decision(&path, target, new_block),
    }
}

fn op_append_block(path: &Path, patch: &str) -> Result<OpOutcome, CairnError> {
    if patch.is_empty() {
        return Err(CairnError::OpFailed("append_block: empty patch".to_string()));
    }
    let mut text = fs::read_to_string(path)?;
    text.push('\n');
    text.push_str(patch);
    text.push('\n');
    fs::write(path, text)?;
    Ok(OpOutcome {
        message: "append_block: OK".to_string(),
        created: true,
    })
}

fn op_insert_after_block(path: &Path, target: &str, patch: &str) -> Result<OpOutcome, CairnError> {
    if patch.is_empty() {
        return Err(CairnError::OpFailed(
            "insert_after_block: missing patch".to_string(),
        ));
    }
    let mut lines = read_lines(path)?;

    let mut found = false;
    let mut insert_at = None;
    for (i, line) in lines.iter().enumerate() {
        if is_target_header(line, target) {
            found = true;
            continue;
        }
        if found && is_block_header(line) {
            insert_at = Some(i);
            break;
        }
    }
    if !found {
        return Err(CairnError::OpFailed(format!(
            "insert_after_block: target {target} not found"
        )));
    }
    let insert_at = insert_at.unwrap_or(lines.len());

    let mut patch_lines: Vec<String> =
        std::iter::once(String::new()).chain(patch.split('\n').map(str::to_string)).collect();
    let tail = lines.split_off(insert_at);
    lines.append(&mut patch_lines);
    lines.extend(tail);

    write_lines(path, &lines)?;
    Ok(OpOutcome {
        message: format!("insert_after_block: inserted after {target}"),
        created: true,
    })
}

fn field_line_re(field: &str) -> Regex {
    Regex::new(&format!(r"^{}:\s+.*$", regex::escape(field))).unwrap()
}

fn op_update_field(path: &Path, target: &str, field: &str, value: &str) -> Result<String, CairnError> {
    let mut lines = read_lines(path)?;
    let re = field_line_re(field);

    let mut in_target = false;
    let mut updated_at = None;
    for (i, line) in lines.iter().enumerate() {
        if is_target_header(line, target) {
            in_target = true;
            continue;
        }
        if in_target && is_block_header(line) {
            break;
        }
        if in_target && re.is_match(line) {
            updated_at = Some(i);
            break;
        }
    }

    let Some(i) = updated_at else {
        return Err(CairnError::OpFailed(format!(
            "update_field: field '{field}' not found in block {target}"
        )));
    };
    lines[i] = format!("{field}: {value}");
    write_lines(path, &lines)?;
    Ok(format!("update_field: {target}.{field} = {value}"))
}

fn op_append_list_item(path: &Path, target: &str, list: &str, item: &str) -> Result<String, CairnError> {
    let mut lines = read_lines(path)?;

    let mut in_target = false;
    let mut in_list = false;
    let mut insert_at = None;
    for (i, line) in lines.iter().enumerate() {
        if is_target_header(line, target) {
            in_target = true;
            continue;
        }
        if in_target && is_block_header(line) {
            break;
        }
        if !in_target {
            continue;
        }
        if line.starts_with(&format!("{list}:")) {
            in_list = true;
            insert_at = Some(i + 1);
            continue;
        }
        if in_list {
            if line.starts_with("- ") || line.starts_with("  -") {
                insert_at = Some(i + 1);
            } else {
                // Blank line or a new field — either ends the list region.
                insert_at = Some(i);
                break;
            }
        }
    }

    let Some(insert_at) = insert_at else {
        return Err(CairnError::OpFailed(format!(
            "append_list_item: list '{list}' not found in {target}"
        )));
    };

    let item_clean = item.trim().trim_matches('"').trim_matches('\'');
    lines.insert(insert_at, format!("- {item_clean}"));
    write_lines(path, &lines)?;
    Ok(format!("append_list_item: added to {target}.{list}"))
}

fn op_set_status(
    path: &Path,
    target: &str,
    status: &str,
    history: Option<&str>,
) -> Result<OpOutcome, CairnError> {
    op_update_field(path, target, "Status", status)?;
    if let Some(history) = history {
        if !history.is_empty() {
            op_append_list_item(path, target, "History", history)?;
        }
    }
    Ok(OpOutcome {
        message: format!("set_status: {target} -> {status}"),
        created: false,
    })
}

fn op_replace_range(
    path: &Path,
    target: &str,
    start_marker: &str,
    end_marker: &str,
    patch: &str,
) -> Result<OpOutcome, CairnError> {
    if start_marker.is_empty() || end_marker.is_empty() {
        return Err(CairnError::OpFailed(
            "replace_range: missing range.start or range.end".to_string(),
        ));
    }
    let mut lines = read_lines(path)?;

    let mut in_target = false;
    let mut start_line = None;
    let mut end_line = None;
    for (i, line) in lines.iter().enumerate() {
        if is_target_header(line, target) {
            in_target = true;
            continue;
        }
        if in_target && is_block_header(line) {
            break;
        }
        if in_target {
            if start_line.is_none() && line.contains(start_marker) {
                start_line = Some(i);
            }
            if start_line.is_some() && line.contains(end_marker) {
                end_line = Some(i);
                break;
            }
        }
    }

    let (Some(start_line), Some(end_line)) = (start_line, end_line) else {
        return Err(CairnError::OpFailed(format!(
            "replace_range: markers not found in {target}"
        )));
    };

    let patch_lines: Vec<String> = patch.split('\n').map(str::to_string).collect();
    let replaced = end_line - start_line;
    lines.splice(start_line..end_line, patch_lines);

    write_lines(path, &lines)?;
    Ok(OpOutcome {
        message: format!("replace_range: replaced {replaced} lines in {target}"),
        created: false,
    })
}

fn op_supersede_decision(path: &Path, target: &str, new_block: &str) -> Result<OpOutcome, CairnError> {
    if new_block.is_empty() {
        return Err(CairnError::OpFailed(
            "supersede_decision: missing new_block/patch".to_string(),
        ));
    }

    let text = fs::read_to_string(path)?;
    let blocks = block::parse_blocks(&text, "", "");
    let old = blocks
        .iter()
        .find(|b| b.id == target)
        .ok_or_else(|| CairnError::OpFailed(format!("supersede_decision: target {target} not found")))?;

    let has_invariant = old
        .field_signatures("ConstraintSignatures")
        .map(|sigs| sigs.iter().any(|s| block::sig_get(s, "enforcement") == Some("invariant")))
        .unwrap_or(false);
    if has_invariant {
        return Err(CairnError::OpFailed(format!(
            "supersede_decision: {target} has invariant enforcement (requires Risk=high + confirmation)"
        )));
    }

    op_update_field(path, target, "Status", "superseded")?;
    op_append_block(path, new_block)?;

    Ok(OpOutcome {
        message: format!("supersede_decision: {target} -> superseded, new block appended"),
        created: true,
    })
}
