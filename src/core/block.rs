//! The block model: Cairn's atomic unit of persisted memory.
//!
//! A block is `[<ID>]` followed by `Name: value` field lines, `Name:`
//! followed by `- item` list lines, or a list field whose items are
//! themselves `key: value` records (a *signature record* — used for
//! `ConstraintSignatures` and similar modal-constraint fields). Two blocks
//! are separated by a blank line or a `---` line; both are tolerated on
//! read, and the emitter always writes a single blank line.
//!
//! Blocks are modeled with a small typed core (`id`, `source_file`,
//! `source_label`, `line`) plus an overflow `fields` map, rather than a
//! per-block-type struct — this preserves round-trip fidelity without
//! forcing a schema per block type (every block type shares one parser and
//! one emitter).

use std::sync::OnceLock;

use regex::Regex;

/// A signature record: a structured sub-record inside a list field expressing
/// a modal constraint (`subject`/`predicate`/`object`/`domain`/`axis`/
/// `modality`/`scope`/`composes_with`/`enforcement`). Stored as an ordered
/// map so emission reproduces the original key order.
pub type SignatureRecord = Vec<(String, String)>;

pub fn sig_get<'a>(sig: &'a SignatureRecord, key: &str) -> Option<&'a str> {
    sig.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// The value held by a named field in a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A single `Name: value` line.
    Text(String),
    /// A `Name:` list of `- item` lines.
    List(Vec<String>),
    /// A `Name:` list of `- key: value` signature records.
    Signatures(Vec<SignatureRecord>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_signatures(&self) -> Option<&[SignatureRecord]> {
        match self {
            FieldValue::Signatures(items) => Some(items),
            _ => None,
        }
    }
}

/// One parsed block, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: String,
    pub source_file: String,
    pub source_label: String,
    /// 1-indexed line number of the block's header.
    pub line: usize,
    /// Field name -> value, in file order.
    pub fields: Vec<(String, FieldValue)>,
}

impl Block {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_text)
    }

    pub fn field_list(&self, name: &str) -> Option<&[String]> {
        self.field(name).and_then(FieldValue::as_list)
    }

    pub fn field_signatures(&self, name: &str) -> Option<&[SignatureRecord]> {
        self.field(name).and_then(FieldValue::as_signatures)
    }

    pub fn status(&self) -> Option<&str> {
        self.field_str("Status")
    }

    pub fn date(&self) -> Option<&str> {
        self.field_str("Date")
    }

    /// ID-prefix-derived block type (`D-` -> `decision`, etc). `"unknown"` if
    /// the prefix isn't in the closed namespace of spec.md §3.
    pub fn block_type(&self) -> &'static str {
        block_type_of(&self.id)
    }
}

/// Infer a block's type from its ID prefix (spec.md §3's closed namespace).
pub fn block_type_of(id: &str) -> &'static str {
    const PREFIXES: &[(&str, &str)] = &[
        ("D-", "decision"),
        ("T-", "task"),
        ("PRJ-", "project"),
        ("PER-", "person"),
        ("TOOL-", "tool"),
        ("INC-", "incident"),
        ("C-", "contradiction"),
        ("SIG-", "signal"),
        ("I-", "impact"),
        ("P-", "proposal"),
    ];
    for (prefix, kind) in PREFIXES {
        if id.starts_with(prefix) {
            return kind;
        }
    }
    "unknown"
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[([^\]]+)\]\s*$").unwrap())
}

fn field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z][A-Za-z0-9_]*):(.*)$").unwrap())
}

fn list_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*-\s?(.*)$").unwrap())
}

fn sig_continuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s{2,}([A-Za-z_][A-Za-z0-9_]*):\s?(.*)$").unwrap())
}

fn kv_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*):\s?(.*)$").unwrap())
}

/// Does `line` open a new block header (`[ID]`)?
pub fn is_block_header(line: &str) -> bool {
    header_re().is_match(line.trim_end_matches(['\r', '\n']))
}

struct ListBuilder {
    name: String,
    raw_lines: Vec<String>,
}

impl ListBuilder {
    fn finish(self) -> FieldValue {
        if self.raw_lines.is_empty() {
            return FieldValue::List(Vec::new());
        }
        let first_item = list_item_re()
            .captures(&self.raw_lines[0])
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        if kv_re().is_match(first_item.trim()) {
            FieldValue::Signatures(parse_signature_items(&self.raw_lines))
        } else {
            FieldValue::List(parse_plain_items(&self.raw_lines))
        }
    }
}

fn parse_plain_items(raw_lines: &[String]) -> Vec<String> {
    raw_lines
        .iter()
        .filter_map(|l| list_item_re().captures(l).map(|c| c[1].to_string()))
        .collect()
}

fn parse_signature_items(raw_lines: &[String]) -> Vec<SignatureRecord> {
    let mut records: Vec<SignatureRecord> = Vec::new();
    for line in raw_lines {
        if let Some(caps) = list_item_re().captures(line) {
            let rest = caps[1].to_string();
            let mut record = SignatureRecord::new();
            if let Some(kv) = kv_re().captures(rest.trim()) {
                record.push((kv[1].to_string(), kv[2].trim().to_string()));
            }
            records.push(record);
        } else if let Some(caps) = sig_continuation_re().captures(line) {
            if let Some(last) = records.last_mut() {
                last.push((caps[1].to_string(), caps[2].trim().to_string()));
            }
        }
    }
    records
}

/// Parse a whole file's text into its blocks. I/O and decode failures are
/// the caller's concern (the loader skips unreadable files rather than
/// treating them as fatal); this function only parses text already in hand.
pub fn parse_blocks(text: &str, source_file: &str, source_label: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;
    let mut list_builder: Option<ListBuilder> = None;

    let flush_list = |block: &mut Block, builder: Option<ListBuilder>| {
        if let Some(b) = builder {
            block.fields.push((b.name.clone(), b.finish()));
        }
    };

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if let Some(caps) = header_re().captures(raw_line) {
            if let Some(mut block) = current.take() {
                flush_list(&mut block, list_builder.take());
                blocks.push(block);
            }
            current = Some(Block {
                id: caps[1].trim().to_string(),
                source_file: source_file.to_string(),
                source_label: source_label.to_string(),
                line: line_no,
                fields: Vec::new(),
            });
            continue;
        }

        let Some(block) = current.as_mut() else {
            continue;
        };

        if let Some(caps) = field_re().captures(raw_line) {
            flush_list(block, list_builder.take());
            let name = caps[1].to_string();
            let rest = caps[2].trim();
            if rest.is_empty() {
                list_builder = Some(ListBuilder {
                    name,
                    raw_lines: Vec::new(),
                });
            } else {
                block.fields.push((name, FieldValue::Text(rest.to_string())));
            }
            continue;
        }

        if let Some(builder) = list_builder.as_mut() {
            if raw_line.trim().is_empty() || raw_line.trim() == "---" {
                flush_list(block, list_builder.take());
                continue;
            }
            if list_item_re().is_match(raw_line) || sig_continuation_re().is_match(raw_line) {
                builder.raw_lines.push(raw_line.to_string());
                continue;
            }
            // Anything else ends the list region; the line itself is
            // otherwise-unstructured block body text and is dropped (the
            // emitter never produces it).
            flush_list(block, list_builder.take());
        }
    }

    if let Some(mut block) = current.take() {
        flush_list(&mut block, list_builder.take());
        blocks.push(block);
    }

    blocks
}

/// Emit a block back to its canonical text form.
pub fn emit_block(block: &Block) -> String {
    let mut out = format!("[{}]\n", block.id);
    for (name, value) in &block.fields {
        match value {
            FieldValue::Text(v) => out.push_str(&format!("{name}: {v}\n")),
            FieldValue::List(items) => {
                out.push_str(&format!("{name}:\n"));
                for item in items {
                    out.push_str(&format!("- {item}\n"));
                }
            }
            FieldValue::Signatures(records) => {
                out.push_str(&format!("{name}:\n"));
                for record in records {
                    for (i, (k, v)) in record.iter().enumerate() {
                        if i == 0 {
                            out.push_str(&format!("- {k}: {v}\n"));
                        } else {
                            out.push_str(&format!("  {k}: {v}\n"));
                        }
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_block() {
        let text = "[D-20260213-001]\nStatement: Use JWT for authentication\nStatus: active\nDate: 2026-02-13\n";
        let blocks = parse_blocks(text, "decisions/DECISIONS.md", "decisions");
        assert_eq!(blocks.len(), 1);
        let b = &blocks[0];
        assert_eq!(b.id, "D-20260213-001");
        assert_eq!(b.field_str("Statement"), Some("Use JWT for authentication"));
        assert_eq!(b.status(), Some("active"));
        assert_eq!(b.line, 1);
    }

    #[test]
    fn parses_multiple_blocks_with_separators() {
        let text = "[D-20260213-001]\nStatement: A\n\n---\n\n[D-20260213-002]\nStatement: B\n";
        let blocks = parse_blocks(text, "f", "l");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].field_str("Statement"), Some("B"));
    }

    #[test]
    fn parses_list_field() {
        let text = "[T-20260213-001]\nTitle: Task\nHistory:\n- created\n- started\n";
        let blocks = parse_blocks(text, "f", "l");
        let history = blocks[0].field_list("History").unwrap();
        assert_eq!(history, &["created".to_string(), "started".to_string()]);
    }

    #[test]
    fn parses_signature_records() {
        let text = "[D-20260213-001]\nStatement: Use JWT\nConstraintSignatures:\n- subject: we\n  predicate: must_use\n  object: JWT\n  enforcement: invariant\n";
        let blocks = parse_blocks(text, "f", "l");
        let sigs = blocks[0].field_signatures("ConstraintSignatures").unwrap();
        assert_eq!(sigs.len(), 1);
        assert_eq!(sig_get(&sigs[0], "enforcement"), Some("invariant"));
        assert_eq!(sig_get(&sigs[0], "subject"), Some("we"));
    }

    #[test]
    fn block_type_from_prefix() {
        assert_eq!(block_type_of("D-20260213-001"), "decision");
        assert_eq!(block_type_of("T-20260213-001"), "task");
        assert_eq!(block_type_of("PRJ-001"), "project");
        assert_eq!(block_type_of("SIG-20260213-001"), "signal");
        assert_eq!(block_type_of("X-001"), "unknown");
    }

    #[test]
    fn round_trips_through_emit() {
        let text = "[D-20260213-001]\nStatement: Use JWT\nStatus: active\nHistory:\n- a\n- b\nConstraintSignatures:\n- subject: we\n  predicate: must_use\n";
        let blocks = parse_blocks(text, "f", "l");
        let emitted = emit_block(&blocks[0]);
        let reparsed = parse_blocks(&emitted, "f", "l");
        assert_eq!(reparsed[0].fields, blocks[0].fields);
        assert_eq!(reparsed[0].id, blocks[0].id);
    }
}
