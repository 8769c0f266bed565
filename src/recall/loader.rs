//! Corpus loader: opens the fixed set of corpus files under a workspace
//! root, tags every block with its source, and applies the status filter
//! and optional per-agent namespace ACL.

use std::path::Path;

use crate::core::block::{self, Block};
use crate::core::safety;

/// The fixed, ordered set of corpus files the recall engine searches
/// (spec.md §4.A / §6). Order matters only for determinism of document
/// ordering within ties; it has no effect on scoring.
pub const CORPUS_FILES: &[(&str, &str)] = &[
    ("decisions/DECISIONS.md", "decisions"),
    ("tasks/TASKS.md", "tasks"),
    ("entities/projects.md", "projects"),
    ("entities/people.md", "people"),
    ("entities/tools.md", "tools"),
    ("entities/incidents.md", "incidents"),
    ("intelligence/CONTRADICTIONS.md", "contradictions"),
    ("intelligence/DRIFT.md", "drift"),
    ("intelligence/SIGNALS.md", "signals"),
];

const ACTIVE_STATUSES: &[&str] = &["active", "todo", "doing"];

/// Per-agent read authorization, checked by relative corpus-file path. The
/// core ships no implementation beyond the trait — auth beyond the
/// read-path namespace filter is explicitly out of scope.
pub trait NamespaceAcl {
    fn can_read(&self, relative_path: &str) -> bool;
}

pub struct LoadOptions<'a> {
    pub active_only: bool,
    pub agent_id: Option<&'a str>,
    pub acl: Option<&'a dyn NamespaceAcl>,
}

impl Default for LoadOptions<'_> {
    fn default() -> Self {
        LoadOptions {
            active_only: false,
            agent_id: None,
            acl: None,
        }
    }
}

/// Load every block from the fixed corpus under `root`. Unreadable or
/// undecodable files are skipped, not fatal — a partially-populated corpus
/// is still useful for retrieval.
pub fn load_corpus(root: &Path, opts: &LoadOptions) -> Vec<Block> {
    let mut blocks = Vec::new();

    for (rel_path, label) in CORPUS_FILES {
        if let Some(acl) = opts.acl {
            if !acl.can_read(rel_path) {
                continue;
            }
        }
        load_one(root, rel_path, label, &mut blocks);

        if let Some(agent_id) = opts.agent_id {
            let mirrored = format!("agents/{agent_id}/{rel_path}");
            load_one(root, &mirrored, label, &mut blocks);
        }
    }

    if opts.active_only {
        blocks.retain(|b| match b.status() {
            Some(status) => ACTIVE_STATUSES.contains(&status),
            None => true,
        });
    }

    blocks
}

fn load_one(root: &Path, rel_path: &str, label: &str, out: &mut Vec<Block>) {
    let Ok(path) = safety::resolve(root, rel_path) else {
        return;
    };
    let Ok(text) = std::fs::read_to_string(&path) else {
        return;
    };
    out.extend(block::parse_blocks(&text, rel_path, label));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_corpus_file(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn loads_blocks_across_fixed_files() {
        let td = tempdir().unwrap();
        write_corpus_file(
            td.path(),
            "decisions/DECISIONS.md",
            "[D-20260213-001]\nStatement: Use JWT\nStatus: active\n",
        );
        write_corpus_file(
            td.path(),
            "tasks/TASKS.md",
            "[T-20260213-001]\nTitle: Ship auth\nStatus: todo\n",
        );
        let blocks = load_corpus(td.path(), &LoadOptions::default());
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn skips_missing_files() {
        let td = tempdir().unwrap();
        let blocks = load_corpus(td.path(), &LoadOptions::default());
        assert!(blocks.is_empty());
    }

    #[test]
    fn active_only_filters_out_superseded() {
        let td = tempdir().unwrap();
        write_corpus_file(
            td.path(),
            "decisions/DECISIONS.md",
            "[D-20260213-001]\nStatement: old\nStatus: superseded\n\n[D-20260213-002]\nStatement: new\nStatus: active\n",
        );
        let opts = LoadOptions {
            active_only: true,
            ..LoadOptions::default()
        };
        let blocks = load_corpus(td.path(), &opts);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id, "D-20260213-002");
    }

    struct DenyAll;
    impl NamespaceAcl for DenyAll {
        fn can_read(&self, _relative_path: &str) -> bool {
            false
        }
    }

    #[test]
    fn acl_can_deny_all_files() {
        let td = tempdir().unwrap();
        write_corpus_file(
            td.path(),
            "decisions/DECISIONS.md",
            "[D-20260213-001]\nStatement: Use JWT\nStatus: active\n",
        );
        let deny = DenyAll;
        let opts = LoadOptions {
            acl: Some(&deny),
            ..LoadOptions::default()
        };
        let blocks = load_corpus(td.path(), &opts);
        assert!(blocks.is_empty());
    }
}
