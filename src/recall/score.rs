//! BM25F scorer with bigram phrase boosting, overlapping-chunk re-scoring,
//! and recency/status/priority multipliers (spec.md §4.F).

use std::sync::OnceLock;

use rayon::prelude::*;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::block::Block;
use crate::recall::classify::RetrievalParams;
use crate::recall::tokenizer::tokenize;

const K1: f64 = 1.2;
const B: f64 = 0.75;

/// Fixed per-field weights. Fields not listed here (arbitrary overflow
/// fields a block may carry) don't contribute to scoring — only excerpt
/// selection falls back to them.
const FIELD_WEIGHTS: &[(&str, f64)] = &[
    ("Statement", 3.0),
    ("Title", 2.5),
    ("Name", 2.0),
    ("Summary", 1.5),
    ("Description", 1.2),
    ("Context", 1.0),
    ("Evidence", 0.8),
    ("Rollback", 0.6),
    ("History", 0.3),
    ("_id", 1.0),
    ("_sig", 0.5),
];

const ACTIVE_STATUS_MULT: f64 = 1.2;
const IN_PROGRESS_STATUS_MULT: f64 = 1.1;
const PRIORITY_MULT: f64 = 1.1;
const CHUNK_SENTENCE_SIZE: usize = 3;
const CHUNK_OVERLAP: usize = 1;
const CHUNK_MIN_LEN: usize = 200;

fn field_weight(name: &str) -> Option<f64> {
    FIELD_WEIGHTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, w)| *w)
}

fn sentence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:[^.!?]+[.!?]+)|(?:[^.!?]+$)").unwrap())
}

/// A hit in a ranked result list.
#[derive(Debug, Clone)]
pub struct Hit {
    pub id: String,
    pub block_type: &'static str,
    pub score: f64,
    pub excerpt: String,
    pub file: String,
    pub line: usize,
    pub status: Option<String>,
    pub via_graph: bool,
}

struct DocStats {
    wdl: f64,
    weighted_tf: FxHashMap<String, f64>,
    bigrams: FxHashSet<(String, String)>,
    primary_text: String,
}

/// The built index: per-document weighted term frequencies, global document
/// frequencies, and average weighted document length. Rebuilt per query —
/// the core permits no caching layer (spec.md §5).
pub struct Bm25Index {
    pub blocks: Vec<Block>,
    docs: Vec<DocStats>,
    df: FxHashMap<String, u32>,
    avgdl: f64,
}

fn field_text(block: &Block, name: &str) -> Option<String> {
    use crate::core::block::FieldValue;
    match block.field(name)? {
        FieldValue::Text(s) => Some(s.clone()),
        FieldValue::List(items) => Some(items.join(" ")),
        FieldValue::Signatures(_) => None,
    }
}

fn signature_text(block: &Block) -> String {
    use crate::core::block::FieldValue;
    let mut parts = Vec::new();
    for (_, value) in &block.fields {
        if let FieldValue::Signatures(records) = value {
            for record in records {
                for (_, v) in record {
                    parts.push(v.clone());
                }
            }
        }
    }
    parts.join(" ")
}

fn bigrams_of(tokens: &[String]) -> FxHashSet<(String, String)> {
    tokens
        .windows(2)
        .map(|w| (w[0].clone(), w[1].clone()))
        .collect()
}

impl Bm25Index {
    pub fn build(blocks: Vec<Block>) -> Self {
        let mut docs = Vec::with_capacity(blocks.len());
        let mut df: FxHashMap<String, u32> = FxHashMap::default();

        for block in &blocks {
            let mut wdl = 0.0;
            let mut weighted_tf: FxHashMap<String, f64> = FxHashMap::default();
            let mut seen_terms: FxHashSet<String> = FxHashSet::default();
            let mut all_tokens = Vec::new();

            let mut contribute = |text: &str, weight: f64| {
                let tokens = tokenize(text);
                wdl += weight * tokens.len() as f64;
                for t in &tokens {
                    *weighted_tf.entry(t.clone()).or_insert(0.0) += weight;
                    seen_terms.insert(t.clone());
                }
                all_tokens.extend(tokens);
            };

            for (name, _) in &block.fields {
                if let Some(weight) = field_weight(name) {
                    if let Some(text) = field_text(block, name) {
                        contribute(&text, weight);
                    }
                }
            }
            if let Some(id_weight) = field_weight("_id") {
                contribute(&block.id, id_weight);
            }
            let sig_text = signature_text(block);
            if !sig_text.is_empty() {
                if let Some(sig_weight) = field_weight("_sig") {
                    contribute(&sig_text, sig_weight);
                }
            }

            for term in seen_terms {
                *df.entry(term).or_insert(0) += 1;
            }

            let primary_text = field_text(block, "Statement")
                .or_else(|| field_text(block, "Title"))
                .unwrap_or_default();

            docs.push(DocStats {
                wdl,
                weighted_tf,
                bigrams: bigrams_of(&all_tokens),
                primary_text,
            });
        }

        let n = docs.len().max(1);
        let avgdl = docs.iter().map(|d| d.wdl).sum::<f64>() / n as f64;

        Bm25Index { blocks, docs, df, avgdl }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.blocks.len() as f64;
        let df = *self.df.get(term).unwrap_or(&0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn base_score(&self, doc: &DocStats, query_tokens: &[String]) -> f64 {
        let mut score = 0.0;
        for q in query_tokens {
            let Some(&wtf) = doc.weighted_tf.get(q) else {
                continue;
            };
            let idf = self.idf(q);
            let numerator = wtf * (K1 + 1.0);
            let denominator = wtf + K1 * (1.0 - B + B * doc.wdl / self.avgdl.max(1e-9));
            score += idf * numerator / denominator;
        }
        score
    }

    fn chunk_score(&self, query_tokens: &[String], chunk_tokens: &[String]) -> f64 {
        let mut tf: FxHashMap<&str, f64> = FxHashMap::default();
        for t in chunk_tokens {
            *tf.entry(t.as_str()).or_insert(0.0) += 1.0;
        }
        let wdl = chunk_tokens.len() as f64;
        let mut score = 0.0;
        for q in query_tokens {
            let Some(&tf) = tf.get(q.as_str()) else {
                continue;
            };
            let idf = self.idf(q);
            let numerator = tf * (K1 + 1.0);
            let denominator = tf + K1 * (1.0 - B + B * wdl / self.avgdl.max(1e-9));
            score += idf * numerator / denominator;
        }
        score
    }

    fn best_chunk_score(&self, query_tokens: &[String], primary_text: &str) -> Option<f64> {
        if primary_text.len() <= CHUNK_MIN_LEN {
            return None;
        }
        let sentences: Vec<&str> = sentence_re()
            .find_iter(primary_text)
            .map(|m| m.as_str())
            .collect();
        if sentences.is_empty() {
            return None;
        }
        let stride = CHUNK_SENTENCE_SIZE - CHUNK_OVERLAP;
        let mut best = 0.0f64;
        let mut start = 0;
        while start < sentences.len() {
            let end = (start + CHUNK_SENTENCE_SIZE).min(sentences.len());
            let chunk_text = sentences[start..end].join(" ");
            let chunk_tokens = tokenize(&chunk_text);
            let s = self.chunk_score(query_tokens, &chunk_tokens);
            if s > best {
                best = s;
            }
            if end == sentences.len() {
                break;
            }
            start += stride;
        }
        Some(best)
    }

    /// Score every block against `query_tokens`, applying bigram, chunk,
    /// recency, status, and priority multipliers; drop non-positive scores.
    ///
    /// Per-block scoring is embarrassingly parallel — each block reads only
    /// its own `DocStats` plus the shared index stats — so the corpus is
    /// fanned out with `rayon` rather than walked in a single thread.
    pub fn score(&self, query_tokens: &[String], params: &RetrievalParams) -> Vec<Hit> {
        let query_bigrams = bigrams_of(query_tokens);

        let mut hits: Vec<Hit> = self
            .blocks
            .par_iter()
            .zip(self.docs.par_iter())
            .filter_map(|(block, doc)| {
                let mut score = self.base_score(doc, query_tokens);

                let shared_bigrams = query_bigrams.intersection(&doc.bigrams).count();
                if shared_bigrams > 0 {
                    score *= 1.0 + 0.25 * shared_bigrams as f64;
                }

                if let Some(chunk_score) = self.best_chunk_score(query_tokens, &doc.primary_text) {
                    if chunk_score > score {
                        score = 0.6 * chunk_score + 0.4 * score;
                    }
                }

                if let Some(date_str) = block.date() {
                    if let Some(date_score) = date_score(date_str) {
                        let rw = params.recency_weight;
                        score *= 1.0 - rw + rw * date_score;
                        score *= params.date_boost;
                    }
                }

                match block.status() {
                    Some("active") => score *= ACTIVE_STATUS_MULT,
                    Some("todo") | Some("doing") => score *= IN_PROGRESS_STATUS_MULT,
                    _ => {}
                }

                if let Some(priority) = block.field_str("Priority") {
                    if priority == "P0" || priority == "P1" {
                        score *= PRIORITY_MULT;
                    }
                }

                if score <= 0.0 {
                    return None;
                }

                Some(Hit {
                    id: block.id.clone(),
                    block_type: block.block_type(),
                    score: round4(score),
                    excerpt: excerpt_of(block),
                    file: block.source_file.clone(),
                    line: block.line,
                    status: block.status().map(|s| s.to_string()),
                    via_graph: false,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        hits
    }
}

pub(crate) fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// `max(0.1, 1 - days_old/365)`; `None` if `Date` isn't a parseable
/// `YYYY-MM-DD` string.
fn date_score(date_str: &str) -> Option<f64> {
    let date = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()?;
    let today = chrono::Utc::now().date_naive();
    let days_old = (today - date).num_days() as f64;
    Some((1.0 - days_old / 365.0).max(0.1))
}

const EXCERPT_FIELDS: &[&str] = &["Statement", "Title", "Summary", "Description", "Name", "Context"];
const EXCERPT_MAX_LEN: usize = 120;

pub(crate) fn excerpt_of(block: &Block) -> String {
    for field in EXCERPT_FIELDS {
        if let Some(text) = field_text(block, field) {
            if !text.is_empty() {
                return truncate(&text, EXCERPT_MAX_LEN);
            }
        }
    }
    truncate(&block.id, EXCERPT_MAX_LEN)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        s.chars().take(max_len).collect()
    }
}
