//! Cross-reference graph (§4.G) and two-hop score booster (§4.H).
//!
//! Edges are discovered by scanning every field value (and signature-record
//! value) of every block for substrings that equal another loaded block's
//! ID. Blocks are addressed by arena index (§9 design note) rather than by
//! reference, so the adjacency list is a plain `Vec<Vec<u32>>` parallel to
//! the block arena — no ownership cycles to fight.

use std::sync::OnceLock;

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::block::{Block, FieldValue};
use crate::recall::score::{self, Hit};

fn id_pattern_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:PRJ|PER|TOOL|INC|SIG|D|T|C|I|P)-[A-Za-z0-9]+(?:-[A-Za-z0-9]+)*\b")
            .unwrap()
    })
}

/// Bidirectional adjacency over the loaded block arena, by index.
pub struct Graph {
    pub adjacency: Vec<Vec<u32>>,
}

fn reference_text(block: &Block) -> String {
    let mut parts = Vec::new();
    for (_, value) in &block.fields {
        match value {
            FieldValue::Text(s) => parts.push(s.clone()),
            FieldValue::List(items) => parts.extend(items.iter().cloned()),
            FieldValue::Signatures(records) => {
                for record in records {
                    for (_, v) in record {
                        parts.push(v.clone());
                    }
                }
            }
        }
    }
    parts.join(" ")
}

/// Build the cross-reference graph over `blocks`. Self-edges excluded;
/// a reference to an ID not present in `blocks` is simply ignored (it may
/// point at a block that isn't loaded under the current filters).
pub fn build(blocks: &[Block]) -> Graph {
    let id_index: FxHashMap<&str, u32> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id.as_str(), i as u32))
        .collect();

    let mut adjacency: Vec<Vec<u32>> = vec![Vec::new(); blocks.len()];
    let mut seen_edges: FxHashSet<(u32, u32)> = FxHashSet::default();

    for (i, block) in blocks.iter().enumerate() {
        let text = reference_text(block);
        for m in id_pattern_re().find_iter(&text) {
            let candidate = m.as_str();
            if candidate == block.id {
                continue;
            }
            let Some(&j) = id_index.get(candidate) else {
                continue;
            };
            if j as usize == i {
                continue;
            }
            let edge = if (i as u32) < j { (i as u32, j) } else { (j, i as u32) };
            if seen_edges.insert(edge) {
                adjacency[i].push(j);
                adjacency[j as usize].push(i as u32);
            }
        }
    }

    Graph { adjacency }
}

const DECAY: [f64; 2] = [0.3, 0.1];

/// Two-hop score propagation on top of `hits` (spec.md §4.H). Seeds at hop 0
/// are `hits` themselves; seeds at hop 1 are the nodes newly discovered at
/// hop 0. Already-ranked neighbors are left at their BM25F score — only
/// undiscovered neighbors receive a `neighbor_score` and a `via_graph` tag.
pub fn boost(mut hits: Vec<Hit>, blocks: &[Block], graph: &Graph, limit: usize) -> Vec<Hit> {
    let id_index: FxHashMap<&str, u32> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id.as_str(), i as u32))
        .collect();
    let ranked_ids: FxHashSet<&str> = hits.iter().map(|h| h.id.as_str()).collect();

    let mut seeds: Vec<(u32, f64)> = hits
        .iter()
        .filter_map(|h| id_index.get(h.id.as_str()).map(|&i| (i, h.score)))
        .collect();

    let mut neighbor_scores: FxHashMap<u32, f64> = FxHashMap::default();
    let mut discovered_order: Vec<u32> = Vec::new();

    for decay in DECAY {
        let mut next_seeds: FxHashMap<u32, f64> = FxHashMap::default();
        for &(seed_idx, seed_score) in &seeds {
            for &n in &graph.adjacency[seed_idx as usize] {
                let neighbor_id = blocks[n as usize].id.as_str();
                if ranked_ids.contains(neighbor_id) {
                    continue;
                }
                let contribution = seed_score * decay;
                let was_new = !neighbor_scores.contains_key(&n);
                let acc = neighbor_scores.entry(n).or_insert(0.0);
                *acc += contribution;
                if was_new {
                    discovered_order.push(n);
                }
                next_seeds.insert(n, *acc);
            }
        }
        seeds = next_seeds.into_iter().collect();
    }

    for idx in discovered_order {
        let block = &blocks[idx as usize];
        let raw_score = *neighbor_scores.get(&idx).unwrap_or(&0.0);
        hits.push(Hit {
            id: block.id.clone(),
            block_type: block.block_type(),
            score: score::round4(raw_score),
            excerpt: score::excerpt_of(block),
            file: block.source_file.clone(),
            line: block.line,
            status: block.status().map(|s| s.to_string()),
            via_graph: true,
        });
    }

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    hits.truncate(limit);
    hits
}
