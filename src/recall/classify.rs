//! Query classification: bucket a raw query into one of four types and
//! hand back the retrieval parameters that type implies. Classification
//! runs on the raw (unstemmed) query words, since a couple of the boost
//! rules ("starts with an auxiliary verb followed by not/never") need the
//! original function words the tokenizer would otherwise discard.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Temporal,
    Adversarial,
    MultiHop,
    SingleHop,
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalParams {
    pub recency_weight: f64,
    pub date_boost: f64,
    pub expansion_enabled: bool,
    pub extra_limit_factor: f64,
    pub forced_graph: bool,
}

const TEMPORAL_WORDS: &[&str] = &[
    "when", "recent", "recently", "latest", "date", "since", "before", "after", "timeline",
    "history", "now", "today", "yesterday", "last",
];

const ADVERSARIAL_WORDS: &[&str] = &[
    "not", "never", "no", "deny", "denied", "reject", "rejected", "refuse", "refused",
    "contradict", "contradicts", "contradicted", "against",
];

const MULTIHOP_WORDS: &[&str] = &[
    "related", "relate", "relates", "connection", "connects", "depend", "depends", "dependency",
    "because", "chain", "leads", "led", "why", "how", "caused", "cause",
];

const AUX_VERBS: &[&str] = &[
    "is", "was", "are", "were", "do", "does", "did", "has", "have", "had", "can", "could",
    "should", "would", "will",
];

const CLASSIFY_THRESHOLD: i32 = 1;

fn words(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

pub fn classify(query: &str) -> QueryType {
    let words = words(query);
    let temporal = words.iter().filter(|w| TEMPORAL_WORDS.contains(&w.as_str())).count() as i32;
    let mut adversarial = words
        .iter()
        .filter(|w| ADVERSARIAL_WORDS.contains(&w.as_str()))
        .count() as i32;
    let mut multihop = words.iter().filter(|w| MULTIHOP_WORDS.contains(&w.as_str())).count() as i32;

    if let (Some(first), Some(second)) = (words.first(), words.get(1)) {
        if AUX_VERBS.contains(&first.as_str())
            && (second == "not" || second == "never" || second.ends_with("n't"))
        {
            adversarial += 3;
        }
    }
    if words.iter().any(|w| w == "ever") {
        adversarial += 2;
    }
    if words.len() > 15 && multihop > 0 {
        multihop += 2;
    }

    let scores = [
        (QueryType::Temporal, temporal),
        (QueryType::Adversarial, adversarial),
        (QueryType::MultiHop, multihop),
    ];
    let best = scores.iter().max_by_key(|(_, score)| *score).unwrap();
    if best.1 > CLASSIFY_THRESHOLD || (best.1 == CLASSIFY_THRESHOLD && best.1 > 0) {
        best.0
    } else {
        QueryType::SingleHop
    }
}

pub fn params_for(query_type: QueryType) -> RetrievalParams {
    match query_type {
        QueryType::Temporal => RetrievalParams {
            recency_weight: 0.6,
            date_boost: 2.0,
            expansion_enabled: true,
            extra_limit_factor: 1.5,
            forced_graph: false,
        },
        QueryType::Adversarial => RetrievalParams {
            recency_weight: 0.3,
            date_boost: 1.0,
            expansion_enabled: true,
            extra_limit_factor: 1.0,
            forced_graph: false,
        },
        QueryType::MultiHop => RetrievalParams {
            recency_weight: 0.3,
            date_boost: 1.0,
            expansion_enabled: true,
            extra_limit_factor: 2.0,
            forced_graph: true,
        },
        QueryType::SingleHop => RetrievalParams {
            recency_weight: 0.3,
            date_boost: 1.0,
            expansion_enabled: true,
            extra_limit_factor: 1.0,
            forced_graph: false,
        },
    }
}
