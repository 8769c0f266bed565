//! Tokenization and stemming shared by indexing and querying.
//!
//! `tokenize(text) = stem(t) for t in alphanumeric_words(lowercase(text))
//! where t ∉ stopwords and |t| > 1`. The stemmer is a fixed, ordered
//! suffix-rewrite table, not a full Porter implementation — it trades
//! linguistic precision for determinism and zero external dependencies.

use std::sync::OnceLock;

use regex::Regex;

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z0-9_]+").unwrap())
}

/// Closed stopword set. Small and deliberately unremarkable — function
/// words that carry no retrieval signal in this corpus's short,
/// declarative fields.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "else", "of", "to", "in", "on", "at",
    "for", "with", "by", "from", "as", "is", "are", "was", "were", "be", "been", "being", "this",
    "that", "these", "those", "it", "its", "it's", "we", "you", "they", "he", "she", "i", "do",
    "does", "did", "has", "have", "had", "will", "would", "shall", "should", "can", "could",
    "may", "might", "must", "not", "no", "so", "into", "about", "up", "down", "out", "over",
    "under", "again", "further", "than", "too", "very", "just", "also", "there", "here", "all",
    "any", "both", "each", "few", "more", "most", "other", "some", "such", "only", "own", "same",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Ordered suffix-rewrite rules; the first matching rule wins (no cascading
/// re-application). `None` replacement means the suffix is dropped.
const SUFFIX_RULES: &[(&str, &str)] = &[
    ("ies", "y"),
    ("es", ""),
    ("s", ""),
    ("ing", ""),
    ("ed", ""),
    ("tion", ""),
    ("sion", ""),
    ("ment", ""),
    ("ness", ""),
    ("ous", ""),
    ("ful", ""),
    ("ly", ""),
    ("able", ""),
    ("ible", ""),
    ("er", ""),
    ("est", ""),
    ("ation", "ate"),
    ("ate", ""),
];

const MIN_STEM_LEN: usize = 2;

/// Reduced Porter-style stemmer: deterministic, context-free, a single
/// ordered-table lookup per word. Words of length ≤ 3 pass through
/// unchanged.
pub fn stem(word: &str) -> String {
    if word.len() <= 3 {
        return word.to_string();
    }
    for (suffix, replacement) in SUFFIX_RULES {
        if let Some(stripped) = word.strip_suffix(suffix) {
            if stripped.len() < MIN_STEM_LEN {
                continue;
            }
            let mut stem = format!("{stripped}{replacement}");
            if (stem.ends_with("at") || stem.ends_with("iz") || stem.ends_with("bl"))
                && !word.ends_with(&format!("{stem}e"))
            {
                stem.push('e');
            }
            return stem;
        }
    }
    word.to_string()
}

/// Lowercase, split on alphanumeric runs, drop stopwords and single
/// characters, stem what remains.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    word_re()
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|w| w.len() > 1 && !is_stopword(w))
        .map(stem)
        .collect()
}
