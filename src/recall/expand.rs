//! Query expansion: a small closed synonym table, applied to already-stemmed
//! query tokens. Expansion only ever adds terms — callers keep the original
//! tokens and extend the set with whatever this returns.

/// term -> synonyms. Capped around 15 entries by design (spec.md §4.E);
/// entries are pre-stemmed since they're matched against stemmed query
/// tokens, not raw words.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("auth", &["authentic", "login", "oauth", "jwt", "session"]),
    ("bug", &["defect", "issue", "error", "fault"]),
    ("fix", &["patch", "repair", "resolve"]),
    ("decision", &["choice", "verdict", "ruling"]),
    ("task", &["todo", "action", "item"]),
    ("config", &["configur", "setting", "option"]),
    ("delet", &["remov", "drop", "purg"]),
    ("creat", &["add", "new", "introduc"]),
    ("updat", &["chang", "modifi", "revis"]),
    ("fail", &["crash", "error", "broken"]),
    ("deploy", &["releas", "ship", "publish"]),
    ("test", &["verif", "valid", "check"]),
    ("secur", &["safeti", "protect", "harden"]),
    ("perform", &["speed", "latenc", "throughput"]),
    ("incid", &["outag", "breach", "failur"]),
];

fn synonyms_for(token: &str) -> Option<&'static [&'static str]> {
    SYNONYMS
        .iter()
        .find(|(term, _)| *term == token)
        .map(|(_, syns)| *syns)
}

/// Expand `tokens`, adding at most `max_expansions` new distinct stemmed
/// terms not already present in `tokens`. Original tokens are preserved and
/// never removed.
pub fn expand(tokens: &[String], max_expansions: usize) -> Vec<String> {
    let mut expanded = tokens.to_vec();
    let mut added = 0usize;
    for token in tokens {
        if added >= max_expansions {
            break;
        }
        let Some(syns) = synonyms_for(token) else {
            continue;
        };
        for syn in syns {
            if added >= max_expansions {
                break;
            }
            let syn = syn.to_string();
            if !expanded.contains(&syn) {
                expanded.push(syn);
                added += 1;
            }
        }
    }
    expanded
}

pub const DEFAULT_MAX_EXPANSIONS: usize = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_term() {
        let tokens = vec!["auth".to_string()];
        let expanded = expand(&tokens, DEFAULT_MAX_EXPANSIONS);
        assert!(expanded.len() > tokens.len());
        assert!(expanded.contains(&"auth".to_string()));
    }

    #[test]
    fn never_exceeds_max_expansions() {
        let tokens = vec!["auth".to_string(), "bug".to_string(), "fix".to_string()];
        let expanded = expand(&tokens, 3);
        assert_eq!(expanded.len(), tokens.len() + 3);
    }

    #[test]
    fn unknown_term_is_unaffected() {
        let tokens = vec!["xyzzy".to_string()];
        let expanded = expand(&tokens, DEFAULT_MAX_EXPANSIONS);
        assert_eq!(expanded, tokens);
    }

    #[test]
    fn never_removes_originals() {
        let tokens = vec!["auth".to_string()];
        let expanded = expand(&tokens, 0);
        assert_eq!(expanded, tokens);
    }
}
