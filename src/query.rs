//! Free-text query parser.
//!
//! Grammar (all folded before parsing):
//! - bare tokens: `ana gomez`
//! - negation: `-rejected`, `-"press corps"`
//! - quoted phrases: `"exact phrase"`
//! - field filters: `status:paid`, `committee:"ip - photography"`,
//!   `-phone:98115` (negation preserved as a `-` prefix on the stored value)
//!
//! The parsed query is stateless — built fresh from the debounced search
//! input and discarded after the scoring pass.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::text::fold;

/// A parsed free-text query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    /// The whole folded input, for whole-string match bonuses.
    pub raw: String,
    /// Required tokens — each one is independently mandatory.
    pub must: Vec<String>,
    /// Disqualifying tokens — any present in the slab kills the row.
    pub not: Vec<String>,
    /// Mandatory exact substrings.
    pub phrases: Vec<String>,
    /// Field filters, key → values. A value starting with `-` is negated.
    pub kv: HashMap<String, Vec<String>>,
}

impl ParsedQuery {
    /// True when nothing was asked: every row passes with score 0.
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.not.is_empty() && self.phrases.is_empty() && self.kv.is_empty()
    }
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Either an optionally-negated, optionally key-prefixed quoted chunk, or
    // an optionally-negated bare run of non-space non-quote characters.
    RE.get_or_init(|| Regex::new(r#"-?[^\s"]*"[^"]*"|-?[^\s"]+"#).unwrap())
}

/// Fold a filter key through the synonym table.
fn normalize_key(key: &str) -> String {
    match key {
        "is" | "status" => "status",
        "comm" | "committee" => "committee",
        "port" | "portfolio" => "portfolio",
        "mail" | "email" => "email",
        "tel" | "mobile" | "phone" => "phone",
        other => other,
    }
    .to_string()
}

fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Parse a free-text search string into a [`ParsedQuery`].
///
/// The input is folded first, so the caller can hand over the raw text box
/// contents.
pub fn parse_query(input: &str) -> ParsedQuery {
    let folded = fold(input);
    let mut q = ParsedQuery {
        raw: folded.replace('"', "").trim().to_string(),
        ..Default::default()
    };

    for m in token_re().find_iter(&folded) {
        let mut tok = m.as_str();
        let neg = tok.starts_with('-') && tok.len() > 1;
        if neg {
            tok = &tok[1..];
        }

        // Field filter: a colon past position 0, outside any leading quote
        if let Some(ci) = tok.find(':') {
            if ci > 0 && !tok.starts_with('"') {
                let key = normalize_key(&tok[..ci]);
                let value = strip_quotes(&tok[ci + 1..]).trim().to_string();
                if !value.is_empty() {
                    let stored = if neg { format!("-{}", value) } else { value };
                    q.kv.entry(key).or_default().push(stored);
                }
                continue;
            }
        }

        if tok.starts_with('"') {
            let phrase = strip_quotes(tok).trim().to_string();
            if phrase.is_empty() {
                continue;
            }
            if neg {
                q.not.push(phrase);
            } else {
                q.phrases.push(phrase);
            }
            continue;
        }

        let bare = tok.trim().to_string();
        if bare.is_empty() || bare == "-" {
            continue;
        }
        if neg {
            q.not.push(bare);
        } else {
            q.must.push(bare);
        }
    }

    q
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let q = parse_query(r#"status:paid committee:"IP - Photography" -rejected "exact phrase""#);
        assert_eq!(q.kv.get("status"), Some(&vec!["paid".to_string()]));
        assert_eq!(
            q.kv.get("committee"),
            Some(&vec!["ip - photography".to_string()])
        );
        assert_eq!(q.not, vec!["rejected"]);
        assert_eq!(q.phrases, vec!["exact phrase"]);
        assert!(q.must.is_empty());
    }

    #[test]
    fn test_bare_tokens_fold() {
        let q = parse_query("Ana GÓMEZ");
        assert_eq!(q.must, vec!["ana", "gomez"]);
        assert_eq!(q.raw, "ana gomez");
    }

    #[test]
    fn test_key_synonyms() {
        let q = parse_query("is:paid comm:who tel:98115 mail:ana@x.com port:reporter");
        assert!(q.kv.contains_key("status"));
        assert!(q.kv.contains_key("committee"));
        assert!(q.kv.contains_key("phone"));
        assert!(q.kv.contains_key("email"));
        assert!(q.kv.contains_key("portfolio"));
    }

    #[test]
    fn test_negated_field_filter_keeps_prefix() {
        let q = parse_query("-status:rejected");
        assert_eq!(q.kv.get("status"), Some(&vec!["-rejected".to_string()]));
    }

    #[test]
    fn test_multiple_values_accumulate() {
        let q = parse_query("committee:who committee:unsc");
        assert_eq!(
            q.kv.get("committee"),
            Some(&vec!["who".to_string(), "unsc".to_string()])
        );
    }

    #[test]
    fn test_negated_phrase_goes_to_not() {
        let q = parse_query(r#"-"press corps""#);
        assert_eq!(q.not, vec!["press corps"]);
        assert!(q.phrases.is_empty());
    }

    #[test]
    fn test_empty_and_degenerate_tokens_discarded() {
        assert!(parse_query("").is_empty());
        assert!(parse_query("   ").is_empty());
        assert!(parse_query("\"\"").is_empty());
        assert!(parse_query("-").is_empty());
        // lone colon-led token stays a bare token, not a filter
        let q = parse_query(":paid");
        assert_eq!(q.must, vec![":paid"]);
    }

    #[test]
    fn test_unknown_key_passes_through() {
        let q = parse_query("city:delhi");
        assert_eq!(q.kv.get("city"), Some(&vec!["delhi".to_string()]));
    }
}
