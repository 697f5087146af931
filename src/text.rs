//! Text folding and validation primitives.
//!
//! Everything the search engine compares goes through `fold()` first, so
//! matching is accent-, case-, and spacing-insensitive. The same fold is
//! applied to the query string and to the per-row slab, which keeps the two
//! sides of every comparison in the same alphabet.

use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold text for search: NFKD-decompose, strip diacritics, lowercase, and
/// collapse runs of punctuation/whitespace to single spaces.
///
/// A few characters survive the punctuation collapse because the query
/// language needs them: `"` (phrases), `:` (field filters), `-` (negation,
/// and hyphenated committee names like "IP - Photography"), and `@`/`.` so
/// e-mail addresses stay matchable as written.
pub fn fold(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if matches!(c, '"' | ':' | '-' | '@' | '.') {
            out.push(c);
        } else {
            out.push(' ');
        }
    }
    // Collapse whitespace runs
    let mut collapsed = String::with_capacity(out.len());
    let mut last_space = true;
    for c in out.chars() {
        if c == ' ' {
            if !last_space {
                collapsed.push(' ');
            }
            last_space = true;
        } else {
            collapsed.push(c);
            last_space = false;
        }
    }
    while collapsed.ends_with(' ') {
        collapsed.pop();
    }
    collapsed
}

/// Keep only ASCII digits. Used for the per-row phone index and for
/// digit-bearing query tokens.
pub fn digits_of(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap())
}

/// Loose e-mail shape check: `local@domain.tld`, no whitespace.
pub fn email_ok(s: &str) -> bool {
    email_re().is_match(s.trim())
}

/// Loose phone check: 7–15 digits once formatting characters are stripped,
/// and nothing outside digits, `+ ( ) - . x` and whitespace.
pub fn phone_ok(s: &str) -> bool {
    let s = s.trim();
    let digits = digits_of(s);
    if !(7..=15).contains(&digits.len()) {
        return false;
    }
    s.chars().all(|c| {
        c.is_ascii_digit() || c.is_whitespace() || matches!(c, '+' | '(' | ')' | '-' | '.' | 'x')
    })
}
