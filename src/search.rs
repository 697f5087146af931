//! Fuzzy matcher, scorer, ranker, and pager.
//!
//! Evaluation order per row: field filters (mandatory, conjunctive) →
//! phrases (mandatory, +6 each) → negated tokens (disqualify) → required
//! tokens (mandatory, fuzzy-scored) → whole-query bonuses. Any mandatory
//! stage failing disqualifies the row outright regardless of score.

use serde::Serialize;

use crate::query::ParsedQuery;
use crate::text::{digits_of, fold};
use crate::types::{DelegateRow, PaymentStatus};

/// Selectable page sizes for the results table.
pub const PAGE_SIZES: [usize; 3] = [25, 50, 100];

// ---------------------------------------------------------------------------
// Field filters
// ---------------------------------------------------------------------------

/// Match one positive field-filter value against a row.
///
/// Unknown keys match vacuously: a positive unknown filter passes, which
/// also means a negated unknown filter disqualifies.
fn kv_match(key: &str, value: &str, row: &DelegateRow) -> bool {
    match key {
        "status" => row.payment_status.as_str() == value,
        "committee" => fold(&row.committee_pref1).contains(value),
        "portfolio" => fold(&row.portfolio_pref1).contains(value),
        "name" => fold(&row.full_name).contains(value),
        "email" => {
            let email = fold(&row.email);
            email.contains(value) || (value.contains('@') && email.ends_with(value))
        }
        "phone" => {
            let wanted = digits_of(value);
            !wanted.is_empty() && row.digits.contains(&wanted)
        }
        "id" => row.id.to_string() == value,
        _ => true,
    }
}

/// Evaluate every field filter. Filters are conjunctive and mandatory:
/// positive values for one key OR together, any matching negative value
/// disqualifies on its own.
pub fn kv_pass(q: &ParsedQuery, row: &DelegateRow) -> bool {
    for (key, values) in &q.kv {
        let mut positives_seen = false;
        let mut positive_hit = false;
        for value in values {
            if let Some(negated) = value.strip_prefix('-') {
                if kv_match(key, negated, row) {
                    return false;
                }
            } else {
                positives_seen = true;
                if kv_match(key, value, row) {
                    positive_hit = true;
                }
            }
        }
        if positives_seen && !positive_hit {
            return false;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Token scoring
// ---------------------------------------------------------------------------

/// Edit-distance tolerance for a query token: 1 for short tokens, 2 beyond.
fn fuzzy_bound(token_len: usize) -> usize {
    if token_len <= 4 {
        1
    } else {
        2
    }
}

/// Score one required token against a row, or `None` if it fails.
///
/// Digit-bearing tokens route exclusively through the digits index — a
/// numeric query never matches via slab substrings. Literal substring hits
/// earn prefix and name-start boosts; otherwise a bounded edit-distance scan
/// over the row tokens salvages near-misses for a single point.
pub fn token_hit(token: &str, row: &DelegateRow) -> Option<u32> {
    if token.chars().any(|c| c.is_ascii_digit()) {
        let wanted = digits_of(token);
        if !wanted.is_empty() && row.digits.contains(&wanted) {
            return Some(3);
        }
        return None;
    }

    if row.slab.contains(token) {
        let mut score = 2;
        if row.tokens.iter().any(|t| t.starts_with(token)) {
            score += 2;
        }
        if fold(&row.full_name).starts_with(token) {
            score += 3;
        }
        return Some(score);
    }

    let token_len = token.chars().count();
    let allowed = fuzzy_bound(token_len);
    for row_token in &row.tokens {
        let len_gap = row_token.chars().count().abs_diff(token_len);
        if len_gap > allowed {
            continue;
        }
        if strsim::levenshtein(token, row_token) <= allowed {
            return Some(1);
        }
    }
    None
}

/// Evaluate a parsed query against a row: `Some(score)` on hit, `None` when
/// any mandatory element fails. An empty query passes every row at score 0.
pub fn score_row(q: &ParsedQuery, row: &DelegateRow) -> Option<i64> {
    if q.is_empty() {
        return Some(0);
    }
    if !kv_pass(q, row) {
        return None;
    }

    let mut score: i64 = 0;

    for phrase in &q.phrases {
        if row.slab.contains(phrase.as_str()) {
            score += 6;
        } else {
            return None;
        }
    }

    for neg in &q.not {
        if row.slab.contains(neg.as_str()) {
            return None;
        }
    }

    for token in &q.must {
        match token_hit(token, row) {
            Some(s) => score += s as i64,
            None => return None,
        }
    }

    // Whole-string bonuses: an exact name or email hit outranks rows that
    // only matched token-by-token.
    if !q.raw.is_empty() {
        if fold(&row.full_name).contains(&q.raw) {
            score += 3;
        }
        if fold(&row.email).contains(&q.raw) {
            score += 2;
        }
    }

    Some(score)
}

// ---------------------------------------------------------------------------
// Ranking + pagination
// ---------------------------------------------------------------------------

/// Dropdown-level filters, applied before the text query runs.
#[derive(Debug, Clone, Default)]
pub struct ViewFilter {
    pub status: Option<PaymentStatus>,
    pub committee: Option<String>,
}

impl ViewFilter {
    fn passes(&self, row: &DelegateRow) -> bool {
        if let Some(status) = self.status {
            if row.payment_status != status {
                return false;
            }
        }
        if let Some(committee) = &self.committee {
            if fold(&row.committee_pref1) != fold(committee) {
                return false;
            }
        }
        true
    }
}

/// A row together with its relevance score.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredRow {
    pub row: DelegateRow,
    pub score: i64,
}

/// Run the scorer over all rows passing the dropdown filters, sorted by
/// score descending, ties broken by ascending row id.
pub fn rank(rows: &[DelegateRow], q: &ParsedQuery, filter: &ViewFilter) -> Vec<ScoredRow> {
    let mut scored: Vec<ScoredRow> = rows
        .iter()
        .filter(|row| filter.passes(row))
        .filter_map(|row| {
            score_row(q, row).map(|score| ScoredRow {
                row: row.clone(),
                score,
            })
        })
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score).then(a.row.id.cmp(&b.row.id)));
    scored
}

/// One page of results, 1-indexed, page clamped into range.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub items: Vec<ScoredRow>,
    pub page: usize,
    pub page_count: usize,
    pub page_size: usize,
    pub total: usize,
}

/// Slice a ranked result set into a page. `page` is clamped to
/// `[1, ceil(total/page_size)]` (minimum one page), so a stale page number
/// after a filter or page-size change never panics.
pub fn paginate(ranked: &[ScoredRow], page: usize, page_size: usize) -> Page {
    let page_size = page_size.max(1);
    let total = ranked.len();
    let page_count = total.div_ceil(page_size).max(1);
    let page = page.clamp(1, page_count);
    let start = (page - 1) * page_size;
    let items = ranked
        .iter()
        .skip(start)
        .take(page_size)
        .cloned()
        .collect();
    Page {
        items,
        page,
        page_count,
        page_size,
        total,
    }
}
