//! Row normalizer: heterogeneous remote records → canonical `DelegateRow`s.
//!
//! Upstream rows come from a spreadsheet and their keys drift over time
//! ("Full Name" / "full_name" / "Name", a status column that may be labelled
//! "Paid"). The tolerance table below is data, not conditionals: each logical
//! field carries an ordered list of candidate keys, first non-empty exact
//! match wins, then a case-insensitive fallback scan over all keys.

use std::collections::HashSet;

use serde_json::Value;

use crate::text::fold;
use crate::types::{DelegateRow, PaymentStatus};

// ---------------------------------------------------------------------------
// Candidate-key tables
// ---------------------------------------------------------------------------

const ID_KEYS: &[&str] = &["id", "ID", "Id", "Sr No", "sr_no", "S.No", "row"];
const NAME_KEYS: &[&str] = &["Full Name", "full_name", "fullName", "Name", "Delegate Name"];
const EMAIL_KEYS: &[&str] = &["Email", "email", "Email Address", "E-mail", "Mail ID"];
const PHONE_KEYS: &[&str] = &["Phone", "phone", "Mobile", "Phone Number", "Contact", "Contact Number"];
const ALT_PHONE_KEYS: &[&str] = &[
    "Alt Phone",
    "alt_phone",
    "altPhone",
    "Alternate Phone",
    "Alternate Number",
    "WhatsApp Number",
];
const COMMITTEE_KEYS: &[&str] = &[
    "Committee Preference 1",
    "committee_pref1",
    "committeePref1",
    "Committee",
    "Committee Preference",
];
const PORTFOLIO_KEYS: &[&str] = &[
    "Portfolio Preference 1",
    "portfolio_pref1",
    "portfolioPref1",
    "Portfolio",
    "Portfolio Preference",
];
const MAIL_SENT_KEYS: &[&str] = &["Mail Sent", "mail_sent", "mailSent", "Confirmation Mail"];
const STATUS_KEYS: &[&str] = &[
    "Payment Status",
    "payment_status",
    "paymentStatus",
    "Paid",
    "Status",
    "Payment",
];

/// Render a JSON scalar as trimmed text. Arrays/objects/null read as empty.
fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Resolve one logical field from a loosely-shaped source object.
///
/// Exact candidates first (in order, first non-empty wins), then a
/// case-insensitive scan over every key in the object.
pub fn pick(obj: &serde_json::Map<String, Value>, candidates: &[&str]) -> String {
    for key in candidates {
        if let Some(v) = obj.get(*key) {
            let s = value_text(v);
            if !s.is_empty() {
                return s;
            }
        }
    }
    for cand in candidates {
        for (key, v) in obj {
            if key.eq_ignore_ascii_case(cand) {
                let s = value_text(v);
                if !s.is_empty() {
                    return s;
                }
            }
        }
    }
    String::new()
}

// ---------------------------------------------------------------------------
// Status derivation
// ---------------------------------------------------------------------------

/// Map a raw status label onto the UI vocabulary.
///
/// Checks "unpaid" before "paid" — substring matching would otherwise read
/// "UNPAID" as paid. "cancel" wins over everything (a cancelled row stays
/// rejected even if the label also says paid). Labels in the backend wire
/// vocabulary (`pending`/`verified`/`rejected`) map through as a second pass.
pub fn derive_status(raw: &str) -> PaymentStatus {
    let s = raw.trim().to_lowercase();
    if s.contains("cancel") {
        return PaymentStatus::Rejected;
    }
    if s.contains("unpaid") {
        return PaymentStatus::Unpaid;
    }
    if s.contains("paid") || s == "yes" {
        return PaymentStatus::Paid;
    }
    PaymentStatus::from_wire(&s)
}

// ---------------------------------------------------------------------------
// Normalization pass
// ---------------------------------------------------------------------------

/// Result of one normalization pass over a raw feed payload.
#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    pub rows: Vec<DelegateRow>,
    /// Distinct committee names observed, sorted by folded comparison —
    /// feeds the committee filter dropdown.
    pub committees: Vec<String>,
    /// Source rows dropped for having no name, email, or phone at all.
    pub dropped: usize,
}

/// Normalize an array of loosely-typed source objects.
///
/// Row ids come from a source-provided identifier when one parses as an
/// integer, falling back to the positional index.
pub fn normalize_rows(source: &[Value]) -> NormalizeOutcome {
    let mut out = NormalizeOutcome::default();
    let mut seen_committees: HashSet<String> = HashSet::new();

    for (index, value) in source.iter().enumerate() {
        let Some(obj) = value.as_object() else {
            out.dropped += 1;
            continue;
        };

        let full_name = pick(obj, NAME_KEYS);
        let email = pick(obj, EMAIL_KEYS);
        let phone = pick(obj, PHONE_KEYS);
        if full_name.is_empty() && email.is_empty() && phone.is_empty() {
            out.dropped += 1;
            continue;
        }

        let id = pick(obj, ID_KEYS)
            .parse::<u64>()
            .unwrap_or(index as u64);

        let committee_pref1 = pick(obj, COMMITTEE_KEYS);
        if !committee_pref1.is_empty() {
            seen_committees.insert(committee_pref1.clone());
        }

        let mut row = DelegateRow {
            id,
            full_name,
            email,
            phone,
            alt_phone: pick(obj, ALT_PHONE_KEYS),
            committee_pref1,
            portfolio_pref1: pick(obj, PORTFOLIO_KEYS),
            mail_sent: pick(obj, MAIL_SENT_KEYS),
            payment_status: derive_status(&pick(obj, STATUS_KEYS)),
            ..Default::default()
        };
        row.recompute_derived();
        out.rows.push(row);
    }

    out.committees = seen_committees.into_iter().collect();
    out.committees.sort_by_key(|c| fold(c));
    out
}
