//! Core data types: the normalized delegate row, patches, actors, audit
//! entries, and the KPI snapshot shapes.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::text::{digits_of, fold};

// ---------------------------------------------------------------------------
// Payment status
// ---------------------------------------------------------------------------

/// Payment status in the UI vocabulary. The backend speaks
/// `verified`/`pending`/`rejected`; translation happens only at the network
/// boundary (`to_wire`/`from_wire`) — everything in-process uses this enum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    #[default]
    Unpaid,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Rejected => "rejected",
        }
    }

    /// Parse the UI vocabulary (CLI flags, query filter values).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "paid" => Some(PaymentStatus::Paid),
            "unpaid" => Some(PaymentStatus::Unpaid),
            "rejected" => Some(PaymentStatus::Rejected),
            _ => None,
        }
    }

    /// Backend vocabulary for update POSTs.
    pub fn to_wire(self) -> &'static str {
        match self {
            PaymentStatus::Paid => "verified",
            PaymentStatus::Unpaid => "pending",
            PaymentStatus::Rejected => "rejected",
        }
    }

    /// Backend vocabulary → UI vocabulary. Unknown labels map to `Unpaid`.
    pub fn from_wire(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "verified" => PaymentStatus::Paid,
            "rejected" => PaymentStatus::Rejected,
            _ => PaymentStatus::Unpaid,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Delegate row
// ---------------------------------------------------------------------------

/// A normalized registration row — the canonical unit of search and display.
///
/// `slab`, `digits`, and `tokens` are pure functions of the visible fields.
/// Any mutation must go through `recompute_derived()` before the row is used
/// for search again; `RowPatch::apply_to` does this for you.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateRow {
    pub id: u64,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub alt_phone: String,
    #[serde(default)]
    pub committee_pref1: String,
    #[serde(default)]
    pub portfolio_pref1: String,
    #[serde(default)]
    pub mail_sent: String,
    #[serde(default)]
    pub payment_status: PaymentStatus,

    /// Folded concatenation of every searchable field, for substring search.
    #[serde(skip)]
    pub slab: String,
    /// Digits-only index of `phone` + `alt_phone`.
    #[serde(skip)]
    pub digits: String,
    /// Whitespace-split tokens of `slab`.
    #[serde(skip)]
    pub tokens: Vec<String>,
}

impl DelegateRow {
    /// Regenerate `slab`/`digits`/`tokens` from the visible fields.
    pub fn recompute_derived(&mut self) {
        self.slab = fold(&format!(
            "{} {} {} {} {} {} {} {}",
            self.full_name,
            self.email,
            self.phone,
            self.alt_phone,
            self.committee_pref1,
            self.portfolio_pref1,
            self.mail_sent,
            self.payment_status.as_str(),
        ));
        self.digits = digits_of(&format!("{} {}", self.phone, self.alt_phone));
        self.tokens = self
            .slab
            .split(' ')
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
    }
}

// ---------------------------------------------------------------------------
// Row patch
// ---------------------------------------------------------------------------

/// A partial update to a row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowPatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub alt_phone: Option<String>,
    pub committee_pref1: Option<String>,
    pub portfolio_pref1: Option<String>,
    pub mail_sent: Option<String>,
    pub payment_status: Option<PaymentStatus>,
}

impl RowPatch {
    /// A patch that sets only the status field.
    pub fn status(status: PaymentStatus) -> Self {
        RowPatch {
            payment_status: Some(status),
            ..Default::default()
        }
    }

    /// A patch that replays every visible field of `row` — used by undo to
    /// restore the exact prior state.
    pub fn replay(row: &DelegateRow) -> Self {
        RowPatch {
            full_name: Some(row.full_name.clone()),
            email: Some(row.email.clone()),
            phone: Some(row.phone.clone()),
            alt_phone: Some(row.alt_phone.clone()),
            committee_pref1: Some(row.committee_pref1.clone()),
            portfolio_pref1: Some(row.portfolio_pref1.clone()),
            mail_sent: Some(row.mail_sent.clone()),
            payment_status: Some(row.payment_status),
        }
    }

    /// Merge this patch into `row` and recompute the derived fields.
    pub fn apply_to(&self, row: &mut DelegateRow) {
        if let Some(v) = &self.full_name {
            row.full_name = v.clone();
        }
        if let Some(v) = &self.email {
            row.email = v.clone();
        }
        if let Some(v) = &self.phone {
            row.phone = v.clone();
        }
        if let Some(v) = &self.alt_phone {
            row.alt_phone = v.clone();
        }
        if let Some(v) = &self.committee_pref1 {
            row.committee_pref1 = v.clone();
        }
        if let Some(v) = &self.portfolio_pref1 {
            row.portfolio_pref1 = v.clone();
        }
        if let Some(v) = &self.mail_sent {
            row.mail_sent = v.clone();
        }
        if let Some(v) = self.payment_status {
            row.payment_status = v;
        }
        row.recompute_derived();
    }
}

/// The full field set sent with an update POST. Status is already translated
/// to the backend vocabulary here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFields {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub alt_phone: String,
    pub committee_pref1: String,
    pub portfolio_pref1: String,
    pub mail_sent: String,
    pub payment_status: String,
}

impl UpdateFields {
    pub fn from_row(row: &DelegateRow) -> Self {
        UpdateFields {
            full_name: row.full_name.clone(),
            email: row.email.clone(),
            phone: row.phone.clone(),
            alt_phone: row.alt_phone.clone(),
            committee_pref1: row.committee_pref1.clone(),
            portfolio_pref1: row.portfolio_pref1.clone(),
            mail_sent: row.mail_sent.clone(),
            payment_status: row.payment_status.to_wire().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Actor + audit
// ---------------------------------------------------------------------------

/// Who is performing an edit. Supplied by the caller from its external
/// session; this crate never authenticates anyone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub email: String,
}

/// One audit-log line: who changed which field of which row, from what to
/// what.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub actor_id: String,
    pub actor_email: String,
    pub row_id: u64,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
    pub at: String,
}

impl AuditEntry {
    pub fn new(actor: &Actor, row_id: u64, field: &str, old: String, new: String) -> Self {
        AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            actor_id: actor.id.clone(),
            actor_email: actor.email.clone(),
            row_id,
            field: field.to_string(),
            old_value: old,
            new_value: new,
            at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// KPI shapes
// ---------------------------------------------------------------------------

/// Which KPI feed wins when the grid and totals sources disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiSourcePref {
    Grid,
    #[default]
    Totals,
}

/// Shadow values for one KPI field: what each source reported, retained for
/// display regardless of which source was chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowPair {
    pub grid: Option<u64>,
    pub totals: Option<u64>,
}

/// The reconciled aggregate counts plus the mismatch diagnostic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSnapshot {
    pub total: u64,
    pub paid: u64,
    pub unpaid: u64,
    pub rejected: u64,
    pub mismatched: bool,
    pub paid_shadow: ShadowPair,
    pub unpaid_shadow: ShadowPair,
}

/// Per-committee registration counts from the KPI feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitteeCount {
    pub name: String,
    pub total: u64,
    pub paid: u64,
    pub unpaid: u64,
}
