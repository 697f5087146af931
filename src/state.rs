//! Shared dashboard state: the row collection, view filters, KPI snapshot,
//! undo stack, selection set, and health counters.
//!
//! Single-owner model: mutations to rows go through the edit controller,
//! everything sits behind cheap non-poisoning mutexes, and reads hand out
//! clones so no lock is held across an await point.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::health::{HealthReport, LatencyWindow, SourceHealth};
use crate::query::parse_query;
use crate::search::{self, Page, ScoredRow, ViewFilter};
use crate::types::{CommitteeCount, DelegateRow, KpiSnapshot, PaymentStatus};

/// Current search/filter/pagination settings.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub query: String,
    pub status: Option<PaymentStatus>,
    pub committee: Option<String>,
    pub page: usize,
    pub page_size: usize,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            query: String::new(),
            status: None,
            committee: None,
            page: 1,
            page_size: 50,
        }
    }
}

/// KPI display state: last good snapshot plus staleness.
#[derive(Debug, Clone, Default)]
pub struct KpiState {
    pub snapshot: Option<KpiSnapshot>,
    pub breakdown: Vec<CommitteeCount>,
    pub stale: bool,
}

/// A pending undo window for one row. The token ties the expiry task to
/// this specific entry so a superseding save can't be evicted early.
#[derive(Debug, Clone)]
pub struct UndoEntry {
    pub row_id: u64,
    pub prev: DelegateRow,
    pub token: Uuid,
}

#[derive(Debug, Default)]
struct HealthState {
    rows: SourceHealth,
    kpi: SourceHealth,
    rows_latency: LatencyWindow,
    kpi_latency: LatencyWindow,
}

/// All mutable dashboard state.
#[derive(Debug, Default)]
pub struct DashboardState {
    rows: Mutex<Vec<DelegateRow>>,
    committees: Mutex<Vec<String>>,
    view: Mutex<ViewState>,
    kpi: Mutex<KpiState>,
    undo: Mutex<Vec<UndoEntry>>,
    selection: Mutex<HashSet<u64>>,
    health: Mutex<HealthState>,
    /// Raw pre-normalization payload of the last row fetch, for inspecting
    /// upstream shape drift.
    raw_rows: Mutex<Option<Value>>,
    last_synced: Mutex<Option<String>>,
    /// Set during user-initiated (non-silent) refreshes only.
    pub loading: AtomicBool,
}

impl DashboardState {
    pub fn new(page_size: usize) -> Self {
        let state = DashboardState::default();
        state.view.lock().page_size = page_size.max(1);
        state
    }

    // -----------------------------------------------------------------------
    // Rows
    // -----------------------------------------------------------------------

    /// Replace the row collection after a successful fetch.
    pub fn set_rows(&self, rows: Vec<DelegateRow>, committees: Vec<String>, raw: Value) {
        *self.rows.lock() = rows;
        *self.committees.lock() = committees;
        *self.raw_rows.lock() = Some(raw);
        *self.last_synced.lock() = Some(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string());
    }

    pub fn row(&self, id: u64) -> Option<DelegateRow> {
        self.rows.lock().iter().find(|r| r.id == id).cloned()
    }

    /// Replace a row in place by id (optimistic apply and rollback both come
    /// through here).
    pub fn put_row(&self, row: DelegateRow) {
        let mut rows = self.rows.lock();
        if let Some(slot) = rows.iter_mut().find(|r| r.id == row.id) {
            *slot = row;
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn committees(&self) -> Vec<String> {
        self.committees.lock().clone()
    }

    pub fn raw_snapshot(&self) -> Option<Value> {
        self.raw_rows.lock().clone()
    }

    pub fn last_synced(&self) -> Option<String> {
        self.last_synced.lock().clone()
    }

    // -----------------------------------------------------------------------
    // View
    // -----------------------------------------------------------------------

    pub fn view(&self) -> ViewState {
        self.view.lock().clone()
    }

    /// Changing the text query resets pagination.
    pub fn set_query(&self, query: &str) {
        let mut view = self.view.lock();
        view.query = query.to_string();
        view.page = 1;
    }

    pub fn set_status_filter(&self, status: Option<PaymentStatus>) {
        let mut view = self.view.lock();
        view.status = status;
        view.page = 1;
    }

    pub fn set_committee_filter(&self, committee: Option<String>) {
        let mut view = self.view.lock();
        view.committee = committee;
        view.page = 1;
    }

    pub fn set_page(&self, page: usize) {
        self.view.lock().page = page.max(1);
    }

    /// Page size is restricted to the preset values; anything else is
    /// ignored.
    pub fn set_page_size(&self, page_size: usize) {
        if search::PAGE_SIZES.contains(&page_size) {
            self.view.lock().page_size = page_size;
        }
    }

    /// Run the full pipeline for the current view: parse → filter → score →
    /// rank → paginate.
    pub fn results(&self) -> Page {
        let view = self.view();
        let rows = self.rows.lock().clone();
        let q = parse_query(&view.query);
        let filter = ViewFilter {
            status: view.status,
            committee: view.committee.clone(),
        };
        let ranked = search::rank(&rows, &q, &filter);
        search::paginate(&ranked, view.page, view.page_size)
    }

    /// The complete filtered/sorted result set (no pagination) — feeds the
    /// CSV export.
    pub fn ranked_rows(&self) -> Vec<ScoredRow> {
        let view = self.view();
        let rows = self.rows.lock().clone();
        let q = parse_query(&view.query);
        let filter = ViewFilter {
            status: view.status,
            committee: view.committee.clone(),
        };
        search::rank(&rows, &q, &filter)
    }

    // -----------------------------------------------------------------------
    // KPI
    // -----------------------------------------------------------------------

    pub fn set_kpi(&self, snapshot: KpiSnapshot, breakdown: Vec<CommitteeCount>) {
        let mut kpi = self.kpi.lock();
        kpi.snapshot = Some(snapshot);
        kpi.breakdown = breakdown;
        kpi.stale = false;
    }

    /// KPI fetch failed: keep the last good snapshot, flag it stale.
    pub fn mark_kpi_stale(&self) {
        self.kpi.lock().stale = true;
    }

    pub fn kpi(&self) -> KpiState {
        self.kpi.lock().clone()
    }

    // -----------------------------------------------------------------------
    // Undo
    // -----------------------------------------------------------------------

    /// Arm an undo window, superseding any prior entry for the same row.
    pub fn push_undo(&self, entry: UndoEntry) {
        let mut undo = self.undo.lock();
        undo.retain(|e| e.row_id != entry.row_id);
        undo.push(entry);
    }

    /// Consume the pending undo entry for a row, if any.
    pub fn take_undo(&self, row_id: u64) -> Option<UndoEntry> {
        let mut undo = self.undo.lock();
        let idx = undo.iter().position(|e| e.row_id == row_id)?;
        Some(undo.remove(idx))
    }

    /// Expiry path: drop the entry only if this exact window is still armed.
    pub fn expire_undo(&self, row_id: u64, token: Uuid) {
        let mut undo = self.undo.lock();
        undo.retain(|e| !(e.row_id == row_id && e.token == token));
    }

    pub fn has_undo(&self, row_id: u64) -> bool {
        self.undo.lock().iter().any(|e| e.row_id == row_id)
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    pub fn select(&self, row_id: u64) {
        self.selection.lock().insert(row_id);
    }

    pub fn deselect(&self, row_id: u64) {
        self.selection.lock().remove(&row_id);
    }

    /// Selected ids in ascending order (bulk edits run in this order).
    pub fn selected(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.selection.lock().iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn clear_selection(&self) {
        self.selection.lock().clear();
    }

    // -----------------------------------------------------------------------
    // Health
    // -----------------------------------------------------------------------

    pub fn record_rows_health(&self, ok: bool, ms: u64, status: u16) {
        let mut health = self.health.lock();
        health.rows.record(ok, ms, status);
        if ok {
            health.rows_latency.push(ms);
        }
    }

    pub fn record_kpi_health(&self, ok: bool, ms: u64, status: u16) {
        let mut health = self.health.lock();
        health.kpi.record(ok, ms, status);
        if ok {
            health.kpi_latency.push(ms);
        }
    }

    pub fn health_report(&self) -> HealthReport {
        let health = self.health.lock();
        let kpi = self.kpi.lock();
        let (mismatched, paid_shadow, unpaid_shadow) = match &kpi.snapshot {
            Some(s) => (s.mismatched, s.paid_shadow, s.unpaid_shadow),
            None => (false, Default::default(), Default::default()),
        };
        HealthReport {
            rows: health.rows.clone(),
            kpi: health.kpi.clone(),
            rows_p50: health.rows_latency.percentile(0.5),
            rows_p95: health.rows_latency.percentile(0.95),
            kpi_p50: health.kpi_latency.percentile(0.5),
            kpi_p95: health.kpi_latency.percentile(0.95),
            kpi_stale: kpi.stale,
            kpi_mismatched: mismatched,
            paid_shadow,
            unpaid_shadow,
        }
    }

    pub fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::Relaxed);
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Relaxed)
    }
}
