//! Refresh orchestration. One pass fetches both feeds, normalizes the row
//! payload, reconciles the KPI sources, and records source health. Partial
//! failures degrade rather than abort:
//! - Row fetch failure keeps the previously synced rows in place.
//! - KPI fetch failure marks the snapshot stale but leaves the last good
//!   numbers on screen.

use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::config::Config;
use crate::feed::rows::extract_rows;
use crate::feed::stats::StatsPayload;
use crate::feed::FeedClient;
use crate::kpi::{committee_breakdown, extract_grid, extract_totals, reconcile, GridOffsets};
use crate::normalize::normalize_rows;
use crate::state::DashboardState;
use crate::types::{CommitteeCount, KpiSnapshot};

/// What a refresh pass accomplished, for logging and the CLI.
#[derive(Debug, Clone, Default)]
pub struct RefreshSummary {
    pub row_count: usize,
    pub dropped: usize,
    pub kpi: Option<KpiSnapshot>,
    pub kpi_stale: bool,
}

/// Fetch both feeds and fold the results into shared state. `silent` skips
/// the loading flag so background polls don't flicker the UI.
pub async fn refresh(
    state: &Arc<DashboardState>,
    client: &FeedClient,
    config: &Config,
    silent: bool,
) -> Result<RefreshSummary, String> {
    let rows_url = Url::parse(&config.rows_url)
        .map_err(|e| format!("Invalid rows URL '{}': {}", config.rows_url, e))?;
    let stats_url = Url::parse(&config.stats_url)
        .map_err(|e| format!("Invalid stats URL '{}': {}", config.stats_url, e))?;

    if !silent {
        state.set_loading(true);
    }

    let mut summary = RefreshSummary {
        row_count: state.row_count(),
        ..RefreshSummary::default()
    };

    // --- Row feed ---
    let rows_resp = client.get(&rows_url).await;
    state.record_rows_health(rows_resp.ok, rows_resp.ms, rows_resp.status);
    if rows_resp.ok {
        match rows_resp.json.as_ref().and_then(|j| extract_rows(j)) {
            Some(raw) => {
                let outcome = normalize_rows(raw);
                summary.row_count = outcome.rows.len();
                summary.dropped = outcome.dropped;
                log::info!(
                    "Feed: synced {} rows ({} dropped) in {}ms",
                    outcome.rows.len(),
                    outcome.dropped,
                    rows_resp.ms
                );
                state.set_rows(
                    outcome.rows,
                    outcome.committees,
                    Value::Array(raw.clone()),
                );
            }
            None => {
                log::warn!("Feed: row payload had no recognizable row array");
            }
        }
    } else {
        log::warn!(
            "Feed: row fetch failed (status {}), keeping previous rows",
            rows_resp.status
        );
    }

    // --- KPI feed ---
    let stats_resp = client.get(&stats_url).await;
    state.record_kpi_health(stats_resp.ok, stats_resp.ms, stats_resp.status);
    if stats_resp.ok {
        let payload = StatsPayload::from_value(stats_resp.json.as_ref().unwrap_or(&Value::Null));
        let (snapshot, breakdown) = reconcile_payload(&payload, config);
        summary.kpi = Some(snapshot.clone());
        if snapshot.mismatched {
            log::warn!(
                "Feed: KPI sources disagree (grid paid={:?} vs totals paid={:?})",
                snapshot.paid_shadow.grid,
                snapshot.paid_shadow.totals
            );
        }
        state.set_kpi(snapshot, breakdown);
    } else {
        log::warn!(
            "Feed: KPI fetch failed (status {}), marking snapshot stale",
            stats_resp.status
        );
        state.mark_kpi_stale();
        summary.kpi_stale = true;
    }

    if !silent {
        state.set_loading(false);
    }
    Ok(summary)
}

/// Pure half of the KPI path: payload in, snapshot and breakdown out.
pub fn reconcile_payload(
    payload: &StatsPayload,
    config: &Config,
) -> (KpiSnapshot, Vec<CommitteeCount>) {
    let offsets = GridOffsets::default();
    let grid = payload
        .grid
        .as_ref()
        .map(|g| extract_grid(g, &offsets))
        .unwrap_or_default();
    let totals = payload
        .totals
        .as_ref()
        .map(|t| extract_totals(t))
        .unwrap_or_default();
    let snapshot = reconcile(&grid, &totals, config.kpi_source);
    let breakdown = payload
        .committees
        .as_ref()
        .map(|c| committee_breakdown(c))
        .unwrap_or_default();
    (snapshot, breakdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KpiSourcePref;
    use serde_json::json;

    fn config_with_pref(pref: KpiSourcePref) -> Config {
        Config {
            kpi_source: pref,
            ..Config::default()
        }
    }

    #[test]
    fn test_reconcile_payload_full() {
        let payload = StatsPayload::from_value(&json!({
            "grid": [
                ["", ""], ["", ""], ["", ""], ["", ""], ["", ""],
                ["Total", "40"],
                ["Paid", "25"],
                ["Unpaid", "15"],
            ],
            "totals": { "delegates": 42, "paid": 26, "unpaid": 16, "cancellations": 3 },
            "committees": [
                { "name": "IP", "total": 12, "paid": 9 },
                { "name": "GA", "total": 20, "paid": 14 },
            ],
        }));
        let (snapshot, breakdown) = reconcile_payload(&payload, &config_with_pref(KpiSourcePref::Totals));
        assert_eq!(snapshot.total, 42);
        assert_eq!(snapshot.paid, 26);
        assert_eq!(snapshot.rejected, 3);
        assert!(snapshot.mismatched);
        assert_eq!(breakdown[0].name, "GA");
        assert_eq!(breakdown.len(), 2);
    }

    #[test]
    fn test_reconcile_payload_grid_preference() {
        let payload = StatsPayload::from_value(&json!({
            "grid": [
                ["", ""], ["", ""], ["", ""], ["", ""], ["", ""],
                ["Total", "40"],
                ["Paid", "25"],
                ["Unpaid", "15"],
            ],
            "totals": { "delegates": 42, "paid": 26, "unpaid": 16 },
        }));
        let (snapshot, _) = reconcile_payload(&payload, &config_with_pref(KpiSourcePref::Grid));
        assert_eq!(snapshot.paid, 25);
        assert_eq!(snapshot.total, 40);
        assert_eq!(snapshot.rejected, 0);
    }

    #[test]
    fn test_reconcile_payload_missing_sections() {
        let payload = StatsPayload::from_value(&json!({
            "totals": { "delegates": 10, "paid": 4, "unpaid": 6 },
        }));
        let (snapshot, breakdown) = reconcile_payload(&payload, &config_with_pref(KpiSourcePref::Grid));
        // Grid preference falls through to totals when the grid is absent.
        assert_eq!(snapshot.paid, 4);
        assert!(!snapshot.mismatched);
        assert!(breakdown.is_empty());
    }

    #[test]
    fn test_reconcile_payload_empty() {
        let payload = StatsPayload::from_value(&json!({}));
        let (snapshot, breakdown) = reconcile_payload(&payload, &Config::default());
        assert_eq!(snapshot.total, 0);
        assert!(!snapshot.mismatched);
        assert!(breakdown.is_empty());
    }
}
