//! Per-source health instrumentation: last fetch outcome plus a bounded
//! latency window with percentile snapshots. In-process state only — this
//! is the data behind the dashboard's health badges, not a metrics service.

use std::collections::VecDeque;

use chrono::Utc;
use serde::Serialize;

use crate::types::ShadowPair;

/// Bounded latency sample count per source.
const WINDOW: usize = 256;

/// Outcome of the most recent fetch against one remote source.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub ok: bool,
    pub ms: u64,
    pub status: u16,
    pub checked_at: Option<String>,
}

impl SourceHealth {
    pub fn record(&mut self, ok: bool, ms: u64, status: u16) {
        self.ok = ok;
        self.ms = ms;
        self.status = status;
        self.checked_at = Some(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string());
    }
}

/// Sliding window of latency observations.
#[derive(Debug, Clone, Default)]
pub struct LatencyWindow {
    samples: VecDeque<u64>,
}

impl LatencyWindow {
    pub fn push(&mut self, ms: u64) {
        if self.samples.len() == WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Nearest-rank percentile over the window, `p` in `[0, 1]`.
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
        Some(sorted[idx])
    }
}

/// Everything the health badge row renders.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub rows: SourceHealth,
    pub kpi: SourceHealth,
    pub rows_p50: Option<u64>,
    pub rows_p95: Option<u64>,
    pub kpi_p50: Option<u64>,
    pub kpi_p95: Option<u64>,
    pub kpi_stale: bool,
    pub kpi_mismatched: bool,
    pub paid_shadow: ShadowPair,
    pub unpaid_shadow: ShadowPair,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_window_bounded() {
        let mut w = LatencyWindow::default();
        for i in 0..300 {
            w.push(i);
        }
        assert_eq!(w.len(), WINDOW);
        // Oldest samples evicted first
        assert_eq!(w.percentile(0.0), Some(300 - WINDOW as u64));
    }

    #[test]
    fn test_percentiles() {
        let mut w = LatencyWindow::default();
        assert_eq!(w.percentile(0.5), None);
        for ms in [10, 20, 30, 40, 100] {
            w.push(ms);
        }
        assert_eq!(w.percentile(0.5), Some(30));
        assert_eq!(w.percentile(1.0), Some(100));
        assert_eq!(w.percentile(0.95), Some(100));
    }

    #[test]
    fn test_source_health_record() {
        let mut h = SourceHealth::default();
        h.record(true, 210, 200);
        assert!(h.ok);
        assert_eq!(h.ms, 210);
        assert_eq!(h.status, 200);
        assert!(h.checked_at.is_some());
    }
}
