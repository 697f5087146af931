//! KPI feed: splits the aggregate GET payload into its optional parts.

use serde_json::Value;

/// The three optional sections of a KPI payload. Kept as raw values — the
/// reconciler in `kpi.rs` owns interpretation.
#[derive(Debug, Clone, Default)]
pub struct StatsPayload {
    pub grid: Option<Value>,
    pub totals: Option<Value>,
    pub committees: Option<Value>,
}

impl StatsPayload {
    pub fn from_value(payload: &Value) -> Self {
        StatsPayload {
            grid: payload.get("grid").cloned().filter(|v| !v.is_null()),
            totals: payload.get("totals").cloned().filter(|v| !v.is_null()),
            committees: payload.get("committees").cloned().filter(|v| !v.is_null()),
        }
    }
}
