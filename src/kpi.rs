//! KPI reconciler: merges the two aggregate feeds (raw grid region vs the
//! structured totals object) into one snapshot, flagging disagreements.
//!
//! The grid is a literal 2D slice of the spreadsheet; counts sit at fixed
//! row offsets in column B. The totals object is the structured export of
//! the same numbers. They can drift apart — both values are kept as shadow
//! diagnostics and a user preference decides which one the snapshot shows.

use serde_json::Value;

use crate::types::{CommitteeCount, KpiSnapshot, KpiSourcePref, ShadowPair};

// ---------------------------------------------------------------------------
// Numeric coercion
// ---------------------------------------------------------------------------

/// Coerce a JSON value to a count. Strings are stripped to their digits
/// before parsing ("1,204 delegates" → 1204). Absent/garbage → `None`, so
/// presence can drive mismatch detection.
pub fn numify(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                None
            } else {
                digits.parse().ok()
            }
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Source extraction
// ---------------------------------------------------------------------------

/// Fixed grid positions (0-based row index, column B) for each count.
#[derive(Debug, Clone, Copy)]
pub struct GridOffsets {
    pub total_row: usize,
    pub paid_row: usize,
    pub unpaid_row: usize,
}

impl Default for GridOffsets {
    // Spreadsheet rows 6/7/8
    fn default() -> Self {
        GridOffsets {
            total_row: 5,
            paid_row: 6,
            unpaid_row: 7,
        }
    }
}

/// What one source reported. `None` means the source had no value there.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourceCounts {
    pub total: Option<u64>,
    pub paid: Option<u64>,
    pub unpaid: Option<u64>,
    pub rejected: Option<u64>,
}

fn grid_cell(grid: &Value, row: usize) -> Option<u64> {
    grid.get(row).and_then(|r| r.get(1)).and_then(numify)
}

/// Read the configured offsets out of a 2D grid. A missing total is derived
/// as paid + unpaid when both are present. The grid has no rejected count.
pub fn extract_grid(grid: &Value, offsets: &GridOffsets) -> SourceCounts {
    let paid = grid_cell(grid, offsets.paid_row);
    let unpaid = grid_cell(grid, offsets.unpaid_row);
    let total = grid_cell(grid, offsets.total_row).or(match (paid, unpaid) {
        (Some(p), Some(u)) => Some(p + u),
        _ => None,
    });
    SourceCounts {
        total,
        paid,
        unpaid,
        rejected: None,
    }
}

/// Read the named fields of the structured totals object.
pub fn extract_totals(totals: &Value) -> SourceCounts {
    SourceCounts {
        total: totals.get("delegates").and_then(numify),
        paid: totals.get("paid").and_then(numify),
        unpaid: totals.get("unpaid").and_then(numify),
        rejected: totals.get("cancellations").and_then(numify),
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Merge both sources into one snapshot. The preferred source wins per
/// field, falling back to the other source, then to 0. `rejected` always
/// comes from the totals feed. Mismatch is flagged when both sources supply
/// paid or unpaid and they disagree; shadow values are retained either way.
pub fn reconcile(grid: &SourceCounts, totals: &SourceCounts, pref: KpiSourcePref) -> KpiSnapshot {
    let choose = |g: Option<u64>, t: Option<u64>| match pref {
        KpiSourcePref::Grid => g.or(t),
        KpiSourcePref::Totals => t.or(g),
    };

    let disagree = |g: Option<u64>, t: Option<u64>| matches!((g, t), (Some(a), Some(b)) if a != b);

    KpiSnapshot {
        total: choose(grid.total, totals.total).unwrap_or(0),
        paid: choose(grid.paid, totals.paid).unwrap_or(0),
        unpaid: choose(grid.unpaid, totals.unpaid).unwrap_or(0),
        rejected: totals.rejected.unwrap_or(0),
        mismatched: disagree(grid.paid, totals.paid) || disagree(grid.unpaid, totals.unpaid),
        paid_shadow: ShadowPair {
            grid: grid.paid,
            totals: totals.paid,
        },
        unpaid_shadow: ShadowPair {
            grid: grid.unpaid,
            totals: totals.unpaid,
        },
    }
}

// ---------------------------------------------------------------------------
// Committee breakdown
// ---------------------------------------------------------------------------

fn committee_from(name: String, v: &Value) -> CommitteeCount {
    CommitteeCount {
        name,
        total: v.get("total").and_then(numify).unwrap_or(0),
        paid: v.get("paid").and_then(numify).unwrap_or(0),
        unpaid: v.get("unpaid").and_then(numify).unwrap_or(0),
    }
}

/// Extract the per-committee table. The feed ships either an array of
/// `{name, total, paid, unpaid}` objects or a map keyed by committee name.
/// Sorted descending by total, name ascending on ties.
pub fn committee_breakdown(v: &Value) -> Vec<CommitteeCount> {
    let mut out: Vec<CommitteeCount> = match v {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let name = item.get("name").and_then(Value::as_str)?.to_string();
                Some(committee_from(name, item))
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(name, item)| committee_from(name.clone(), item))
            .collect(),
        _ => Vec::new(),
    };
    out.sort_by(|a, b| b.total.cmp(&a.total).then(a.name.cmp(&b.name)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grid_fixture(total: &str, paid: &str, unpaid: &str) -> Value {
        // Rows 0-4 are headers/decoration, counts start at row 5
        json!([
            ["Registrations", ""],
            ["", ""],
            ["", ""],
            ["", ""],
            ["", ""],
            ["Total", total],
            ["Paid", paid],
            ["Unpaid", unpaid],
        ])
    }

    #[test]
    fn test_numify() {
        assert_eq!(numify(&json!(42)), Some(42));
        assert_eq!(numify(&json!("1,204 delegates")), Some(1204));
        assert_eq!(numify(&json!("42")), Some(42));
        assert_eq!(numify(&json!("")), None);
        assert_eq!(numify(&json!("n/a")), None);
        assert_eq!(numify(&json!(null)), None);
    }

    #[test]
    fn test_extract_grid_fixed_offsets() {
        let grid = grid_fixture("100", "60", "40");
        let counts = extract_grid(&grid, &GridOffsets::default());
        assert_eq!(counts.total, Some(100));
        assert_eq!(counts.paid, Some(60));
        assert_eq!(counts.unpaid, Some(40));
        assert_eq!(counts.rejected, None);
    }

    #[test]
    fn test_grid_total_derived_from_paid_plus_unpaid() {
        let grid = grid_fixture("", "60", "40");
        let counts = extract_grid(&grid, &GridOffsets::default());
        assert_eq!(counts.total, Some(100));
    }

    #[test]
    fn test_grid_too_short_yields_nothing() {
        let counts = extract_grid(&json!([["only", "row"]]), &GridOffsets::default());
        assert_eq!(counts, SourceCounts::default());
    }

    #[test]
    fn test_extract_totals() {
        let totals = json!({ "delegates": "120", "paid": 70, "unpaid": 50, "cancellations": 3 });
        let counts = extract_totals(&totals);
        assert_eq!(counts.total, Some(120));
        assert_eq!(counts.paid, Some(70));
        assert_eq!(counts.unpaid, Some(50));
        assert_eq!(counts.rejected, Some(3));
    }

    #[test]
    fn test_mismatch_detected_with_shadows_retained() {
        let grid = SourceCounts {
            paid: Some(40),
            ..Default::default()
        };
        let totals = SourceCounts {
            paid: Some(42),
            rejected: Some(1),
            ..Default::default()
        };
        let snap = reconcile(&grid, &totals, KpiSourcePref::Totals);
        assert!(snap.mismatched);
        assert_eq!(snap.paid, 42);
        assert_eq!(snap.paid_shadow.grid, Some(40));
        assert_eq!(snap.paid_shadow.totals, Some(42));

        let grid_pref = reconcile(&grid, &totals, KpiSourcePref::Grid);
        assert_eq!(grid_pref.paid, 40);
        assert!(grid_pref.mismatched);
    }

    #[test]
    fn test_preference_falls_back_to_other_source() {
        let grid = SourceCounts::default();
        let totals = SourceCounts {
            paid: Some(12),
            ..Default::default()
        };
        let snap = reconcile(&grid, &totals, KpiSourcePref::Grid);
        assert_eq!(snap.paid, 12);
        assert!(!snap.mismatched);
        assert_eq!(snap.unpaid, 0);
    }

    #[test]
    fn test_rejected_always_from_totals() {
        let totals = SourceCounts {
            rejected: Some(5),
            ..Default::default()
        };
        let snap = reconcile(&SourceCounts::default(), &totals, KpiSourcePref::Grid);
        assert_eq!(snap.rejected, 5);
    }

    #[test]
    fn test_breakdown_array_and_map_shapes() {
        let array = json!([
            { "name": "WHO", "total": 10, "paid": 6, "unpaid": 4 },
            { "name": "UNSC", "total": 25, "paid": 20, "unpaid": 5 },
        ]);
        let from_array = committee_breakdown(&array);
        assert_eq!(from_array[0].name, "UNSC");
        assert_eq!(from_array[1].name, "WHO");

        let map = json!({
            "WHO": { "total": 10, "paid": 6, "unpaid": 4 },
            "UNSC": { "total": 25, "paid": 20, "unpaid": 5 },
        });
        let from_map = committee_breakdown(&map);
        assert_eq!(from_map[0].name, "UNSC");
        assert_eq!(from_map[0].total, 25);
    }
}
