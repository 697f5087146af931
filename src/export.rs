//! CSV export of the current ranked view. Column order is fixed so exports
//! from different sessions diff cleanly.

use chrono::Utc;

use crate::types::DelegateRow;

/// Header order for exported files. Derived search fields are never exported.
pub const CSV_COLUMNS: [&str; 9] = [
    "id",
    "full_name",
    "email",
    "phone",
    "alt_phone",
    "committee_pref1",
    "portfolio_pref1",
    "mail_sent",
    "payment_status",
];

/// Render rows to CSV text. Every cell is quoted via JSON string encoding,
/// which handles embedded commas, quotes, and newlines in one move.
pub fn to_csv(rows: &[DelegateRow]) -> String {
    let mut out = String::new();
    out.push_str(&CSV_COLUMNS.join(","));
    out.push('\n');
    for row in rows {
        let cells = [
            row.id.to_string(),
            row.full_name.clone(),
            row.email.clone(),
            row.phone.clone(),
            row.alt_phone.clone(),
            row.committee_pref1.clone(),
            row.portfolio_pref1.clone(),
            row.mail_sent.clone(),
            row.payment_status.as_str().to_string(),
        ];
        let line: Vec<String> = cells.iter().map(|c| quote_cell(c)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn quote_cell(cell: &str) -> String {
    // serde_json string encoding is a superset of CSV quoting once the
    // outer double quotes are in place.
    serde_json::to_string(cell).unwrap_or_else(|_| String::from("\"\""))
}

/// Suggested filename for today's export: `delegates_YYYY-MM-DD.csv`.
pub fn default_filename() -> String {
    format!("delegates_{}.csv", Utc::now().format("%Y-%m-%d"))
}
