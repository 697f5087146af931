//! HTTP audit sink: append-only writes plus a recent-N readback for the
//! history view. The storage engine behind the endpoint is opaque — this
//! module only speaks the wire shape.

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use crate::editor::AuditSink;
use crate::feed::{FeedClient, FeedError};
use crate::types::AuditEntry;

/// Default history depth for the audit view.
pub const DEFAULT_HISTORY_LIMIT: usize = 300;

/// Audit sink backed by the remote audit endpoint.
pub struct HttpAuditSink {
    client: FeedClient,
    url: Url,
}

impl HttpAuditSink {
    pub fn new(client: FeedClient, url: Url) -> Self {
        HttpAuditSink { client, url }
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn append(&self, entry: &AuditEntry) -> Result<(), FeedError> {
        let body = json!({ "action": "audit", "entry": entry });
        let resp = self.client.post_json(&self.url, &body).await;
        if !resp.ok {
            return Err(resp.error());
        }
        if resp
            .json
            .as_ref()
            .and_then(|j| j.get("ok"))
            .and_then(Value::as_bool)
            == Some(false)
        {
            return Err(FeedError::Rejected("audit append refused".into()));
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, FeedError> {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("action", "audit")
            .append_pair("limit", &limit.to_string());
        let resp = self.client.get(&url).await;
        if !resp.ok {
            return Err(resp.error());
        }
        let payload = resp.json.unwrap_or(Value::Null);
        parse_entries(&payload).ok_or(FeedError::Shape)
    }
}

/// Accept either a bare array or an `{entries: [...]}` wrapper; individual
/// malformed entries are skipped rather than failing the whole read.
fn parse_entries(payload: &Value) -> Option<Vec<AuditEntry>> {
    let array = payload
        .as_array()
        .or_else(|| payload.get("entries").and_then(Value::as_array))?;
    Some(
        array
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect(),
    )
}

/// No-op sink for when no audit endpoint is configured. Appends vanish,
/// history reads come back empty.
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn append(&self, _entry: &AuditEntry) -> Result<(), FeedError> {
        Ok(())
    }

    async fn recent(&self, _limit: usize) -> Result<Vec<AuditEntry>, FeedError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Actor;

    fn sample_entry() -> AuditEntry {
        AuditEntry::new(
            &Actor {
                id: "u1".into(),
                email: "ops@example.com".into(),
            },
            7,
            "payment_status",
            "unpaid".into(),
            "paid".into(),
        )
    }

    #[test]
    fn test_parse_entries_bare_array_and_wrapper() {
        let entry = serde_json::to_value(sample_entry()).unwrap();
        let bare = json!([entry]);
        assert_eq!(parse_entries(&bare).unwrap().len(), 1);

        let wrapped = json!({ "entries": [entry] });
        assert_eq!(parse_entries(&wrapped).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_entries_skips_malformed() {
        let entry = serde_json::to_value(sample_entry()).unwrap();
        let mixed = json!([entry, { "garbage": true }, 42]);
        assert_eq!(parse_entries(&mixed).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_entries_unknown_shape() {
        assert!(parse_entries(&json!({ "rows": [] })).is_none());
    }

    #[tokio::test]
    async fn test_null_sink() {
        let sink = NullAuditSink;
        sink.append(&sample_entry()).await.unwrap();
        assert!(sink.recent(10).await.unwrap().is_empty());
    }
}
