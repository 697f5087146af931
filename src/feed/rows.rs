//! Registration row feed: payload extraction and the update POST.

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use super::{FeedClient, FeedError};
use crate::editor::RowStore;
use crate::types::UpdateFields;

/// Locate the row array inside a tolerantly-shaped GET payload: one of
/// `rows`, `data`, `items`, or `result.rows`.
pub fn extract_rows(payload: &Value) -> Option<&Vec<Value>> {
    for key in ["rows", "data", "items"] {
        if let Some(arr) = payload.get(key).and_then(Value::as_array) {
            return Some(arr);
        }
    }
    payload
        .get("result")
        .and_then(|r| r.get("rows"))
        .and_then(Value::as_array)
}

/// HTTP-backed [`RowStore`]: POSTs `{action: "update", id, fields}` to the
/// registration endpoint and honors an explicit `ok:false` in the body.
pub struct HttpRowStore {
    client: FeedClient,
    url: Url,
}

impl HttpRowStore {
    pub fn new(client: FeedClient, url: Url) -> Self {
        HttpRowStore { client, url }
    }
}

#[async_trait]
impl RowStore for HttpRowStore {
    async fn push_update(&self, id: u64, fields: &UpdateFields) -> Result<(), FeedError> {
        let body = json!({
            "action": "update",
            "id": id,
            "fields": fields,
        });
        let resp = self.client.post_json(&self.url, &body).await;
        if !resp.ok {
            return Err(resp.error());
        }
        let payload = resp.json.unwrap_or(Value::Null);
        if payload.get("ok").and_then(Value::as_bool) == Some(false) {
            let reason = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("no reason given")
                .to_string();
            return Err(FeedError::Rejected(reason));
        }
        Ok(())
    }
}
