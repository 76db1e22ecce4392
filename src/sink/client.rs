//! HTTP client for the sink search store: document reads, index refresh,
//! index creation, and the bulk write call.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::index::batch::{DocRef, WriteOp};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sink returned status {0} for {1}")]
    UnexpectedStatus(StatusCode, String),
}

/// How a bulk attempt failed. Conflicts and recoverable failures keep the
/// command alive for an identical retry; fatal failures abandon it.
#[derive(Debug, Error)]
pub enum BulkError {
    #[error("version conflict: {0}")]
    Conflict(String),

    #[error("structural mapping failure: {0}")]
    Fatal(String),

    #[error("bulk request failed: {0}")]
    Recoverable(String),
}

pub struct SinkClient {
    http: reqwest::Client,
    base_url: String,
}

impl SinkClient {
    pub fn new(base_url: &str) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch a document's source by id; `None` when absent.
    pub async fn get_doc(&self, index: &str, id: &str) -> Result<Option<Value>, SinkError> {
        let url = format!(
            "{}/{}/_doc/{}",
            self.base_url,
            index,
            urlencoding::encode(id)
        );
        let resp = self.http.get(&url).send().await?;
        match resp.status() {
            status if status.is_success() => {
                let body: Value = resp.json().await?;
                Ok(body.get("_source").cloned())
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(SinkError::UnexpectedStatus(status, url)),
        }
    }

    /// Make recent writes visible to reads. A missing index (first run,
    /// checkpoint never written) is not an error.
    pub async fn refresh(&self, index: &str) -> Result<(), SinkError> {
        let url = format!("{}/{}/_refresh", self.base_url, index);
        let resp = self.http.post(&url).send().await?;
        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            status => Err(SinkError::UnexpectedStatus(status, url)),
        }
    }

    /// Create an index, tolerating "already exists".
    pub async fn create_index(&self, index: &str) -> Result<(), SinkError> {
        let url = format!("{}/{}", self.base_url, index);
        let resp = self.http.put(&url).send().await?;
        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if error_type(&body)
            .map(|t| t.contains("already_exists"))
            .unwrap_or(false)
        {
            return Ok(());
        }
        Err(SinkError::UnexpectedStatus(status, url))
    }

    /// Submit one ordered bulk call. The sink applies the operations as a
    /// unit from the caller's perspective; per-item failures are classified
    /// into the retry taxonomy.
    pub async fn bulk(&self, ops: &[WriteOp]) -> Result<(), BulkError> {
        let url = format!("{}/_bulk", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(render_bulk(ops))
            .send()
            .await
            .map_err(|e| BulkError::Recoverable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(BulkError::Recoverable(format!(
                "bulk call returned status {}",
                resp.status()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| BulkError::Recoverable(e.to_string()))?;
        classify_bulk_response(&body)
    }
}

/// Render operations as the sink's newline-delimited bulk payload.
fn render_bulk(ops: &[WriteOp]) -> String {
    let mut payload = String::new();
    for op in ops {
        match op {
            WriteOp::Index { target, body } => {
                payload.push_str(&json!({ "index": action_meta(target) }).to_string());
                payload.push('\n');
                payload.push_str(&Value::Object(body.clone()).to_string());
                payload.push('\n');
            }
            WriteOp::Delete { target } => {
                payload.push_str(&json!({ "delete": action_meta(target) }).to_string());
                payload.push('\n');
            }
        }
    }
    payload
}

fn action_meta(target: &DocRef) -> Value {
    let mut meta = Map::new();
    meta.insert("_index".to_string(), json!(target.index));
    meta.insert("_type".to_string(), json!(target.doc_type));
    meta.insert("_id".to_string(), json!(target.id));
    if let Some(routing) = &target.routing {
        meta.insert("routing".to_string(), json!(routing));
    }
    if let Some(parent) = &target.parent {
        meta.insert("parent".to_string(), json!(parent));
    }
    Value::Object(meta)
}

/// Walk the per-item results. Conflicts win over everything (the whole batch
/// is retried verbatim), then structural failures (fatal), then the rest
/// (recoverable).
fn classify_bulk_response(body: &Value) -> Result<(), BulkError> {
    if !body.get("errors").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(());
    }

    let mut fatal: Option<String> = None;
    let mut recoverable: Option<String> = None;

    for item in body
        .get("items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        // Each item is wrapped in its action name: {"index": {...}}.
        let Some(result) = item.as_object().and_then(|m| m.values().next()) else {
            continue;
        };
        let status = result.get("status").and_then(Value::as_u64).unwrap_or(0);
        let Some(error) = result.get("error") else {
            continue;
        };
        let error_kind = error_type(error).unwrap_or_default();
        let message = format!("status={} error={}", status, error);

        if status == 409 || error_kind == "version_conflict_engine_exception" {
            return Err(BulkError::Conflict(message));
        }
        if error_kind.contains("mapp") || error_kind.contains("parsing") {
            fatal.get_or_insert(message);
        } else {
            recoverable.get_or_insert(message);
        }
    }

    match (fatal, recoverable) {
        (Some(message), _) => Err(BulkError::Fatal(message)),
        (None, Some(message)) => Err(BulkError::Recoverable(message)),
        // errors=true but nothing actionable in items; treat as transient.
        (None, None) => Err(BulkError::Recoverable(
            "bulk response reported errors without failed items".to_string(),
        )),
    }
}

/// Error type string from either `{"error": {"type": ...}}` or a bare
/// error object.
fn error_type(value: &Value) -> Option<&str> {
    let error = value.get("error").unwrap_or(value);
    error.get("type").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_ref(id: &str) -> DocRef {
        DocRef {
            index: "db".to_string(),
            doc_type: "db".to_string(),
            id: id.to_string(),
            routing: None,
            parent: None,
        }
    }

    #[test]
    fn test_render_bulk_upsert_and_delete() {
        let mut body = Map::new();
        body.insert("foo".to_string(), json!("bar"));
        let ops = vec![
            WriteOp::Index {
                target: doc_ref("doc1"),
                body,
            },
            WriteOp::Delete {
                target: doc_ref("doc2"),
            },
        ];

        let payload = render_bulk(&ops);
        let lines: Vec<&str> = payload.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            serde_json::from_str::<Value>(lines[0]).unwrap(),
            json!({"index": {"_index": "db", "_type": "db", "_id": "doc1"}})
        );
        assert_eq!(
            serde_json::from_str::<Value>(lines[1]).unwrap(),
            json!({"foo": "bar"})
        );
        assert_eq!(
            serde_json::from_str::<Value>(lines[2]).unwrap(),
            json!({"delete": {"_index": "db", "_type": "db", "_id": "doc2"}})
        );
        assert!(payload.ends_with('\n'));
    }

    #[test]
    fn test_render_bulk_includes_routing_and_parent() {
        let mut target = doc_ref("doc1");
        target.routing = Some("shard-1".to_string());
        target.parent = Some("p-1".to_string());
        let payload = render_bulk(&[WriteOp::Delete { target }]);

        let meta: Value = serde_json::from_str(payload.lines().next().unwrap()).unwrap();
        assert_eq!(meta["delete"]["routing"], "shard-1");
        assert_eq!(meta["delete"]["parent"], "p-1");
    }

    #[test]
    fn test_classify_clean_response() {
        let body = json!({"took": 3, "errors": false, "items": []});
        assert!(classify_bulk_response(&body).is_ok());
    }

    #[test]
    fn test_classify_version_conflict() {
        let body = json!({
            "errors": true,
            "items": [
                {"index": {"_id": "doc1", "status": 200}},
                {"index": {"_id": "checkpoint", "status": 409,
                           "error": {"type": "version_conflict_engine_exception"}}}
            ]
        });
        assert!(matches!(
            classify_bulk_response(&body),
            Err(BulkError::Conflict(_))
        ));
    }

    #[test]
    fn test_classify_mapping_failure_is_fatal() {
        let body = json!({
            "errors": true,
            "items": [
                {"index": {"_id": "doc1", "status": 400,
                           "error": {"type": "mapper_parsing_exception"}}}
            ]
        });
        assert!(matches!(
            classify_bulk_response(&body),
            Err(BulkError::Fatal(_))
        ));
    }

    #[test]
    fn test_classify_other_failure_is_recoverable() {
        let body = json!({
            "errors": true,
            "items": [
                {"index": {"_id": "doc1", "status": 503,
                           "error": {"type": "es_rejected_execution_exception"}}}
            ]
        });
        assert!(matches!(
            classify_bulk_response(&body),
            Err(BulkError::Recoverable(_))
        ));
    }

    #[test]
    fn test_conflict_wins_over_fatal() {
        let body = json!({
            "errors": true,
            "items": [
                {"index": {"_id": "a", "status": 400,
                           "error": {"type": "mapper_parsing_exception"}}},
                {"index": {"_id": "b", "status": 409,
                           "error": {"type": "version_conflict_engine_exception"}}}
            ]
        });
        assert!(matches!(
            classify_bulk_response(&body),
            Err(BulkError::Conflict(_))
        ));
    }
}
