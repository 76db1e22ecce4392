//! Turns one raw change line into a write operation (or nothing) plus the
//! extracted sequence token.
//!
//! Classification rules, in order: unparseable lines and feed-level error
//! records are dropped without a sequence (the checkpoint must not advance
//! past a change we never applied); design documents and transform failures
//! yield no operation but still return the sequence so the checkpoint can
//! move past them.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::batch::{DocRef, WriteOp};
use super::seq::Seq;
use crate::transform::Transform;

/// Namespace prefix of source-store metadata documents.
const DESIGN_DOC_PREFIX: &str = "_design/";

pub struct ProcessedChange {
    pub op: Option<WriteOp>,
    pub seq: Option<Seq>,
}

impl ProcessedChange {
    fn dropped() -> Self {
        Self { op: None, seq: None }
    }

    fn seq_only(seq: Seq) -> Self {
        Self {
            op: None,
            seq: Some(seq),
        }
    }
}

pub struct ChangeProcessor {
    database: String,
    default_index: String,
    default_type: String,
    ignore_attachments: bool,
    transform: Option<Arc<dyn Transform>>,
}

impl ChangeProcessor {
    pub fn new(
        database: String,
        default_index: String,
        default_type: String,
        ignore_attachments: bool,
        transform: Option<Arc<dyn Transform>>,
    ) -> Self {
        Self {
            database,
            default_index,
            default_type,
            ignore_attachments,
            transform,
        }
    }

    pub fn process(&self, line: &str) -> ProcessedChange {
        let mut record: Map<String, Value> = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    "Processor[{}]: failed to parse change=[{}]: {}",
                    self.database,
                    line,
                    e
                );
                return ProcessedChange::dropped();
            }
        };

        if let Some(error) = record.get("error") {
            tracing::warn!(
                "Processor[{}]: error=[{}] when processing change=[{}], reason=[{}]",
                self.database,
                error,
                line,
                record.get("reason").unwrap_or(&serde_json::Value::Null)
            );
            return ProcessedChange::dropped();
        }

        let seq = record.get("seq").and_then(Seq::from_value);
        let id = record.get("id").and_then(scalar_to_string);
        let (Some(seq), Some(id)) = (seq, id) else {
            tracing::warn!(
                "Processor[{}]: missing id or seq in change=[{}]",
                self.database,
                line
            );
            return ProcessedChange::dropped();
        };

        if id.starts_with(DESIGN_DOC_PREFIX) {
            tracing::trace!(
                "Processor[{}]: ignoring design document with id=[{}]",
                self.database,
                id
            );
            return ProcessedChange::seq_only(seq);
        }

        if let Some(transform) = &self.transform {
            record = match transform.transform(record) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(
                        "Processor[{}]: failed to transform change=[{}]: {}",
                        self.database,
                        line,
                        e
                    );
                    return ProcessedChange::seq_only(seq);
                }
            };
        }

        let ignore = flag_set(&record, "ignore");
        let deleted = flag_set(&record, "deleted");

        if ignore {
            tracing::debug!(
                "Processor[{}]: ignoring update of document [id={}]; seq=[{}]",
                self.database,
                id,
                seq
            );
            ProcessedChange::seq_only(seq)
        } else if deleted {
            tracing::debug!(
                "Processor[{}]: processing document [id={}] marked as deleted; seq=[{}]",
                self.database,
                id,
                seq
            );
            let target = self.resolve_target(&record, id);
            ProcessedChange {
                op: Some(WriteOp::Delete { target }),
                seq: Some(seq),
            }
        } else if let Some(doc) = record.get("doc").and_then(Value::as_object) {
            let mut body = doc.clone();
            body.remove("_id");
            body.remove("_rev");
            if self.ignore_attachments {
                body.remove("_attachments");
            }

            tracing::debug!(
                "Processor[{}]: processing indexing of document [id={}]; seq=[{}]",
                self.database,
                id,
                seq
            );
            let target = self.resolve_target(&record, id);
            ProcessedChange {
                op: Some(WriteOp::Index { target, body }),
                seq: Some(seq),
            }
        } else {
            tracing::warn!(
                "Processor[{}]: ignoring unknown change=[{}]; seq=[{}]",
                self.database,
                line,
                seq
            );
            ProcessedChange::seq_only(seq)
        }
    }

    /// Record-level `_index`/`_type`/`_routing`/`_parent` (typically set by a
    /// transform) override the configured defaults.
    fn resolve_target(&self, record: &Map<String, Value>, id: String) -> DocRef {
        let field = |name: &str| record.get(name).and_then(scalar_to_string);
        DocRef {
            index: field("_index").unwrap_or_else(|| self.default_index.clone()),
            doc_type: field("_type").unwrap_or_else(|| self.default_type.clone()),
            id,
            routing: field("_routing"),
            parent: field("_parent"),
        }
    }
}

fn flag_set(record: &Map<String, Value>, name: &str) -> bool {
    record.get(name).and_then(Value::as_bool).unwrap_or(false)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformError;
    use serde_json::json;

    fn processor() -> ChangeProcessor {
        ChangeProcessor::new(
            "db".to_string(),
            "db".to_string(),
            "db".to_string(),
            true,
            None,
        )
    }

    fn processor_with(transform: Arc<dyn Transform>) -> ChangeProcessor {
        ChangeProcessor::new(
            "db".to_string(),
            "db".to_string(),
            "db".to_string(),
            true,
            Some(transform),
        )
    }

    #[test]
    fn test_document_update_yields_upsert() {
        let line = r#"{"seq":"5","id":"doc1","doc":{"_id":"doc1","foo":"bar"}}"#;
        let out = processor().process(line);

        assert_eq!(out.seq.unwrap().to_checkpoint(), "5");
        let Some(WriteOp::Index { target, body }) = out.op else {
            panic!("expected an upsert operation");
        };
        assert_eq!(target.index, "db");
        assert_eq!(target.doc_type, "db");
        assert_eq!(target.id, "doc1");
        assert_eq!(Value::Object(body), json!({"foo": "bar"}));
    }

    #[test]
    fn test_deleted_record_yields_delete() {
        let line = r#"{"seq":"6","id":"doc1","deleted":true}"#;
        let out = processor().process(line);

        assert_eq!(out.seq.unwrap().to_checkpoint(), "6");
        let Some(WriteOp::Delete { target }) = out.op else {
            panic!("expected a delete operation");
        };
        assert_eq!(target.id, "doc1");
    }

    #[test]
    fn test_design_document_advances_checkpoint_without_op() {
        let line = r#"{"seq":"7","id":"_design/foo"}"#;
        let out = processor().process(line);

        assert!(out.op.is_none());
        assert_eq!(out.seq.unwrap().to_checkpoint(), "7");
    }

    #[test]
    fn test_malformed_line_yields_nothing() {
        let out = processor().process("not json");
        assert!(out.op.is_none());
        assert!(out.seq.is_none());
    }

    #[test]
    fn test_error_record_yields_nothing() {
        let line = r#"{"error":"unauthorized","reason":"session expired"}"#;
        let out = processor().process(line);
        assert!(out.op.is_none());
        assert!(out.seq.is_none());
    }

    #[test]
    fn test_missing_id_or_seq_yields_nothing() {
        let out = processor().process(r#"{"seq":"9"}"#);
        assert!(out.op.is_none());
        assert!(out.seq.is_none());

        let out = processor().process(r#"{"id":"doc1"}"#);
        assert!(out.op.is_none());
        assert!(out.seq.is_none());
    }

    #[test]
    fn test_record_without_doc_advances_checkpoint_only() {
        let line = r#"{"seq":"11","id":"doc1"}"#;
        let out = processor().process(line);
        assert!(out.op.is_none());
        assert_eq!(out.seq.unwrap().to_checkpoint(), "11");
    }

    #[test]
    fn test_processing_is_idempotent() {
        let line = r#"{"seq":"5","id":"doc1","doc":{"_id":"doc1","foo":"bar"}}"#;
        let p = processor();

        let first = p.process(line);
        let second = p.process(line);
        assert_eq!(first.op, second.op);
        assert_eq!(first.seq, second.seq);
    }

    #[test]
    fn test_attachments_stripped_when_configured() {
        let line = r#"{"seq":"5","id":"a","doc":{"_rev":"1-x","_attachments":{"f":{}},"k":1}}"#;
        let out = processor().process(line);

        let Some(WriteOp::Index { body, .. }) = out.op else {
            panic!("expected an upsert operation");
        };
        assert_eq!(Value::Object(body), json!({"k": 1}));
    }

    #[test]
    fn test_attachments_kept_when_not_ignored() {
        let p = ChangeProcessor::new(
            "db".to_string(),
            "db".to_string(),
            "db".to_string(),
            false,
            None,
        );
        let line = r#"{"seq":"5","id":"a","doc":{"_attachments":{"f":{}},"k":1}}"#;
        let out = p.process(line);

        let Some(WriteOp::Index { body, .. }) = out.op else {
            panic!("expected an upsert operation");
        };
        assert!(body.contains_key("_attachments"));
    }

    struct RoutingTransform;
    impl Transform for RoutingTransform {
        fn transform(
            &self,
            mut record: Map<String, Value>,
        ) -> Result<Map<String, Value>, TransformError> {
            record.insert("_index".to_string(), json!("other-index"));
            record.insert("_type".to_string(), json!("other-type"));
            record.insert("_routing".to_string(), json!("shard-7"));
            record.insert("_parent".to_string(), json!("parent-1"));
            Ok(record)
        }
    }

    #[test]
    fn test_transform_overrides_destination() {
        let line = r#"{"seq":"5","id":"doc1","doc":{"foo":"bar"}}"#;
        let out = processor_with(Arc::new(RoutingTransform)).process(line);

        let Some(WriteOp::Index { target, .. }) = out.op else {
            panic!("expected an upsert operation");
        };
        assert_eq!(target.index, "other-index");
        assert_eq!(target.doc_type, "other-type");
        assert_eq!(target.routing.as_deref(), Some("shard-7"));
        assert_eq!(target.parent.as_deref(), Some("parent-1"));
    }

    struct IgnoreTransform;
    impl Transform for IgnoreTransform {
        fn transform(
            &self,
            mut record: Map<String, Value>,
        ) -> Result<Map<String, Value>, TransformError> {
            record.insert("ignore".to_string(), json!(true));
            Ok(record)
        }
    }

    #[test]
    fn test_transform_ignore_flag_skips_record_but_keeps_seq() {
        let line = r#"{"seq":"8","id":"doc1","doc":{"foo":"bar"}}"#;
        let out = processor_with(Arc::new(IgnoreTransform)).process(line);

        assert!(out.op.is_none());
        assert_eq!(out.seq.unwrap().to_checkpoint(), "8");
    }

    struct FailingTransform;
    impl Transform for FailingTransform {
        fn transform(&self, _: Map<String, Value>) -> Result<Map<String, Value>, TransformError> {
            Err(TransformError("boom".to_string()))
        }
    }

    #[test]
    fn test_transform_failure_still_advances_checkpoint() {
        let line = r#"{"seq":"9","id":"doc1","doc":{"foo":"bar"}}"#;
        let out = processor_with(Arc::new(FailingTransform)).process(line);

        assert!(out.op.is_none());
        assert_eq!(out.seq.unwrap().to_checkpoint(), "9");
    }

    #[test]
    fn test_multi_part_seq_extracted() {
        let line = r#"{"seq":[42,"hash"],"id":"doc1","deleted":true}"#;
        let out = processor().process(line);
        assert_eq!(out.seq.unwrap().to_checkpoint(), "[42,\"hash\"]");
    }
}
