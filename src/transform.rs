//! User-supplied change transform.
//!
//! The scripting engine behind it is not part of the core; the connector
//! only depends on this narrow rewrite capability. A transform may mutate
//! or remove fields, set `ignore` to skip the record, or set `_index`,
//! `_type`, `_routing`, `_parent` to override the destination.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("transform failed: {0}")]
pub struct TransformError(pub String);

pub trait Transform: Send + Sync {
    fn transform(&self, record: Map<String, Value>) -> Result<Map<String, Value>, TransformError>;
}
