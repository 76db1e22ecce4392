//! Change-feed sequence tokens.

use serde_json::Value;

/// Opaque position in the changes feed. Single-node sources emit a scalar
/// (string or number); clustered sources emit an array of scalars.
#[derive(Debug, Clone, PartialEq)]
pub struct Seq(Value);

impl Seq {
    /// Accepts the `seq` field of a change record. Anything other than a
    /// scalar or array is not a usable resumption token.
    pub fn from_value(value: &Value) -> Option<Seq> {
        match value {
            Value::String(_) | Value::Number(_) | Value::Array(_) => Some(Seq(value.clone())),
            _ => None,
        }
    }

    /// String form stored in the checkpoint document and echoed back to the
    /// feed as `since`. Array seqs serialize to a compact JSON array.
    pub fn to_checkpoint(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for Seq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_checkpoint())
    }
}
