//! Write operations, batches, and the retry command.

use serde_json::{Map, Value};

use super::seq::Seq;

/// Fully resolved destination for one write operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DocRef {
    pub index: String,
    pub doc_type: String,
    pub id: String,
    pub routing: Option<String>,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Upsert: same id + same content always converges to the same sink
    /// state, which is what makes batch retries safe.
    Index {
        target: DocRef,
        body: Map<String, Value>,
    },
    Delete { target: DocRef },
}

/// One indexing cycle's worth of operations plus the highest sequence
/// observed while collecting them.
#[derive(Debug, Default)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
    pub last_seq: Option<Seq>,
}

/// A rendered bulk attempt: the operations (checkpoint update included) and
/// the checkpoint value they certify.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexCommand {
    pub ops: Vec<WriteOp>,
    pub last_seq: Option<String>,
}

/// Remembers the last attempted-but-failed command so a retry reissues an
/// identical bulk call instead of re-deriving one. Holds at most one command.
#[derive(Debug, Default)]
pub struct RetryHandler {
    last_cmd: Option<IndexCommand>,
}

impl RetryHandler {
    pub fn take_pending(&mut self) -> Option<IndexCommand> {
        self.last_cmd.take()
    }

    pub fn remember(&mut self, cmd: IndexCommand) {
        self.last_cmd = Some(cmd);
    }
}
