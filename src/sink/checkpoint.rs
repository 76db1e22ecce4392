//! Checkpoint store: one document per source database in a dedicated
//! checkpoint index, holding the last successfully applied sequence.

use std::sync::Arc;

use serde_json::{json, Map};

use super::client::{SinkClient, SinkError};
use crate::index::batch::{DocRef, WriteOp};

pub const LAST_SEQ: &str = "last_seq";

/// Mapping type of checkpoint documents in the bulk action metadata.
const CHECKPOINT_TYPE: &str = "checkpoint";

#[derive(Clone)]
pub struct CheckpointStore {
    client: Arc<SinkClient>,
    index: String,
    database: String,
}

impl CheckpointStore {
    pub fn new(client: Arc<SinkClient>, index: String, database: String) -> Self {
        Self {
            client,
            index,
            database,
        }
    }

    /// Read the last stored sequence, refreshing first so the read sees the
    /// latest committed bulk. `None` on first run.
    pub async fn read(&self) -> Result<Option<String>, SinkError> {
        self.client.refresh(&self.index).await?;

        let doc = self.client.get_doc(&self.index, &self.database).await?;
        let last_seq = doc.and_then(|source| {
            source
                .get(LAST_SEQ)
                .and_then(|v| v.as_str())
                .map(str::to_owned)
        });

        match &last_seq {
            Some(seq) => {
                tracing::info!(
                    "Checkpoint[{}]: read {}=[{}] from index",
                    self.database,
                    LAST_SEQ,
                    seq
                );
            }
            None => {
                tracing::info!(
                    "Checkpoint[{}]: no {} value found in index",
                    self.database,
                    LAST_SEQ
                );
            }
        }
        Ok(last_seq)
    }

    /// The upsert that persists `last_seq`, bundled into the same bulk call
    /// as the writes it certifies.
    pub fn update_op(&self, last_seq: &str) -> WriteOp {
        let mut body = Map::new();
        body.insert(LAST_SEQ.to_string(), json!(last_seq));
        WriteOp::Index {
            target: DocRef {
                index: self.index.clone(),
                doc_type: CHECKPOINT_TYPE.to_string(),
                id: self.database.clone(),
                routing: None,
                parent: None,
            },
            body,
        }
    }
}
