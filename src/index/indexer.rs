//! Bulk write executor: commits one batch plus its checkpoint update per
//! iteration, retrying the identical command on transient failures.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::batch::{IndexCommand, RetryHandler, WriteBatch};
use super::collector::ChangeCollector;
use super::seq::Seq;
use crate::sink::checkpoint::{CheckpointStore, LAST_SEQ};
use crate::sink::client::{BulkError, SinkClient};

/// Short pause after a checkpoint write conflict before reissuing the batch.
const CONFLICT_BACKOFF: Duration = Duration::from_secs(1);
/// Cool-down after any other recoverable bulk failure.
const ERROR_COOLDOWN: Duration = Duration::from_secs(10);

pub struct Indexer {
    database: String,
    collector: ChangeCollector,
    sink: Arc<SinkClient>,
    checkpoint: CheckpointStore,
    retry: RetryHandler,
    cancel: CancellationToken,
}

impl Indexer {
    pub fn new(
        database: String,
        collector: ChangeCollector,
        sink: Arc<SinkClient>,
        checkpoint: CheckpointStore,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            database,
            collector,
            sink,
            checkpoint,
            retry: RetryHandler::default(),
            cancel,
        }
    }

    /// One iteration = one bulk attempt. A pending retry is reissued
    /// verbatim; otherwise a fresh batch is collected and the checkpoint
    /// update is appended before the attempt, so a conflict can never cause
    /// a rebuilt (and therefore different) command.
    pub async fn run(mut self) {
        loop {
            let cmd = match self.retry.take_pending() {
                Some(cmd) => {
                    tracing::debug!(
                        "Indexer[{}]: retrying previously failed bulk command",
                        self.database
                    );
                    cmd
                }
                None => match self.collector.collect(&self.cancel).await {
                    Some(batch) => self.command_from(batch),
                    // Queue closed or cancelled; a partially built batch is
                    // never committed.
                    None => break,
                },
            };

            if cmd.ops.is_empty() {
                continue;
            }

            match self.sink.bulk(&cmd.ops).await {
                Ok(()) => {
                    if let Some(seq) = &cmd.last_seq {
                        tracing::debug!(
                            "Indexer[{}]: succeeded to index change with seq=[{}]",
                            self.database,
                            seq
                        );
                    }
                }
                Err(BulkError::Conflict(msg)) => {
                    tracing::warn!(
                        "Indexer[{}]: version conflict on checkpoint update, will retry the same batch: {}",
                        self.database,
                        msg
                    );
                    self.retry.remember(cmd);
                    if !self.sleep_through(CONFLICT_BACKOFF).await {
                        break;
                    }
                }
                Err(BulkError::Fatal(msg)) => {
                    tracing::error!(
                        "Indexer[{}]: abandoning batch up to seq=[{:?}] after structural failure: {}",
                        self.database,
                        cmd.last_seq,
                        msg
                    );
                }
                Err(BulkError::Recoverable(msg)) => {
                    tracing::warn!(
                        "Indexer[{}]: failed to execute bulk request, throttling: {}",
                        self.database,
                        msg
                    );
                    self.retry.remember(cmd);
                    if !self.sleep_through(ERROR_COOLDOWN).await {
                        break;
                    }
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }
        }
        tracing::info!("Indexer[{}]: closed", self.database);
    }

    fn command_from(&self, batch: WriteBatch) -> IndexCommand {
        let last_seq = batch.last_seq.as_ref().map(Seq::to_checkpoint);
        let mut ops = batch.ops;

        if let Some(seq) = &last_seq {
            tracing::debug!(
                "Indexer[{}]: will update {} to [{}]",
                self.database,
                LAST_SEQ,
                seq
            );
            ops.push(self.checkpoint.update_op(seq));
        }
        IndexCommand { ops, last_seq }
    }

    /// False when cancelled mid-sleep.
    async fn sleep_through(&self, pause: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(pause) => true,
        }
    }
}
