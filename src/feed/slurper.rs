//! Feed reader loop: keeps a live subscription to the changes feed,
//! resuming from the last checkpoint on every reconnect.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::transport::FeedTransport;
use super::url::UrlBuilder;
use crate::queue::ChangesSender;
use crate::sink::checkpoint::CheckpointStore;

/// Fixed cool-down after a failed iteration, to avoid log flooding.
const ERROR_COOLDOWN: Duration = Duration::from_secs(10);

pub struct Slurper {
    database: String,
    checkpoint: CheckpointStore,
    url: UrlBuilder,
    transport: FeedTransport,
    tx: ChangesSender,
    cancel: CancellationToken,
}

impl Slurper {
    pub fn new(
        database: String,
        checkpoint: CheckpointStore,
        url: UrlBuilder,
        transport: FeedTransport,
        tx: ChangesSender,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            database,
            checkpoint,
            url,
            transport,
            tx,
            cancel,
        }
    }

    /// Never gives up on its own: every failure (checkpoint read, connect,
    /// mid-stream I/O) aborts the iteration, and the next one restarts the
    /// whole read-checkpoint → reconnect cycle. Exits only on cancellation.
    pub async fn run(self) {
        while !self.cancel.is_cancelled() {
            if let Err(e) = self.slurp().await {
                if self.cancel.is_cancelled() {
                    break;
                }
                tracing::warn!("Slurper[{}]: unhandled error, throttling: {:#}", self.database, e);
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(ERROR_COOLDOWN) => {}
                }
            }
        }
        tracing::info!("Slurper[{}]: closed", self.database);
    }

    async fn slurp(&self) -> anyhow::Result<()> {
        let last_seq = self.checkpoint.read().await?;

        let url = self.url.build(last_seq.as_deref());
        tracing::debug!("Slurper[{}]: using changes feed URL=[{}]", self.database, url);

        self.transport.listen(&url, &self.tx, &self.cancel).await?;
        Ok(())
    }
}
