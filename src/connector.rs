//! Composition root: wires the two worker loops together and owns their
//! lifecycle. The feed reader and the indexer share nothing but the change
//! hand-off queue and the shutdown token.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SluiceConfig;
use crate::error::SluiceError;
use crate::feed::slurper::Slurper;
use crate::feed::transport::FeedTransport;
use crate::feed::url::UrlBuilder;
use crate::index::collector::ChangeCollector;
use crate::index::indexer::Indexer;
use crate::index::processor::ChangeProcessor;
use crate::queue::changes_queue;
use crate::sink::checkpoint::CheckpointStore;
use crate::sink::client::SinkClient;
use crate::transform::Transform;

pub struct Connector {
    cancel: CancellationToken,
    slurper: JoinHandle<()>,
    indexer: JoinHandle<()>,
}

impl Connector {
    /// Build every component from configuration and start both loops.
    pub async fn spawn(
        config: SluiceConfig,
        transform: Option<Arc<dyn Transform>>,
    ) -> Result<Self, SluiceError> {
        let database = config.database.database.clone();
        let index_name = config
            .index
            .name
            .clone()
            .unwrap_or_else(|| database.clone());
        let type_name = config
            .index
            .doc_type
            .clone()
            .unwrap_or_else(|| database.clone());

        tracing::info!(
            "Connector: starting changes stream: url=[{}], db=[{}], filter=[{}], indexing to [{}]/[{}]",
            config.connection.url,
            database,
            config.database.filter.as_deref().unwrap_or("-"),
            index_name,
            type_name
        );

        let sink = Arc::new(SinkClient::new(&config.index.sink_url)?);

        // Best-effort: the sink may still be starting up; the first bulk
        // call will create the index anyway.
        if let Err(e) = sink.create_index(&index_name).await {
            tracing::warn!(
                "Connector: could not pre-create index [{}]: {}",
                index_name,
                e
            );
        }

        let checkpoint = CheckpointStore::new(
            sink.clone(),
            config.index.checkpoint_index.clone(),
            database.clone(),
        );

        let (tx, rx) = changes_queue(config.index.throttle_size);
        let cancel = CancellationToken::new();

        let slurper = Slurper::new(
            database.clone(),
            checkpoint.clone(),
            UrlBuilder::new(&config.connection, &config.database),
            FeedTransport::new(&config.connection, &database)?,
            tx,
            cancel.clone(),
        );

        let processor = ChangeProcessor::new(
            database.clone(),
            index_name,
            type_name,
            config.database.ignore_attachments,
            transform,
        );
        let collector = ChangeCollector::new(
            rx,
            processor,
            config.index.bulk_size,
            Duration::from_millis(config.index.bulk_timeout_ms),
        );
        let indexer = Indexer::new(database, collector, sink, checkpoint, cancel.clone());

        Ok(Self {
            cancel,
            slurper: tokio::spawn(slurper.run()),
            indexer: tokio::spawn(indexer.run()),
        })
    }

    /// Request a cooperative shutdown; both loops exit at their next
    /// blocking point.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) {
        let _ = self.slurper.await;
        let _ = self.indexer.await;
    }
}
