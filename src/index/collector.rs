//! Assembles one write batch per indexing cycle.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::batch::WriteBatch;
use super::processor::ChangeProcessor;
use crate::queue::{ChangesReceiver, Polled};

pub struct ChangeCollector {
    rx: ChangesReceiver,
    processor: ChangeProcessor,
    bulk_size: usize,
    bulk_timeout: Duration,
}

impl ChangeCollector {
    pub fn new(
        rx: ChangesReceiver,
        processor: ChangeProcessor,
        bulk_size: usize,
        bulk_timeout: Duration,
    ) -> Self {
        Self {
            rx,
            processor,
            bulk_size,
            bulk_timeout,
        }
    }

    /// Wait for the first available change, then linger-poll to fold in more
    /// until the poll times out or the batch reaches the bulk size ceiling.
    /// `None` means the queue closed or the collector was cancelled.
    pub async fn collect(&mut self, cancel: &CancellationToken) -> Option<WriteBatch> {
        let first = tokio::select! {
            _ = cancel.cancelled() => return None,
            line = self.rx.recv() => line?,
        };

        let mut batch = WriteBatch::default();
        self.fold(&mut batch, &first);

        while batch.ops.len() < self.bulk_size {
            match self.rx.poll(self.bulk_timeout).await {
                Polled::Line(line) => self.fold(&mut batch, &line),
                Polled::Timeout | Polled::Closed => break,
            }
        }
        Some(batch)
    }

    /// The batch seq tracks the last line that produced one; lines that yield
    /// no seq (malformed, feed errors) leave it untouched.
    fn fold(&self, batch: &mut WriteBatch, line: &str) {
        let processed = self.processor.process(line);
        if let Some(op) = processed.op {
            batch.ops.push(op);
        }
        if let Some(seq) = processed.seq {
            batch.last_seq = Some(seq);
        }
    }
}
