//! Change hand-off queue between the feed reader and the indexer.
//!
//! Strict FIFO — checkpoint correctness depends on processing changes in
//! source order. Bounded mode suspends the feed reader when the indexer
//! falls behind (backpressure); unbounded mode never blocks the producer.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
#[error("changes queue closed")]
pub struct QueueClosed;

/// Build the hand-off queue. A non-positive `throttle_size` selects the
/// unbounded discipline.
pub fn changes_queue(throttle_size: i64) -> (ChangesSender, ChangesReceiver) {
    if throttle_size <= 0 {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ChangesSender::Unbounded(tx),
            ChangesReceiver::Unbounded(rx),
        )
    } else {
        let (tx, rx) = mpsc::channel(throttle_size as usize);
        (ChangesSender::Bounded(tx), ChangesReceiver::Bounded(rx))
    }
}

pub enum ChangesSender {
    Bounded(mpsc::Sender<String>),
    Unbounded(mpsc::UnboundedSender<String>),
}

impl ChangesSender {
    /// Enqueue one raw change line. Suspends while a bounded queue is full.
    pub async fn send(&self, line: String) -> Result<(), QueueClosed> {
        match self {
            ChangesSender::Bounded(tx) => tx.send(line).await.map_err(|_| QueueClosed),
            ChangesSender::Unbounded(tx) => tx.send(line).map_err(|_| QueueClosed),
        }
    }
}

/// Result of a linger poll on the queue.
pub enum Polled {
    Line(String),
    Timeout,
    Closed,
}

pub enum ChangesReceiver {
    Bounded(mpsc::Receiver<String>),
    Unbounded(mpsc::UnboundedReceiver<String>),
}

impl ChangesReceiver {
    /// Wait indefinitely for the next line; `None` once the queue is closed
    /// and drained.
    pub async fn recv(&mut self) -> Option<String> {
        match self {
            ChangesReceiver::Bounded(rx) => rx.recv().await,
            ChangesReceiver::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Wait up to `linger` for the next line.
    pub async fn poll(&mut self, linger: Duration) -> Polled {
        match tokio::time::timeout(linger, self.recv()).await {
            Ok(Some(line)) => Polled::Line(line),
            Ok(None) => Polled::Closed,
            Err(_) => Polled::Timeout,
        }
    }
}
