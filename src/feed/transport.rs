//! Streaming HTTP transport for the continuous changes feed.
//!
//! Splits the response body into newline-delimited change lines. Empty
//! lines are server heartbeats and never reach the queue.

use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::ConnectionConfig;
use crate::queue::{ChangesSender, QueueClosed};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned status {0}")]
    BadStatus(reqwest::StatusCode),

    #[error(transparent)]
    QueueClosed(#[from] QueueClosed),
}

pub struct FeedTransport {
    http: reqwest::Client,
    username: Option<String>,
    password: Option<String>,
    database: String,
}

impl FeedTransport {
    pub fn new(connection: &ConnectionConfig, database: &str) -> Result<Self, FeedError> {
        let mut builder = reqwest::Client::builder()
            .read_timeout(Duration::from_millis(connection.read_timeout_ms()));
        if connection.no_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(Self {
            http: builder.build()?,
            username: connection.username.clone(),
            password: connection.password.clone(),
            database: database.to_string(),
        })
    }

    /// Hold the streaming connection open and enqueue every change line
    /// until the server closes the stream, an error occurs, or we are
    /// cancelled. Enqueueing suspends under backpressure, which throttles
    /// the read side.
    pub async fn listen(
        &self,
        url: &str,
        tx: &ChangesSender,
        cancel: &CancellationToken,
    ) -> Result<(), FeedError> {
        let mut request = self.http.get(url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(FeedError::BadStatus(response.status()));
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                chunk = stream.next() => match chunk {
                    Some(chunk) => chunk?,
                    None => break, // server closed the feed; caller reconnects
                },
            };

            for line in lines.split(&chunk) {
                if line.is_empty() {
                    tracing::trace!("Feed[{}]: received a heartbeat", self.database);
                    continue;
                }
                tracing::trace!("Feed[{}]: received an update=[{}]", self.database, line);

                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    sent = tx.send(line) => sent?,
                }
            }
        }
        Ok(())
    }
}

/// Incremental newline splitter. Partial lines stay buffered until the next
/// chunk completes them.
#[derive(Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn split(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}
