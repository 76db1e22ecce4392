//! Unified error type for the connector surface.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SluiceError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(#[from] crate::feed::transport::FeedError),

    #[error("Sink error: {0}")]
    Sink(#[from] crate::sink::client::SinkError),
}
