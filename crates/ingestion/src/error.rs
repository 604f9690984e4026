//! Error types for upstream ingestion.

use thiserror::Error;

/// Errors raised by the upstream client and connector.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("upstream connection lost")]
    ConnectionLost,
    #[error("{method} failed: {message}")]
    Rpc { method: String, message: String },
    #[error("unexpected {method} response: {reason}")]
    InvalidResponse { method: String, reason: String },
    #[error("invalid subscription {0:?}: expected <address>:<topic>")]
    InvalidSubscription(String),
    #[error(transparent)]
    Feed(#[from] FeedError),
}

/// Errors raised by the feed itself.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("backfill has not completed yet")]
    NotReady,
    #[error("backfill already completed")]
    AlreadyLive,
    #[error("failed to serialize snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}
