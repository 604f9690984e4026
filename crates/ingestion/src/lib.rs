//! Upstream ingestion for the feedy event feed.
//!
//! Connects to a node over WebSocket, backfills history while a live log
//! subscription is already running, and reconciles both into one ordered,
//! deduplicated record store that downstream clients can subscribe to.

pub mod connector;
pub mod error;
pub mod feed;
pub mod listeners;
pub mod rpc_client;
pub mod subscription;

pub use connector::{LogSource, UpstreamConnector};
pub use error::{FeedError, IngestionError};
pub use feed::{BackfillSummary, Feed};
pub use listeners::{ClientId, ClientRegistration};
pub use rpc_client::{Notification, RpcClient};
pub use subscription::{LogSubscription, SubscriptionSpec};
