//! Upstream connector: subscribe, backfill, then stream live.

use async_trait::async_trait;
use feedy_store::RawLog;
use feedy_telemetry::Metrics;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::IngestionError;
use crate::feed::{BackfillSummary, Feed};
use crate::rpc_client::{Notification, RpcClient};
use crate::subscription::SubscriptionSpec;

/// The two node calls the connector needs.
///
/// Implemented by [`RpcClient`]; tests script their own.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// `eth_subscribe("logs", filter)`.
    ///
    /// # Returns
    /// The subscription id that pushes will carry
    async fn subscribe_logs(&self, filter: Value) -> Result<String, IngestionError>;

    /// `eth_getLogs(filter)`.
    async fn get_logs(&self, filter: Value) -> Result<Vec<RawLog>, IngestionError>;
}

/// Owns the upstream connection and the feed it populates.
pub struct UpstreamConnector<S> {
    source: S,
    notifications: mpsc::UnboundedReceiver<Notification>,
    spec: SubscriptionSpec,
    feed: Feed,
    metrics: Metrics,
}

impl UpstreamConnector<RpcClient> {
    /// Connect to a node over WebSocket.
    pub async fn connect(url: &str, spec: SubscriptionSpec, metrics: Metrics) -> Result<Self, IngestionError> {
        let (client, notifications) = RpcClient::connect(url, metrics.clone()).await?;
        Ok(Self::new(client, notifications, spec, metrics))
    }
}

impl<S: LogSource> UpstreamConnector<S> {
    /// Create a connector over an established source.
    ///
    /// # Arguments
    /// * `source` - Node the calls go to
    /// * `notifications` - Subscription pushes from the same connection
    /// * `spec` - Pairs to backfill and subscribe to
    /// * `metrics` - Metrics collector
    pub fn new(
        source: S,
        notifications: mpsc::UnboundedReceiver<Notification>,
        spec: SubscriptionSpec,
        metrics: Metrics,
    ) -> Self {
        Self {
            source,
            notifications,
            spec,
            feed: Feed::new(metrics.clone()),
            metrics,
        }
    }

    /// Handle to the feed, for the fan-out server.
    pub fn feed(&self) -> Feed {
        self.feed.clone()
    }

    /// Run until the upstream connection is lost.
    ///
    /// Subscribes first, then fetches history one pair at a time while live
    /// pushes are buffered by the feed. Never returns `Ok` on its own: the
    /// live loop only ends when the connection does.
    pub async fn run(self) -> Result<(), IngestionError> {
        let Self {
            source,
            mut notifications,
            spec,
            feed,
            metrics,
        } = self;

        let subscription = source.subscribe_logs(spec.live_filter()).await?;
        info!(subscription = %subscription, pairs = spec.pairs().len(), "Created live log subscription");

        let history = fetch_history(&source, &spec, &metrics);
        tokio::pin!(history);
        let logs = loop {
            tokio::select! {
                biased;

                notification = notifications.recv() => match notification {
                    Some(notification) => dispatch(&feed, &subscription, notification),
                    None => return Err(IngestionError::ConnectionLost),
                },
                result = &mut history => break result?,
            }
        };
        // Pushes forwarded ahead of the last history reply must still be
        // buffered, not handled as live.
        while let Ok(notification) = notifications.try_recv() {
            dispatch(&feed, &subscription, notification);
        }

        let BackfillSummary { fetched, historical, flushed } = feed.complete_backfill(logs)?;
        info!(fetched, historical, flushed, "Historical data loaded");

        while let Some(notification) = notifications.recv().await {
            dispatch(&feed, &subscription, notification);
        }

        error!("Upstream connection lost");
        Err(IngestionError::ConnectionLost)
    }
}

/// Fetch all history, one `eth_getLogs` per pair, strictly in sequence.
async fn fetch_history<S: LogSource>(
    source: &S,
    spec: &SubscriptionSpec,
    metrics: &Metrics,
) -> Result<Vec<RawLog>, IngestionError> {
    info!("Fetching historical logs for {} pairs", spec.pairs().len());
    let mut logs = Vec::new();
    for pair in spec.pairs() {
        let batch = source.get_logs(pair.backfill_filter()).await?;
        debug!(pair = %pair, count = batch.len(), "Fetched historical logs");
        metrics.inc_backfill_records(batch.len() as u64);
        logs.extend(batch);
    }
    info!("Fetched {} historical logs", logs.len());
    Ok(logs)
}

fn dispatch(feed: &Feed, subscription: &str, notification: Notification) {
    if notification.subscription != subscription {
        debug!(subscription = %notification.subscription, "Ignoring push for a foreign subscription");
        return;
    }

    let raw: RawLog = match serde_json::from_value(notification.result) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Skipping unparseable live log: {}", e);
            return;
        }
    };
    if raw.removed {
        warn!(key = %raw.dedup_key(), "Ignoring log removed by a reorg");
        return;
    }
    feed.push_live(raw);
}
