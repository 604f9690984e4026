//! WebSocket JSON-RPC client for the upstream node.
//!
//! One background task owns the socket. Requests are correlated with their
//! responses by id; `eth_subscription` pushes are forwarded on a separate
//! channel created at connect time, so no push can race the subscribe
//! response. There is no reconnect: when the socket closes, every pending
//! call and the notification channel end with [`IngestionError::ConnectionLost`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use feedy_store::RawLog;
use feedy_telemetry::Metrics;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::connector::LogSource;
use crate::error::IngestionError;

type Reply = oneshot::Sender<Value>;

/// An `eth_subscription` push.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub subscription: String,
    pub result: Value,
}

enum Command {
    Send { id: u64, payload: String, reply: Reply },
}

/// Upstream node client.
pub struct RpcClient {
    url: String,
    commands: mpsc::UnboundedSender<Command>,
    next_id: AtomicU64,
    metrics: Metrics,
}

impl RpcClient {
    /// Connect to a node.
    ///
    /// # Arguments
    /// * `url` - WebSocket endpoint (`ws://` or `wss://`)
    /// * `metrics` - Metrics collector
    ///
    /// # Returns
    /// The client and the stream of subscription pushes
    pub async fn connect(
        url: &str,
        metrics: Metrics,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notification>), IngestionError> {
        let (socket, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|source| IngestionError::Connect {
                url: url.to_string(),
                source,
            })?;
        info!("Connected to upstream node at {}", url);

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (notification_tx, notifications) = mpsc::unbounded_channel();
        let task_url = url.to_string();
        tokio::spawn(async move {
            connection_task(socket, command_rx, notification_tx).await;
            warn!("Upstream connection to {} closed", task_url);
        });

        Ok((
            Self {
                url: url.to_string(),
                commands,
                next_id: AtomicU64::new(0),
                metrics,
            },
            notifications,
        ))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue a request and wait for its response.
    ///
    /// # Returns
    /// The `result` member of the response
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, IngestionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let start = Instant::now();
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send {
                id,
                payload: payload.to_string(),
                reply,
            })
            .map_err(|_| IngestionError::ConnectionLost)?;
        let mut response = response.await.map_err(|_| IngestionError::ConnectionLost)?;
        self.metrics
            .observe_rpc_latency(method, start.elapsed().as_secs_f64());

        if let Some(error) = response.get("error") {
            return Err(IngestionError::Rpc {
                method: method.to_string(),
                message: error.to_string(),
            });
        }
        debug!(id, method, "RPC call completed");
        Ok(response
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}

#[async_trait]
impl LogSource for RpcClient {
    async fn subscribe_logs(&self, filter: Value) -> Result<String, IngestionError> {
        let result = self.call("eth_subscribe", json!(["logs", filter])).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| IngestionError::InvalidResponse {
                method: "eth_subscribe".to_string(),
                reason: format!("expected a subscription id, got {result}"),
            })
    }

    async fn get_logs(&self, filter: Value) -> Result<Vec<RawLog>, IngestionError> {
        let result = self.call("eth_getLogs", json!([filter])).await?;
        let Value::Array(entries) = result else {
            return Err(IngestionError::InvalidResponse {
                method: "eth_getLogs".to_string(),
                reason: format!("expected an array, got {result}"),
            });
        };

        let mut logs = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<RawLog>(entry) {
                Ok(log) => logs.push(log),
                Err(e) => warn!("Skipping unparseable historical log: {}", e),
            }
        }
        Ok(logs)
    }
}

async fn connection_task<S>(
    socket: S,
    mut commands: mpsc::UnboundedReceiver<Command>,
    notifications: mpsc::UnboundedSender<Notification>,
) where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut stream) = socket.split();
    let mut pending: HashMap<u64, Reply> = HashMap::new();

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(Command::Send { id, payload, reply }) = command else {
                    // Client dropped.
                    break;
                };
                pending.insert(id, reply);
                if let Err(e) = sink.send(Message::Text(payload)).await {
                    warn!("Upstream send failed: {}", e);
                    break;
                }
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => handle_message(&text, &mut pending, &notifications),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("Upstream closed the connection: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Upstream receive error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }
    // Dropping `pending` and `notifications` fails every waiter.
}

fn handle_message(
    text: &str,
    pending: &mut HashMap<u64, Reply>,
    notifications: &mpsc::UnboundedSender<Notification>,
) {
    let Ok(mut message) = serde_json::from_str::<Value>(text) else {
        warn!("Ignoring non-JSON upstream message");
        return;
    };

    if message.get("method").and_then(Value::as_str) == Some("eth_subscription") {
        let params = message.get_mut("params").map(Value::take).unwrap_or(Value::Null);
        let Some(subscription) = params.get("subscription").and_then(Value::as_str) else {
            warn!("Ignoring subscription push without a subscription id");
            return;
        };
        let notification = Notification {
            subscription: subscription.to_string(),
            result: params.get("result").cloned().unwrap_or(Value::Null),
        };
        let _ = notifications.send(notification);
        return;
    }

    match message.get("id").and_then(Value::as_u64) {
        Some(id) => match pending.remove(&id) {
            Some(reply) => {
                let _ = reply.send(message);
            }
            None => debug!(id, "Response for unknown request id"),
        },
        None => debug!("Ignoring upstream message without id"),
    }
}
