//! Integration tests against a mock node speaking JSON-RPC over WebSocket.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use feedy_ingestion::{IngestionError, LogSubscription, RpcClient, SubscriptionSpec, UpstreamConnector};
    use feedy_store::RawLog;
    use feedy_telemetry::Metrics;
    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::Message;

    const EXCHANGE: &str = "b1e52539adedb96aaefb970e6b985990868880ec";
    const EXCHANGE_TOPIC: &str = "a6fee24309b1d83d9ec7b9e4dbb73c6f882746efbfb26db7b7d9e9f2fb6dc95a";
    const SUBSCRIPTION: &str = "0x4a8a4c0517381924f9838102c5a4dcb7";

    fn word(value: u64) -> String {
        format!("{:064x}", value)
    }

    fn exchange_log(tx: &str, block: u64) -> RawLog {
        RawLog {
            address: format!("0x{EXCHANGE}"),
            transaction_hash: tx.to_string(),
            transaction_index: 1,
            block_hash: format!("0x{block:064x}"),
            block_number: block,
            log_index: 0,
            topics: vec![format!("0x{EXCHANGE_TOPIC}"), format!("0x{}", word(0x1234))],
            data: format!(
                "0x{}{}{}{}",
                word(0xce10),
                word(0),
                word(4_000_000_000_000_000_000),
                word(1_000_000_000_000_000_000)
            ),
            removed: false,
        }
    }

    /// Serve one connection: answer the subscription, push `live` right
    /// after it, answer history with `history`, and reject anything else.
    /// Closes the socket when `close` fires.
    async fn mock_node(listener: TcpListener, history: Vec<RawLog>, live: Vec<RawLog>, close: oneshot::Receiver<()>) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        tokio::pin!(close);

        loop {
            tokio::select! {
                _ = &mut close => {
                    let _ = ws.close(None).await;
                    break;
                }
                message = ws.next() => {
                    let Some(Ok(Message::Text(text))) = message else { break };
                    let request: Value = serde_json::from_str(&text).unwrap();
                    let id = request["id"].clone();
                    match request["method"].as_str() {
                        Some("eth_subscribe") => {
                            let reply = json!({"jsonrpc": "2.0", "id": id, "result": SUBSCRIPTION});
                            ws.send(Message::Text(reply.to_string())).await.unwrap();
                            for log in &live {
                                let push = json!({
                                    "jsonrpc": "2.0",
                                    "method": "eth_subscription",
                                    "params": {"subscription": SUBSCRIPTION, "result": log},
                                });
                                ws.send(Message::Text(push.to_string())).await.unwrap();
                            }
                        }
                        Some("eth_getLogs") => {
                            let reply = json!({"jsonrpc": "2.0", "id": id, "result": history});
                            ws.send(Message::Text(reply.to_string())).await.unwrap();
                        }
                        _ => {
                            let reply = json!({
                                "jsonrpc": "2.0",
                                "id": id,
                                "error": {"code": -32601, "message": "the method does not exist"},
                            });
                            ws.send(Message::Text(reply.to_string())).await.unwrap();
                        }
                    }
                }
            }
        }
    }

    async fn start_node(history: Vec<RawLog>, live: Vec<RawLog>) -> (String, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (close_tx, close_rx) = oneshot::channel();
        tokio::spawn(mock_node(listener, history, live, close_rx));
        (url, close_tx)
    }

    fn spec() -> SubscriptionSpec {
        SubscriptionSpec::new(vec![LogSubscription::new(EXCHANGE, EXCHANGE_TOPIC).unwrap()]).unwrap()
    }

    #[tokio::test]
    async fn test_connector_against_mock_node() {
        let (url, close) = start_node(
            vec![exchange_log("0x01", 7), exchange_log("0x02", 8)],
            vec![exchange_log("0x02", 8), exchange_log("0x03", 9)],
        )
        .await;

        let connector = UpstreamConnector::connect(&url, spec(), Metrics::new().unwrap())
            .await
            .unwrap();
        let feed = connector.feed();
        let handle = tokio::spawn(connector.run());

        tokio::time::timeout(Duration::from_secs(5), async {
            while !feed.is_live() || feed.len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let records = feed.records();
        let hashes: Vec<_> = records.iter().map(|r| r.transaction_hash.as_str()).collect();
        assert_eq!(hashes, vec!["0x01", "0x02", "0x03"]);
        assert_eq!(records[0].event_name, "Exchange");
        assert_eq!(records[0].details.approx_exchange_rate.and_then(|r| r.value()), Some(0.25));

        close.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(IngestionError::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_rpc_error_is_reported() {
        let (url, _close) = start_node(Vec::new(), Vec::new()).await;
        let (client, _notifications) = RpcClient::connect(&url, Metrics::new().unwrap()).await.unwrap();

        let result = client.call("eth_chainId", json!([])).await;
        match result {
            Err(IngestionError::Rpc { method, message }) => {
                assert_eq!(method, "eth_chainId");
                assert!(message.contains("does not exist"));
            }
            other => panic!("expected an RPC error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pending_call_fails_when_node_goes_away() {
        let (url, close) = start_node(Vec::new(), Vec::new()).await;
        let (client, mut notifications) = RpcClient::connect(&url, Metrics::new().unwrap()).await.unwrap();

        close.send(()).unwrap();
        assert!(notifications.recv().await.is_none());
        assert!(matches!(
            client.call("eth_blockNumber", json!([])).await,
            Err(IngestionError::ConnectionLost)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let result = RpcClient::connect(&url, Metrics::new().unwrap()).await;
        assert!(matches!(result, Err(IngestionError::Connect { .. })));
    }
}
