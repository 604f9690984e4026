//! Fan-out tests with real WebSocket clients.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use feedy_ingestion::{
        Feed, IngestionError, LogSource, LogSubscription, Notification, SubscriptionSpec, UpstreamConnector,
    };
    use feedy_store::RawLog;
    use feedy_telemetry::Metrics;
    use futures::{SinkExt, StreamExt};
    use serde_json::Value;
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::{self, Message};
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    const AUCTION: &str = "1eb806d40b102ac71ffb5b3f4bef8a049ea09de7";
    const WITHDRAWAL: &str = "2717ead6b9200dd235aad468c9809ea400fe33ac69b5bfaa6d3e90fc922b6398";
    const SUBSCRIPTION: &str = "0x1";

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    /// Returns a fixed history, or never returns when `history` is `None`.
    struct FixedHistory(Option<Vec<RawLog>>);

    #[async_trait]
    impl LogSource for FixedHistory {
        async fn subscribe_logs(&self, _filter: Value) -> Result<String, IngestionError> {
            Ok(SUBSCRIPTION.to_string())
        }

        async fn get_logs(&self, _filter: Value) -> Result<Vec<RawLog>, IngestionError> {
            match &self.0 {
                Some(history) => Ok(history.clone()),
                None => std::future::pending().await,
            }
        }
    }

    fn withdrawal(tx: &str, block: u64) -> RawLog {
        RawLog {
            address: format!("0x{AUCTION}"),
            transaction_hash: tx.to_string(),
            transaction_index: 0,
            block_hash: format!("0x{block:064x}"),
            block_number: block,
            log_index: 0,
            topics: vec![
                format!("0x{WITHDRAWAL}"),
                format!("0x{:064x}", 0xce10),
                format!("0x{:064x}", 0xbeef),
            ],
            data: format!("0x{:064x}", 3_000_000_000_000_000_000u64),
            removed: false,
        }
    }

    fn push(raw: &RawLog) -> Notification {
        Notification {
            subscription: SUBSCRIPTION.to_string(),
            result: serde_json::to_value(raw).unwrap(),
        }
    }

    struct Harness {
        url: String,
        feed: Feed,
        live: mpsc::UnboundedSender<Notification>,
    }

    async fn start(history: Option<Vec<RawLog>>) -> Harness {
        let metrics = Metrics::new().unwrap();
        let spec = SubscriptionSpec::new(vec![LogSubscription::new(AUCTION, WITHDRAWAL).unwrap()]).unwrap();
        let (live, notifications) = mpsc::unbounded_channel();
        let backfilled = history.is_some();
        let connector = UpstreamConnector::new(FixedHistory(history), notifications, spec, metrics.clone());
        let feed = connector.feed();
        tokio::spawn(connector.run());

        let listener = feedy_server::bind("127.0.0.1", 0).await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(feedy_server::serve(listener, feed.clone(), metrics));

        if backfilled {
            eventually(|| feed.is_live()).await;
        }
        Harness { url, feed, live }
    }

    async fn eventually(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    async fn connect(url: &str) -> Client {
        let (client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        client
    }

    async fn next_json(client: &mut Client) -> Value {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no message received")
            .expect("stream ended")
            .unwrap();
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    async fn assert_silent(client: &mut Client) {
        let next = tokio::time::timeout(Duration::from_millis(100), client.next()).await;
        assert!(next.is_err(), "unexpected message {next:?}");
    }

    #[tokio::test]
    async fn test_full_client_receives_snapshot_first() {
        let harness = start(Some(vec![withdrawal("0x01", 1), withdrawal("0x02", 2)])).await;

        let mut full = connect(&format!("{}/full", harness.url)).await;
        let mut partial = connect(&harness.url).await;
        eventually(|| harness.feed.client_count() == 2).await;

        let snapshot = next_json(&mut full).await;
        assert_eq!(snapshot["type"], "snapshot");
        let records = snapshot["records"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["transactionHash"], "0x01");
        assert_eq!(records[1]["approxValue0"], 3.0);

        harness.live.send(push(&withdrawal("0x03", 3))).unwrap();

        let event = next_json(&mut full).await;
        assert_eq!(event["type"], "event");
        assert_eq!(event["transactionHash"], "0x03");

        let event = next_json(&mut partial).await;
        assert_eq!(event["transactionHash"], "0x03");
        assert_silent(&mut partial).await;
    }

    #[tokio::test]
    async fn test_clients_refused_until_backfill_completes() {
        let harness = start(None).await;

        for path in ["", "/full"] {
            let result = tokio_tungstenite::connect_async(format!("{}{}", harness.url, path)).await;
            match result {
                Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 503),
                other => panic!("expected a refusal, got {:?}", other.map(|_| ())),
            }
        }
        assert_eq!(harness.feed.client_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_client_does_not_affect_others() {
        let harness = start(Some(Vec::new())).await;

        let mut a = connect(&harness.url).await;
        let mut b = connect(&harness.url).await;
        let mut c = connect(&harness.url).await;
        eventually(|| harness.feed.client_count() == 3).await;

        b.close(None).await.unwrap();
        eventually(|| harness.feed.client_count() == 2).await;

        harness.live.send(push(&withdrawal("0x0a", 10))).unwrap();
        assert_eq!(next_json(&mut a).await["transactionHash"], "0x0a");
        assert_eq!(next_json(&mut c).await["transactionHash"], "0x0a");
    }

    #[tokio::test]
    async fn test_abandoned_handshake_leaves_no_client() {
        use tokio::io::AsyncWriteExt;

        let harness = start(Some(Vec::new())).await;
        let addr = harness.url.trim_start_matches("ws://");

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(
                b"GET /full HTTP/1.1\r\n\
                  Host: 127.0.0.1\r\n\
                  Connection: Upgrade\r\n\
                  Upgrade: websocket\r\n\
                  Sec-WebSocket-Version: 13\r\n\
                  Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
            )
            .await
            .unwrap();
        drop(stream);

        tokio::time::sleep(Duration::from_millis(200)).await;
        eventually(|| harness.feed.client_count() == 0).await;

        let _client = connect(&harness.url).await;
        eventually(|| harness.feed.client_count() == 1).await;
    }

    #[tokio::test]
    async fn test_inbound_frames_are_ignored() {
        let harness = start(Some(Vec::new())).await;
        let mut client = connect(&harness.url).await;
        eventually(|| harness.feed.client_count() == 1).await;

        client.send(Message::Text("subscribe please".to_string())).await.unwrap();
        assert_silent(&mut client).await;

        harness.live.send(push(&withdrawal("0x0b", 11))).unwrap();
        assert_eq!(next_json(&mut client).await["transactionHash"], "0x0b");
        assert_eq!(harness.feed.client_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_event_is_pushed_once() {
        let harness = start(Some(vec![withdrawal("0x01", 1)])).await;
        let mut client = connect(&harness.url).await;
        eventually(|| harness.feed.client_count() == 1).await;

        harness.live.send(push(&withdrawal("0x01", 1))).unwrap();
        harness.live.send(push(&withdrawal("0x02", 2))).unwrap();
        harness.live.send(push(&withdrawal("0x02", 2))).unwrap();

        assert_eq!(next_json(&mut client).await["transactionHash"], "0x02");
        assert_silent(&mut client).await;
        assert_eq!(harness.feed.len(), 2);
    }
}
