//! Prometheus metrics for the feedy event feed.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntGauge, Registry, TextEncoder,
};

/// Metrics collector for the feed service.
///
/// Every instance owns its own registry, so independent feeds (and tests)
/// never collide on metric names.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    events_accepted: IntCounter,
    duplicates_dropped: IntCounter,
    decode_errors: IntCounter,
    live_buffered: IntCounter,
    backfill_records: IntCounter,
    clients_connected: IntGauge,
    clients_refused: IntCounter,
    client_send_failures: IntCounter,
    rpc_latency: HistogramVec,
}

impl Metrics {
    /// Create a new metrics instance.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_accepted = IntCounter::new(
            "feedy_events_accepted_total",
            "Total number of decoded events appended to the record store",
        )?;
        let duplicates_dropped = IntCounter::new(
            "feedy_duplicates_dropped_total",
            "Total number of logs discarded because their key was already stored",
        )?;
        let decode_errors = IntCounter::new(
            "feedy_decode_errors_total",
            "Total number of logs dropped because they could not be decoded",
        )?;
        let live_buffered = IntCounter::new(
            "feedy_live_buffered_total",
            "Total number of live notifications buffered while backfilling",
        )?;
        let backfill_records = IntCounter::new(
            "feedy_backfill_records_total",
            "Total number of historical logs fetched during backfill",
        )?;
        let clients_connected = IntGauge::new(
            "feedy_clients_connected",
            "Number of currently registered downstream clients",
        )?;
        let clients_refused = IntCounter::new(
            "feedy_clients_refused_total",
            "Total number of clients refused before backfill completed",
        )?;
        let client_send_failures = IntCounter::new(
            "feedy_client_send_failures_total",
            "Total number of clients dropped after a delivery failure",
        )?;
        let rpc_latency = HistogramVec::new(
            HistogramOpts::new("feedy_rpc_latency_seconds", "Upstream RPC call latency in seconds"),
            &["method"],
        )?;

        registry.register(Box::new(events_accepted.clone()))?;
        registry.register(Box::new(duplicates_dropped.clone()))?;
        registry.register(Box::new(decode_errors.clone()))?;
        registry.register(Box::new(live_buffered.clone()))?;
        registry.register(Box::new(backfill_records.clone()))?;
        registry.register(Box::new(clients_connected.clone()))?;
        registry.register(Box::new(clients_refused.clone()))?;
        registry.register(Box::new(client_send_failures.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;

        Ok(Self {
            registry,
            events_accepted,
            duplicates_dropped,
            decode_errors,
            live_buffered,
            backfill_records,
            clients_connected,
            clients_refused,
            client_send_failures,
            rpc_latency,
        })
    }

    pub fn inc_events_accepted(&self) {
        self.events_accepted.inc();
    }

    pub fn inc_duplicates_dropped(&self) {
        self.duplicates_dropped.inc();
    }

    pub fn inc_decode_errors(&self) {
        self.decode_errors.inc();
    }

    pub fn inc_live_buffered(&self) {
        self.live_buffered.inc();
    }

    pub fn inc_backfill_records(&self, count: u64) {
        self.backfill_records.inc_by(count);
    }

    /// Set the connected clients gauge.
    pub fn set_clients_connected(&self, count: usize) {
        self.clients_connected.set(count as i64);
    }

    pub fn inc_clients_refused(&self) {
        self.clients_refused.inc();
    }

    pub fn inc_client_send_failures(&self) {
        self.client_send_failures.inc();
    }

    /// Record upstream RPC latency.
    pub fn observe_rpc_latency(&self, method: &str, duration_secs: f64) {
        self.rpc_latency.with_label_values(&[method]).observe(duration_secs);
    }

    pub fn events_accepted(&self) -> u64 {
        self.events_accepted.get()
    }

    pub fn duplicates_dropped(&self) -> u64 {
        self.duplicates_dropped.get()
    }

    pub fn clients_connected(&self) -> i64 {
        self.clients_connected.get()
    }

    /// Get Prometheus metrics as a string.
    pub fn gather(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
