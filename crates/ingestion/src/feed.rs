//! The feed: record store, backfill/live reconciliation and listeners.
//!
//! The live subscription is opened before history is fetched, so a log can
//! arrive on both paths. Live notifications are queued while backfilling,
//! history is sorted and appended, and only then is the queue released.
//! Every log goes through [`FeedState::accept`], which is the single place
//! duplicates are collapsed.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use feedy_decoder::decode;
use feedy_store::{ParsedEvent, RawLog, RecordStore, Snapshot};
use feedy_telemetry::Metrics;
use tracing::{debug, error, info, warn};

use crate::error::FeedError;
use crate::listeners::{ClientId, ClientRegistration, Listeners};

#[derive(Debug)]
enum Phase {
    /// History is still being fetched; live logs wait here in arrival order.
    Backfilling { pending: VecDeque<RawLog> },
    Live,
}

#[derive(Debug)]
struct FeedState {
    phase: Phase,
    store: RecordStore,
    listeners: Listeners,
}

/// Outcome of [`Feed::complete_backfill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillSummary {
    /// Historical logs returned by the node.
    pub fetched: usize,
    /// Records in the store once history and early live logs were merged.
    pub historical: usize,
    /// Buffered live logs appended after history.
    pub flushed: usize,
}

/// Shared handle to the feed.
///
/// All mutations and snapshot reads happen under one lock, so a client
/// registering concurrently with an append either sees the event in its
/// snapshot or receives it as a push, never both and never neither.
#[derive(Clone)]
pub struct Feed {
    state: Arc<Mutex<FeedState>>,
    metrics: Metrics,
}

impl Feed {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            state: Arc::new(Mutex::new(FeedState {
                phase: Phase::Backfilling {
                    pending: VecDeque::new(),
                },
                store: RecordStore::new(),
                listeners: Listeners::default(),
            })),
            metrics,
        }
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether backfill has completed and clients may connect.
    pub fn is_live(&self) -> bool {
        matches!(self.state().phase, Phase::Live)
    }

    pub fn len(&self) -> usize {
        self.state().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().store.is_empty()
    }

    /// Copy of the current records.
    pub fn records(&self) -> Vec<ParsedEvent> {
        self.state().store.records().to_vec()
    }

    pub fn client_count(&self) -> usize {
        self.state().listeners.len()
    }

    /// Hand a live notification to the feed.
    ///
    /// Queued while backfilling, appended right away once live.
    ///
    /// # Returns
    /// `true` if the log was appended now
    pub(crate) fn push_live(&self, raw: RawLog) -> bool {
        let mut guard = self.state();
        let state = &mut *guard;
        if let Phase::Backfilling { pending } = &mut state.phase {
            debug!(key = %raw.dedup_key(), "Buffering live log until backfill completes");
            pending.push_back(raw);
            self.metrics.inc_live_buffered();
            return false;
        }

        if let Some(last) = state.store.last_order_key() {
            if raw.order_key() < last {
                warn!(key = %raw.dedup_key(), block = raw.block_number, "Live log is older than the last stored record");
            }
        }
        state.accept(&raw, &self.metrics)
    }

    /// Append sorted history, switch to live and release buffered logs.
    ///
    /// Buffered logs positioned at or before the end of history are merged
    /// into the history sort; the rest are appended after it in arrival
    /// order. History is sorted by `(block, log index)`, ties keep fetch
    /// order.
    pub(crate) fn complete_backfill(&self, mut history: Vec<RawLog>) -> Result<BackfillSummary, FeedError> {
        let mut guard = self.state();
        let state = &mut *guard;
        let pending = match &mut state.phase {
            Phase::Backfilling { pending } => std::mem::take(pending),
            Phase::Live => return Err(FeedError::AlreadyLive),
        };

        let fetched = history.len();
        let boundary = history.iter().map(RawLog::order_key).max();
        let (early, late): (Vec<RawLog>, Vec<RawLog>) = pending
            .into_iter()
            .partition(|raw| boundary.is_some_and(|end| raw.order_key() <= end));

        history.extend(early);
        history.sort_by_key(RawLog::order_key);
        for raw in &history {
            state.accept(raw, &self.metrics);
        }
        let historical = state.store.len();

        state.phase = Phase::Live;
        info!(fetched, records = historical, buffered = late.len(), "Backfill complete, feed is live");

        let mut flushed = 0;
        for raw in &late {
            if state.accept(raw, &self.metrics) {
                flushed += 1;
            }
        }

        Ok(BackfillSummary {
            fetched,
            historical,
            flushed,
        })
    }

    /// Admit a downstream client.
    ///
    /// # Arguments
    /// * `wants_snapshot` - Queue the full record list as the first message
    ///
    /// # Returns
    /// The client's message stream, or [`FeedError::NotReady`] while backfilling
    pub fn register(&self, wants_snapshot: bool) -> Result<ClientRegistration, FeedError> {
        let mut state = self.state();
        if !matches!(state.phase, Phase::Live) {
            self.metrics.inc_clients_refused();
            return Err(FeedError::NotReady);
        }

        let snapshot = if wants_snapshot {
            let message = serde_json::to_string(&Snapshot::new(state.store.records()))?;
            Some(Arc::from(message))
        } else {
            None
        };

        let registration = state.listeners.register(wants_snapshot, snapshot);
        self.metrics.set_clients_connected(state.listeners.len());
        info!(client = registration.id, full = wants_snapshot, records = state.store.len(), "Client registered");
        Ok(registration)
    }

    /// Remove a client. Safe to call for a client already dropped.
    pub fn deregister(&self, id: ClientId) -> bool {
        let mut state = self.state();
        let removed = state.listeners.remove(id);
        self.metrics.set_clients_connected(state.listeners.len());
        if removed {
            info!(client = id, "Client deregistered");
        }
        removed
    }
}

impl FeedState {
    /// Dedup, decode, append and broadcast one log.
    ///
    /// # Returns
    /// `true` if the log was appended
    fn accept(&mut self, raw: &RawLog, metrics: &Metrics) -> bool {
        let key = raw.dedup_key();
        if self.store.contains(&key) {
            debug!(%key, "Duplicate event discarded");
            metrics.inc_duplicates_dropped();
            return false;
        }

        let event = match decode(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(%key, "Dropping undecodable log: {}", e);
                metrics.inc_decode_errors();
                return false;
            }
        };

        let message: Arc<str> = match serde_json::to_string(&event) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                error!(%key, "Failed to serialize event: {}", e);
                return false;
            }
        };

        self.store.append(event);
        metrics.inc_events_accepted();

        let dropped = self.listeners.broadcast(&message);
        for _ in 0..dropped {
            metrics.inc_client_send_failures();
        }
        if dropped > 0 {
            metrics.set_clients_connected(self.listeners.len());
        }
        true
    }
}
