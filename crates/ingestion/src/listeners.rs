//! Registry of downstream listeners.
//!
//! Each listener gets a bounded channel of pre-serialized messages; its
//! connection task drains it. A listener whose receiver is gone, or whose
//! queue is full because it stopped reading, is removed on the next
//! broadcast without affecting the others.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

/// Messages a client may fall behind by before it is dropped.
pub const CLIENT_QUEUE_CAPACITY: usize = 4096;

/// Identifies a registered client for its whole lifetime.
pub type ClientId = u64;

/// Handle returned to a newly admitted client.
#[derive(Debug)]
pub struct ClientRegistration {
    pub id: ClientId,
    pub wants_snapshot: bool,
    /// Messages to deliver, in order. A snapshot, when requested, is first.
    pub messages: mpsc::Receiver<Arc<str>>,
}

#[derive(Debug)]
struct Listener {
    wants_snapshot: bool,
    sender: mpsc::Sender<Arc<str>>,
}

#[derive(Debug)]
pub(crate) struct Listeners {
    capacity: usize,
    next_id: ClientId,
    entries: BTreeMap<ClientId, Listener>,
}

impl Default for Listeners {
    fn default() -> Self {
        Self::with_capacity(CLIENT_QUEUE_CAPACITY)
    }
}

impl Listeners {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            // The first message always fits.
            capacity: capacity.max(1),
            next_id: 0,
            entries: BTreeMap::new(),
        }
    }

    /// Register a client. `first` is queued before anything broadcast later.
    pub(crate) fn register(&mut self, wants_snapshot: bool, first: Option<Arc<str>>) -> ClientRegistration {
        let (sender, messages) = mpsc::channel(self.capacity);
        if let Some(message) = first {
            // Fresh channel with a live receiver.
            let _ = sender.try_send(message);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, Listener { wants_snapshot, sender });

        ClientRegistration {
            id,
            wants_snapshot,
            messages,
        }
    }

    pub(crate) fn remove(&mut self, id: ClientId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Queue `message` for every listener, dropping the ones that are gone.
    ///
    /// # Returns
    /// Number of listeners dropped
    pub(crate) fn broadcast(&mut self, message: &Arc<str>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, listener| match listener.sender.try_send(Arc::clone(message)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(client = id, full = listener.wants_snapshot, "Client queue full, dropping client");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(client = id, full = listener.wants_snapshot, "Client channel closed, dropping client");
                false
            }
        });
        before - self.entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_message_precedes_broadcasts() {
        let mut listeners = Listeners::default();
        let mut client = listeners.register(true, Some(Arc::from("snapshot")));
        listeners.broadcast(&Arc::from("live"));

        assert_eq!(&*client.messages.try_recv().unwrap(), "snapshot");
        assert_eq!(&*client.messages.try_recv().unwrap(), "live");
    }

    #[test]
    fn closed_listener_is_dropped_without_affecting_others() {
        let mut listeners = Listeners::default();
        let mut a = listeners.register(false, None);
        let b = listeners.register(false, None);
        let mut c = listeners.register(false, None);
        drop(b);

        assert_eq!(listeners.broadcast(&Arc::from("event")), 1);
        assert_eq!(listeners.len(), 2);
        assert_eq!(&*a.messages.try_recv().unwrap(), "event");
        assert_eq!(&*c.messages.try_recv().unwrap(), "event");
    }

    #[test]
    fn client_that_stops_reading_is_dropped() {
        let mut listeners = Listeners::with_capacity(2);
        let mut reader = listeners.register(false, None);
        let stalled = listeners.register(true, Some(Arc::from("snapshot")));

        assert_eq!(listeners.broadcast(&Arc::from("one")), 0);
        assert_eq!(&*reader.messages.try_recv().unwrap(), "one");
        assert_eq!(listeners.broadcast(&Arc::from("two")), 1);

        assert_eq!(listeners.len(), 1);
        assert!(!listeners.remove(stalled.id));
        assert_eq!(&*reader.messages.try_recv().unwrap(), "two");
    }

    #[test]
    fn ids_are_not_reused() {
        let mut listeners = Listeners::default();
        let a = listeners.register(false, None);
        assert!(listeners.remove(a.id));
        assert!(!listeners.remove(a.id));
        let b = listeners.register(false, None);
        assert_ne!(a.id, b.id);
    }
}
