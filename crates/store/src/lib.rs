//! Data model and in-memory record storage for the feedy event feed.
//!
//! Holds the raw log shape delivered by the upstream node, the decoded
//! event shape pushed to subscribers, and the append-only record store.

pub mod models;
pub mod quantity;
pub mod records;

pub use models::{AuctionStage, DedupKey, EventDetails, ExchangeRate, ParsedEvent, RawLog, Snapshot};
pub use records::RecordStore;
