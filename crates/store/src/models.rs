//! Event models and wire types.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::quantity;

/// A log entry as delivered by `eth_getLogs` or an `eth_subscription` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    /// Emitting contract.
    #[serde(default)]
    pub address: String,
    pub transaction_hash: String,
    #[serde(with = "quantity")]
    pub transaction_index: u64,
    pub block_hash: String,
    #[serde(with = "quantity")]
    pub block_number: u64,
    #[serde(with = "quantity")]
    pub log_index: u64,
    /// 32-byte words, `0x` prefixed. The first one is the event signature hash.
    /// Missing or `null` reads as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub topics: Vec<String>,
    /// ABI-encoded non-indexed parameters.
    #[serde(default)]
    pub data: String,
    /// Set by the node when a log is retracted by a reorg.
    #[serde(default)]
    pub removed: bool,
}

impl RawLog {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.transaction_hash, self.log_index)
    }

    /// Canonical history order: block first, then position inside the block.
    pub fn order_key(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Identity of one log occurrence on chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    transaction_hash: String,
    log_index: u64,
}

impl DedupKey {
    pub fn new(transaction_hash: &str, log_index: u64) -> Self {
        Self {
            transaction_hash: transaction_hash.to_ascii_lowercase(),
            log_index,
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.transaction_hash, quantity::format(self.log_index))
    }
}

/// Stage of a commit/reveal auction, as encoded by `AuctionStageChanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuctionStage {
    Reset,
    Commit,
    Reveal,
    Fill,
    Ended,
}

impl AuctionStage {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Reset),
            1 => Some(Self::Commit),
            2 => Some(Self::Reveal),
            3 => Some(Self::Fill),
            4 => Some(Self::Ended),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reset => "Reset",
            Self::Commit => "Commit",
            Self::Reveal => "Reveal",
            Self::Fill => "Fill",
            Self::Ended => "Ended",
        }
    }

    /// Whether bids can still move the auction forward.
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, Self::Reset | Self::Ended)
    }
}

impl fmt::Display for AuctionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ratio of two decoded values.
///
/// Serialized as a plain number, or as the string `"unavailable"` when the
/// denominator is zero so that subscribers never see `NaN`/`Infinity`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExchangeRate {
    Rate(f64),
    Unavailable,
}

impl ExchangeRate {
    pub fn between(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            return Self::Unavailable;
        }
        let rate = numerator / denominator;
        if rate.is_finite() {
            Self::Rate(rate)
        } else {
            Self::Unavailable
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Rate(rate) => Some(*rate),
            Self::Unavailable => None,
        }
    }
}

impl Serialize for ExchangeRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Rate(rate) => serializer.serialize_f64(*rate),
            Self::Unavailable => serializer.serialize_str("unavailable"),
        }
    }
}

/// Event-specific fields. Everything is optional; unknown events leave all
/// of them empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    /// Participant (bidder, exchanger, withdrawer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wei_value0: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wei_value1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approx_value0: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approx_value1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approx_exchange_rate: Option<ExchangeRate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub erc_name0: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub erc_name1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_nonce: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_bid_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_stage_name: Option<AuctionStage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Event,
}

/// A decoded log, as stored and as pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEvent {
    pub transaction_hash: String,
    #[serde(with = "quantity")]
    pub transaction_index: u64,
    pub block_hash: String,
    #[serde(with = "quantity")]
    pub block_number: u64,
    #[serde(with = "quantity")]
    pub log_index: u64,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(rename = "name")]
    pub event_name: String,
    /// Indexed parameters followed by data words, hex without prefix.
    pub args: Vec<String>,
    #[serde(flatten)]
    pub details: EventDetails,
}

impl ParsedEvent {
    /// Build an event carrying only the position metadata of `raw`.
    pub fn generic(raw: &RawLog, event_name: &str, args: Vec<String>) -> Self {
        Self {
            transaction_hash: raw.transaction_hash.clone(),
            transaction_index: raw.transaction_index,
            block_hash: raw.block_hash.clone(),
            block_number: raw.block_number,
            log_index: raw.log_index,
            kind: RecordKind::Event,
            event_name: event_name.to_string(),
            args,
            details: EventDetails::default(),
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.transaction_hash, self.log_index)
    }

    pub fn order_key(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// First message sent to a client that connected in full mode.
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    records: &'a [ParsedEvent],
}

impl<'a> Snapshot<'a> {
    pub fn new(records: &'a [ParsedEvent]) -> Self {
        Self {
            kind: "snapshot",
            records,
        }
    }
}
