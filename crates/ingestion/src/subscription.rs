//! Contract/topic pairs the feed backfills and subscribes to.

use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::IngestionError;

/// Deployment the service was built for: the auction contract's six events,
/// the exchange contract and the exchange-rate oracle.
const DEFAULT_SUBSCRIPTIONS: &[(&str, &str)] = &[
    // AuctionStarted
    ("1eb806d40b102ac71ffb5b3f4bef8a049ea09de7", "db90cc2d5cdd2c25ea01e065395b401ab89b5064fd28a4b5a6d4c5b1aa767c81"),
    // AuctionStageChanged
    ("1eb806d40b102ac71ffb5b3f4bef8a049ea09de7", "509c675521ec7d4b747c41bb2181725e32efb1a3cef7a026b6e95c1ae52bfe50"),
    // Commit
    ("1eb806d40b102ac71ffb5b3f4bef8a049ea09de7", "d6d959909d722cf4a43540e718e2353ee9c39d1b07199e33b21b0f66bd8605e6"),
    // Reveal
    ("1eb806d40b102ac71ffb5b3f4bef8a049ea09de7", "3b67285ec3b24442f44159b1aaa1d41560abbcd8fa3235d7fd8a2a94220c689f"),
    // Fill
    ("1eb806d40b102ac71ffb5b3f4bef8a049ea09de7", "58b9d2001c95a893e2a0beb5ef569696c3daca96fe3f55470d6d45219a36c803"),
    // Withdrawal
    ("1eb806d40b102ac71ffb5b3f4bef8a049ea09de7", "2717ead6b9200dd235aad468c9809ea400fe33ac69b5bfaa6d3e90fc922b6398"),
    // Exchange
    ("b1e52539adedb96aaefb970e6b985990868880ec", "a6fee24309b1d83d9ec7b9e4dbb73c6f882746efbfb26db7b7d9e9f2fb6dc95a"),
    // ExchangeRateSet
    ("04f2e8af89391c93557353cec7ec7826829d06ef", "d0675b080f4d777cea1fd6b41821128760cbe794196648f8f0f5c160544d2270"),
];

/// One `(contract address, event topic)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSubscription {
    /// 40 lowercase hex characters, no prefix.
    address: String,
    /// 64 lowercase hex characters, no prefix.
    topic: String,
}

impl LogSubscription {
    pub fn new(address: &str, topic: &str) -> Result<Self, IngestionError> {
        let invalid = || IngestionError::InvalidSubscription(format!("{address}:{topic}"));
        let address = normalize_hex(address, 40).ok_or_else(invalid)?;
        let topic = normalize_hex(topic, 64).ok_or_else(invalid)?;
        Ok(Self { address, topic })
    }

    pub fn address(&self) -> String {
        format!("0x{}", self.address)
    }

    pub fn topic(&self) -> String {
        format!("0x{}", self.topic)
    }

    /// `eth_getLogs` filter covering all history for this pair.
    pub fn backfill_filter(&self) -> Value {
        json!({
            "fromBlock": "0x0",
            "address": self.address(),
            "topics": [self.topic()],
        })
    }
}

impl FromStr for LogSubscription {
    type Err = IngestionError;

    /// Parse `<address>:<topic>`, `0x` prefixes optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, topic) = s
            .split_once(':')
            .ok_or_else(|| IngestionError::InvalidSubscription(s.to_string()))?;
        Self::new(address.trim(), topic.trim())
    }
}

impl fmt::Display for LogSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.topic)
    }
}

/// The fixed set of pairs a feed covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    pairs: Vec<LogSubscription>,
}

impl SubscriptionSpec {
    pub fn new(pairs: Vec<LogSubscription>) -> Result<Self, IngestionError> {
        if pairs.is_empty() {
            return Err(IngestionError::InvalidSubscription(String::new()));
        }
        Ok(Self { pairs })
    }

    /// Pairs in declaration order; backfill runs in this order.
    pub fn pairs(&self) -> &[LogSubscription] {
        &self.pairs
    }

    /// `eth_subscribe("logs", ...)` filter matching any of the pairs.
    pub fn live_filter(&self) -> Value {
        let mut addresses: Vec<String> = Vec::new();
        let mut topics: Vec<String> = Vec::new();
        for pair in &self.pairs {
            let address = pair.address();
            if !addresses.contains(&address) {
                addresses.push(address);
            }
            let topic = pair.topic();
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }
        json!({
            "address": addresses,
            "topics": [topics],
        })
    }
}

impl Default for SubscriptionSpec {
    fn default() -> Self {
        Self {
            pairs: DEFAULT_SUBSCRIPTIONS
                .iter()
                .map(|(address, topic)| LogSubscription {
                    address: address.to_string(),
                    topic: topic.to_string(),
                })
                .collect(),
        }
    }
}

fn normalize_hex(value: &str, len: usize) -> Option<String> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    (digits.len() == len && digits.bytes().all(|b| b.is_ascii_hexdigit()))
        .then(|| digits.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_address_topic_pairs() {
        let pair: LogSubscription = format!("0x{}:{}", "AB".repeat(20), "cd".repeat(32)).parse().unwrap();
        assert_eq!(pair.address(), format!("0x{}", "ab".repeat(20)));
        assert_eq!(pair.topic(), format!("0x{}", "cd".repeat(32)));

        assert!("nocolon".parse::<LogSubscription>().is_err());
        assert!(format!("{}:{}", "ab".repeat(19), "cd".repeat(32)).parse::<LogSubscription>().is_err());
        assert!(format!("{}:{}", "zz".repeat(20), "cd".repeat(32)).parse::<LogSubscription>().is_err());
    }

    #[test]
    fn live_filter_merges_pairs() {
        let spec = SubscriptionSpec::default();
        let filter = spec.live_filter();

        assert_eq!(filter["address"].as_array().unwrap().len(), 3);
        assert_eq!(filter["topics"][0].as_array().unwrap().len(), 8);
    }

    #[test]
    fn backfill_filter_starts_at_genesis() {
        let spec = SubscriptionSpec::default();
        let filter = spec.pairs()[0].backfill_filter();

        assert_eq!(filter["fromBlock"], "0x0");
        assert_eq!(filter["address"], "0x1eb806d40b102ac71ffb5b3f4bef8a049ea09de7");
        assert_eq!(
            filter["topics"][0],
            "0xdb90cc2d5cdd2c25ea01e065395b401ab89b5064fd28a4b5a6d4c5b1aa767c81"
        );
    }

    #[test]
    fn empty_spec_is_rejected() {
        assert!(SubscriptionSpec::new(Vec::new()).is_err());
    }
}
