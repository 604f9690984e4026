//! Raw log decoding.
//!
//! A log's first topic selects the event; the remaining topics (indexed
//! parameters) followed by the 32-byte words of the data blob (non-indexed
//! parameters) form one argument sequence. Each known event kind reads its
//! fields from fixed positions of that sequence.

use alloy::primitives::U256;
use feedy_store::{AuctionStage, EventDetails, ExchangeRate, ParsedEvent, RawLog};
use thiserror::Error;
use tracing::warn;

use crate::signatures::{self, UNKNOWN_EVENT};
use crate::tokens::token_name;

/// Values are 18-decimal fixed point.
const WEI_PER_UNIT: f64 = 1e18;

/// Errors raised while decoding a single log.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log data is not a sequence of 32-byte words: {0}")]
    MalformedData(String),
    #[error("malformed 32-byte word {0:?}")]
    MalformedWord(String),
    #[error("{event} expects an argument at position {index}, log has {len}")]
    MissingArgument {
        event: &'static str,
        index: usize,
        len: usize,
    },
    #[error("auction stage code {0} is out of range")]
    StageOutOfRange(String),
}

impl DecodeError {
    /// Whether the record must be dropped rather than kept with the
    /// generic shape.
    pub fn drops_record(&self) -> bool {
        matches!(self, Self::StageOutOfRange(_))
    }
}

/// Events with a dedicated field layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    AuctionStarted,
    AuctionStageChanged,
    Commit,
    Reveal,
    Fill,
    Withdrawal,
    Exchange,
    ExchangeRateSet,
    /// Any other name, known to the signature table or not.
    Other,
}

/// Argument positions read by an event kind.
#[derive(Debug, Clone, Copy)]
struct Layout {
    /// Index into the indexed topics, signature excluded.
    address: Option<usize>,
    value0: Option<usize>,
    value1: Option<usize>,
    token0: Option<usize>,
    token1: Option<usize>,
    nonce: Option<usize>,
    bid_index: Option<usize>,
    stage: Option<usize>,
}

impl Layout {
    const EMPTY: Layout = Layout {
        address: None,
        value0: None,
        value1: None,
        token0: None,
        token1: None,
        nonce: None,
        bid_index: None,
        stage: None,
    };
}

impl EventKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "AuctionStarted" => Self::AuctionStarted,
            "AuctionStageChanged" => Self::AuctionStageChanged,
            "Commit" => Self::Commit,
            "Reveal" => Self::Reveal,
            "Fill" => Self::Fill,
            "Withdrawal" => Self::Withdrawal,
            "Exchange" => Self::Exchange,
            "ExchangeRateSet" => Self::ExchangeRateSet,
            _ => Self::Other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AuctionStarted => "AuctionStarted",
            Self::AuctionStageChanged => "AuctionStageChanged",
            Self::Commit => "Commit",
            Self::Reveal => "Reveal",
            Self::Fill => "Fill",
            Self::Withdrawal => "Withdrawal",
            Self::Exchange => "Exchange",
            Self::ExchangeRateSet => "ExchangeRateSet",
            Self::Other => UNKNOWN_EVENT,
        }
    }

    fn layout(&self) -> Layout {
        match self {
            Self::Commit => Layout {
                address: Some(2),
                value0: Some(4),
                token0: Some(0),
                token1: Some(1),
                nonce: Some(3),
                bid_index: Some(5),
                ..Layout::EMPTY
            },
            Self::Reveal | Self::Fill => Layout {
                address: Some(2),
                value0: Some(4),
                value1: Some(5),
                token0: Some(0),
                token1: Some(1),
                nonce: Some(3),
                bid_index: Some(6),
                ..Layout::EMPTY
            },
            Self::Exchange => Layout {
                address: Some(0),
                value0: Some(4),
                value1: Some(3),
                token0: Some(2),
                token1: Some(1),
                ..Layout::EMPTY
            },
            Self::ExchangeRateSet => Layout {
                value0: Some(2),
                value1: Some(3),
                token0: Some(0),
                token1: Some(1),
                ..Layout::EMPTY
            },
            Self::Withdrawal => Layout {
                address: Some(1),
                value0: Some(2),
                token0: Some(0),
                ..Layout::EMPTY
            },
            Self::AuctionStarted => Layout {
                value0: Some(6),
                token0: Some(0),
                token1: Some(1),
                nonce: Some(2),
                ..Layout::EMPTY
            },
            Self::AuctionStageChanged => Layout {
                token0: Some(0),
                token1: Some(1),
                nonce: Some(2),
                stage: Some(3),
                ..Layout::EMPTY
            },
            Self::Other => Layout::EMPTY,
        }
    }

    /// Read the event-specific fields.
    ///
    /// # Arguments
    /// * `topics` - Indexed parameter words (signature excluded)
    /// * `args` - Indexed words followed by data words
    pub fn extract(&self, topics: &[String], args: &[String]) -> Result<EventDetails, DecodeError> {
        let layout = self.layout();
        let event = self.name();
        let mut details = EventDetails::default();

        if let Some(index) = layout.address {
            details.address = Some(address_from_word(word_at(topics, index, event)?));
        }

        if let Some(index) = layout.value0 {
            let word = word_at(args, index, event)?;
            details.approx_value0 = Some(wei_to_units(word)?);
            details.wei_value0 = Some(word.to_string());
        }
        if let Some(index) = layout.value1 {
            let word = word_at(args, index, event)?;
            details.approx_value1 = Some(wei_to_units(word)?);
            details.wei_value1 = Some(word.to_string());
        }
        if let (Some(value0), Some(value1)) = (details.approx_value0, details.approx_value1) {
            details.approx_exchange_rate = Some(ExchangeRate::between(value0, value1));
        }

        if let Some(index) = layout.token0 {
            details.erc_name0 = Some(token_name(word_at(args, index, event)?).to_string());
        }
        if let Some(index) = layout.token1 {
            details.erc_name1 = Some(token_name(word_at(args, index, event)?).to_string());
        }
        if let Some(index) = layout.nonce {
            details.auction_nonce = Some(word_to_u64(word_at(args, index, event)?)?);
        }
        if let Some(index) = layout.bid_index {
            details.auction_bid_index = Some(word_to_u64(word_at(args, index, event)?)?);
        }
        if let Some(index) = layout.stage {
            details.auction_stage_name = Some(stage_from_word(word_at(args, index, event)?)?);
        }

        Ok(details)
    }
}

/// Decode one raw log.
///
/// Unknown signatures and malformed logs still produce an event with the
/// generic fields only. The only error returned is an out-of-range auction
/// stage, in which case the record must be dropped.
pub fn decode(raw: &RawLog) -> Result<ParsedEvent, DecodeError> {
    let Some(signature) = raw.topics.first() else {
        warn!(tx = %raw.transaction_hash, log_index = raw.log_index, "Log has no topics, recording as unknown");
        return Ok(ParsedEvent::generic(raw, UNKNOWN_EVENT, Vec::new()));
    };
    let name = signatures::event_name(signature);

    let args = match split_arguments(raw) {
        Ok(args) => args,
        Err(e) => {
            warn!(tx = %raw.transaction_hash, log_index = raw.log_index, event = name, "Malformed log, recording generic fields only: {}", e);
            return Ok(ParsedEvent::generic(raw, name, Vec::new()));
        }
    };
    let indexed = raw.topics.len() - 1;

    let details = match EventKind::from_name(name).extract(&args[..indexed], &args) {
        Ok(details) => details,
        Err(e) if e.drops_record() => return Err(e),
        Err(e) => {
            warn!(tx = %raw.transaction_hash, log_index = raw.log_index, event = name, "Could not extract event fields: {}", e);
            EventDetails::default()
        }
    };

    let mut event = ParsedEvent::generic(raw, name, args);
    event.details = details;
    Ok(event)
}

fn split_arguments(raw: &RawLog) -> Result<Vec<String>, DecodeError> {
    let mut args = raw.topics[1..]
        .iter()
        .map(|topic| normalize_word(topic))
        .collect::<Result<Vec<_>, _>>()?;

    let data = raw.data.strip_prefix("0x").unwrap_or(&raw.data);
    let bytes = hex::decode(data).map_err(|e| DecodeError::MalformedData(e.to_string()))?;
    if bytes.len() % 32 != 0 {
        return Err(DecodeError::MalformedData(format!("{} trailing bytes", bytes.len() % 32)));
    }
    args.extend(bytes.chunks(32).map(hex::encode));
    Ok(args)
}

/// Lowercase 64-character hex word without prefix.
fn normalize_word(word: &str) -> Result<String, DecodeError> {
    let digits = word.strip_prefix("0x").unwrap_or(word);
    match hex::decode(digits) {
        Ok(bytes) if bytes.len() == 32 => Ok(hex::encode(bytes)),
        _ => Err(DecodeError::MalformedWord(word.to_string())),
    }
}

fn word_at<'a>(words: &'a [String], index: usize, event: &'static str) -> Result<&'a str, DecodeError> {
    words
        .get(index)
        .map(String::as_str)
        .ok_or(DecodeError::MissingArgument {
            event,
            index,
            len: words.len(),
        })
}

/// Words are normalized to 64 hex characters, the address is the low 20 bytes.
fn address_from_word(word: &str) -> String {
    format!("0x{}", &word[24..])
}

fn wei_to_units(word: &str) -> Result<f64, DecodeError> {
    let wei = U256::from_str_radix(word, 16).map_err(|_| DecodeError::MalformedWord(word.to_string()))?;
    let wei: f64 = wei
        .to_string()
        .parse()
        .map_err(|_| DecodeError::MalformedWord(word.to_string()))?;
    Ok(wei / WEI_PER_UNIT)
}

fn word_to_u64(word: &str) -> Result<u64, DecodeError> {
    let digits = word.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    if digits.len() > 16 {
        return Err(DecodeError::MalformedWord(word.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| DecodeError::MalformedWord(word.to_string()))
}

fn stage_from_word(word: &str) -> Result<AuctionStage, DecodeError> {
    let out_of_range = || DecodeError::StageOutOfRange(format!("0x{}", word.trim_start_matches('0')));
    let code = word_to_u64(word).map_err(|_| out_of_range())?;
    AuctionStage::from_code(code).ok_or_else(out_of_range)
}
