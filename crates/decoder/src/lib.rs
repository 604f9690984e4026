//! Log decoding for the auction and exchange contracts.

pub mod decoder;
pub mod signatures;
pub mod tokens;

pub use decoder::{decode, DecodeError, EventKind};
pub use signatures::{event_name, UNKNOWN_EVENT};
pub use tokens::token_name;
