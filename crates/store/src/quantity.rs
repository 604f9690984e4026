//! Serde helpers for `0x`-prefixed hex quantities (`"0x1b4"`).

use serde::{de, Deserialize, Deserializer, Serializer};

/// Parse a hex quantity, with or without the `0x` prefix.
pub fn parse(value: &str) -> Result<u64, std::num::ParseIntError> {
    u64::from_str_radix(value.strip_prefix("0x").unwrap_or(value), 16)
}

/// Format a quantity the way the node emits it.
pub fn format(value: u64) -> String {
    format!("0x{:x}", value)
}

pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(*value))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(|e| de::Error::custom(format!("invalid hex quantity {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_prefix() {
        assert_eq!(parse("0x1b4").unwrap(), 436);
        assert_eq!(parse("ff").unwrap(), 255);
        assert!(parse("0xzz").is_err());
    }

    #[test]
    fn formats_lowercase_without_padding() {
        assert_eq!(format(0), "0x0");
        assert_eq!(format(436), "0x1b4");
    }
}
