//! Symbolic names for well-known token addresses.

/// Token addresses as left-padded 32-byte words. `_PEG` marks the
/// supply/demand rate pseudo-token.
static TOKENS: &[(&str, &str)] = &[
    (
        "0000000000000000000000000000000000000000000000000000000000000000",
        "_PEG",
    ),
    (
        "000000000000000000000000000000000000000000000000000000000000ce10",
        "cGLD",
    ),
    (
        "0000000000000000000000009a9f0ac7e4668a094f0be966f8eb79d6ad166e61",
        "cUSD",
    ),
];

/// Resolve a 32-byte address word to its token symbol, or return the word
/// itself when it is not a known token.
pub fn token_name(word: &str) -> &str {
    let normalized = word.strip_prefix("0x").unwrap_or(word);
    TOKENS
        .iter()
        .find(|(address, _)| address.eq_ignore_ascii_case(normalized))
        .map(|(_, name)| *name)
        .unwrap_or(word)
}
