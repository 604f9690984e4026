//! Known function and event signatures.
//!
//! Keys are the lowercase hex signature hash without `0x`: 8 characters for
//! function selectors, 64 for event topics.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Name reported for logs whose signature is not in the table.
pub const UNKNOWN_EVENT: &str = "unknown";

/// Function selectors (first four bytes of the call data).
static FUNCTIONS: &[(&str, &str)] = &[
    ("04af2560", "userBids(address,address,address)"),
    ("158ef93e", "initialized()"),
    ("715018a6", "renounceOwnership()"),
    ("7b103999", "registry()"),
    ("8da5cb5b", "owner()"),
    ("a4f1433c", "sortedBids(address,address)"),
    ("a91ee0dc", "setRegistry(address)"),
    ("aafb088e", "stageDuration()"),
    ("affed0e0", "nonce()"),
    ("e831be58", "pendingWithdrawals(address,address)"),
    ("f2fde38b", "transferOwnership(address)"),
    ("da35a26f", "initialize(uint256,address)"),
    ("d1e76063", "setStageDuration(uint256)"),
    ("056d380c", "reset(address,address)"),
    ("62edcae8", "start(address,address,address,uint256)"),
    ("90a08853", "commit(address,address,uint256,bytes32)"),
    ("d2e06d16", "reveal(address,address,uint256,uint256,uint256,uint256)"),
    ("dab3d742", "fill(address,address,uint256)"),
    ("51cff8d9", "withdraw(address)"),
    ("fe527edc", "getNumBids(address,address,address)"),
    ("e1fe26a5", "getBidParams(address,address,address,uint256)"),
    ("b1f7872f", "getStage(address,address)"),
    ("54d2d402", "getAuctionParams(address,address)"),
    ("4ea5014e", "stageStartTime(uint256,uint256,uint8)"),
    ("03386ba3", "_setAndInitializeImplementation(address,bytes)"),
    ("42404e07", "_getImplementation()"),
    ("bb913f41", "_setImplementation(address)"),
    ("d29d44ee", "_transferOwnership(address)"),
    ("f7e6af80", "_getOwner()"),
    ("93a59077", "spreads(address,address)"),
    ("8129fc1c", "initialize()"),
    ("a532e748", "addTokenPair(address,address,uint256,uint256,uint256,uint256,uint256,uint256)"),
    ("75ead459", "getSpread(address,address)"),
    ("73d42fe4", "getBuyTokenAmount(address,address,uint256)"),
    ("1dee47b3", "getSellTokenAmount(address,address,uint256)"),
    ("afa99860", "getTokenPrice(address,address)"),
    ("0ed2fc95", "exchange(address,address,uint256,uint256)"),
    ("503fa44f", "exchangeRates(address,address)"),
    ("de378f38", "setExchangeRate(address,address,uint256,uint256)"),
    ("baaa61be", "getExchangeRate(address,address)"),
    ("c4d66de8", "initialize(address)"),
    ("d48bfca7", "addToken(address)"),
    ("5fa7b584", "removeToken(address)"),
    ("950dad19", "burnToken(address)"),
    ("6bec32da", "mintToken(address,address,uint256)"),
    ("1c39c7d5", "transferGold(address,uint256)"),
    ("45eb9077", "rebaseToken(address)"),
    ("d6b34fd7", "exchangeGoldAndStableTokens(address,address,uint256,uint256)"),
    ("e4860339", "tokens(address)"),
];

/// Event topics (first topic of a log).
static EVENTS: &[(&str, &str)] = &[
    (
        "db90cc2d5cdd2c25ea01e065395b401ab89b5064fd28a4b5a6d4c5b1aa767c81",
        "AuctionStarted(address,address,uint256,uint256,uint256,address,uint256)",
    ),
    (
        "509c675521ec7d4b747c41bb2181725e32efb1a3cef7a026b6e95c1ae52bfe50",
        "AuctionStageChanged(address,address,uint256,uint8)",
    ),
    (
        "d6d959909d722cf4a43540e718e2353ee9c39d1b07199e33b21b0f66bd8605e6",
        "Commit(address,address,address,uint256,uint256,uint256)",
    ),
    (
        "3b67285ec3b24442f44159b1aaa1d41560abbcd8fa3235d7fd8a2a94220c689f",
        "Reveal(address,address,address,uint256,uint256,uint256,uint256)",
    ),
    (
        "58b9d2001c95a893e2a0beb5ef569696c3daca96fe3f55470d6d45219a36c803",
        "Fill(address,address,address,uint256,uint256,uint256,uint256)",
    ),
    (
        "2717ead6b9200dd235aad468c9809ea400fe33ac69b5bfaa6d3e90fc922b6398",
        "Withdrawal(address,address,uint256)",
    ),
    (
        "27fe5f0c1c3b1ed427cc63d0f05759ffdecf9aec9e18d31ef366fc8a6cb5dc3b",
        "RegistrySet(address)",
    ),
    (
        "f8df31144d9c2f0f6b59d69b8b98abd5459d07f2742c4df920b25aae33c64820",
        "OwnershipRenounced(address)",
    ),
    (
        "8be0079c531659141344cd1fd0a4f28419497f9722a3daafe3b4186f6b6457e0",
        "OwnershipTransferred(address,address)",
    ),
    (
        "63e047f6c744b74fb6176ae8e95a5d056f5bf82ffe806b6a70f381b44b7e6ece",
        "Commit(address,address,address,uint256,bytes32)",
    ),
    (
        "aa6fbca0b50b44ba485aef79eb18c66d3fa7181bcda59f81a0a4ec954094e1c8",
        "Reveal(address,address,address,uint256,uint256,bytes32)",
    ),
    (
        "e190fa40eda4f49a8e67dd86f6dd05d6f106ad9a5eae4424a6151af93cbe60f5",
        "Fill(address,address,address,uint256,uint256,bytes32)",
    ),
    (
        "50146d0e3c60aa1d17a70635b05494f864e86144a2201275021014fbf08bafe2",
        "OwnerSet(address)",
    ),
    (
        "ab64f92ab780ecbf4f3866f57cee465ff36c89450dcce20237ca7a8d81fb7d13",
        "ImplementationSet(address)",
    ),
    (
        "406a361d060f37c6b9220c9d8da1dfb078069f8dab53c70aa9625cafe0490fa5",
        "TokenPairAdded(address,address,uint256,uint256,uint256,uint256)",
    ),
    (
        "a6fee24309b1d83d9ec7b9e4dbb73c6f882746efbfb26db7b7d9e9f2fb6dc95a",
        "Exchange(address,address,address,uint256,uint256)",
    ),
    (
        "d0675b080f4d777cea1fd6b41821128760cbe794196648f8f0f5c160544d2270",
        "ExchangeRateSet(address,address,uint256,uint256)",
    ),
];

fn table() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| FUNCTIONS.iter().chain(EVENTS).copied().collect())
}

/// Full signature (`Name(type,...)`) for a hash, if known.
pub fn lookup(hash: &str) -> Option<&'static str> {
    let hash = hash.strip_prefix("0x").unwrap_or(hash);
    if hash.bytes().any(|b| b.is_ascii_uppercase()) {
        return table().get(hash.to_ascii_lowercase().as_str()).copied();
    }
    table().get(hash).copied()
}

/// Bare event or function name for a hash, or [`UNKNOWN_EVENT`].
pub fn event_name(hash: &str) -> &'static str {
    lookup(hash)
        .and_then(|signature| signature.split('(').next())
        .unwrap_or(UNKNOWN_EVENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_event_topics() {
        assert_eq!(
            event_name("0x2717ead6b9200dd235aad468c9809ea400fe33ac69b5bfaa6d3e90fc922b6398"),
            "Withdrawal"
        );
        assert_eq!(
            lookup("509C675521EC7D4B747C41BB2181725E32EFB1A3CEF7A026B6E95C1AE52BFE50"),
            Some("AuctionStageChanged(address,address,uint256,uint8)")
        );
    }

    #[test]
    fn resolves_function_selectors() {
        assert_eq!(event_name("51cff8d9"), "withdraw");
        assert_eq!(lookup("0ed2fc95"), Some("exchange(address,address,uint256,uint256)"));
    }

    #[test]
    fn both_commit_revisions_share_a_name() {
        assert_eq!(
            event_name("d6d959909d722cf4a43540e718e2353ee9c39d1b07199e33b21b0f66bd8605e6"),
            "Commit"
        );
        assert_eq!(
            event_name("63e047f6c744b74fb6176ae8e95a5d056f5bf82ffe806b6a70f381b44b7e6ece"),
            "Commit"
        );
    }

    #[test]
    fn unknown_hash_is_not_an_error() {
        assert_eq!(lookup("deadbeef"), None);
        assert_eq!(event_name("deadbeef"), UNKNOWN_EVENT);
    }
}
