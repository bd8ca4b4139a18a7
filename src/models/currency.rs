//! Crypto currencies a new CryptoPort account gets a wallet for.
//! The ledger may hold others; those are handled by symbol string.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CryptoCurrency {
    BTC,
    ETH,
    BNB,
    SOL,
    ADA,
    DOT,
    LINK,
    UNI,
}

impl CryptoCurrency {
    pub const ALL: [CryptoCurrency; 8] = [
        CryptoCurrency::BTC,
        CryptoCurrency::ETH,
        CryptoCurrency::BNB,
        CryptoCurrency::SOL,
        CryptoCurrency::ADA,
        CryptoCurrency::DOT,
        CryptoCurrency::LINK,
        CryptoCurrency::UNI,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            CryptoCurrency::BTC => "BTC",
            CryptoCurrency::ETH => "ETH",
            CryptoCurrency::BNB => "BNB",
            CryptoCurrency::SOL => "SOL",
            CryptoCurrency::ADA => "ADA",
            CryptoCurrency::DOT => "DOT",
            CryptoCurrency::LINK => "LINK",
            CryptoCurrency::UNI => "UNI",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CryptoCurrency::BTC => "Bitcoin",
            CryptoCurrency::ETH => "Ethereum",
            CryptoCurrency::BNB => "Binance Coin",
            CryptoCurrency::SOL => "Solana",
            CryptoCurrency::ADA => "Cardano",
            CryptoCurrency::DOT => "Polkadot",
            CryptoCurrency::LINK => "Chainlink",
            CryptoCurrency::UNI => "Uniswap",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BTC" => Some(CryptoCurrency::BTC),
            "ETH" => Some(CryptoCurrency::ETH),
            "BNB" => Some(CryptoCurrency::BNB),
            "SOL" => Some(CryptoCurrency::SOL),
            "ADA" => Some(CryptoCurrency::ADA),
            "DOT" => Some(CryptoCurrency::DOT),
            "LINK" => Some(CryptoCurrency::LINK),
            "UNI" => Some(CryptoCurrency::UNI),
            _ => None,
        }
    }
}

impl std::fmt::Display for CryptoCurrency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Normalize a symbol coming from the browser ("btc " -> "BTC").
pub fn normalize_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_round_trip_case_insensitively() {
        for c in CryptoCurrency::ALL {
            assert_eq!(CryptoCurrency::from_symbol(&c.symbol().to_lowercase()), Some(c));
        }
        assert_eq!(CryptoCurrency::from_symbol("DOGE"), None);
        assert_eq!(normalize_symbol(" eth"), "ETH");
    }
}
