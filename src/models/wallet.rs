use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Crypto wallet as shown to the browser.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CryptoWallet {
    pub id: String,
    pub crypto_symbol: String,
    pub crypto_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub deposit_address: String,
}
