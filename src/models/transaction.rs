use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Sent,
    Received,
    AdminAdjusted,
    Deposit,
    Withdrawal,
    Requested,
    RequestReceived,
    CryptoSent,
    CryptoReceived,
    CryptoDeposit,
    CryptoWithdrawal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Sent => "sent",
            TransactionType::Received => "received",
            TransactionType::AdminAdjusted => "admin_adjusted",
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Requested => "requested",
            TransactionType::RequestReceived => "request_received",
            TransactionType::CryptoSent => "crypto_sent",
            TransactionType::CryptoReceived => "crypto_received",
            TransactionType::CryptoDeposit => "crypto_deposit",
            TransactionType::CryptoWithdrawal => "crypto_withdrawal",
        }
    }

    /// Outgoing kinds: the owning account is the sender.
    pub fn is_outgoing(&self) -> bool {
        matches!(
            self,
            TransactionType::Sent | TransactionType::CryptoSent | TransactionType::Requested
        )
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Completed,
    Pending,
    Failed,
}

/// Transaction as shown to the browser.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub sender_id: String,
    pub recipient: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "transaction_type")]
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crypto_symbol: Option<String>,
}
