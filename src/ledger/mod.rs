//! Client side of the external accounts/ledger API.
//!
//! The ledger is a plain CRUD service: collection endpoints for users, accounts,
//! platforms, crypto currencies, crypto wallets and transactions, filtered with
//! query parameters, plus a handful of platform-specific endpoints (login,
//! registration, chat, admin views) reached through [`LedgerApi::call`].
//!
//! [`HttpLedgerClient`] talks to the real service; [`InMemoryLedger`] serves
//! the same trait in-process for local runs and tests.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::models::{
    AccountId, CurrencyId, PlatformId, TransactionId, TransactionStatus, TransactionType, UserId,
    WalletId,
};

pub use http::HttpLedgerClient;
pub use memory::{InMemoryLedger, LedgerOp};

#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// Network failure, timeout, or the ledger is down.
    #[error("ledger unreachable: {0}")]
    Unavailable(String),
    /// The ledger answered with a non-success status.
    #[error("ledger answered {status}: {message}")]
    Status { status: u16, message: String },
    /// The ledger answered 2xx with a body we could not decode.
    #[error("undecodable ledger response: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LedgerUser {
    pub id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_joined: Option<DateTime<Utc>>,
}

impl LedgerUser {
    pub fn full_name(&self) -> String {
        crate::models::user::join_full_name(&self.first_name, &self.last_name)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

fn default_status() -> String {
    "active".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LedgerAccount {
    pub id: AccountId,
    pub user: UserId,
    pub platform: PlatformId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_name: Option<String>,
    pub balance: Decimal,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub chat_enabled: bool,
    #[serde(default)]
    pub mobile_number: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NewAccount {
    pub user: UserId,
    pub platform: PlatformId,
    pub balance: Decimal,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LedgerPlatform {
    pub id: PlatformId,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LedgerCurrency {
    pub id: CurrencyId,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
}

/// Wallet's currency as the ledger serves it: either the bare foreign key or the
/// nested record. Always written back as the key.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CurrencyRef {
    Id(CurrencyId),
    Nested(LedgerCurrency),
}

impl CurrencyRef {
    pub fn id(&self) -> CurrencyId {
        match self {
            CurrencyRef::Id(id) => *id,
            CurrencyRef::Nested(c) => c.id,
        }
    }
}

impl Serialize for CurrencyRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.id())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LedgerCryptoWallet {
    pub id: WalletId,
    pub account: AccountId,
    pub crypto_currency: CurrencyRef,
    #[serde(default, skip_serializing)]
    pub crypto_currency_symbol: Option<String>,
    pub balance: Decimal,
    pub deposit_address: String,
}

impl LedgerCryptoWallet {
    pub fn symbol(&self) -> Option<String> {
        match (&self.crypto_currency_symbol, &self.crypto_currency) {
            (Some(s), _) => Some(s.clone()),
            (None, CurrencyRef::Nested(c)) => Some(c.symbol.clone()),
            (None, CurrencyRef::Id(_)) => None,
        }
    }

    pub fn currency_name(&self) -> Option<String> {
        match &self.crypto_currency {
            CurrencyRef::Nested(c) if !c.name.is_empty() => Some(c.name.clone()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct NewCryptoWallet {
    pub account: AccountId,
    pub crypto_currency: CurrencyId,
    pub balance: Decimal,
    pub deposit_address: String,
}

/// Ledger transaction record. Kind and status stay strings here so one
/// unexpected row does not break decoding of a whole history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LedgerTransaction {
    pub id: TransactionId,
    pub account: AccountId,
    #[serde(default)]
    pub sender_account: Option<AccountId>,
    #[serde(default)]
    pub crypto_wallet: Option<Value>,
    #[serde(default)]
    pub crypto_symbol: Option<String>,
    pub amount: Decimal,
    pub transaction_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub recipient: String,
}

impl LedgerTransaction {
    pub fn kind(&self) -> Option<TransactionType> {
        serde_json::from_value(Value::String(self.transaction_type.clone())).ok()
    }

    pub fn status(&self) -> TransactionStatus {
        serde_json::from_value(Value::String(self.status.clone())).unwrap_or_default()
    }

    /// Symbol of the wallet the record belongs to, if it is a crypto record.
    pub fn symbol(&self) -> Option<String> {
        if let Some(s) = &self.crypto_symbol {
            return Some(s.clone());
        }
        self.crypto_wallet
            .as_ref()
            .and_then(|w| w.pointer("/crypto_currency/symbol"))
            .and_then(|s| s.as_str())
            .map(str::to_string)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewTransaction {
    pub account: AccountId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_account: Option<AccountId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crypto_wallet: Option<WalletId>,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub recipient: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpstreamMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// A request to one of the ledger's platform-specific endpoints.
#[derive(Clone, Debug)]
pub struct UpstreamRequest {
    pub method: UpstreamMethod,
    /// Path relative to the ledger base URL, segments already encoded.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl UpstreamRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: UpstreamMethod::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: UpstreamMethod::Post,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: UpstreamMethod::Put,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }
}

/// Whatever the ledger answered, status included.
#[derive(Clone, Debug)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: Value,
}

impl UpstreamReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `data` member of an enveloped answer, or the whole body.
    pub fn data(&self) -> &Value {
        self.body.get("data").unwrap_or(&self.body)
    }

    pub fn error_message(&self, fallback: &str) -> String {
        upstream_message(&self.body).unwrap_or_else(|| fallback.to_string())
    }
}

/// Pull a human-readable message out of a ledger error body.
pub fn upstream_message(body: &Value) -> Option<String> {
    ["error", "detail", "message"]
        .iter()
        .find_map(|key| body.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// Encode one path segment (emails, mobile numbers) for an upstream path.
pub fn segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

#[async_trait]
pub trait LedgerApi: Send + Sync {
    async fn find_users_by_email(&self, email: &str) -> Result<Vec<LedgerUser>, LedgerError>;
    async fn get_user(&self, id: UserId) -> Result<Option<LedgerUser>, LedgerError>;
    async fn list_users(&self) -> Result<Vec<LedgerUser>, LedgerError>;
    async fn create_user(&self, user: &NewUser) -> Result<LedgerUser, LedgerError>;
    async fn delete_user(&self, id: UserId) -> Result<(), LedgerError>;

    async fn find_accounts(
        &self,
        user: UserId,
        platform_name: &str,
    ) -> Result<Vec<LedgerAccount>, LedgerError>;
    async fn get_account(&self, id: AccountId) -> Result<Option<LedgerAccount>, LedgerError>;
    async fn create_account(&self, account: &NewAccount) -> Result<LedgerAccount, LedgerError>;
    async fn update_account(&self, account: &LedgerAccount) -> Result<LedgerAccount, LedgerError>;
    async fn delete_account(&self, id: AccountId) -> Result<(), LedgerError>;

    async fn find_platforms(&self, name: &str) -> Result<Vec<LedgerPlatform>, LedgerError>;
    async fn create_platform(&self, name: &str) -> Result<LedgerPlatform, LedgerError>;

    async fn find_currencies(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<LedgerCurrency>, LedgerError>;
    async fn create_currency(
        &self,
        symbol: &str,
        name: &str,
    ) -> Result<LedgerCurrency, LedgerError>;

    async fn find_wallets(
        &self,
        account: AccountId,
        symbol: Option<&str>,
    ) -> Result<Vec<LedgerCryptoWallet>, LedgerError>;
    async fn get_wallet(&self, id: WalletId) -> Result<Option<LedgerCryptoWallet>, LedgerError>;
    async fn create_wallet(
        &self,
        wallet: &NewCryptoWallet,
    ) -> Result<LedgerCryptoWallet, LedgerError>;
    async fn update_wallet(
        &self,
        wallet: &LedgerCryptoWallet,
    ) -> Result<LedgerCryptoWallet, LedgerError>;
    async fn delete_wallet(&self, id: WalletId) -> Result<(), LedgerError>;

    async fn create_transaction(
        &self,
        tx: &NewTransaction,
    ) -> Result<LedgerTransaction, LedgerError>;
    async fn list_transactions(
        &self,
        account: AccountId,
    ) -> Result<Vec<LedgerTransaction>, LedgerError>;
    async fn delete_transaction(&self, id: TransactionId) -> Result<(), LedgerError>;

    /// Platform-specific endpoint. Non-2xx answers come back as `Ok` with their
    /// status; only transport and decoding failures are errors.
    async fn call(&self, request: UpstreamRequest) -> Result<UpstreamReply, LedgerError>;
}
