//! In-process stand-in for the ledger service.
//!
//! Serves `--in-memory` runs and the test suite. Collections behave like the
//! real CRUD endpoints (deletes cascade the way the ledger's foreign keys do),
//! and the platform endpoints reached through `call` answer with the same
//! envelopes the real service uses. Faults can be armed per operation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::{
    CurrencyRef, LedgerAccount, LedgerApi, LedgerCryptoWallet, LedgerCurrency, LedgerError,
    LedgerPlatform, LedgerTransaction, LedgerUser, NewAccount, NewCryptoWallet, NewTransaction,
    NewUser, UpstreamMethod, UpstreamReply, UpstreamRequest,
};
use crate::models::{
    user::split_full_name, AccountId, ChatMessage, CryptoCurrency, Platform, TransactionId,
    TransactionType, UserId, WalletId,
};

/// Operations of [`LedgerApi`], used to arm faults and count calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    FindUsers,
    GetUser,
    ListUsers,
    CreateUser,
    DeleteUser,
    FindAccounts,
    GetAccount,
    CreateAccount,
    UpdateAccount,
    DeleteAccount,
    FindPlatforms,
    CreatePlatform,
    FindCurrencies,
    CreateCurrency,
    FindWallets,
    GetWallet,
    CreateWallet,
    UpdateWallet,
    DeleteWallet,
    CreateTransaction,
    ListTransactions,
    DeleteTransaction,
    Call,
}

struct StoredUser {
    record: LedgerUser,
    password: String,
}

struct StoredMessage {
    platform: Platform,
    message: ChatMessage,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<UserId, StoredUser>,
    accounts: BTreeMap<AccountId, LedgerAccount>,
    platforms: BTreeMap<i64, LedgerPlatform>,
    currencies: BTreeMap<i64, LedgerCurrency>,
    wallets: BTreeMap<WalletId, LedgerCryptoWallet>,
    transactions: BTreeMap<TransactionId, LedgerTransaction>,
    messages: Vec<StoredMessage>,
}

#[derive(Default)]
struct Faults {
    /// Successful calls left before the armed fault fires.
    armed: HashMap<LedgerOp, usize>,
    /// Writes that land but whose reply is lost on the way back.
    lost: HashSet<LedgerOp>,
    calls: HashMap<LedgerOp, usize>,
}

pub struct InMemoryLedger {
    tables: Mutex<Tables>,
    faults: Mutex<Faults>,
    latency: Option<Duration>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            faults: Mutex::new(Faults::default()),
            latency: None,
        }
    }

    /// Delay every operation, so interleavings between requests show up.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Let `op` succeed `after` more times, then fail once as if the ledger
    /// were unreachable.
    pub async fn fail_after(&self, op: LedgerOp, after: usize) {
        self.faults.lock().await.armed.insert(op, after);
    }

    /// Let the next `op` write go through but report it as unreachable, like a
    /// request that timed out after the ledger committed it.
    pub async fn lose_reply(&self, op: LedgerOp) {
        self.faults.lock().await.lost.insert(op);
    }

    async fn reply_lost(&self, op: LedgerOp) -> Result<(), LedgerError> {
        if self.faults.lock().await.lost.remove(&op) {
            tracing::debug!("dropping reply of {:?}", op);
            return Err(LedgerError::Unavailable(format!("{:?} reply lost", op)));
        }
        Ok(())
    }

    pub async fn calls(&self, op: LedgerOp) -> usize {
        self.faults.lock().await.calls.get(&op).copied().unwrap_or(0)
    }

    pub async fn total_calls(&self) -> usize {
        self.faults.lock().await.calls.values().sum()
    }

    async fn enter(&self, op: LedgerOp) -> Result<(), LedgerError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut faults = self.faults.lock().await;
        *faults.calls.entry(op).or_default() += 1;
        let fire = match faults.armed.get_mut(&op) {
            Some(0) => true,
            Some(left) => {
                *left -= 1;
                false
            }
            None => false,
        };
        if fire {
            faults.armed.remove(&op);
            tracing::debug!("injected ledger fault on {:?}", op);
            return Err(LedgerError::Unavailable(format!("injected {:?} failure", op)));
        }
        Ok(())
    }

    // Seeding helpers. These bypass fault injection and call counting.

    pub async fn seed_user(&self, email: &str, full_name: &str, password: &str) -> LedgerUser {
        let mut t = self.tables.lock().await;
        t.insert_user(email, full_name, password)
    }

    pub async fn open_account(
        &self,
        user: UserId,
        platform: Platform,
        balance: Decimal,
        mobile_number: Option<&str>,
    ) -> LedgerAccount {
        let mut t = self.tables.lock().await;
        let platform_id = t.platform_id(platform.ledger_name());
        t.insert_account(user, platform_id, balance, mobile_number.map(str::to_string))
    }

    pub async fn open_wallet(
        &self,
        account: AccountId,
        symbol: &str,
        balance: Decimal,
    ) -> LedgerCryptoWallet {
        let mut t = self.tables.lock().await;
        let currency = t.currency(symbol);
        let id = t.next();
        let wallet = LedgerCryptoWallet {
            id,
            account,
            crypto_currency: CurrencyRef::Nested(currency.clone()),
            crypto_currency_symbol: Some(currency.symbol.clone()),
            balance,
            deposit_address: format!("{}-seed-{}", currency.symbol.to_lowercase(), id),
        };
        t.wallets.insert(id, wallet.clone());
        wallet
    }

    pub async fn account(&self, id: AccountId) -> Option<LedgerAccount> {
        self.tables.lock().await.accounts.get(&id).cloned()
    }

    pub async fn wallet(&self, id: WalletId) -> Option<LedgerCryptoWallet> {
        self.tables.lock().await.wallets.get(&id).cloned()
    }

    pub async fn transactions_of(&self, account: AccountId) -> Vec<LedgerTransaction> {
        self.tables
            .lock()
            .await
            .transactions
            .values()
            .filter(|t| t.account == account)
            .cloned()
            .collect()
    }

    pub async fn transaction_count(&self) -> usize {
        self.tables.lock().await.transactions.len()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }

    /// Demo data for `--in-memory` runs.
    pub async fn seed_demo(&self) {
        let alice = self.seed_user("alice@example.com", "Alice Martin", "password123").await;
        let bob = self.seed_user("bob@example.com", "Bob Stone", "password123").await;

        for platform in [Platform::PayFlow, Platform::QuickCash] {
            self.open_account(alice.id, platform, Decimal::new(50000, 2), None).await;
            self.open_account(bob.id, platform, Decimal::new(12500, 2), None).await;
        }
        self.open_account(alice.id, Platform::SendWave, Decimal::new(30000, 2), Some("+15550001"))
            .await;
        self.open_account(bob.id, Platform::SendWave, Decimal::new(7500, 2), Some("+15550002"))
            .await;

        for user in [&alice, &bob] {
            let account = self
                .open_account(user.id, Platform::CryptoPort, Decimal::new(100000, 2), None)
                .await;
            for currency in CryptoCurrency::ALL {
                let balance = match currency {
                    CryptoCurrency::BTC => Decimal::new(5, 1),
                    CryptoCurrency::ETH => Decimal::new(4, 0),
                    _ => Decimal::ZERO,
                };
                self.open_wallet(account.id, currency.symbol(), balance).await;
            }
        }
        tracing::info!("In-memory ledger seeded with demo users");
    }
}

fn missing_record(kind: &str, id: i64) -> LedgerError {
    LedgerError::Status {
        status: 404,
        message: format!("{} {} not found", kind, id),
    }
}

fn number(value: Decimal) -> Value {
    json!(value.to_f64().unwrap_or_default())
}

/// Accepts `12`, `"12"` and `12.0` the way a permissive JSON API does.
fn as_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_str<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}

fn query_value<'a>(request: &'a UpstreamRequest, key: &str) -> &'a str {
    request
        .query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or_default()
}

fn reply(status: u16, body: Value) -> UpstreamReply {
    UpstreamReply { status, body }
}

fn failure(status: u16, error: &str) -> UpstreamReply {
    reply(status, json!({ "success": false, "error": error }))
}

impl Tables {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_user(&mut self, email: &str, full_name: &str, password: &str) -> LedgerUser {
        let (first_name, last_name) = split_full_name(full_name);
        let id = self.next();
        let record = LedgerUser {
            id,
            username: email.to_string(),
            email: email.to_string(),
            first_name,
            last_name,
            date_joined: Some(Utc::now()),
        };
        self.users.insert(
            id,
            StoredUser {
                record: record.clone(),
                password: password.to_string(),
            },
        );
        record
    }

    fn platform_id(&mut self, name: &str) -> i64 {
        if let Some(p) = self.platforms.values().find(|p| p.name.eq_ignore_ascii_case(name)) {
            return p.id;
        }
        let id = self.next();
        self.platforms.insert(
            id,
            LedgerPlatform {
                id,
                name: name.to_string(),
            },
        );
        id
    }

    fn platform_name(&self, id: i64) -> Option<String> {
        self.platforms.get(&id).map(|p| p.name.clone())
    }

    fn currency(&mut self, symbol: &str) -> LedgerCurrency {
        let symbol = symbol.to_uppercase();
        if let Some(c) = self.currencies.values().find(|c| c.symbol == symbol) {
            return c.clone();
        }
        let id = self.next();
        let name = CryptoCurrency::from_symbol(&symbol)
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| symbol.clone());
        let currency = LedgerCurrency { id, symbol, name };
        self.currencies.insert(id, currency.clone());
        currency
    }

    fn insert_account(
        &mut self,
        user: UserId,
        platform: i64,
        balance: Decimal,
        mobile_number: Option<String>,
    ) -> LedgerAccount {
        let id = self.next();
        let account = LedgerAccount {
            id,
            user,
            platform,
            platform_name: self.platform_name(platform),
            balance,
            status: "active".to_string(),
            chat_enabled: false,
            mobile_number,
        };
        self.accounts.insert(id, account.clone());
        account
    }

    fn user_by_email(&self, email: &str) -> Option<&LedgerUser> {
        self.users
            .values()
            .map(|u| &u.record)
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
    }

    fn account_on(&self, user: UserId, platform: Platform) -> Option<&LedgerAccount> {
        self.accounts.values().find(|a| {
            a.user == user
                && a.platform_name
                    .as_deref()
                    .map_or(false, |n| n.eq_ignore_ascii_case(platform.ledger_name()))
        })
    }

    fn account_on_mut(&mut self, user: UserId, platform: Platform) -> Option<&mut LedgerAccount> {
        self.accounts.values_mut().find(|a| {
            a.user == user
                && a.platform_name
                    .as_deref()
                    .map_or(false, |n| n.eq_ignore_ascii_case(platform.ledger_name()))
        })
    }

    fn remove_account(&mut self, id: AccountId) {
        self.accounts.remove(&id);
        self.wallets.retain(|_, w| w.account != id);
        self.transactions.retain(|_, t| t.account != id);
    }

    fn profile_json(&self, user: &LedgerUser, account: Option<&LedgerAccount>) -> Value {
        let joined = user.date_joined.unwrap_or_else(Utc::now);
        let mut profile = json!({
            "id": user.id,
            "email": user.email,
            "fullName": user.full_name(),
            "balance": account.map(|a| number(a.balance)).unwrap_or(json!(0.0)),
            "createdAt": joined,
            "updatedAt": joined,
        });
        if let Some(mobile) = account.and_then(|a| a.mobile_number.clone()) {
            profile["mobileNumber"] = json!(mobile);
        }
        profile
    }

    fn chat_name(&self, email: &str) -> (String, Option<String>) {
        match self.user_by_email(email) {
            Some(u) => (u.id.to_string(), Some(u.full_name())),
            None => (email.to_string(), None),
        }
    }

    // Platform endpoints.

    fn register(&mut self, platform: Platform, body: &Value) -> UpstreamReply {
        let email = as_str(body, "email").unwrap_or_default().trim().to_lowercase();
        let password = as_str(body, "password").unwrap_or_default();
        if email.is_empty() || password.is_empty() {
            return failure(400, "Email and password are required");
        }
        if self.user_by_email(&email).is_some() {
            return failure(400, "User with this email already exists");
        }
        let mobile = as_str(body, "mobileNumber").map(str::to_string);
        if platform == Platform::SendWave {
            let taken = mobile.as_deref().map_or(false, |m| {
                self.accounts
                    .values()
                    .any(|a| a.mobile_number.as_deref() == Some(m))
            });
            if taken {
                return failure(400, "Mobile number already registered");
            }
        }

        let full_name = as_str(body, "fullName").unwrap_or_default();
        let user = self.insert_user(&email, full_name, password);
        let platform_id = self.platform_id(platform.ledger_name());
        let account = self.insert_account(user.id, platform_id, Decimal::ZERO, mobile);
        reply(
            201,
            json!({
                "success": true,
                "message": "User registered successfully",
                "data": self.profile_json(&user, Some(&account)),
            }),
        )
    }

    fn login(&self, body: &Value) -> UpstreamReply {
        let email = as_str(body, "email").unwrap_or_default();
        let password = as_str(body, "password").unwrap_or_default();
        let stored = self
            .users
            .values()
            .find(|u| u.record.email.eq_ignore_ascii_case(email.trim()));
        match stored {
            None => failure(404, "User not found"),
            Some(u) if u.password != password => failure(401, "Invalid email or password"),
            Some(u) => reply(
                200,
                json!({
                    "success": true,
                    "message": "Login successful",
                    "data": {
                        "id": u.record.id,
                        "email": u.record.email,
                        "fullName": u.record.full_name(),
                    },
                }),
            ),
        }
    }

    fn user_by_mobile(&self, mobile: &str) -> UpstreamReply {
        let found = self.accounts.values().find(|a| {
            a.mobile_number.as_deref() == Some(mobile)
                && a.platform_name.as_deref() == Some(Platform::SendWave.ledger_name())
        });
        match found.and_then(|a| self.users.get(&a.user).map(|u| (u, a))) {
            Some((u, a)) => reply(
                200,
                json!({ "success": true, "data": self.profile_json(&u.record, Some(a)) }),
            ),
            None => failure(404, "User not found"),
        }
    }

    fn search(&self, platform: Platform, needle: &str) -> UpstreamReply {
        let needle = needle.trim().to_lowercase();
        let hits: Vec<Value> = self
            .accounts
            .values()
            .filter(|a| a.platform_name.as_deref() == Some(platform.ledger_name()))
            .filter_map(|a| self.users.get(&a.user).map(|u| (&u.record, a)))
            .filter(|(u, a)| {
                !needle.is_empty()
                    && (a.mobile_number.as_deref().map_or(false, |m| m.contains(&needle))
                        || (platform != Platform::SendWave
                            && (u.email.to_lowercase().contains(&needle)
                                || u.full_name().to_lowercase().contains(&needle))))
            })
            .map(|(u, a)| self.profile_json(u, Some(a)))
            .collect();
        reply(200, json!({ "success": true, "data": hits }))
    }

    fn chat_send(&mut self, platform: Platform, body: &Value) -> UpstreamReply {
        let sender_email = as_str(body, "sender_email").unwrap_or_default().to_string();
        let receiver_email = as_str(body, "receiver_email").unwrap_or_default().to_string();
        let text = as_str(body, "message").unwrap_or_default().trim().to_string();
        if sender_email.is_empty() || receiver_email.is_empty() || text.is_empty() {
            return failure(400, "sender_email, receiver_email and message are required");
        }

        let (sender, sender_name) = self.chat_name(&sender_email);
        let (receiver, receiver_name) = self.chat_name(&receiver_email);
        let id = self.next();
        let message = ChatMessage {
            id: id.to_string(),
            sender,
            receiver,
            message: text,
            timestamp: Utc::now(),
            is_read: false,
            sender_name,
            sender_email: Some(sender_email),
            receiver_name,
            receiver_email: Some(receiver_email),
        };
        self.messages.push(StoredMessage {
            platform,
            message: message.clone(),
        });
        reply(
            201,
            json!({ "success": true, "message": "Message sent successfully", "data": message }),
        )
    }

    fn chat_history(&self, platform: Platform, email: &str) -> UpstreamReply {
        let history: Vec<&ChatMessage> = self
            .messages
            .iter()
            .filter(|m| m.platform == platform)
            .map(|m| &m.message)
            .filter(|m| {
                m.sender_email.as_deref() == Some(email) || m.receiver_email.as_deref() == Some(email)
            })
            .collect();
        reply(200, json!({ "success": true, "data": history }))
    }

    fn chat_unread(&self, platform: Platform, email: &str) -> UpstreamReply {
        let count = self
            .messages
            .iter()
            .filter(|m| m.platform == platform)
            .filter(|m| m.message.receiver_email.as_deref() == Some(email) && !m.message.is_read)
            .count();
        reply(200, json!({ "success": true, "unread_count": count }))
    }

    fn chat_mark_read(&mut self, platform: Platform, email: &str) -> UpstreamReply {
        for stored in self.messages.iter_mut().filter(|m| m.platform == platform) {
            if stored.message.receiver_email.as_deref() == Some(email) {
                stored.message.is_read = true;
            }
        }
        reply(200, json!({ "success": true, "message": "Messages marked as read" }))
    }

    fn chat_status(&self, platform: Platform, email: &str) -> UpstreamReply {
        let enabled = self
            .user_by_email(email)
            .and_then(|u| self.account_on(u.id, platform))
            .map(|a| a.chat_enabled);
        match enabled {
            Some(chat_enabled) => reply(200, json!({ "success": true, "chat_enabled": chat_enabled })),
            None => failure(404, "User not found"),
        }
    }

    fn toggle_chat(&mut self, platform: Platform, user: &str) -> UpstreamReply {
        let account = user
            .trim()
            .parse::<UserId>()
            .ok()
            .and_then(|id| self.account_on_mut(id, platform));
        match account {
            Some(account) => {
                account.chat_enabled = !account.chat_enabled;
                let enabled = account.chat_enabled;
                let message = if enabled { "Chat enabled" } else { "Chat disabled" };
                reply(
                    200,
                    json!({ "success": true, "chat_enabled": enabled, "message": message }),
                )
            }
            None => failure(404, "User not found"),
        }
    }

    fn admin_transactions(&self, platform: Platform) -> UpstreamReply {
        let rows: Vec<Value> = self
            .transactions
            .values()
            .rev()
            .filter_map(|t| self.accounts.get(&t.account).map(|a| (t, a)))
            .filter(|(_, a)| a.platform_name.as_deref() == Some(platform.ledger_name()))
            .map(|(t, a)| {
                let mut row = serde_json::to_value(t).unwrap_or(Value::Null);
                if let Some(user) = self.users.get(&a.user) {
                    row["user_email"] = json!(user.record.email);
                }
                row
            })
            .collect();
        reply(200, json!({ "success": true, "data": rows }))
    }

    fn adjust_balance(&mut self, body: &Value) -> UpstreamReply {
        let (Some(user), Some(amount)) = (as_i64(body.get("userId")), as_decimal(body.get("amount")))
        else {
            return failure(400, "userId and amount are required");
        };
        let reason = as_str(body, "reason")
            .unwrap_or("Admin balance adjustment")
            .to_string();
        let Some(account) = self.account_on_mut(user, Platform::SendWave) else {
            return failure(404, "User account not found");
        };
        let balance = account.balance + amount;
        if balance < Decimal::ZERO {
            return failure(400, "Balance cannot be negative");
        }
        account.balance = balance;
        let account_id = account.id;

        let id = self.next();
        self.transactions.insert(
            id,
            LedgerTransaction {
                id,
                account: account_id,
                sender_account: None,
                crypto_wallet: None,
                crypto_symbol: None,
                amount,
                transaction_type: TransactionType::AdminAdjusted.as_str().to_string(),
                status: "completed".to_string(),
                date: Some(Utc::now()),
                reason: Some(reason),
                recipient: "admin".to_string(),
            },
        );
        reply(
            200,
            json!({
                "success": true,
                "message": "Balance adjusted successfully",
                "data": { "newBalance": number(balance) },
            }),
        )
    }

    fn edit_user(&mut self, platform: Platform, user: Option<UserId>, body: &Value) -> UpstreamReply {
        let Some(user_id) = user.filter(|id| self.users.contains_key(id)) else {
            return failure(404, "User not found");
        };

        if let Some(email) = as_str(body, "email").map(|e| e.trim().to_lowercase()) {
            let clash = self
                .user_by_email(&email)
                .map_or(false, |other| other.id != user_id);
            if clash {
                return failure(400, "User with this email already exists");
            }
            if let Some(stored) = self.users.get_mut(&user_id) {
                stored.record.username = email.clone();
                stored.record.email = email;
            }
        }
        if let Some(full_name) = as_str(body, "fullName") {
            let (first, last) = split_full_name(full_name);
            if let Some(stored) = self.users.get_mut(&user_id) {
                stored.record.first_name = first;
                stored.record.last_name = last;
            }
        }
        if let Some(account) = self.account_on_mut(user_id, platform) {
            if let Some(mobile) = as_str(body, "mobileNumber") {
                account.mobile_number = Some(mobile.to_string());
            }
            if let Some(status) = as_str(body, "status") {
                account.status = status.to_string();
            }
        }

        let Some(user) = self.users.get(&user_id).map(|u| u.record.clone()) else {
            return failure(404, "User not found");
        };
        let account = self.account_on(user_id, platform);
        reply(
            200,
            json!({
                "success": true,
                "message": "User updated successfully",
                "data": self.profile_json(&user, account),
            }),
        )
    }

    fn route(&mut self, request: &UpstreamRequest) -> UpstreamReply {
        let segments: Vec<String> = request
            .path
            .trim_matches('/')
            .split('/')
            .map(|s| {
                urlencoding::decode(s)
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            })
            .collect();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let Some(platform) = segments.first().and_then(|s| Platform::from_slug(s)) else {
            return failure(404, "Not found");
        };
        let body = request.body.clone().unwrap_or(Value::Null);
        let query = |key: &str| query_value(request, key).to_string();

        use UpstreamMethod::*;
        match (request.method, &segments[1..]) {
            (Post, ["register"]) => self.register(platform, &body),
            (Post, ["login"]) => self.login(&body),
            (Get, ["user", "mobile", mobile]) if platform == Platform::SendWave => {
                self.user_by_mobile(mobile)
            }
            (Get, ["user", "search"]) if platform == Platform::SendWave => {
                self.search(platform, &query("q"))
            }
            (Get, ["search"]) if platform == Platform::QuickCash => {
                self.search(platform, &query("query"))
            }
            (Post, ["chat", "send"]) => self.chat_send(platform, &body),
            (Get, ["chat", "history", email]) => self.chat_history(platform, email),
            (Get, ["chat", "unread", email]) => self.chat_unread(platform, email),
            (Post, ["chat", "mark-read", email]) => self.chat_mark_read(platform, email),
            (Get, ["chat", "status", email]) => self.chat_status(platform, email),
            (Post, ["admin", "user", user, "toggle-chat"]) => self.toggle_chat(platform, user),
            (Get, ["admin", "transactions"]) => self.admin_transactions(platform),
            (Post, ["admin", "adjust-balance"]) if platform == Platform::SendWave => {
                self.adjust_balance(&body)
            }
            (Put, ["admin", "user", user, "update"]) if platform == Platform::SendWave => {
                self.edit_user(platform, user.parse().ok(), &body)
            }
            (Put, ["admin", "edit-user"]) if platform == Platform::QuickCash => {
                self.edit_user(platform, as_i64(body.get("userId")), &body)
            }
            _ => failure(404, "Not found"),
        }
    }
}

#[async_trait]
impl LedgerApi for InMemoryLedger {
    async fn find_users_by_email(&self, email: &str) -> Result<Vec<LedgerUser>, LedgerError> {
        self.enter(LedgerOp::FindUsers).await?;
        let t = self.tables.lock().await;
        Ok(t.user_by_email(email).cloned().into_iter().collect())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<LedgerUser>, LedgerError> {
        self.enter(LedgerOp::GetUser).await?;
        Ok(self.tables.lock().await.users.get(&id).map(|u| u.record.clone()))
    }

    async fn list_users(&self) -> Result<Vec<LedgerUser>, LedgerError> {
        self.enter(LedgerOp::ListUsers).await?;
        let t = self.tables.lock().await;
        Ok(t.users.values().map(|u| u.record.clone()).collect())
    }

    async fn create_user(&self, user: &NewUser) -> Result<LedgerUser, LedgerError> {
        self.enter(LedgerOp::CreateUser).await?;
        let mut t = self.tables.lock().await;
        if t.user_by_email(&user.email).is_some() {
            return Err(LedgerError::Status {
                status: 400,
                message: "A user with that username already exists.".to_string(),
            });
        }
        let full_name = crate::models::user::join_full_name(&user.first_name, &user.last_name);
        let mut created = t.insert_user(&user.email, &full_name, &user.password);
        created.username = user.username.clone();
        if let Some(stored) = t.users.get_mut(&created.id) {
            stored.record.username = user.username.clone();
        }
        drop(t);
        self.reply_lost(LedgerOp::CreateUser).await?;
        Ok(created)
    }

    async fn delete_user(&self, id: UserId) -> Result<(), LedgerError> {
        self.enter(LedgerOp::DeleteUser).await?;
        let mut t = self.tables.lock().await;
        t.users.remove(&id);
        let owned: Vec<AccountId> = t
            .accounts
            .values()
            .filter(|a| a.user == id)
            .map(|a| a.id)
            .collect();
        for account in owned {
            t.remove_account(account);
        }
        Ok(())
    }

    async fn find_accounts(
        &self,
        user: UserId,
        platform_name: &str,
    ) -> Result<Vec<LedgerAccount>, LedgerError> {
        self.enter(LedgerOp::FindAccounts).await?;
        let t = self.tables.lock().await;
        Ok(t.accounts
            .values()
            .filter(|a| a.user == user)
            .filter(|a| {
                a.platform_name
                    .as_deref()
                    .map_or(false, |n| n.eq_ignore_ascii_case(platform_name))
            })
            .cloned()
            .collect())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<LedgerAccount>, LedgerError> {
        self.enter(LedgerOp::GetAccount).await?;
        Ok(self.tables.lock().await.accounts.get(&id).cloned())
    }

    async fn create_account(&self, account: &NewAccount) -> Result<LedgerAccount, LedgerError> {
        self.enter(LedgerOp::CreateAccount).await?;
        let mut t = self.tables.lock().await;
        if !t.users.contains_key(&account.user) {
            return Err(missing_record("user", account.user));
        }
        if !t.platforms.contains_key(&account.platform) {
            return Err(missing_record("platform", account.platform));
        }
        let mut created = t.insert_account(
            account.user,
            account.platform,
            account.balance,
            account.mobile_number.clone(),
        );
        created.status = account.status.clone();
        t.accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_account(&self, account: &LedgerAccount) -> Result<LedgerAccount, LedgerError> {
        self.enter(LedgerOp::UpdateAccount).await?;
        let mut t = self.tables.lock().await;
        let stored = t
            .accounts
            .get_mut(&account.id)
            .ok_or_else(|| missing_record("account", account.id))?;
        stored.balance = account.balance;
        stored.status = account.status.clone();
        stored.chat_enabled = account.chat_enabled;
        stored.mobile_number = account.mobile_number.clone();
        Ok(stored.clone())
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), LedgerError> {
        self.enter(LedgerOp::DeleteAccount).await?;
        self.tables.lock().await.remove_account(id);
        Ok(())
    }

    async fn find_platforms(&self, name: &str) -> Result<Vec<LedgerPlatform>, LedgerError> {
        self.enter(LedgerOp::FindPlatforms).await?;
        let t = self.tables.lock().await;
        Ok(t.platforms
            .values()
            .filter(|p| p.name.eq_ignore_ascii_case(name))
            .cloned()
            .collect())
    }

    async fn create_platform(&self, name: &str) -> Result<LedgerPlatform, LedgerError> {
        self.enter(LedgerOp::CreatePlatform).await?;
        let mut t = self.tables.lock().await;
        let id = t.platform_id(name);
        Ok(LedgerPlatform {
            id,
            name: name.to_string(),
        })
    }

    async fn find_currencies(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<LedgerCurrency>, LedgerError> {
        self.enter(LedgerOp::FindCurrencies).await?;
        let t = self.tables.lock().await;
        Ok(t.currencies
            .values()
            .filter(|c| symbol.map_or(true, |s| c.symbol.eq_ignore_ascii_case(s)))
            .cloned()
            .collect())
    }

    async fn create_currency(
        &self,
        symbol: &str,
        name: &str,
    ) -> Result<LedgerCurrency, LedgerError> {
        self.enter(LedgerOp::CreateCurrency).await?;
        let mut t = self.tables.lock().await;
        let mut currency = t.currency(symbol);
        if currency.name != name {
            currency.name = name.to_string();
            t.currencies.insert(currency.id, currency.clone());
        }
        Ok(currency)
    }

    async fn find_wallets(
        &self,
        account: AccountId,
        symbol: Option<&str>,
    ) -> Result<Vec<LedgerCryptoWallet>, LedgerError> {
        self.enter(LedgerOp::FindWallets).await?;
        let t = self.tables.lock().await;
        Ok(t.wallets
            .values()
            .filter(|w| w.account == account)
            .filter(|w| {
                symbol.map_or(true, |s| {
                    w.symbol().map_or(false, |have| have.eq_ignore_ascii_case(s))
                })
            })
            .cloned()
            .collect())
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Option<LedgerCryptoWallet>, LedgerError> {
        self.enter(LedgerOp::GetWallet).await?;
        Ok(self.tables.lock().await.wallets.get(&id).cloned())
    }

    async fn create_wallet(
        &self,
        wallet: &NewCryptoWallet,
    ) -> Result<LedgerCryptoWallet, LedgerError> {
        self.enter(LedgerOp::CreateWallet).await?;
        let mut t = self.tables.lock().await;
        if !t.accounts.contains_key(&wallet.account) {
            return Err(missing_record("account", wallet.account));
        }
        let currency = t
            .currencies
            .get(&wallet.crypto_currency)
            .cloned()
            .ok_or_else(|| missing_record("crypto currency", wallet.crypto_currency))?;
        let id = t.next();
        let created = LedgerCryptoWallet {
            id,
            account: wallet.account,
            crypto_currency_symbol: Some(currency.symbol.clone()),
            crypto_currency: CurrencyRef::Nested(currency),
            balance: wallet.balance,
            deposit_address: wallet.deposit_address.clone(),
        };
        t.wallets.insert(id, created.clone());
        Ok(created)
    }

    async fn update_wallet(
        &self,
        wallet: &LedgerCryptoWallet,
    ) -> Result<LedgerCryptoWallet, LedgerError> {
        self.enter(LedgerOp::UpdateWallet).await?;
        let mut t = self.tables.lock().await;
        let stored = t
            .wallets
            .get_mut(&wallet.id)
            .ok_or_else(|| missing_record("crypto wallet", wallet.id))?;
        stored.balance = wallet.balance;
        stored.deposit_address = wallet.deposit_address.clone();
        Ok(stored.clone())
    }

    async fn delete_wallet(&self, id: WalletId) -> Result<(), LedgerError> {
        self.enter(LedgerOp::DeleteWallet).await?;
        let mut t = self.tables.lock().await;
        t.wallets.remove(&id);
        Ok(())
    }

    async fn create_transaction(
        &self,
        tx: &NewTransaction,
    ) -> Result<LedgerTransaction, LedgerError> {
        self.enter(LedgerOp::CreateTransaction).await?;
        let mut t = self.tables.lock().await;
        if !t.accounts.contains_key(&tx.account) {
            return Err(missing_record("account", tx.account));
        }
        let wallet = tx.crypto_wallet.and_then(|id| t.wallets.get(&id).cloned());
        let id = t.next();
        let status = serde_json::to_value(tx.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "completed".to_string());
        let created = LedgerTransaction {
            id,
            account: tx.account,
            sender_account: tx.sender_account,
            crypto_symbol: wallet.as_ref().and_then(LedgerCryptoWallet::symbol),
            crypto_wallet: tx.crypto_wallet.map(|w| json!(w)),
            amount: tx.amount,
            transaction_type: tx.transaction_type.as_str().to_string(),
            status,
            date: Some(Utc::now()),
            reason: tx.reason.clone(),
            recipient: tx.recipient.clone(),
        };
        t.transactions.insert(id, created.clone());
        drop(t);
        self.reply_lost(LedgerOp::CreateTransaction).await?;
        Ok(created)
    }

    async fn list_transactions(
        &self,
        account: AccountId,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        self.enter(LedgerOp::ListTransactions).await?;
        let t = self.tables.lock().await;
        let mut rows: Vec<LedgerTransaction> = t
            .transactions
            .values()
            .filter(|tx| tx.account == account)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn delete_transaction(&self, id: TransactionId) -> Result<(), LedgerError> {
        self.enter(LedgerOp::DeleteTransaction).await?;
        self.tables.lock().await.transactions.remove(&id);
        Ok(())
    }

    async fn call(&self, request: UpstreamRequest) -> Result<UpstreamReply, LedgerError> {
        self.enter(LedgerOp::Call).await?;
        let mut t = self.tables.lock().await;
        Ok(t.route(&request))
    }
}
