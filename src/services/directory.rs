//! User, account and wallet lookups, profile assembly and registration.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::ledger::{
    segment, LedgerAccount, LedgerApi, LedgerCryptoWallet, LedgerCurrency, LedgerPlatform,
    LedgerTransaction, LedgerUser, NewAccount, NewCryptoWallet, NewUser, UpstreamReply,
    UpstreamRequest,
};
use crate::models::{
    user::split_full_name, CryptoCurrency, CryptoUser, CryptoWallet, Platform, Profile,
    Transaction, User, UserId,
};
use crate::services::saga::{self, CompensationLog};
use crate::utils::address::deposit_address;

/// Concurrent per-user lookups when listing a platform's users.
const LIST_CONCURRENCY: usize = 8;

/// Registration input after the route has parsed it.
#[derive(Clone, Debug)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub mobile_number: Option<String>,
}

#[derive(Clone)]
pub struct Directory {
    ledger: Arc<dyn LedgerApi>,
    starting_balance: Decimal,
}

/// Map a non-2xx platform endpoint answer to an error with the ledger's status.
pub fn upstream_failure(reply: &UpstreamReply, fallback: &str) -> ApiError {
    ApiError::from(crate::ledger::LedgerError::Status {
        status: reply.status,
        message: reply.error_message(fallback),
    })
}

fn json_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_decimal(value: &Value) -> Decimal {
    match value {
        Value::Number(n) => n.to_string().parse().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}

fn json_time(value: &Value) -> DateTime<Utc> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Reshape the `data` of a platform endpoint answer into a [`User`].
pub fn user_from_upstream(data: &Value) -> ApiResult<User> {
    let id = data.get("id").and_then(json_id).ok_or(ApiError::UnexpectedResponse)?;
    let text = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Ok(User {
        id: id.to_string(),
        email: text("email"),
        full_name: text("fullName"),
        mobile_number: data
            .get("mobileNumber")
            .and_then(Value::as_str)
            .map(str::to_string),
        balance: data.get("balance").map(json_decimal).unwrap_or_default(),
        created_at: data.get("createdAt").map(json_time).unwrap_or_else(Utc::now),
        updated_at: data.get("updatedAt").map(json_time).unwrap_or_else(Utc::now),
    })
}

/// Ledger transaction as the browser sees it. Kinds this gateway does not know
/// are skipped.
pub fn to_transaction(tx: &LedgerTransaction, platform: Platform) -> Option<Transaction> {
    let Some(kind) = tx.kind() else {
        tracing::warn!(
            "Skipping transaction {} with unknown type '{}'",
            tx.id,
            tx.transaction_type
        );
        return None;
    };
    Some(Transaction {
        id: tx.id.to_string(),
        sender_id: tx.account.to_string(),
        recipient: tx.recipient.clone(),
        amount: tx.amount,
        reason: tx.reason.clone(),
        transaction_type: kind,
        status: tx.status(),
        date: tx.date.unwrap_or_else(Utc::now),
        crypto_symbol: platform
            .has_crypto_wallets()
            .then(|| tx.symbol().unwrap_or_else(|| "FIAT".to_string())),
    })
}

pub fn to_wallet(wallet: &LedgerCryptoWallet, currencies: &[LedgerCurrency]) -> CryptoWallet {
    let known = currencies.iter().find(|c| c.id == wallet.crypto_currency.id());
    let symbol = wallet
        .symbol()
        .or_else(|| known.map(|c| c.symbol.clone()))
        .unwrap_or_default();
    let name = wallet
        .currency_name()
        .or_else(|| known.map(|c| c.name.clone()))
        .or_else(|| CryptoCurrency::from_symbol(&symbol).map(|c| c.name().to_string()))
        .unwrap_or_else(|| symbol.clone());
    CryptoWallet {
        id: wallet.id.to_string(),
        crypto_symbol: symbol,
        crypto_name: name,
        balance: wallet.balance,
        deposit_address: wallet.deposit_address.clone(),
    }
}

impl Directory {
    pub fn new(ledger: Arc<dyn LedgerApi>, starting_balance: Decimal) -> Self {
        Self {
            ledger,
            starting_balance,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerApi> {
        &self.ledger
    }

    pub async fn find_user(&self, email: &str, missing: &str) -> ApiResult<LedgerUser> {
        self.ledger
            .find_users_by_email(email.trim())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::not_found(missing))
    }

    pub async fn user_by_id(&self, id: UserId, missing: &str) -> ApiResult<LedgerUser> {
        self.ledger
            .get_user(id)
            .await?
            .ok_or_else(|| ApiError::not_found(missing))
    }

    /// SendWave resolves people by phone number through its own endpoint.
    pub async fn find_user_by_mobile(&self, mobile: &str, missing: &str) -> ApiResult<LedgerUser> {
        let reply = self
            .ledger
            .call(UpstreamRequest::get(format!(
                "sendwave/user/mobile/{}",
                segment(mobile.trim())
            )))
            .await?;
        if reply.status == 404 {
            return Err(ApiError::not_found(missing));
        }
        if !reply.is_success() {
            return Err(upstream_failure(&reply, missing));
        }
        let id = reply
            .data()
            .get("id")
            .and_then(json_id)
            .ok_or(ApiError::UnexpectedResponse)?;
        self.user_by_id(id, missing).await
    }

    pub async fn account_of(
        &self,
        user: UserId,
        platform: Platform,
    ) -> ApiResult<Option<LedgerAccount>> {
        Ok(self
            .ledger
            .find_accounts(user, platform.ledger_name())
            .await?
            .into_iter()
            .next())
    }

    pub async fn require_account(
        &self,
        user: UserId,
        platform: Platform,
        missing: &str,
    ) -> ApiResult<LedgerAccount> {
        self.account_of(user, platform)
            .await?
            .ok_or_else(|| ApiError::not_found(missing))
    }

    pub async fn wallet(
        &self,
        account: &LedgerAccount,
        symbol: &str,
        missing: &str,
    ) -> ApiResult<LedgerCryptoWallet> {
        self.ledger
            .find_wallets(account.id, Some(symbol))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::not_found(missing))
    }

    pub async fn fiat_profile(&self, user: &LedgerUser, platform: Platform) -> ApiResult<User> {
        let account = self.account_of(user.id, platform).await?;
        let joined = user.date_joined.unwrap_or_else(Utc::now);
        Ok(User {
            id: user.id.to_string(),
            email: user.email.clone(),
            full_name: user.full_name(),
            mobile_number: account.as_ref().and_then(|a| a.mobile_number.clone()),
            balance: account.map(|a| a.balance).unwrap_or_default(),
            created_at: joined,
            updated_at: Utc::now(),
        })
    }

    pub async fn crypto_profile(
        &self,
        user: &LedgerUser,
        account: &LedgerAccount,
    ) -> ApiResult<CryptoUser> {
        let wallets = self.ledger.find_wallets(account.id, None).await?;
        let currencies = if wallets.iter().any(|w| w.symbol().is_none()) {
            self.ledger.find_currencies(None).await?
        } else {
            Vec::new()
        };

        let crypto_balances: BTreeMap<String, f64> = wallets
            .iter()
            .map(|w| to_wallet(w, &currencies))
            .map(|w| (w.crypto_symbol, w.balance.to_f64().unwrap_or_default()))
            .collect();

        let joined = user.date_joined.unwrap_or_else(Utc::now);
        Ok(CryptoUser {
            id: user.id.to_string(),
            email: user.email.clone(),
            full_name: user.full_name(),
            fiat_balance: account.balance,
            crypto_balances,
            created_at: joined,
            updated_at: Utc::now(),
        })
    }

    /// Platform profile. CryptoPort profiles need the CryptoPort account.
    pub async fn profile(&self, user: &LedgerUser, platform: Platform) -> ApiResult<Profile> {
        if platform.has_crypto_wallets() {
            let account = self
                .require_account(user.id, platform, platform.missing_account_message())
                .await?;
            Ok(Profile::Crypto(self.crypto_profile(user, &account).await?))
        } else {
            Ok(Profile::Fiat(self.fiat_profile(user, platform).await?))
        }
    }

    pub async fn profile_by_email(&self, email: &str, platform: Platform) -> ApiResult<Profile> {
        let user = self.find_user(email, "User not found").await?;
        self.profile(&user, platform).await
    }

    pub async fn profile_by_id(&self, id: UserId, platform: Platform) -> ApiResult<Profile> {
        let user = self.user_by_id(id, "User not found").await?;
        self.profile(&user, platform).await
    }

    /// Every user holding an account on `platform`.
    pub async fn list_profiles(&self, platform: Platform) -> ApiResult<Vec<Profile>> {
        let users = self.ledger.list_users().await?;

        let profiles: Vec<Option<Profile>> = stream::iter(users)
            .map(|user| async move {
                let Some(account) = self.account_of(user.id, platform).await? else {
                    return Ok::<_, ApiError>(None);
                };
                let profile = if platform.has_crypto_wallets() {
                    Profile::Crypto(self.crypto_profile(&user, &account).await?)
                } else {
                    Profile::Fiat(self.fiat_profile(&user, platform).await?)
                };
                Ok(Some(profile))
            })
            .buffered(LIST_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(profiles.into_iter().flatten().collect())
    }

    pub async fn transactions_of(
        &self,
        user: &LedgerUser,
        platform: Platform,
    ) -> ApiResult<Vec<Transaction>> {
        let account = self
            .require_account(user.id, platform, platform.missing_account_message())
            .await?;
        let rows = self.ledger.list_transactions(account.id).await?;
        Ok(rows
            .iter()
            .filter_map(|tx| to_transaction(tx, platform))
            .collect())
    }

    pub async fn transactions_by_email(
        &self,
        email: &str,
        platform: Platform,
    ) -> ApiResult<Vec<Transaction>> {
        let user = self.find_user(email, "User not found").await?;
        self.transactions_of(&user, platform).await
    }

    pub async fn wallets_by_email(&self, email: &str) -> ApiResult<Vec<CryptoWallet>> {
        let user = self.find_user(email, "User not found").await?;
        let account = self
            .require_account(user.id, Platform::CryptoPort, "CryptoPort account not found")
            .await?;
        let wallets = self.ledger.find_wallets(account.id, None).await?;
        let currencies = self.ledger.find_currencies(None).await?;
        Ok(wallets.iter().map(|w| to_wallet(w, &currencies)).collect())
    }

    /// Check credentials against the platform's login endpoint, then answer with
    /// the platform profile.
    pub async fn login(&self, platform: Platform, email: &str, password: &str) -> ApiResult<Profile> {
        let email = email.trim().to_lowercase();
        let reply = self
            .ledger
            .call(UpstreamRequest::post(
                format!("{}/login", platform.slug()),
                Some(json!({ "email": email, "password": password })),
            ))
            .await?;
        if !reply.is_success() {
            return Err(upstream_failure(&reply, "Invalid email or password"));
        }
        self.profile_by_email(&email, platform).await
    }

    pub async fn register(&self, platform: Platform, registration: Registration) -> ApiResult<Profile> {
        let registration = Registration {
            email: registration.email.trim().to_lowercase(),
            ..registration
        };
        if registration.email.is_empty() || registration.password.is_empty() {
            return Err(ApiError::validation("Email and password are required"));
        }

        if platform.has_crypto_wallets() {
            return self.register_crypto(registration).await.map(Profile::Crypto);
        }

        let mut body = json!({
            "email": registration.email,
            "password": registration.password,
            "fullName": registration.full_name,
        });
        if let Some(mobile) = &registration.mobile_number {
            body["mobileNumber"] = json!(mobile);
        }
        let reply = self
            .ledger
            .call(UpstreamRequest::post(
                format!("{}/register", platform.slug()),
                Some(body),
            ))
            .await?;
        if !reply.is_success() {
            return Err(upstream_failure(&reply, "Failed to create user"));
        }
        let user = user_from_upstream(reply.data())?;
        tracing::info!("Registered {} user {}", platform.slug(), user.id);
        Ok(Profile::Fiat(user))
    }

    /// CryptoPort has no registration endpoint on the ledger; the account and
    /// its wallets are assembled here.
    async fn register_crypto(&self, registration: Registration) -> ApiResult<CryptoUser> {
        if !self
            .ledger
            .find_users_by_email(&registration.email)
            .await?
            .is_empty()
        {
            return Err(ApiError::validation("User with this email already exists"));
        }

        let platform = self.platform_record(Platform::CryptoPort).await?;
        let currencies = self.ensure_currencies().await?;

        let mut log = CompensationLog::begin(self.ledger.clone(), "register_cryptoport");
        let starting_balance = self.starting_balance;
        let (user, account) = saga::detached(async move {
            let result = open_crypto_account(
                &mut log,
                &registration,
                &platform,
                &currencies,
                starting_balance,
            )
            .await;
            log.finish(result).await
        })
        .await?;
        tracing::info!("Registered CryptoPort user {}", user.id);
        self.crypto_profile(&user, &account).await
    }

    pub async fn platform_record(&self, platform: Platform) -> ApiResult<LedgerPlatform> {
        let name = platform.ledger_name();
        match self.ledger.find_platforms(name).await?.into_iter().next() {
            Some(found) => Ok(found),
            None => {
                tracing::info!("Creating ledger platform {}", name);
                Ok(self.ledger.create_platform(name).await?)
            }
        }
    }

    /// Every supported currency, created on the ledger if missing.
    async fn ensure_currencies(&self) -> ApiResult<Vec<LedgerCurrency>> {
        let existing = self.ledger.find_currencies(None).await?;
        let mut currencies = Vec::with_capacity(CryptoCurrency::ALL.len());
        for currency in CryptoCurrency::ALL {
            match existing
                .iter()
                .find(|c| c.symbol.eq_ignore_ascii_case(currency.symbol()))
            {
                Some(found) => currencies.push(found.clone()),
                None => {
                    tracing::info!("Creating crypto currency {}", currency);
                    currencies.push(
                        self.ledger
                            .create_currency(currency.symbol(), currency.name())
                            .await?,
                    );
                }
            }
        }
        Ok(currencies)
    }

    /// Remove a CryptoPort user: wallets, then the account, then the user.
    pub async fn delete_crypto_user(&self, id: UserId) -> ApiResult<()> {
        let user = self.user_by_id(id, "User not found").await?;
        if let Some(account) = self.account_of(user.id, Platform::CryptoPort).await? {
            for wallet in self.ledger.find_wallets(account.id, None).await? {
                self.ledger.delete_wallet(wallet.id).await?;
            }
            self.ledger.delete_account(account.id).await?;
        }
        self.ledger.delete_user(user.id).await?;
        tracing::info!("Deleted CryptoPort user {}", user.id);
        Ok(())
    }
}

/// User, account and one wallet per currency, each write logged.
async fn open_crypto_account(
    log: &mut CompensationLog,
    registration: &Registration,
    platform: &LedgerPlatform,
    currencies: &[LedgerCurrency],
    starting_balance: Decimal,
) -> ApiResult<(LedgerUser, LedgerAccount)> {
    let (first_name, last_name) = split_full_name(&registration.full_name);
    let user = log
        .create_user(&NewUser {
            username: registration.email.clone(),
            email: registration.email.clone(),
            password: registration.password.clone(),
            first_name,
            last_name,
        })
        .await?;

    let account = log
        .create_account(&NewAccount {
            user: user.id,
            platform: platform.id,
            balance: starting_balance,
            status: "active".to_string(),
            mobile_number: registration.mobile_number.clone(),
        })
        .await?;

    for currency in currencies {
        log.create_wallet(&NewCryptoWallet {
            account: account.id,
            crypto_currency: currency.id,
            balance: Decimal::ZERO,
            deposit_address: deposit_address(&currency.symbol, user.id, account.id, currency.id),
        })
        .await?;
    }

    Ok((user, account))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    #[test]
    fn upstream_user_accepts_string_or_number_fields() {
        let user = user_from_upstream(&json!({
            "id": 7, "email": "a@example.com", "fullName": "A B",
            "balance": "12.50", "createdAt": "2025-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(user.id, "7");
        assert_eq!(user.balance, Decimal::new(1250, 2));
        assert!(user.mobile_number.is_none());

        let user = user_from_upstream(&json!({"id": "8", "balance": 3.25})).unwrap();
        assert_eq!(user.balance, Decimal::new(325, 2));

        assert!(user_from_upstream(&json!({"email": "x"})).is_err());
    }

    #[tokio::test]
    async fn crypto_profile_collects_wallet_balances() {
        let ledger = Arc::new(InMemoryLedger::new());
        let user = ledger.seed_user("c@example.com", "Cee Port", "pw").await;
        let account = ledger
            .open_account(user.id, Platform::CryptoPort, Decimal::new(1000, 0), None)
            .await;
        ledger.open_wallet(account.id, "BTC", Decimal::new(25, 2)).await;
        ledger.open_wallet(account.id, "ETH", Decimal::new(3, 0)).await;

        let directory = Directory::new(ledger.clone(), Decimal::new(1000, 0));
        let profile = directory.crypto_profile(&user, &account).await.unwrap();
        assert_eq!(profile.crypto_balances.get("BTC"), Some(&0.25));
        assert_eq!(profile.crypto_balances.get("ETH"), Some(&3.0));
        assert_eq!(profile.fiat_balance, Decimal::new(1000, 0));
    }

    #[tokio::test]
    async fn list_only_includes_platform_members() {
        let ledger = Arc::new(InMemoryLedger::new());
        let a = ledger.seed_user("a@example.com", "A", "pw").await;
        let b = ledger.seed_user("b@example.com", "B", "pw").await;
        ledger.seed_user("c@example.com", "C", "pw").await;
        ledger
            .open_account(a.id, Platform::QuickCash, Decimal::ONE, None)
            .await;
        ledger
            .open_account(b.id, Platform::PayFlow, Decimal::ONE, None)
            .await;

        let directory = Directory::new(ledger, Decimal::ZERO);
        let profiles = directory.list_profiles(Platform::QuickCash).await.unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].id(), a.id.to_string());
    }
}
