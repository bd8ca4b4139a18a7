//! Balance-moving operations: transfers, admin funding, money requests and
//! crypto deposits/withdrawals.
//!
//! Each operation follows the same shape. Resolve and validate with plain
//! reads, take the per-record locks, re-read and re-check under the locks, then
//! write through a [`CompensationLog`] so a failed write leaves the ledger as it
//! was.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::{ApiError, ApiResult};
use crate::ledger::{
    LedgerAccount, LedgerApi, LedgerCryptoWallet, LedgerTransaction, LedgerUser, NewTransaction,
    UpstreamReply, UpstreamRequest,
};
use crate::models::{
    currency::normalize_symbol, AccountId, CryptoWallet, Platform, Transaction, TransactionStatus,
    TransactionType, UserId, WalletId,
};
use crate::services::directory::{to_transaction, to_wallet, Directory};
use crate::services::locks::{LockKey, LockRegistry};
use crate::services::saga::{self, CompensationLog};
use crate::utils::money::{self, display_amount, require_positive};

/// How a route names a person: by email, or by phone number on SendWave.
#[derive(Clone, Copy, Debug)]
pub enum Party<'a> {
    Email(&'a str),
    Mobile(&'a str),
}

impl Party<'_> {
    fn label(&self) -> String {
        match self {
            Party::Email(email) => email.trim().to_string(),
            Party::Mobile(mobile) => mobile.trim().to_string(),
        }
    }
}

/// Result of a payment: the record shown to the browser plus the success text.
#[derive(Clone, Debug)]
pub struct Receipt {
    pub transaction: Transaction,
    pub message: String,
}

#[derive(Clone)]
pub struct Payments {
    directory: Directory,
    locks: LockRegistry,
    network_fee: Decimal,
}

fn insufficient() -> ApiError {
    ApiError::validation("Insufficient balance")
}

fn record(
    account: AccountId,
    wallet: Option<WalletId>,
    amount: Decimal,
    kind: TransactionType,
    status: TransactionStatus,
    reason: Option<String>,
    recipient: impl Into<String>,
) -> NewTransaction {
    NewTransaction {
        account,
        sender_account: None,
        crypto_wallet: wallet,
        amount,
        transaction_type: kind,
        status,
        reason,
        recipient: recipient.into(),
    }
}

impl Payments {
    pub fn new(directory: Directory, locks: LockRegistry, network_fee: Decimal) -> Self {
        Self {
            directory,
            locks,
            network_fee,
        }
    }

    pub fn network_fee(&self) -> Decimal {
        self.network_fee
    }

    fn ledger(&self) -> &Arc<dyn LedgerApi> {
        self.directory.ledger()
    }

    fn receipt(
        &self,
        created: &LedgerTransaction,
        platform: Platform,
        sender_id: String,
        message: String,
    ) -> ApiResult<Receipt> {
        let mut transaction =
            to_transaction(created, platform).ok_or(ApiError::UnexpectedResponse)?;
        transaction.sender_id = sender_id;
        Ok(Receipt {
            transaction,
            message,
        })
    }

    async fn resolve(&self, party: Party<'_>, missing: &str) -> ApiResult<LedgerUser> {
        match party {
            Party::Email(email) => self.directory.find_user(email, missing).await,
            Party::Mobile(mobile) => self.directory.find_user_by_mobile(mobile, missing).await,
        }
    }

    async fn fresh_account(&self, id: AccountId, missing: &str) -> ApiResult<LedgerAccount> {
        self.ledger()
            .get_account(id)
            .await?
            .ok_or_else(|| ApiError::not_found(missing))
    }

    async fn fresh_wallet(&self, id: WalletId, missing: &str) -> ApiResult<LedgerCryptoWallet> {
        self.ledger()
            .get_wallet(id)
            .await?
            .ok_or_else(|| ApiError::not_found(missing))
    }

    /// Move `amount` of fiat between two users' accounts on `platform`.
    pub async fn send_money(
        &self,
        platform: Platform,
        sender: Party<'_>,
        recipient: Party<'_>,
        amount: Decimal,
        message: Option<String>,
    ) -> ApiResult<Receipt> {
        let amount = require_positive(amount)?;
        let from = self.resolve(sender, "Sender not found").await?;
        let to = self.resolve(recipient, "Recipient not found").await?;
        if from.id == to.id {
            return Err(ApiError::validation("Cannot send money to yourself"));
        }

        let from_account = self
            .directory
            .require_account(from.id, platform, "Sender account not found")
            .await?;
        if from_account.balance < amount {
            return Err(insufficient());
        }
        let to_account = self
            .directory
            .require_account(to.id, platform, "Recipient account not found")
            .await?;

        let held = self
            .locks
            .acquire([
                LockKey::Account(from_account.id),
                LockKey::Account(to_account.id),
            ])
            .await;
        let from_account = self
            .fresh_account(from_account.id, "Sender account not found")
            .await?;
        let to_account = self
            .fresh_account(to_account.id, "Recipient account not found")
            .await?;
        if from_account.balance < amount {
            return Err(insufficient());
        }
        let debited_balance = money::sub(from_account.balance, amount)?;
        let credited_balance = money::add(to_account.balance, amount)?;

        let mut sent = record(
            from_account.id,
            None,
            amount,
            TransactionType::Sent,
            TransactionStatus::Completed,
            message.clone(),
            recipient.label(),
        );
        sent.sender_account = Some(from_account.id);
        let mut received = record(
            to_account.id,
            None,
            amount,
            TransactionType::Received,
            TransactionStatus::Completed,
            message,
            sender.label(),
        );
        received.sender_account = Some(from_account.id);

        let mut log = CompensationLog::begin(self.ledger().clone(), "send_money");
        tracing::info!(
            operation_id = %log.id(),
            "{}: {} from account {} to account {}",
            platform.slug(),
            amount,
            from_account.id,
            to_account.id
        );
        let created = saga::detached(async move {
            let _held = held;
            let result = async {
                let mut debited = from_account.clone();
                debited.balance = debited_balance;
                log.update_account(&from_account, &debited).await?;

                let mut credited = to_account.clone();
                credited.balance = credited_balance;
                log.update_account(&to_account, &credited).await?;

                let created = log.create_transaction(&sent).await?;
                log.create_transaction(&received).await?;
                Ok::<_, ApiError>(created)
            }
            .await;
            log.finish(result).await
        })
        .await?;

        self.receipt(
            &created,
            platform,
            from.id.to_string(),
            "Money sent successfully".to_string(),
        )
    }

    /// Move crypto between two CryptoPort users' wallets of the same currency.
    pub async fn send_crypto(
        &self,
        sender_email: &str,
        recipient_email: &str,
        symbol: &str,
        amount: Decimal,
    ) -> ApiResult<Receipt> {
        let platform = Platform::CryptoPort;
        let symbol = normalize_symbol(symbol);
        let amount = require_positive(amount)?;
        let from = self.directory.find_user(sender_email, "Sender not found").await?;
        let to = self
            .directory
            .find_user(recipient_email, "Recipient not found")
            .await?;
        if from.id == to.id {
            return Err(ApiError::validation("Cannot send crypto to yourself"));
        }

        let from_account = self
            .directory
            .require_account(from.id, platform, "Sender account not found")
            .await?;
        let to_account = self
            .directory
            .require_account(to.id, platform, "Recipient account not found")
            .await?;
        let from_wallet = self
            .directory
            .wallet(&from_account, &symbol, "Sender wallet not found")
            .await?;
        if from_wallet.balance < amount {
            return Err(insufficient());
        }
        let to_wallet = self
            .directory
            .wallet(&to_account, &symbol, "Recipient wallet not found")
            .await?;

        let held = self
            .locks
            .acquire([LockKey::Wallet(from_wallet.id), LockKey::Wallet(to_wallet.id)])
            .await;
        let from_wallet = self
            .fresh_wallet(from_wallet.id, "Sender wallet not found")
            .await?;
        let to_wallet = self
            .fresh_wallet(to_wallet.id, "Recipient wallet not found")
            .await?;
        if from_wallet.balance < amount {
            return Err(insufficient());
        }
        let debited_balance = money::sub(from_wallet.balance, amount)?;
        let credited_balance = money::add(to_wallet.balance, amount)?;

        let mut sent = record(
            from_account.id,
            Some(from_wallet.id),
            amount,
            TransactionType::CryptoSent,
            TransactionStatus::Completed,
            Some(format!("Sent {} to {}", symbol, recipient_email.trim())),
            recipient_email.trim(),
        );
        sent.sender_account = Some(from_account.id);
        let mut received = record(
            to_account.id,
            Some(to_wallet.id),
            amount,
            TransactionType::CryptoReceived,
            TransactionStatus::Completed,
            Some(format!("Received {} from {}", symbol, sender_email.trim())),
            sender_email.trim(),
        );
        received.sender_account = Some(from_account.id);

        let mut log = CompensationLog::begin(self.ledger().clone(), "send_crypto");
        tracing::info!(
            operation_id = %log.id(),
            "cryptoport: {} {} from wallet {} to wallet {}",
            amount,
            symbol,
            from_wallet.id,
            to_wallet.id
        );
        let created = saga::detached(async move {
            let _held = held;
            let result = async {
                let mut debited = from_wallet.clone();
                debited.balance = debited_balance;
                log.update_wallet(&from_wallet, &debited).await?;

                let mut credited = to_wallet.clone();
                credited.balance = credited_balance;
                log.update_wallet(&to_wallet, &credited).await?;

                let created = log.create_transaction(&sent).await?;
                log.create_transaction(&received).await?;
                Ok::<_, ApiError>(created)
            }
            .await;
            log.finish(result).await
        })
        .await?;

        self.receipt(
            &created,
            platform,
            from.id.to_string(),
            format!("{} {} sent successfully", display_amount(amount), symbol),
        )
    }

    /// Record a pending request on both sides. No balance moves.
    pub async fn request_money(
        &self,
        platform: Platform,
        requester_email: &str,
        recipient_email: &str,
        amount: Decimal,
        message: Option<String>,
    ) -> ApiResult<Receipt> {
        let amount = require_positive(amount)?;
        let requester = self
            .directory
            .find_user(requester_email, "Requester not found")
            .await?;
        let recipient = self
            .directory
            .find_user(recipient_email, "Recipient not found")
            .await?;
        if requester.id == recipient.id {
            return Err(ApiError::validation("Cannot request money from yourself"));
        }
        let requester_account = self
            .directory
            .require_account(requester.id, platform, "Requester account not found")
            .await?;
        let recipient_account = self
            .directory
            .require_account(recipient.id, platform, "Recipient account not found")
            .await?;

        let requested = record(
            requester_account.id,
            None,
            amount,
            TransactionType::Requested,
            TransactionStatus::Pending,
            message.clone(),
            recipient_email.trim(),
        );
        let request_received = record(
            recipient_account.id,
            None,
            amount,
            TransactionType::RequestReceived,
            TransactionStatus::Pending,
            message,
            requester_email.trim(),
        );

        let mut log = CompensationLog::begin(self.ledger().clone(), "request_money");
        let created = saga::detached(async move {
            let result = async {
                let created = log.create_transaction(&requested).await?;
                log.create_transaction(&request_received).await?;
                Ok::<_, ApiError>(created)
            }
            .await;
            log.finish(result).await
        })
        .await?;

        self.receipt(
            &created,
            platform,
            requester.id.to_string(),
            "Money request sent successfully".to_string(),
        )
    }

    /// Admin credit to a user's fiat account on `platform`.
    pub async fn fund_account(
        &self,
        platform: Platform,
        user_id: UserId,
        amount: Decimal,
        reason: Option<String>,
    ) -> ApiResult<Receipt> {
        let amount = require_positive(amount)?;
        let account = self
            .directory
            .require_account(user_id, platform, "User account not found")
            .await?;

        let held = self.locks.acquire([LockKey::Account(account.id)]).await;
        let account = self.fresh_account(account.id, "User account not found").await?;
        let credited_balance = money::add(account.balance, amount)?;

        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "Admin wallet funding".to_string());
        let adjustment = record(
            account.id,
            None,
            amount,
            TransactionType::AdminAdjusted,
            TransactionStatus::Completed,
            Some(reason),
            "admin",
        );

        let mut log = CompensationLog::begin(self.ledger().clone(), "fund_account");
        tracing::info!(
            operation_id = %log.id(),
            "{}: admin credit of {} to account {}",
            platform.slug(),
            amount,
            account.id
        );
        let created = saga::detached(async move {
            let _held = held;
            let result = async {
                let mut credited = account.clone();
                credited.balance = credited_balance;
                log.update_account(&account, &credited).await?;
                Ok::<_, ApiError>(log.create_transaction(&adjustment).await?)
            }
            .await;
            log.finish(result).await
        })
        .await?;

        let mut receipt = self.receipt(
            &created,
            platform,
            "admin".to_string(),
            "Wallet funded successfully".to_string(),
        )?;
        receipt.transaction.recipient = user_id.to_string();
        Ok(receipt)
    }

    /// Admin credit to one of a CryptoPort user's wallets.
    pub async fn fund_crypto_wallet(
        &self,
        user_id: UserId,
        symbol: &str,
        amount: Decimal,
        reason: Option<String>,
    ) -> ApiResult<Receipt> {
        let symbol = normalize_symbol(symbol);
        let amount = require_positive(amount)?;
        let user = self.directory.user_by_id(user_id, "User not found").await?;
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| format!("Admin adjusted {} balance", symbol));

        let mut receipt = self
            .credit_wallet(
                &user,
                &symbol,
                amount,
                TransactionType::AdminAdjusted,
                reason,
                "admin",
                "fund_crypto_wallet",
            )
            .await?;
        receipt.transaction.sender_id = "admin".to_string();
        receipt.message = format!(
            "{} {} added to wallet successfully",
            display_amount(amount),
            symbol
        );
        Ok(receipt)
    }

    /// Crypto arriving from outside the platform.
    pub async fn deposit_crypto(
        &self,
        email: &str,
        symbol: &str,
        amount: Decimal,
    ) -> ApiResult<Receipt> {
        let symbol = normalize_symbol(symbol);
        let amount = require_positive(amount)?;
        let user = self.directory.find_user(email, "User not found").await?;

        let mut receipt = self
            .credit_wallet(
                &user,
                &symbol,
                amount,
                TransactionType::CryptoDeposit,
                format!("Deposited {} {}", display_amount(amount), symbol),
                "external_wallet",
                "deposit_crypto",
            )
            .await?;
        receipt.message = format!("{} {} deposited successfully", display_amount(amount), symbol);
        Ok(receipt)
    }

    #[allow(clippy::too_many_arguments)]
    async fn credit_wallet(
        &self,
        user: &LedgerUser,
        symbol: &str,
        amount: Decimal,
        kind: TransactionType,
        reason: String,
        recipient: &str,
        operation: &'static str,
    ) -> ApiResult<Receipt> {
        let account = self
            .directory
            .require_account(user.id, Platform::CryptoPort, "CryptoPort account not found")
            .await?;
        let wallet = self
            .directory
            .wallet(&account, symbol, "Crypto wallet not found")
            .await?;

        let held = self.locks.acquire([LockKey::Wallet(wallet.id)]).await;
        let wallet = self.fresh_wallet(wallet.id, "Crypto wallet not found").await?;
        let credited_balance = money::add(wallet.balance, amount)?;

        let entry = record(
            account.id,
            Some(wallet.id),
            amount,
            kind,
            TransactionStatus::Completed,
            Some(reason),
            recipient,
        );

        let mut log = CompensationLog::begin(self.ledger().clone(), operation);
        tracing::info!(
            operation_id = %log.id(),
            "cryptoport: credit {} {} to wallet {}",
            amount,
            symbol,
            wallet.id
        );
        let created = saga::detached(async move {
            let _held = held;
            let result = async {
                let mut credited = wallet.clone();
                credited.balance = credited_balance;
                log.update_wallet(&wallet, &credited).await?;
                Ok::<_, ApiError>(log.create_transaction(&entry).await?)
            }
            .await;
            log.finish(result).await
        })
        .await?;

        self.receipt(&created, Platform::CryptoPort, user.id.to_string(), String::new())
    }

    /// Replace one wallet's deposit address. Runs under the wallet lock since the
    /// ledger write carries the whole record, balance included.
    pub async fn update_deposit_address(
        &self,
        user_id: UserId,
        symbol: &str,
        address: &str,
    ) -> ApiResult<CryptoWallet> {
        let symbol = normalize_symbol(symbol);
        let address = address.trim();
        if address.is_empty() {
            return Err(ApiError::validation("Deposit address is required"));
        }
        let user = self.directory.user_by_id(user_id, "User not found").await?;
        let account = self
            .directory
            .require_account(user.id, Platform::CryptoPort, "CryptoPort account not found")
            .await?;
        let wallet = self
            .directory
            .wallet(&account, &symbol, "Crypto wallet not found")
            .await?;

        let _held = self.locks.acquire([LockKey::Wallet(wallet.id)]).await;
        let mut wallet = self.fresh_wallet(wallet.id, "Crypto wallet not found").await?;
        wallet.deposit_address = address.to_string();
        let saved = self.ledger().update_wallet(&wallet).await?;
        tracing::info!("cryptoport: {} deposit address for user {} updated", symbol, user.id);
        Ok(to_wallet(&saved, &[]))
    }

    /// Forward an admin endpoint that rewrites `user`'s account on `platform`
    /// (balance adjustments, profile edits). The account lock is held until the
    /// ledger has answered. Unknown users go straight through so the ledger
    /// gives its own answer.
    pub async fn forward_account_write(
        &self,
        platform: Platform,
        user: Option<UserId>,
        request: UpstreamRequest,
    ) -> ApiResult<UpstreamReply> {
        let account = match user {
            Some(id) => self.directory.account_of(id, platform).await?,
            None => None,
        };
        let Some(account) = account else {
            return Ok(self.ledger().call(request).await?);
        };

        let held = self.locks.acquire([LockKey::Account(account.id)]).await;
        let ledger = self.ledger().clone();
        tracing::debug!(
            "{}: forwarding {} under lock of account {}",
            platform.slug(),
            request.path,
            account.id
        );
        saga::detached(async move {
            let _held = held;
            Ok::<_, ApiError>(ledger.call(request).await?)
        })
        .await
    }

    /// Crypto leaving the platform. The network fee comes out of the wallet on
    /// top of the amount; the record carries the amount only.
    pub async fn withdraw_crypto(
        &self,
        email: &str,
        symbol: &str,
        amount: Decimal,
        address: &str,
    ) -> ApiResult<Receipt> {
        let symbol = normalize_symbol(symbol);
        let address = address.trim();
        if address.is_empty() {
            return Err(ApiError::validation("Withdrawal address is required"));
        }
        let amount = require_positive(amount)?;
        let total = money::add(amount, self.network_fee)?;

        let user = self.directory.find_user(email, "User not found").await?;
        let account = self
            .directory
            .require_account(user.id, Platform::CryptoPort, "CryptoPort account not found")
            .await?;
        let wallet = self
            .directory
            .wallet(&account, &symbol, "Crypto wallet not found")
            .await?;
        if wallet.balance < total {
            return Err(ApiError::validation("Insufficient balance including network fee"));
        }

        let held = self.locks.acquire([LockKey::Wallet(wallet.id)]).await;
        let wallet = self.fresh_wallet(wallet.id, "Crypto wallet not found").await?;
        if wallet.balance < total {
            return Err(ApiError::validation("Insufficient balance including network fee"));
        }
        let debited_balance = money::sub(wallet.balance, total)?;

        let entry = record(
            account.id,
            Some(wallet.id),
            amount,
            TransactionType::CryptoWithdrawal,
            TransactionStatus::Completed,
            Some(format!(
                "Withdrew {} {} to {}",
                display_amount(amount),
                symbol,
                address
            )),
            address,
        );

        let mut log = CompensationLog::begin(self.ledger().clone(), "withdraw_crypto");
        tracing::info!(
            operation_id = %log.id(),
            "cryptoport: withdraw {} {} (+{} fee) from wallet {}",
            amount,
            symbol,
            self.network_fee,
            wallet.id
        );
        let created = saga::detached(async move {
            let _held = held;
            let result = async {
                let mut debited = wallet.clone();
                debited.balance = debited_balance;
                log.update_wallet(&wallet, &debited).await?;
                Ok::<_, ApiError>(log.create_transaction(&entry).await?)
            }
            .await;
            log.finish(result).await
        })
        .await?;

        self.receipt(
            &created,
            Platform::CryptoPort,
            user.id.to_string(),
            format!("{} {} withdrawn successfully", display_amount(amount), symbol),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryLedger, LedgerOp};

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        payments: Payments,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new());
        let directory = Directory::new(ledger.clone(), Decimal::new(1000, 0));
        let payments = Payments::new(directory, LockRegistry::new(), Decimal::new(1, 3));
        Fixture { ledger, payments }
    }

    async fn member(f: &Fixture, email: &str, platform: Platform, balance: i64) -> LedgerAccount {
        let user = f.ledger.seed_user(email, "Some One", "pw").await;
        f.ledger
            .open_account(user.id, platform, Decimal::new(balance, 0), None)
            .await
    }

    #[tokio::test]
    async fn transfer_moves_exact_amount_and_writes_pair() {
        let f = fixture();
        let a = member(&f, "a@example.com", Platform::PayFlow, 100).await;
        let b = member(&f, "b@example.com", Platform::PayFlow, 10).await;

        let receipt = f
            .payments
            .send_money(
                Platform::PayFlow,
                Party::Email("a@example.com"),
                Party::Email("b@example.com"),
                Decimal::new(30, 0),
                Some("rent".into()),
            )
            .await
            .unwrap();

        assert_eq!(receipt.message, "Money sent successfully");
        assert_eq!(receipt.transaction.transaction_type, TransactionType::Sent);
        assert_eq!(receipt.transaction.sender_id, a.user.to_string());
        assert_eq!(receipt.transaction.recipient, "b@example.com");
        assert_eq!(f.ledger.account(a.id).await.unwrap().balance, Decimal::new(70, 0));
        assert_eq!(f.ledger.account(b.id).await.unwrap().balance, Decimal::new(40, 0));

        let received = f.ledger.transactions_of(b.id).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].transaction_type, "received");
        assert_eq!(received[0].recipient, "a@example.com");
        assert_eq!(received[0].amount, Decimal::new(30, 0));
    }

    #[tokio::test]
    async fn failed_credit_rolls_back_debit() {
        let f = fixture();
        let a = member(&f, "a@example.com", Platform::QuickCash, 100).await;
        let b = member(&f, "b@example.com", Platform::QuickCash, 10).await;
        // Debit succeeds, credit fails.
        f.ledger.fail_after(LedgerOp::UpdateAccount, 1).await;

        let err = f
            .payments
            .send_money(
                Platform::QuickCash,
                Party::Email("a@example.com"),
                Party::Email("b@example.com"),
                Decimal::new(30, 0),
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Unavailable));
        assert_eq!(f.ledger.account(a.id).await.unwrap().balance, Decimal::new(100, 0));
        assert_eq!(f.ledger.account(b.id).await.unwrap().balance, Decimal::new(10, 0));
        assert_eq!(f.ledger.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn failed_second_record_removes_the_first() {
        let f = fixture();
        let a = member(&f, "a@example.com", Platform::PayFlow, 100).await;
        let b = member(&f, "b@example.com", Platform::PayFlow, 0).await;
        f.ledger.fail_after(LedgerOp::CreateTransaction, 1).await;

        assert!(f
            .payments
            .send_money(
                Platform::PayFlow,
                Party::Email("a@example.com"),
                Party::Email("b@example.com"),
                Decimal::new(5, 0),
                None,
            )
            .await
            .is_err());
        assert_eq!(f.ledger.account(a.id).await.unwrap().balance, Decimal::new(100, 0));
        assert_eq!(f.ledger.account(b.id).await.unwrap().balance, Decimal::ZERO);
        assert_eq!(f.ledger.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn validation_order() {
        let f = fixture();
        member(&f, "a@example.com", Platform::PayFlow, 20).await;
        member(&f, "b@example.com", Platform::PayFlow, 0).await;
        let send = |from: &'static str, to: &'static str, amount: i64| {
            f.payments.send_money(
                Platform::PayFlow,
                Party::Email(from),
                Party::Email(to),
                Decimal::new(amount, 0),
                None,
            )
        };

        let msg = |r: ApiResult<Receipt>| r.unwrap_err().to_string();
        assert_eq!(msg(send("x@example.com", "b@example.com", 1).await), "Sender not found");
        assert_eq!(msg(send("a@example.com", "x@example.com", 1).await), "Recipient not found");
        assert_eq!(
            msg(send("a@example.com", "a@example.com", 1).await),
            "Cannot send money to yourself"
        );
        assert_eq!(msg(send("a@example.com", "b@example.com", 50).await), "Insufficient balance");
        assert_eq!(
            msg(send("a@example.com", "b@example.com", 0).await),
            "Amount must be greater than 0"
        );
    }

    #[tokio::test]
    async fn withdrawal_charges_fee_and_records_amount() {
        let f = fixture();
        let account = member(&f, "c@example.com", Platform::CryptoPort, 0).await;
        let wallet = f.ledger.open_wallet(account.id, "ETH", Decimal::new(1, 0)).await;

        let receipt = f
            .payments
            .withdraw_crypto("c@example.com", "eth", Decimal::new(5, 1), "0xabc")
            .await
            .unwrap();
        assert_eq!(receipt.message, "0.5 ETH withdrawn successfully");
        assert_eq!(receipt.transaction.amount, Decimal::new(5, 1));
        assert_eq!(receipt.transaction.crypto_symbol.as_deref(), Some("ETH"));
        assert_eq!(
            f.ledger.wallet(wallet.id).await.unwrap().balance,
            Decimal::new(499, 3)
        );

        let err = f
            .payments
            .withdraw_crypto("c@example.com", "ETH", Decimal::new(499, 3), "0xabc")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Insufficient balance including network fee");

        let err = f
            .payments
            .withdraw_crypto("c@example.com", "ETH", Decimal::new(1, 1), "  ")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Withdrawal address is required");
    }

    #[tokio::test]
    async fn concurrent_debits_never_overdraw() {
        let ledger = Arc::new(InMemoryLedger::new().with_latency(std::time::Duration::from_millis(2)));
        let directory = Directory::new(ledger.clone(), Decimal::ZERO);
        let payments = Payments::new(directory, LockRegistry::new(), Decimal::ZERO);
        let a = ledger.seed_user("a@example.com", "A", "pw").await;
        let b = ledger.seed_user("b@example.com", "B", "pw").await;
        let from = ledger
            .open_account(a.id, Platform::PayFlow, Decimal::new(100, 0), None)
            .await;
        let to = ledger
            .open_account(b.id, Platform::PayFlow, Decimal::ZERO, None)
            .await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let payments = payments.clone();
            tasks.push(tokio::spawn(async move {
                payments
                    .send_money(
                        Platform::PayFlow,
                        Party::Email("a@example.com"),
                        Party::Email("b@example.com"),
                        Decimal::new(30, 0),
                        None,
                    )
                    .await
                    .is_ok()
            }));
        }
        let mut succeeded = 0;
        for task in tasks {
            if task.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 3);
        assert_eq!(ledger.account(from.id).await.unwrap().balance, Decimal::new(10, 0));
        assert_eq!(ledger.account(to.id).await.unwrap().balance, Decimal::new(90, 0));
    }
}
