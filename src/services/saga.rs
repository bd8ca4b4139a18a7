//! Compensation log for multi-write ledger operations.
//!
//! The ledger has no transactions, so each logical operation records an undo
//! step for every write it makes. On failure the steps run newest first and the
//! caller still gets the original error.
//!
//! A create whose reply never arrived may still have landed on the ledger. Such
//! writes are logged as stray-record steps that look the record up by its
//! content and delete it if it is there.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::ledger::{
    LedgerAccount, LedgerApi, LedgerCryptoWallet, LedgerError, LedgerTransaction, LedgerUser,
    NewAccount, NewCryptoWallet, NewTransaction, NewUser,
};
use crate::models::{AccountId, TransactionId, UserId, WalletId};

#[derive(Clone, Debug, PartialEq)]
pub enum Compensation {
    RestoreAccount(LedgerAccount),
    RestoreWallet(LedgerCryptoWallet),
    DeleteTransaction(TransactionId),
    DeleteWallet(WalletId),
    DeleteAccount(AccountId),
    DeleteUser(UserId),
    DeleteStrayTransaction(NewTransaction),
    DeleteStrayUser(String),
}

/// Run a write sequence on its own task so it settles even if the request that
/// started it is dropped. Anything the future owns, locks included, is released
/// only once it has finished.
pub async fn detached<T, F>(work: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: Future<Output = ApiResult<T>> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Ledger write task did not complete: {}", e);
            Err(ApiError::Internal)
        }
    }
}

/// Anything but an explicit rejection may have been applied upstream.
fn may_have_landed(err: &LedgerError) -> bool {
    !matches!(err, LedgerError::Status { .. })
}

pub struct CompensationLog {
    ledger: Arc<dyn LedgerApi>,
    operation: &'static str,
    id: Uuid,
    started: DateTime<Utc>,
    steps: Vec<Compensation>,
}

impl CompensationLog {
    pub fn begin(ledger: Arc<dyn LedgerApi>, operation: &'static str) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(operation_id = %id, "{} started", operation);
        Self {
            ledger,
            operation,
            id,
            started: Utc::now(),
            steps: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn steps(&self) -> &[Compensation] {
        &self.steps
    }

    pub fn record(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    // The restore step for an update is logged before the write: a PUT that
    // timed out may still have landed, and putting the snapshot back is harmless
    // if it did not.

    pub async fn update_account(
        &mut self,
        before: &LedgerAccount,
        after: &LedgerAccount,
    ) -> Result<LedgerAccount, LedgerError> {
        self.record(Compensation::RestoreAccount(before.clone()));
        self.ledger.update_account(after).await
    }

    pub async fn update_wallet(
        &mut self,
        before: &LedgerCryptoWallet,
        after: &LedgerCryptoWallet,
    ) -> Result<LedgerCryptoWallet, LedgerError> {
        self.record(Compensation::RestoreWallet(before.clone()));
        self.ledger.update_wallet(after).await
    }

    pub async fn create_transaction(
        &mut self,
        tx: &NewTransaction,
    ) -> Result<LedgerTransaction, LedgerError> {
        match self.ledger.create_transaction(tx).await {
            Ok(created) => {
                self.record(Compensation::DeleteTransaction(created.id));
                Ok(created)
            }
            Err(e) => {
                if may_have_landed(&e) {
                    self.record(Compensation::DeleteStrayTransaction(tx.clone()));
                }
                Err(e)
            }
        }
    }

    pub async fn create_user(&mut self, user: &NewUser) -> Result<LedgerUser, LedgerError> {
        match self.ledger.create_user(user).await {
            Ok(created) => {
                self.record(Compensation::DeleteUser(created.id));
                Ok(created)
            }
            Err(e) => {
                if may_have_landed(&e) {
                    self.record(Compensation::DeleteStrayUser(user.email.clone()));
                }
                Err(e)
            }
        }
    }

    pub async fn create_account(
        &mut self,
        account: &NewAccount,
    ) -> Result<LedgerAccount, LedgerError> {
        let created = self.ledger.create_account(account).await?;
        self.record(Compensation::DeleteAccount(created.id));
        Ok(created)
    }

    pub async fn create_wallet(
        &mut self,
        wallet: &NewCryptoWallet,
    ) -> Result<LedgerCryptoWallet, LedgerError> {
        let created = self.ledger.create_wallet(wallet).await?;
        self.record(Compensation::DeleteWallet(created.id));
        Ok(created)
    }

    /// Commit on success, unwind on failure. The result passes through untouched.
    pub async fn finish<T>(self, result: ApiResult<T>) -> ApiResult<T> {
        match result {
            Ok(value) => {
                tracing::debug!(operation_id = %self.id, "{} completed", self.operation);
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(
                    operation_id = %self.id,
                    "{} failed: {}; compensating {} step(s)",
                    self.operation,
                    err,
                    self.steps.len()
                );
                self.unwind().await;
                Err(err)
            }
        }
    }

    /// Run every recorded step, newest first. Returns how many steps failed.
    pub async fn unwind(self) -> usize {
        let mut failed = 0;
        for step in self.steps.iter().rev() {
            if let Err(e) = self.apply(step).await {
                failed += 1;
                tracing::error!(
                    operation_id = %self.id,
                    "Compensation {:?} for {} failed: {}",
                    step,
                    self.operation,
                    e
                );
            }
        }
        failed
    }

    async fn apply(&self, step: &Compensation) -> Result<(), LedgerError> {
        match step {
            Compensation::RestoreAccount(snapshot) => {
                self.ledger.update_account(snapshot).await.map(|_| ())
            }
            Compensation::RestoreWallet(snapshot) => {
                self.ledger.update_wallet(snapshot).await.map(|_| ())
            }
            Compensation::DeleteTransaction(id) => self.ledger.delete_transaction(*id).await,
            Compensation::DeleteWallet(id) => self.ledger.delete_wallet(*id).await,
            Compensation::DeleteAccount(id) => self.ledger.delete_account(*id).await,
            Compensation::DeleteUser(id) => self.ledger.delete_user(*id).await,
            Compensation::DeleteStrayTransaction(tx) => {
                let stray = self
                    .ledger
                    .list_transactions(tx.account)
                    .await?
                    .into_iter()
                    .filter(|t| t.date.map_or(false, |d| d >= self.started) && matches_new(t, tx))
                    .max_by_key(|t| t.id);
                match stray {
                    Some(t) => self.ledger.delete_transaction(t.id).await,
                    None => Ok(()),
                }
            }
            Compensation::DeleteStrayUser(email) => {
                for user in self.ledger.find_users_by_email(email).await? {
                    self.ledger.delete_user(user.id).await?;
                }
                Ok(())
            }
        }
    }
}

// Accounts and wallets are not covered: deleting the user removes them.
fn matches_new(existing: &LedgerTransaction, tx: &NewTransaction) -> bool {
    existing.amount == tx.amount
        && existing.transaction_type == tx.transaction_type.as_str()
        && existing.recipient == tx.recipient
        && existing.reason == tx.reason
        && existing.sender_account == tx.sender_account
}
