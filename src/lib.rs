// Library root - exports for testing

pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

pub use config::Config;
pub use routes::app;

use std::sync::Arc;

use ledger::LedgerApi;
use services::{Directory, IdempotencyStore, LockRegistry, Payments};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerApi>,
    pub config: Arc<Config>,
    pub directory: Directory,
    pub payments: Payments,
    pub idempotency: IdempotencyStore,
}

impl AppState {
    /// Wire the services around one ledger client.
    pub fn new(ledger: Arc<dyn LedgerApi>, config: Config) -> Self {
        let directory = Directory::new(ledger.clone(), config.cryptoport_starting_balance);
        let payments = Payments::new(
            directory.clone(),
            LockRegistry::new(),
            config.crypto_network_fee,
        );
        Self {
            ledger,
            directory,
            payments,
            idempotency: IdempotencyStore::new(config.idempotency_ttl),
            config: Arc::new(config),
        }
    }
}
