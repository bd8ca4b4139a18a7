//! Browser-facing DTOs and shared enums. Ledger record types live in `crate::ledger`.

pub mod chat;
pub mod currency;
pub mod envelope;
pub mod ids;
pub mod platform;
pub mod transaction;
pub mod user;
pub mod wallet;

pub use chat::{ChatMessage, SendMessageRequest};
pub use currency::CryptoCurrency;
pub use envelope::ApiResponse;
pub use ids::{AccountId, CurrencyId, PlatformId, TransactionId, UserId, WalletId};
pub use platform::Platform;
pub use transaction::{Transaction, TransactionStatus, TransactionType};
pub use user::{CryptoUser, Profile, User};
pub use wallet::CryptoWallet;
