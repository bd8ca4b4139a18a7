pub mod directory;
pub mod idempotency;
pub mod locks;
pub mod payments;
pub mod saga;

pub use directory::{Directory, Registration};
pub use idempotency::IdempotencyStore;
pub use locks::LockRegistry;
pub use payments::{Party, Payments, Receipt};
