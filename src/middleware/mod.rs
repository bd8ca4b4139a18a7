pub mod idempotency;
pub mod security_headers;

pub use idempotency::{idempotency_middleware, IDEMPOTENCY_KEY, REPLAYED_HEADER};
pub use security_headers::security_headers_middleware;
