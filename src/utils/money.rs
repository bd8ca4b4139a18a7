//! Amount handling shared by the payment routes.

use rust_decimal::Decimal;

use crate::error::{ApiError, ApiResult};

/// Reject zero and negative amounts before touching the ledger.
pub fn require_positive(amount: Decimal) -> ApiResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(ApiError::validation("Amount must be greater than 0"));
    }
    Ok(amount)
}

fn too_large() -> ApiError {
    ApiError::validation("Amount is too large")
}

/// `balance + amount`, rejecting results `Decimal` cannot hold.
pub fn add(balance: Decimal, amount: Decimal) -> ApiResult<Decimal> {
    balance.checked_add(amount).ok_or_else(too_large)
}

pub fn sub(balance: Decimal, amount: Decimal) -> ApiResult<Decimal> {
    balance.checked_sub(amount).ok_or_else(too_large)
}

/// Amount as it appears in user-facing messages: `0.50000000` -> `0.5`.
pub fn display_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}
