//! Type aliases for ledger record IDs. The ledger hands out integer primary keys;
//! the browser sees them as strings.

pub type UserId = i64;
pub type AccountId = i64;
pub type WalletId = i64;
pub type TransactionId = i64;
pub type PlatformId = i64;
pub type CurrencyId = i64;

/// Parse a user ID received from the browser. Use at API boundaries.
pub fn parse_user_id(id: &str) -> Result<UserId, String> {
    id.trim()
        .parse::<UserId>()
        .map_err(|e| format!("Invalid user id '{}': {}", id, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_ids_and_rejects_garbage() {
        assert_eq!(parse_user_id("42"), Ok(42));
        assert_eq!(parse_user_id(" 7 "), Ok(7));
        assert!(parse_user_id("abc").is_err());
    }
}
