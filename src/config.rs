use std::env;
use std::time::Duration;

use rust_decimal::Decimal;

#[derive(Clone, Debug)]
pub struct Config {
    pub ledger_api_url: String,
    pub host: String,
    pub port: u16,
    pub ledger_timeout: Duration,
    pub crypto_network_fee: Decimal,
    pub cryptoport_starting_balance: Decimal,
    pub idempotency_ttl: Duration,
    pub ping_message: String,
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::from_lookup(|key| env::var(key).ok()))
    }

    /// Build from any key/value source. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            ledger_api_url: var("LEDGER_API_URL")
                .unwrap_or_else(|| "http://localhost:8000/api".to_string())
                .trim_end_matches('/')
                .to_string(),
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: var("PORT").and_then(|v| v.trim().parse().ok()).unwrap_or(8080),
            ledger_timeout: Duration::from_secs(
                var("LEDGER_TIMEOUT_SECS")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(30),
            ),
            crypto_network_fee: var("CRYPTO_NETWORK_FEE")
                .and_then(|v| v.trim().parse().ok())
                .filter(|fee: &Decimal| !fee.is_sign_negative())
                .unwrap_or_else(|| Decimal::new(1, 3)),
            cryptoport_starting_balance: var("CRYPTOPORT_STARTING_BALANCE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or_else(|| Decimal::new(100_000, 2)),
            idempotency_ttl: Duration::from_secs(
                var("IDEMPOTENCY_TTL_SECS")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(86_400),
            ),
            ping_message: var("PING_MESSAGE").unwrap_or_else(|| "ping".to_string()),
            log_format: match var("LOG_FORMAT").as_deref().map(str::trim) {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
