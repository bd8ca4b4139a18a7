//! The simulated apps served by the gateway. Each one owns a route namespace
//! and maps to a platform record in the ledger.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    PayFlow,
    CryptoPort,
    SendWave,
    QuickCash,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::PayFlow,
        Platform::CryptoPort,
        Platform::SendWave,
        Platform::QuickCash,
    ];

    /// Path segment used both by our routes and by the ledger's platform endpoints.
    pub fn slug(&self) -> &'static str {
        match self {
            Platform::PayFlow => "payflow",
            Platform::CryptoPort => "cryptoport",
            Platform::SendWave => "sendwave",
            Platform::QuickCash => "quickcash",
        }
    }

    /// Accepts the legacy `paypal` namespace as PayFlow.
    pub fn from_slug(slug: &str) -> Option<Platform> {
        match slug.to_ascii_lowercase().as_str() {
            "payflow" | "paypal" => Some(Platform::PayFlow),
            "cryptoport" => Some(Platform::CryptoPort),
            "sendwave" => Some(Platform::SendWave),
            "quickcash" => Some(Platform::QuickCash),
            _ => None,
        }
    }

    /// Name of the platform record in the ledger (`platforms/?name=`).
    /// PayFlow accounts live under the PayPal platform.
    pub fn ledger_name(&self) -> &'static str {
        match self {
            Platform::PayFlow => "PayPal",
            Platform::CryptoPort => "CryptoPort",
            Platform::SendWave => "SendWave",
            Platform::QuickCash => "QuickCash",
        }
    }

    /// Error text when the user's account on this platform is missing.
    pub fn missing_account_message(&self) -> &'static str {
        match self {
            Platform::CryptoPort => "CryptoPort account not found",
            _ => "User account not found",
        }
    }

    pub fn has_crypto_wallets(&self) -> bool {
        matches!(self, Platform::CryptoPort)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ledger_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payflow_accounts_belong_to_paypal_platform() {
        assert_eq!(Platform::PayFlow.slug(), "payflow");
        assert_eq!(Platform::PayFlow.ledger_name(), "PayPal");
        assert_eq!(
            Platform::CryptoPort.missing_account_message(),
            "CryptoPort account not found"
        );
        assert_eq!(Platform::QuickCash.missing_account_message(), "User account not found");
        assert_eq!(Platform::from_slug("paypal"), Some(Platform::PayFlow));
        assert_eq!(Platform::from_slug("SendWave"), Some(Platform::SendWave));
        assert_eq!(Platform::from_slug("venmo"), None);
    }
}
