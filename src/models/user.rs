use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fiat-platform user profile (PayFlow, SendWave, QuickCash).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mobile_number: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CryptoPort user profile: fiat balance plus one balance per crypto wallet.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CryptoUser {
    pub id: String,
    pub email: String,
    pub full_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub fiat_balance: Decimal,
    pub crypto_balances: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Profile {
    Fiat(User),
    Crypto(CryptoUser),
}

impl Profile {
    pub fn id(&self) -> &str {
        match self {
            Profile::Fiat(u) => &u.id,
            Profile::Crypto(u) => &u.id,
        }
    }
}

/// "Ada Lovelace King" -> ("Ada", "Lovelace King").
pub fn split_full_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

pub fn join_full_name(first: &str, last: &str) -> String {
    format!("{} {}", first, last).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_split_and_join() {
        assert_eq!(
            split_full_name("Ada Lovelace King"),
            ("Ada".to_string(), "Lovelace King".to_string())
        );
        assert_eq!(split_full_name("Cher"), ("Cher".to_string(), String::new()));
        assert_eq!(join_full_name("Cher", ""), "Cher");
        assert_eq!(join_full_name("Ada", "Lovelace"), "Ada Lovelace");
    }

    #[test]
    fn crypto_profile_serializes_flat() {
        let now = Utc::now();
        let mut balances = BTreeMap::new();
        balances.insert("BTC".to_string(), 0.5);
        let profile = Profile::Crypto(CryptoUser {
            id: "3".into(),
            email: "c@example.com".into(),
            full_name: "C D".into(),
            fiat_balance: Decimal::new(100000, 2),
            crypto_balances: balances,
            created_at: now,
            updated_at: now,
        });
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["fiatBalance"], 1000.0);
        assert_eq!(json["cryptoBalances"]["BTC"], 0.5);
        assert_eq!(profile.id(), "3");
    }
}
