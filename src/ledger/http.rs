use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use super::{
    upstream_message, LedgerAccount, LedgerApi, LedgerCryptoWallet, LedgerCurrency, LedgerError,
    LedgerPlatform, LedgerTransaction, LedgerUser, NewAccount, NewCryptoWallet, NewTransaction,
    NewUser, UpstreamMethod, UpstreamReply, UpstreamRequest,
};
use crate::models::{AccountId, TransactionId, UserId, WalletId};

/// Ledger client over HTTP. Collection endpoints take a trailing slash.
#[derive(Clone)]
pub struct HttpLedgerClient {
    client: Client,
    base_url: String,
}

impl HttpLedgerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        tracing::debug!("ledger {} {}", method, url);
        self.client.request(method, url)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<(StatusCode, String), LedgerError> {
        let response = builder.send().await.map_err(|e| {
            tracing::warn!("Ledger request failed: {}", e);
            LedgerError::Unavailable(e.to_string())
        })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        Ok((status, text))
    }

    /// Decode a 2xx body, or turn the answer into `LedgerError::Status`.
    fn decode<T: DeserializeOwned>(status: StatusCode, text: &str) -> Result<T, LedgerError> {
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|body| upstream_message(&body))
                .unwrap_or_else(|| format!("Ledger request failed with status {}", status.as_u16()));
            return Err(LedgerError::Status {
                status: status.as_u16(),
                message,
            });
        }
        serde_json::from_str(text).map_err(|e| LedgerError::Decode(e.to_string()))
    }

    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, LedgerError> {
        let (status, text) = self.send(self.request(Method::GET, path).query(query)).await?;
        Self::decode(status, &text)
    }

    /// Single record; a 404 is `None`.
    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, LedgerError> {
        let (status, text) = self.send(self.request(Method::GET, path)).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(status, &text).map(Some)
    }

    async fn write<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, LedgerError> {
        let (status, text) = self.send(self.request(method, path).json(body)).await?;
        Self::decode(status, &text)
    }

    /// Deleting something already gone counts as done.
    async fn remove(&self, path: &str) -> Result<(), LedgerError> {
        let (status, text) = self.send(self.request(Method::DELETE, path)).await?;
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::decode::<Value>(status, &text).map(|_| ())
    }
}

#[async_trait]
impl LedgerApi for HttpLedgerClient {
    async fn find_users_by_email(&self, email: &str) -> Result<Vec<LedgerUser>, LedgerError> {
        self.list("users/", &[("email", email.to_string())]).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<LedgerUser>, LedgerError> {
        self.fetch(&format!("users/{}/", id)).await
    }

    async fn list_users(&self) -> Result<Vec<LedgerUser>, LedgerError> {
        self.list("users/", &[]).await
    }

    async fn create_user(&self, user: &NewUser) -> Result<LedgerUser, LedgerError> {
        self.write(Method::POST, "users/", user).await
    }

    async fn delete_user(&self, id: UserId) -> Result<(), LedgerError> {
        self.remove(&format!("users/{}/", id)).await
    }

    async fn find_accounts(
        &self,
        user: UserId,
        platform_name: &str,
    ) -> Result<Vec<LedgerAccount>, LedgerError> {
        let accounts: Vec<LedgerAccount> = self
            .list(
                "accounts/",
                &[("user", user.to_string()), ("platform__name", platform_name.to_string())],
            )
            .await?;
        // Some ledger deployments ignore the platform filter.
        Ok(accounts
            .into_iter()
            .filter(|a| {
                a.platform_name
                    .as_deref()
                    .map_or(true, |name| name.eq_ignore_ascii_case(platform_name))
            })
            .collect())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<LedgerAccount>, LedgerError> {
        self.fetch(&format!("accounts/{}/", id)).await
    }

    async fn create_account(&self, account: &NewAccount) -> Result<LedgerAccount, LedgerError> {
        self.write(Method::POST, "accounts/", account).await
    }

    async fn update_account(&self, account: &LedgerAccount) -> Result<LedgerAccount, LedgerError> {
        self.write(Method::PUT, &format!("accounts/{}/", account.id), account)
            .await
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), LedgerError> {
        self.remove(&format!("accounts/{}/", id)).await
    }

    async fn find_platforms(&self, name: &str) -> Result<Vec<LedgerPlatform>, LedgerError> {
        self.list("platforms/", &[("name", name.to_string())]).await
    }

    async fn create_platform(&self, name: &str) -> Result<LedgerPlatform, LedgerError> {
        self.write(Method::POST, "platforms/", &json!({ "name": name }))
            .await
    }

    async fn find_currencies(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<LedgerCurrency>, LedgerError> {
        let query: Vec<(&str, String)> = symbol
            .map(|s| vec![("symbol", s.to_string())])
            .unwrap_or_default();
        self.list("crypto-currencies/", &query).await
    }

    async fn create_currency(
        &self,
        symbol: &str,
        name: &str,
    ) -> Result<LedgerCurrency, LedgerError> {
        self.write(
            Method::POST,
            "crypto-currencies/",
            &json!({ "symbol": symbol, "name": name }),
        )
        .await
    }

    async fn find_wallets(
        &self,
        account: AccountId,
        symbol: Option<&str>,
    ) -> Result<Vec<LedgerCryptoWallet>, LedgerError> {
        let mut query = vec![("account", account.to_string())];
        if let Some(symbol) = symbol {
            query.push(("crypto_currency__symbol", symbol.to_string()));
        }
        let wallets: Vec<LedgerCryptoWallet> = self.list("crypto-wallets/", &query).await?;
        Ok(wallets
            .into_iter()
            .filter(|w| w.account == account)
            .filter(|w| match (symbol, w.symbol()) {
                (Some(wanted), Some(have)) => have.eq_ignore_ascii_case(wanted),
                _ => true,
            })
            .collect())
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Option<LedgerCryptoWallet>, LedgerError> {
        self.fetch(&format!("crypto-wallets/{}/", id)).await
    }

    async fn create_wallet(
        &self,
        wallet: &NewCryptoWallet,
    ) -> Result<LedgerCryptoWallet, LedgerError> {
        self.write(Method::POST, "crypto-wallets/", wallet).await
    }

    async fn update_wallet(
        &self,
        wallet: &LedgerCryptoWallet,
    ) -> Result<LedgerCryptoWallet, LedgerError> {
        self.write(Method::PUT, &format!("crypto-wallets/{}/", wallet.id), wallet)
            .await
    }

    async fn delete_wallet(&self, id: WalletId) -> Result<(), LedgerError> {
        self.remove(&format!("crypto-wallets/{}/", id)).await
    }

    async fn create_transaction(
        &self,
        tx: &NewTransaction,
    ) -> Result<LedgerTransaction, LedgerError> {
        self.write(Method::POST, "transactions/", tx).await
    }

    async fn list_transactions(
        &self,
        account: AccountId,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        let txs: Vec<LedgerTransaction> = self
            .list("transactions/", &[("account", account.to_string())])
            .await?;
        Ok(txs.into_iter().filter(|t| t.account == account).collect())
    }

    async fn delete_transaction(&self, id: TransactionId) -> Result<(), LedgerError> {
        self.remove(&format!("transactions/{}/", id)).await
    }

    async fn call(&self, request: UpstreamRequest) -> Result<UpstreamReply, LedgerError> {
        let method = match request.method {
            UpstreamMethod::Get => Method::GET,
            UpstreamMethod::Post => Method::POST,
            UpstreamMethod::Put => Method::PUT,
            UpstreamMethod::Delete => Method::DELETE,
        };
        let mut builder = self.request(method, &request.path).query(&request.query);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let (status, text) = self.send(builder).await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(body) => body,
                // Error pages are not JSON; keep their status, not their markup.
                Err(_) if !status.is_success() => Value::Null,
                Err(e) => return Err(LedgerError::Decode(e.to_string())),
            }
        };

        Ok(UpstreamReply {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_and_paths() {
        let client =
            HttpLedgerClient::new("http://localhost:8000/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/api");
        assert_eq!(client.url("users/"), "http://localhost:8000/api/users/");
        assert_eq!(client.url("/sendwave/login"), "http://localhost:8000/api/sendwave/login");
    }

    #[test]
    fn decode_surfaces_ledger_error_text() {
        let err = HttpLedgerClient::decode::<Value>(
            StatusCode::BAD_REQUEST,
            r#"{"error":"User with this email already exists"}"#,
        )
        .unwrap_err();
        match err {
            LedgerError::Status { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "User with this email already exists");
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = HttpLedgerClient::decode::<Value>(StatusCode::BAD_GATEWAY, "<html>").unwrap_err();
        assert!(matches!(err, LedgerError::Status { status: 502, .. }));

        let err = HttpLedgerClient::decode::<Vec<LedgerUser>>(StatusCode::OK, "{}").unwrap_err();
        assert!(matches!(err, LedgerError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_ledger_is_unavailable() {
        let client = HttpLedgerClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = client.list_users().await.unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)));
    }
}
