// Integration tests for CryptoPort: registration with per-currency wallets,
// deposits, withdrawals, crypto transfers and the admin routes

use axum::http::{Method, StatusCode};
use ledger_gateway::ledger::{LedgerAccount, LedgerCryptoWallet, LedgerOp};
use ledger_gateway::models::Platform;
use serde_json::json;

use test_helpers::*;

async fn crypto_user(
    app: &TestApp,
    email: &str,
    eth: &str,
) -> (LedgerAccount, LedgerCryptoWallet, LedgerCryptoWallet) {
    let account = app.member(email, Platform::CryptoPort, dec("1000")).await;
    let eth = app.ledger.open_wallet(account.id, "ETH", dec(eth)).await;
    let btc = app.ledger.open_wallet(account.id, "BTC", dec("0")).await;
    (account, eth, btc)
}

#[tokio::test]
async fn register_opens_account_and_all_wallets() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/cryptoport/register",
            json!({ "email": " Dana@Example.com ", "password": "pw", "fullName": "Dana Scully" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["message"], "User created successfully");
    assert_eq!(body["data"]["email"], "dana@example.com");
    assert_eq!(body["data"]["fullName"], "Dana Scully");
    assert_eq!(body["data"]["fiatBalance"], 1000.0);
    let balances = body["data"]["cryptoBalances"].as_object().unwrap();
    assert_eq!(balances.len(), 8);
    assert!(balances.values().all(|v| v == 0.0));

    let (status, body) = app.get("/api/cryptoport/user/dana@example.com/wallets").await;
    assert_eq!(status, StatusCode::OK);
    let wallets = body["data"].as_array().unwrap();
    assert_eq!(wallets.len(), 8);
    let address = |symbol: &str| {
        wallets
            .iter()
            .find(|w| w["cryptoSymbol"] == symbol)
            .and_then(|w| w["depositAddress"].as_str())
            .unwrap()
            .to_string()
    };
    assert!(address("BTC").starts_with('1'));
    assert_eq!(address("BTC").len(), 34);
    assert!(address("ETH").starts_with("0x"));
    assert_eq!(address("ETH").len(), 42);
    assert!(address("ADA").starts_with("addr1"));

    let (status, body) = app
        .post(
            "/api/cryptoport/register",
            json!({ "email": "dana@example.com", "password": "pw", "fullName": "Again" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User with this email already exists");
}

#[tokio::test]
async fn failed_registration_leaves_no_partial_user() {
    let app = TestApp::new();
    // User and account are created, the third wallet fails.
    app.ledger.fail_after(LedgerOp::CreateWallet, 2).await;

    let (status, _) = app
        .post(
            "/api/cryptoport/register",
            json!({ "email": "erin@example.com", "password": "pw", "fullName": "Erin" }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.ledger.user_count().await, 0);

    let (status, body) = app.get("/api/cryptoport/user/erin@example.com").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn login_returns_crypto_profile() {
    let app = TestApp::new();
    let (_, _, _) = crypto_user(&app, "frank@example.com", "2").await;

    let (status, body) = app
        .post(
            "/api/cryptoport/login",
            json!({ "email": "frank@example.com", "password": "secret" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["data"]["cryptoBalances"]["ETH"], 2.0);

    let (status, body) = app
        .post(
            "/api/cryptoport/login",
            json!({ "email": "frank@example.com", "password": "wrong" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid email or password");
}

#[tokio::test]
async fn deposit_credits_one_wallet() {
    let app = TestApp::new();
    let (account, eth, btc) = crypto_user(&app, "gail@example.com", "1").await;

    let (status, body) = app
        .post(
            "/api/cryptoport/user/gail@example.com/deposit",
            json!({ "cryptoSymbol": "eth", "amount": 0.75 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["message"], "0.75 ETH deposited successfully");
    assert_eq!(body["data"]["transaction_type"], "crypto_deposit");
    assert_eq!(body["data"]["recipient"], "external_wallet");
    assert_eq!(body["data"]["cryptoSymbol"], "ETH");
    assert_eq!(app.wallet_balance(&eth).await, dec("1.75"));
    assert_eq!(app.wallet_balance(&btc).await, dec("0"));
    assert_eq!(app.balance(&account).await, dec("1000"));

    let (status, body) = app
        .post(
            "/api/cryptoport/user/gail@example.com/deposit",
            json!({ "cryptoSymbol": "DOGE", "amount": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Crypto wallet not found");
}

#[tokio::test]
async fn withdrawal_charges_network_fee() {
    let app = TestApp::new();
    let (account, eth, _) = crypto_user(&app, "hank@example.com", "4").await;

    let (status, body) = app
        .post(
            "/api/cryptoport/user/hank@example.com/withdraw",
            json!({ "cryptoSymbol": "ETH", "amount": 1, "withdrawalAddress": "0xdead" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["message"], "1 ETH withdrawn successfully");
    assert_eq!(body["data"]["amount"], 1.0);
    assert_eq!(body["data"]["recipient"], "0xdead");
    assert_eq!(app.wallet_balance(&eth).await, dec("2.999"));

    let records = app.ledger.transactions_of(account.id).await;
    assert_eq!(records[0].reason.as_deref(), Some("Withdrew 1 ETH to 0xdead"));

    let (status, body) = app
        .post(
            "/api/cryptoport/user/hank@example.com/withdraw",
            json!({ "cryptoSymbol": "ETH", "amount": 2.999, "withdrawalAddress": "0xdead" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Insufficient balance including network fee");

    let (status, body) = app
        .post(
            "/api/cryptoport/user/hank@example.com/withdraw",
            json!({ "cryptoSymbol": "ETH", "amount": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Withdrawal address is required");
    assert_eq!(app.wallet_balance(&eth).await, dec("2.999"));
}

#[tokio::test]
async fn send_crypto_between_wallets() {
    let app = TestApp::new();
    let (_, alice_eth, _) = crypto_user(&app, "alice@example.com", "3").await;
    let (_, bob_eth, _) = crypto_user(&app, "bob@example.com", "0").await;

    let (status, body) = app
        .post(
            "/api/cryptoport/user/alice@example.com/send",
            json!({ "recipientEmail": "bob@example.com", "cryptoSymbol": "ETH", "amount": 1.5 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["message"], "1.5 ETH sent successfully");
    assert_eq!(body["data"]["transaction_type"], "crypto_sent");
    assert_eq!(body["data"]["reason"], "Sent ETH to bob@example.com");
    assert_eq!(app.wallet_balance(&alice_eth).await, dec("1.5"));
    assert_eq!(app.wallet_balance(&bob_eth).await, dec("1.5"));

    let (status, body) = app
        .post(
            "/api/cryptoport/user/alice@example.com/send",
            json!({ "recipientEmail": "alice@example.com", "cryptoSymbol": "ETH", "amount": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cannot send crypto to yourself");

    let (status, body) = app
        .post(
            "/api/cryptoport/user/alice@example.com/send",
            json!({ "recipientEmail": "bob@example.com", "cryptoSymbol": "BTC", "amount": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Insufficient balance");

    let (status, body) = app.get("/api/cryptoport/user/bob@example.com/transactions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["transaction_type"], "crypto_received");
    assert_eq!(body["data"][0]["cryptoSymbol"], "ETH");
}

#[tokio::test]
async fn admin_fund_crypto_wallet() {
    let app = TestApp::new();
    let (account, _, btc) = crypto_user(&app, "ivy@example.com", "0").await;

    let (status, body) = app
        .post(
            "/api/cryptoport/admin/fund",
            json!({ "userId": account.user, "cryptoSymbol": "btc", "amount": 0.25 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["message"], "0.25 BTC added to wallet successfully");
    assert_eq!(body["data"]["senderId"], "admin");
    assert_eq!(app.wallet_balance(&btc).await, dec("0.25"));
    let records = app.ledger.transactions_of(account.id).await;
    assert_eq!(records[0].reason.as_deref(), Some("Admin adjusted BTC balance"));

    let (status, body) = app
        .post(
            "/api/cryptoport/admin/fund",
            json!({ "userId": account.user, "amount": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Crypto symbol is required");

    let (status, body) = app
        .post(
            "/api/cryptoport/admin/fund",
            json!({ "userId": 99999, "cryptoSymbol": "BTC", "amount": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
}

#[tokio::test]
async fn admin_updates_deposit_address_and_deletes_user() {
    let app = TestApp::new();
    let (account, eth, _) = crypto_user(&app, "jon@example.com", "2").await;

    let (status, body) = app
        .post(
            "/api/cryptoport/admin/user/update-deposit-address",
            json!({ "userId": account.user.to_string(), "cryptoSymbol": "eth", "depositAddress": "0xfeed" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["message"], "ETH deposit address updated successfully");
    assert_eq!(body["data"]["depositAddress"], "0xfeed");
    let stored = app.ledger.wallet(eth.id).await.unwrap();
    assert_eq!(stored.deposit_address, "0xfeed");
    assert_eq!(stored.balance, dec("2"));

    let (status, body) = app.get("/api/cryptoport/admin/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let reply = app
        .request(
            Method::DELETE,
            &format!("/api/cryptoport/admin/user/{}/delete", account.user),
            None,
            &[],
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["message"], "User deleted successfully");
    assert!(app.ledger.account(account.id).await.is_none());
    assert!(app.ledger.wallet(eth.id).await.is_none());

    let (status, _) = app.get("/api/cryptoport/user/jon@example.com").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
