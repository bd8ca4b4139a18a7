// Integration tests for the Idempotency-Key middleware

use std::time::Duration;

use axum::http::{Method, StatusCode};
use ledger_gateway::ledger::{InMemoryLedger, LedgerOp};
use ledger_gateway::models::Platform;
use serde_json::json;

use test_helpers::*;

const SEND: &str = "/api/payflow/user/alice@example.com/send";

#[tokio::test]
async fn replay_applies_transfer_once() {
    let app = TestApp::new();
    let alice = app.member("alice@example.com", Platform::PayFlow, dec("100")).await;
    let bob = app.member("bob@example.com", Platform::PayFlow, dec("0")).await;
    let body = json!({ "recipientEmail": "bob@example.com", "amount": 30 });

    let first = app
        .request(Method::POST, SEND, Some(body.clone()), &[("Idempotency-Key", "k-1")])
        .await;
    assert_eq!(first.status, StatusCode::OK);
    assert!(first.headers.get("idempotent-replayed").is_none());
    let calls = app.ledger.total_calls().await;

    let second = app
        .request(Method::POST, SEND, Some(body), &[("Idempotency-Key", "k-1")])
        .await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.headers["idempotent-replayed"], "true");
    assert_eq!(second.body, first.body);
    assert_eq!(app.ledger.total_calls().await, calls);

    assert_eq!(app.balance(&alice).await, dec("70"));
    assert_eq!(app.balance(&bob).await, dec("30"));
}

#[tokio::test]
async fn key_reuse_with_other_body_is_rejected() {
    let app = TestApp::new();
    app.member("alice@example.com", Platform::PayFlow, dec("100")).await;
    app.member("bob@example.com", Platform::PayFlow, dec("0")).await;

    app.request(
        Method::POST,
        SEND,
        Some(json!({ "recipientEmail": "bob@example.com", "amount": 1 })),
        &[("Idempotency-Key", "k-2")],
    )
    .await;
    let reply = app
        .request(
            Method::POST,
            SEND,
            Some(json!({ "recipientEmail": "bob@example.com", "amount": 2 })),
            &[("Idempotency-Key", "k-2")],
        )
        .await;

    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        reply.body,
        json!({ "success": false, "error": "Idempotency key reused with a different request" })
    );
}

#[tokio::test]
async fn client_errors_are_cached_but_server_errors_are_not() {
    let app = TestApp::new();
    let alice = app.member("alice@example.com", Platform::PayFlow, dec("100")).await;
    app.member("bob@example.com", Platform::PayFlow, dec("0")).await;
    let too_much = json!({ "recipientEmail": "bob@example.com", "amount": 500 });

    let first = app
        .request(Method::POST, SEND, Some(too_much.clone()), &[("Idempotency-Key", "k-3")])
        .await;
    assert_eq!(first.status, StatusCode::BAD_REQUEST);
    let replay = app
        .request(Method::POST, SEND, Some(too_much), &[("Idempotency-Key", "k-3")])
        .await;
    assert_eq!(replay.status, StatusCode::BAD_REQUEST);
    assert_eq!(replay.headers["idempotent-replayed"], "true");

    let body = json!({ "recipientEmail": "bob@example.com", "amount": 10 });
    app.ledger.fail_after(LedgerOp::UpdateAccount, 0).await;
    let failed = app
        .request(Method::POST, SEND, Some(body.clone()), &[("Idempotency-Key", "k-4")])
        .await;
    assert_eq!(failed.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.balance(&alice).await, dec("100"));

    let retried = app
        .request(Method::POST, SEND, Some(body), &[("Idempotency-Key", "k-4")])
        .await;
    assert_eq!(retried.status, StatusCode::OK);
    assert!(retried.headers.get("idempotent-replayed").is_none());
    assert_eq!(app.balance(&alice).await, dec("90"));
}

#[tokio::test]
async fn concurrent_duplicate_sees_in_progress() {
    let app = std::sync::Arc::new(TestApp::with_ledger(
        InMemoryLedger::new().with_latency(Duration::from_millis(20)),
    ));
    let alice = app.member("alice@example.com", Platform::PayFlow, dec("100")).await;
    app.member("bob@example.com", Platform::PayFlow, dec("0")).await;
    let body = json!({ "recipientEmail": "bob@example.com", "amount": 5 });

    let slow = {
        let app = app.clone();
        let body = body.clone();
        tokio::spawn(async move {
            app.request(Method::POST, SEND, Some(body), &[("Idempotency-Key", "k-5")])
                .await
                .status
        })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    let duplicate = app
        .request(Method::POST, SEND, Some(body), &[("Idempotency-Key", "k-5")])
        .await;

    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(
        duplicate.body["error"],
        "A request with this idempotency key is still in progress"
    );
    assert_eq!(slow.await.unwrap(), StatusCode::OK);
    assert_eq!(app.balance(&alice).await, dec("95"));
}

#[tokio::test]
async fn requests_without_key_are_untouched() {
    let app = TestApp::new();
    let alice = app.member("alice@example.com", Platform::PayFlow, dec("100")).await;
    app.member("bob@example.com", Platform::PayFlow, dec("0")).await;
    let body = json!({ "recipientEmail": "bob@example.com", "amount": 10 });

    app.post(SEND, body.clone()).await;
    app.post(SEND, body).await;

    assert_eq!(app.balance(&alice).await, dec("80"));
    assert!(app.state.idempotency.is_empty().await);
}

#[tokio::test]
async fn retry_after_dropped_request_replays_its_outcome() {
    let app = std::sync::Arc::new(TestApp::with_ledger(
        InMemoryLedger::new().with_latency(Duration::from_millis(20)),
    ));
    let alice = app.member("alice@example.com", Platform::PayFlow, dec("100")).await;
    let bob = app.member("bob@example.com", Platform::PayFlow, dec("10")).await;
    let body = json!({ "recipientEmail": "bob@example.com", "amount": 30 });

    let dropped = {
        let app = app.clone();
        let body = body.clone();
        tokio::spawn(async move {
            app.request(Method::POST, SEND, Some(body), &[("Idempotency-Key", "k-6")])
                .await
                .status
        })
    };
    for _ in 0..200 {
        if app.balance(&alice).await == dec("70") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    dropped.abort();

    let mut retried = None;
    for _ in 0..200 {
        let reply = app
            .request(Method::POST, SEND, Some(body.clone()), &[("Idempotency-Key", "k-6")])
            .await;
        if reply.status != StatusCode::CONFLICT {
            retried = Some(reply);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let retried = retried.expect("key stayed in flight");

    assert_eq!(retried.status, StatusCode::OK);
    assert_eq!(retried.headers["idempotent-replayed"], "true");
    assert_eq!(retried.body["message"], "Money sent successfully");
    assert_eq!(app.balance(&alice).await, dec("70"));
    assert_eq!(app.balance(&bob).await, dec("40"));
}
