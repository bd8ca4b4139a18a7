//! `Idempotency-Key` handling for mutating routes.
//!
//! The request body is buffered to fingerprint it, then handed on unchanged.
//! The response body is buffered so it can be cached and replayed.

use axum::{
    body::{self, Body},
    extract::{Request, State},
    http::{HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::services::idempotency::{fingerprint, CachedResponse, Claim, IdempotencyStore};

pub const IDEMPOTENCY_KEY: &str = "idempotency-key";
pub const REPLAYED_HEADER: &str = "idempotent-replayed";

const MAX_BODY_BYTES: usize = 1024 * 1024;

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::DELETE | Method::PATCH
    )
}

pub async fn idempotency_middleware(
    State(store): State<IdempotencyStore>,
    req: Request,
    next: Next,
) -> Response {
    if !is_mutating(req.method()) {
        return next.run(req).await;
    }
    let key = match req
        .headers()
        .get(IDEMPOTENCY_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
    {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => return next.run(req).await,
    };

    let (parts, body) = req.into_parts();
    let bytes = match body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Could not buffer request body for idempotency key {}: {}", key, e);
            return ApiError::validation("Request body too large").into_response();
        }
    };
    let print = fingerprint(&parts.method, parts.uri.path(), &bytes);

    match store.claim(&key, &print).await {
        Claim::Acquired => {}
        Claim::Replay(cached) => {
            tracing::info!("Replaying cached response for idempotency key {}", key);
            let mut response = cached.into_response();
            response
                .headers_mut()
                .insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
            return response;
        }
        Claim::InProgress => {
            return ApiError::Conflict(
                "A request with this idempotency key is still in progress".to_string(),
            )
            .into_response();
        }
        Claim::Mismatch => {
            return ApiError::Unprocessable(
                "Idempotency key reused with a different request".to_string(),
            )
            .into_response();
        }
    }

    // The handler and the caching run on their own task, so a client that
    // hangs up still leaves a settled key behind for its retry.
    let request = Request::from_parts(parts, Body::from(bytes));
    let task = tokio::spawn(run_and_record(store.clone(), key.clone(), print, next, request));
    match task.await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Request for idempotency key {} did not complete: {}", key, e);
            store.release(&key).await;
            ApiError::Internal.into_response()
        }
    }
}

async fn run_and_record(
    store: IdempotencyStore,
    key: String,
    print: String,
    next: Next,
    request: Request,
) -> Response {
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let bytes = match body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Could not buffer response for idempotency key {}: {}", key, e);
            store.release(&key).await;
            return ApiError::UnexpectedResponse.into_response();
        }
    };

    if parts.status.is_server_error() {
        store.release(&key).await;
    } else {
        store
            .complete(
                &key,
                &print,
                CachedResponse {
                    status: parts.status,
                    headers: parts.headers.clone(),
                    body: bytes.clone(),
                },
            )
            .await;
    }

    Response::from_parts(parts, Body::from(bytes))
}
