//! Response cache behind the `Idempotency-Key` header.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

const PRUNE_THRESHOLD: usize = 10_000;

/// An in-flight key older than this is treated as abandoned.
const IN_FLIGHT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[derive(Clone, Debug)]
enum Slot {
    InFlight {
        fingerprint: String,
        started_at: Instant,
    },
    Completed {
        fingerprint: String,
        response: CachedResponse,
        expires_at: Instant,
    },
}

#[derive(Debug)]
pub enum Claim {
    /// First sighting: the caller runs the request and reports back.
    Acquired,
    Replay(CachedResponse),
    InProgress,
    Mismatch,
}

#[derive(Clone)]
pub struct IdempotencyStore {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    ttl: Duration,
    in_flight_timeout: Duration,
}

impl Slot {
    fn is_live(&self, now: Instant, in_flight_timeout: Duration) -> bool {
        match self {
            Slot::InFlight { started_at, .. } => {
                now.duration_since(*started_at) < in_flight_timeout
            }
            Slot::Completed { expires_at, .. } => *expires_at > now,
        }
    }
}

/// SHA-256 over method, path and body.
pub fn fingerprint(method: &Method, path: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(path.as_bytes());
    hasher.update(b"\n");
    hasher.update(body);
    hex::encode(hasher.finalize())
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            in_flight_timeout: IN_FLIGHT_TIMEOUT,
        }
    }

    pub fn with_in_flight_timeout(mut self, timeout: Duration) -> Self {
        self.in_flight_timeout = timeout;
        self
    }

    pub async fn claim(&self, key: &str, fingerprint: &str) -> Claim {
        let mut slots = self.slots.lock().await;
        let now = Instant::now();

        let timeout = self.in_flight_timeout;
        if slots.len() > PRUNE_THRESHOLD {
            slots.retain(|_, slot| slot.is_live(now, timeout));
        }

        match slots.get(key).filter(|slot| slot.is_live(now, timeout)) {
            Some(Slot::InFlight {
                fingerprint: seen, ..
            }) => {
                if seen == fingerprint {
                    Claim::InProgress
                } else {
                    Claim::Mismatch
                }
            }
            Some(Slot::Completed {
                fingerprint: seen,
                response,
                ..
            }) => {
                if seen == fingerprint {
                    Claim::Replay(response.clone())
                } else {
                    Claim::Mismatch
                }
            }
            _ => {
                slots.insert(
                    key.to_string(),
                    Slot::InFlight {
                        fingerprint: fingerprint.to_string(),
                        started_at: now,
                    },
                );
                Claim::Acquired
            }
        }
    }

    pub async fn complete(&self, key: &str, fingerprint: &str, response: CachedResponse) {
        self.slots.lock().await.insert(
            key.to_string(),
            Slot::Completed {
                fingerprint: fingerprint.to_string(),
                response,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Forget an in-flight key so the client may retry it.
    pub async fn release(&self, key: &str) {
        let mut slots = self.slots.lock().await;
        if matches!(slots.get(key), Some(Slot::InFlight { .. })) {
            slots.remove(key);
        }
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached(body: &'static str) -> CachedResponse {
        CachedResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn fingerprint_covers_method_path_and_body() {
        let a = fingerprint(&Method::POST, "/api/payflow/admin/fund", b"{\"amount\":5}");
        assert_eq!(a.len(), 64);
        assert_eq!(
            a,
            fingerprint(&Method::POST, "/api/payflow/admin/fund", b"{\"amount\":5}")
        );
        assert_ne!(a, fingerprint(&Method::PUT, "/api/payflow/admin/fund", b"{\"amount\":5}"));
        assert_ne!(a, fingerprint(&Method::POST, "/api/quickcash/admin/fund", b"{\"amount\":5}"));
        assert_ne!(a, fingerprint(&Method::POST, "/api/payflow/admin/fund", b"{\"amount\":6}"));
    }

    #[tokio::test]
    async fn lifecycle() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        assert!(matches!(store.claim("k", "fp").await, Claim::Acquired));
        assert!(matches!(store.claim("k", "fp").await, Claim::InProgress));
        assert!(matches!(store.claim("k", "other").await, Claim::Mismatch));

        store.complete("k", "fp", cached("done")).await;
        match store.claim("k", "fp").await {
            Claim::Replay(r) => assert_eq!(r.body, Bytes::from_static(b"done")),
            other => panic!("expected replay, got {:?}", other),
        }
        assert!(matches!(store.claim("k", "other").await, Claim::Mismatch));
    }

    #[tokio::test]
    async fn released_keys_can_be_retried() {
        let store = IdempotencyStore::new(Duration::from_secs(60));
        assert!(matches!(store.claim("k", "fp").await, Claim::Acquired));
        store.release("k").await;
        assert!(store.is_empty().await);
        assert!(matches!(store.claim("k", "fp").await, Claim::Acquired));
    }

    #[tokio::test]
    async fn abandoned_in_flight_keys_expire() {
        let store = IdempotencyStore::new(Duration::from_secs(60))
            .with_in_flight_timeout(Duration::from_millis(10));
        assert!(matches!(store.claim("k", "fp").await, Claim::Acquired));
        assert!(matches!(store.claim("k", "fp").await, Claim::InProgress));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(matches!(store.claim("k", "fp").await, Claim::Acquired));
    }

    #[tokio::test]
    async fn expired_entries_are_claimable_again() {
        let store = IdempotencyStore::new(Duration::from_millis(10));
        assert!(matches!(store.claim("k", "fp").await, Claim::Acquired));
        store.complete("k", "fp", cached("old")).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(matches!(store.claim("k", "other").await, Claim::Acquired));
    }
}
