pub mod admin;
pub mod auth;
pub mod chat;
pub mod transactions;
pub mod users;
pub mod wallets;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::ledger::UpstreamReply;
use crate::models::{ids::parse_user_id, ApiResponse, UserId};

/// `Json` whose rejections render as the `{ success: false, error }` envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::validation(rejection_message(&rejection))),
        }
    }
}

fn rejection_message(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "Expected request with `Content-Type: application/json`".to_string()
        }
        other => other.body_text(),
    }
}

/// Browsers send user ids both as numbers and as strings.
pub fn user_id<'de, D>(deserializer: D) -> Result<UserId, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom(format!("Invalid user id '{}'", n))),
        Value::String(s) => parse_user_id(&s).map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!(
            "Invalid user id '{}'",
            other
        ))),
    }
}

pub fn path_user_id(raw: &str) -> ApiResult<UserId> {
    parse_user_id(raw).map_err(|_| ApiError::not_found("User not found"))
}

/// Pass a platform endpoint's answer through to the browser.
///
/// Bodies that already carry `success` go out as they are, anything else is
/// wrapped in the envelope. Failures keep the ledger's status.
pub fn relay(reply: UpstreamReply, fallback: &str) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    if !reply.is_success() {
        let message = reply.error_message(fallback);
        tracing::warn!("Ledger answered {}: {}", reply.status, message);
        return (status, Json(ApiResponse::failure(message))).into_response();
    }
    if reply.body.get("success").is_some() {
        return (status, Json(reply.body)).into_response();
    }
    (status, Json(ApiResponse::data(reply.body))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::json;

    async fn body_of(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[derive(Deserialize)]
    struct Body {
        #[serde(deserialize_with = "user_id")]
        id: UserId,
    }

    #[test]
    fn user_id_from_number_or_string() {
        let a: Body = serde_json::from_value(json!({"id": 4})).unwrap();
        let b: Body = serde_json::from_value(json!({"id": " 5 "})).unwrap();
        assert_eq!((a.id, b.id), (4, 5));
        assert!(serde_json::from_value::<Body>(json!({"id": "x"})).is_err());
        assert!(serde_json::from_value::<Body>(json!({"id": null})).is_err());
    }

    #[tokio::test]
    async fn relay_keeps_enveloped_bodies() {
        let reply = UpstreamReply {
            status: 200,
            body: json!({"success": true, "unread_count": 2}),
        };
        let response = relay(reply, "x");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, json!({"success": true, "unread_count": 2}));
    }

    #[tokio::test]
    async fn relay_wraps_bare_bodies_and_failures() {
        let wrapped = relay(
            UpstreamReply {
                status: 200,
                body: json!([1, 2]),
            },
            "x",
        );
        assert_eq!(body_of(wrapped).await, json!({"success": true, "data": [1, 2]}));

        let failed = relay(
            UpstreamReply {
                status: 404,
                body: json!({"detail": "Not found."}),
            },
            "Failed to get user",
        );
        assert_eq!(failed.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_of(failed).await,
            json!({"success": false, "error": "Not found."})
        );

        let bare = relay(
            UpstreamReply {
                status: 502,
                body: Value::Null,
            },
            "Failed to get user",
        );
        assert_eq!(
            body_of(bare).await,
            json!({"success": false, "error": "Failed to get user"})
        );
    }
}
