//! Support chat. The ledger keeps the conversation; these routes relay it.

use axum::{
    extract::{Extension, Path, State},
    response::Response,
};
use serde_json::json;

use super::{relay, ApiJson};
use crate::error::{ApiError, ApiResult};
use crate::ledger::{segment, UpstreamRequest};
use crate::models::{Platform, SendMessageRequest};
use crate::AppState;

fn chat_path(platform: Platform, action: &str, email: &str) -> String {
    format!("{}/chat/{}/{}", platform.slug(), action, segment(email.trim()))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
    ApiJson(payload): ApiJson<SendMessageRequest>,
) -> ApiResult<Response> {
    if payload.sender_email.trim().is_empty()
        || payload.receiver_email.trim().is_empty()
        || payload.message.trim().is_empty()
    {
        return Err(ApiError::validation(
            "sender_email, receiver_email and message are required",
        ));
    }
    let body = json!({
        "sender_email": payload.sender_email.trim(),
        "receiver_email": payload.receiver_email.trim(),
        "message": payload.message,
    });
    let reply = state
        .ledger
        .call(UpstreamRequest::post(
            format!("{}/chat/send", platform.slug()),
            Some(body),
        ))
        .await?;
    Ok(relay(reply, "Failed to send message"))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
    Path(email): Path<String>,
) -> ApiResult<Response> {
    let reply = state
        .ledger
        .call(UpstreamRequest::post(chat_path(platform, "mark-read", &email), None))
        .await?;
    Ok(relay(reply, "Failed to mark messages as read"))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
    Path(email): Path<String>,
) -> ApiResult<Response> {
    let reply = state
        .ledger
        .call(UpstreamRequest::get(chat_path(platform, "history", &email)))
        .await?;
    Ok(relay(reply, "Failed to get chat history"))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
    Path(email): Path<String>,
) -> ApiResult<Response> {
    let reply = state
        .ledger
        .call(UpstreamRequest::get(chat_path(platform, "unread", &email)))
        .await?;
    Ok(relay(reply, "Failed to get unread count"))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
    Path(email): Path<String>,
) -> ApiResult<Response> {
    let reply = state
        .ledger
        .call(UpstreamRequest::get(chat_path(platform, "status", &email)))
        .await?;
    Ok(relay(reply, "Failed to get chat status"))
}

pub async fn toggle(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
    Path(user_id): Path<String>,
) -> ApiResult<Response> {
    let id = super::path_user_id(&user_id)?;
    let reply = state
        .ledger
        .call(UpstreamRequest::post(
            format!("{}/admin/user/{}/toggle-chat", platform.slug(), id),
            None,
        ))
        .await?;
    Ok(relay(reply, "Failed to toggle chat"))
}
