use axum::{
    extract::{Extension, Path, Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::relay;
use crate::error::ApiResult;
use crate::ledger::UpstreamRequest;
use crate::models::{ApiResponse, Platform, Profile, Transaction};
use crate::AppState;

#[derive(Deserialize)]
pub struct SendWaveSearch {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct QuickCashSearch {
    #[serde(default)]
    pub query: String,
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
    Path(email): Path<String>,
) -> ApiResult<ApiResponse<Profile>> {
    let profile = state.directory.profile_by_email(&email, platform).await?;
    Ok(ApiResponse::data(profile))
}

pub async fn get_transactions(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
    Path(email): Path<String>,
) -> ApiResult<ApiResponse<Vec<Transaction>>> {
    let transactions = state
        .directory
        .transactions_by_email(&email, platform)
        .await?;
    Ok(ApiResponse::data(transactions))
}

pub async fn get_user_by_mobile(
    State(state): State<AppState>,
    Path(mobile): Path<String>,
) -> ApiResult<ApiResponse<Profile>> {
    let user = state
        .directory
        .find_user_by_mobile(&mobile, "User not found")
        .await?;
    let profile = state.directory.profile(&user, Platform::SendWave).await?;
    Ok(ApiResponse::data(profile))
}

pub async fn get_transactions_by_mobile(
    State(state): State<AppState>,
    Path(mobile): Path<String>,
) -> ApiResult<ApiResponse<Vec<Transaction>>> {
    let user = state
        .directory
        .find_user_by_mobile(&mobile, "User not found")
        .await?;
    let transactions = state
        .directory
        .transactions_of(&user, Platform::SendWave)
        .await?;
    Ok(ApiResponse::data(transactions))
}

pub async fn search_sendwave(
    State(state): State<AppState>,
    Query(params): Query<SendWaveSearch>,
) -> ApiResult<Response> {
    let q = params.q.trim();
    if q.is_empty() {
        return Ok(ApiResponse::data(Vec::<serde_json::Value>::new()).into_response());
    }
    let reply = state
        .ledger
        .call(UpstreamRequest::get("sendwave/user/search").with_query("q", q))
        .await?;
    Ok(relay(reply, "Failed to search users"))
}

pub async fn search_quickcash(
    State(state): State<AppState>,
    Query(params): Query<QuickCashSearch>,
) -> ApiResult<Response> {
    let reply = state
        .ledger
        .call(UpstreamRequest::get("quickcash/search").with_query("query", params.query.trim()))
        .await?;
    Ok(relay(reply, "Failed to search users"))
}
