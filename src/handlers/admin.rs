use axum::{
    extract::{Extension, Path, State},
    response::Response,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::{path_user_id, relay, transactions::receipt_response, user_id, ApiJson};
use crate::error::{ApiError, ApiResult};
use crate::ledger::UpstreamRequest;
use crate::models::{
    currency::normalize_symbol, ApiResponse, CryptoWallet, Platform, Profile, Transaction,
    UserId,
};
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundRequest {
    #[serde(deserialize_with = "user_id")]
    pub user_id: UserId,
    pub amount: Decimal,
    pub reason: Option<String>,
    /// CryptoPort only.
    pub crypto_symbol: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDepositAddressRequest {
    #[serde(deserialize_with = "user_id")]
    pub user_id: UserId,
    pub crypto_symbol: String,
    #[serde(default)]
    pub deposit_address: String,
}

pub async fn fund(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
    ApiJson(payload): ApiJson<FundRequest>,
) -> ApiResult<ApiResponse<Transaction>> {
    let receipt = if platform.has_crypto_wallets() {
        let symbol = payload
            .crypto_symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::validation("Crypto symbol is required"))?;
        state
            .payments
            .fund_crypto_wallet(payload.user_id, symbol, payload.amount, payload.reason)
            .await?
    } else {
        state
            .payments
            .fund_account(platform, payload.user_id, payload.amount, payload.reason)
            .await?
    };
    Ok(receipt_response(receipt))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
) -> ApiResult<ApiResponse<Vec<Profile>>> {
    let profiles = state.directory.list_profiles(platform).await?;
    Ok(ApiResponse::data(profiles))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<Profile>> {
    let profile = state
        .directory
        .profile_by_id(path_user_id(&id)?, platform)
        .await?;
    Ok(ApiResponse::data(profile))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    state.directory.delete_crypto_user(path_user_id(&id)?).await?;
    Ok(ApiResponse::message("User deleted successfully"))
}

pub async fn update_deposit_address(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateDepositAddressRequest>,
) -> ApiResult<ApiResponse<CryptoWallet>> {
    let wallet = state
        .payments
        .update_deposit_address(
            payload.user_id,
            &payload.crypto_symbol,
            &payload.deposit_address,
        )
        .await?;
    let message = format!(
        "{} deposit address updated successfully",
        normalize_symbol(&payload.crypto_symbol)
    );
    Ok(ApiResponse::data(wallet).with_message(message))
}

pub async fn all_transactions(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
) -> ApiResult<Response> {
    let reply = state
        .ledger
        .call(UpstreamRequest::get(format!(
            "{}/admin/transactions",
            platform.slug()
        )))
        .await?;
    Ok(relay(reply, "Failed to get transactions"))
}

/// `userId` of a forwarded admin body, when there is a usable one.
fn body_user_id(payload: &Value) -> Option<UserId> {
    payload.get("userId").cloned().and_then(|v| user_id(v).ok())
}

pub async fn adjust_balance(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<Response> {
    let user = body_user_id(&payload);
    let reply = state
        .payments
        .forward_account_write(
            Platform::SendWave,
            user,
            UpstreamRequest::post("sendwave/admin/adjust-balance", Some(payload)),
        )
        .await?;
    Ok(relay(reply, "Failed to adjust balance"))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<Response> {
    let id = path_user_id(&id)?;
    let reply = state
        .payments
        .forward_account_write(
            Platform::SendWave,
            Some(id),
            UpstreamRequest::put(format!("sendwave/admin/user/{}/update", id), payload),
        )
        .await?;
    Ok(relay(reply, "Failed to update user"))
}

pub async fn edit_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<Value>,
) -> ApiResult<Response> {
    let user = body_user_id(&payload);
    let reply = state
        .payments
        .forward_account_write(
            Platform::QuickCash,
            user,
            UpstreamRequest::put("quickcash/admin/edit-user", payload),
        )
        .await?;
    Ok(relay(reply, "Failed to edit user"))
}
