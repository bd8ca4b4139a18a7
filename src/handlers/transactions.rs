use axum::extract::{Extension, Path, State};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::ApiJson;
use crate::error::ApiResult;
use crate::models::{ApiResponse, Platform, Transaction};
use crate::services::{Party, Receipt};
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMoneyRequest {
    pub recipient_email: String,
    pub amount: Decimal,
    pub message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendByMobileRequest {
    pub recipient_mobile: String,
    pub amount: Decimal,
    pub message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCryptoRequest {
    pub recipient_email: String,
    pub crypto_symbol: String,
    pub amount: Decimal,
}

pub(crate) fn receipt_response(receipt: Receipt) -> ApiResponse<Transaction> {
    ApiResponse::data(receipt.transaction).with_message(receipt.message)
}

fn note(message: Option<String>) -> Option<String> {
    message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty())
}

pub async fn send_money(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
    Path(sender_email): Path<String>,
    ApiJson(payload): ApiJson<SendMoneyRequest>,
) -> ApiResult<ApiResponse<Transaction>> {
    let receipt = state
        .payments
        .send_money(
            platform,
            Party::Email(&sender_email),
            Party::Email(&payload.recipient_email),
            payload.amount,
            note(payload.message),
        )
        .await?;
    Ok(receipt_response(receipt))
}

pub async fn send_money_by_mobile(
    State(state): State<AppState>,
    Path(sender_mobile): Path<String>,
    ApiJson(payload): ApiJson<SendByMobileRequest>,
) -> ApiResult<ApiResponse<Transaction>> {
    let receipt = state
        .payments
        .send_money(
            Platform::SendWave,
            Party::Mobile(&sender_mobile),
            Party::Mobile(&payload.recipient_mobile),
            payload.amount,
            note(payload.message),
        )
        .await?;
    Ok(receipt_response(receipt))
}

pub async fn request_money(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
    Path(requester_email): Path<String>,
    ApiJson(payload): ApiJson<SendMoneyRequest>,
) -> ApiResult<ApiResponse<Transaction>> {
    let receipt = state
        .payments
        .request_money(
            platform,
            &requester_email,
            &payload.recipient_email,
            payload.amount,
            note(payload.message),
        )
        .await?;
    Ok(receipt_response(receipt))
}

pub async fn send_crypto(
    State(state): State<AppState>,
    Path(sender_email): Path<String>,
    ApiJson(payload): ApiJson<SendCryptoRequest>,
) -> ApiResult<ApiResponse<Transaction>> {
    let receipt = state
        .payments
        .send_crypto(
            &sender_email,
            &payload.recipient_email,
            &payload.crypto_symbol,
            payload.amount,
        )
        .await?;
    Ok(receipt_response(receipt))
}
