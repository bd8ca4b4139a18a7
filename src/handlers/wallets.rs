use axum::extract::{Path, State};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{transactions::receipt_response, ApiJson};
use crate::error::ApiResult;
use crate::models::{ApiResponse, CryptoWallet, Transaction};
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub crypto_symbol: String,
    pub amount: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub crypto_symbol: String,
    pub amount: Decimal,
    #[serde(default)]
    pub withdrawal_address: String,
}

pub async fn get_wallets(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<ApiResponse<Vec<CryptoWallet>>> {
    let wallets = state.directory.wallets_by_email(&email).await?;
    Ok(ApiResponse::data(wallets))
}

pub async fn deposit(
    State(state): State<AppState>,
    Path(email): Path<String>,
    ApiJson(payload): ApiJson<DepositRequest>,
) -> ApiResult<ApiResponse<Transaction>> {
    let receipt = state
        .payments
        .deposit_crypto(&email, &payload.crypto_symbol, payload.amount)
        .await?;
    Ok(receipt_response(receipt))
}

pub async fn withdraw(
    State(state): State<AppState>,
    Path(email): Path<String>,
    ApiJson(payload): ApiJson<WithdrawRequest>,
) -> ApiResult<ApiResponse<Transaction>> {
    let receipt = state
        .payments
        .withdraw_crypto(
            &email,
            &payload.crypto_symbol,
            payload.amount,
            &payload.withdrawal_address,
        )
        .await?;
    Ok(receipt_response(receipt))
}
