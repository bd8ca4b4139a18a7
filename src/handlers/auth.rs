use axum::extract::{Extension, State};
use serde::Deserialize;

use super::ApiJson;
use crate::error::{ApiError, ApiResult};
use crate::models::{ApiResponse, Platform, Profile};
use crate::services::Registration;
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub full_name: String,
    pub mobile_number: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<ApiResponse<Profile>> {
    let profile = state
        .directory
        .register(
            platform,
            Registration {
                email: payload.email,
                password: payload.password,
                full_name: payload.full_name,
                mobile_number: payload
                    .mobile_number
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty()),
            },
        )
        .await?;
    Ok(ApiResponse::data(profile).with_message("User created successfully"))
}

pub async fn login(
    State(state): State<AppState>,
    Extension(platform): Extension<Platform>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<ApiResponse<Profile>> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }
    let profile = state
        .directory
        .login(platform, &payload.email, &payload.password)
        .await?;
    tracing::info!("{}: {} logged in", platform.slug(), payload.email.trim());
    Ok(ApiResponse::data(profile).with_message("Login successful"))
}
