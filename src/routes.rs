use axum::{
    extract::State,
    middleware,
    response::Json,
    routing::{delete, get, post},
    Extension, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{admin, auth, chat, transactions, users, wallets};
use crate::middleware::{idempotency_middleware, security_headers_middleware};
use crate::models::Platform;
use crate::AppState;

/// The whole HTTP surface, layers included.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/ping", get(ping))
        .nest("/api/payflow", platform_routes(Platform::PayFlow))
        .nest("/api/paypal", platform_routes(Platform::PayFlow))
        .nest("/api/cryptoport", platform_routes(Platform::CryptoPort))
        .nest("/api/sendwave", platform_routes(Platform::SendWave))
        .nest("/api/quickcash", platform_routes(Platform::QuickCash))
        .layer(middleware::from_fn_with_state(
            state.idempotency.clone(),
            idempotency_middleware,
        ))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn ping(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "message": state.config.ping_message }))
}

fn platform_routes(platform: Platform) -> Router<AppState> {
    let common = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/user/:email", get(users::get_user))
        .route("/user/:email/transactions", get(users::get_transactions))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/fund", post(admin::fund))
        .route("/chat/send", post(chat::send_message))
        .route("/chat/mark-read/:email", post(chat::mark_read))
        .route("/chat/history/:email", get(chat::history))
        .route("/chat/unread/:email", get(chat::unread_count))
        .route("/chat/status/:email", get(chat::status));

    let specific = match platform {
        Platform::PayFlow => Router::new()
            .route("/user/:email/send", post(transactions::send_money))
            .route("/user/:email/request", post(transactions::request_money))
            .route("/admin/user/:id", get(admin::get_user))
            .route("/chat/toggle/:id", post(chat::toggle)),
        Platform::CryptoPort => Router::new()
            .route("/user/:email/wallets", get(wallets::get_wallets))
            .route("/user/:email/send", post(transactions::send_crypto))
            .route("/user/:email/deposit", post(wallets::deposit))
            .route("/user/:email/withdraw", post(wallets::withdraw))
            .route(
                "/admin/user/update-deposit-address",
                post(admin::update_deposit_address),
            )
            .route("/admin/user/:id/delete", delete(admin::delete_user))
            .route("/admin/user/:id/toggle-chat", post(chat::toggle)),
        Platform::SendWave => Router::new()
            .route("/user/search", get(users::search_sendwave))
            .route("/user/mobile/:mobile", get(users::get_user_by_mobile))
            .route(
                "/user/mobile/:mobile/transactions",
                get(users::get_transactions_by_mobile),
            )
            .route(
                "/user/mobile/:mobile/send",
                post(transactions::send_money_by_mobile),
            )
            .route("/admin/adjust-balance", post(admin::adjust_balance))
            .route("/admin/transactions", get(admin::all_transactions))
            .route(
                "/admin/user/:id",
                get(admin::get_user).put(admin::update_user),
            )
            .route("/admin/user/:id/toggle-chat", post(chat::toggle)),
        Platform::QuickCash => Router::new()
            .route("/search", get(users::search_quickcash))
            .route("/user/:email/send", post(transactions::send_money))
            .route("/admin/transactions", get(admin::all_transactions))
            .route("/admin/edit-user", axum::routing::put(admin::edit_user))
            .route("/admin/user/:id/toggle-chat", post(chat::toggle)),
    };

    common.merge(specific).layer(Extension(platform))
}
