use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;
use tokio::sync::oneshot;

use super::{internal_error, ApiResponse, AppState};
use crate::models::users::LoginRequest;
use crate::services::users::UserRequest;

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResponse {
    let (user_tx, user_rx) = oneshot::channel();

    let sent = state
        .user_channel
        .send(UserRequest::Login {
            username: payload.username,
            password: payload.password,
            response: user_tx,
        })
        .await;
    if let Err(e) = sent {
        return internal_error(e);
    }

    match user_rx.await {
        Ok(Ok(session)) => (
            StatusCode::OK,
            Json(json!({ "token": session.token, "user": session.user })),
        ),
        Ok(Err(_)) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid credentials" })),
        ),
        Err(e) => internal_error(e),
    }
}
