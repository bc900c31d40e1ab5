use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tower_http::trace::TraceLayer;

use super::ledger::LedgerRequest;
use super::notifications::NotificationHub;
use super::users::UserRequest;
use super::ServiceError;
use crate::models::ledger::LedgerEvent;
use crate::models::users::Profile;

mod ledger;
mod users;

#[derive(Clone)]
pub struct AppState {
    ledger_channel: mpsc::Sender<LedgerRequest>,
    user_channel: mpsc::Sender<UserRequest>,
    hub: NotificationHub,
}

type ApiResponse = (StatusCode, Json<Value>);

fn internal_error(details: impl ToString) -> ApiResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "Internal server error",
            "details": details.to_string()
        })),
    )
}

fn error_response(error: ServiceError) -> ApiResponse {
    let status = match &error {
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::InsufficientBalance { .. } | ServiceError::AlreadyActive => {
            StatusCode::BAD_REQUEST
        }
        ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
        ServiceError::Repository(..) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(json!({ "error": error.to_string() })))
}

/// Resolves the caller's bearer token to a party profile through the user
/// service. Every ledger route goes through this first.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Profile, ApiResponse> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);

    let Some(token) = token else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Access token required" })),
        ));
    };

    let (user_tx, user_rx) = oneshot::channel();
    state
        .user_channel
        .send(UserRequest::Authenticate {
            token,
            response: user_tx,
        })
        .await
        .map_err(internal_error)?;

    match user_rx.await {
        Ok(Ok(profile)) => Ok(profile),
        Ok(Err(_)) => Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Invalid token" })),
        )),
        Err(e) => Err(internal_error(e)),
    }
}

async fn events_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let receiver = state.hub.subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, receiver))
}

async fn forward_events(mut socket: WebSocket, mut receiver: broadcast::Receiver<LedgerEvent>) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                let Ok(payload) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    log::debug!("Viewer disconnected.");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::debug!("Viewer lagged, {} event(s) skipped.", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

pub async fn start_http_server(
    listen: &str,
    ledger_channel: mpsc::Sender<LedgerRequest>,
    user_channel: mpsc::Sender<UserRequest>,
    hub: NotificationHub,
) -> Result<(), anyhow::Error> {
    let app_state = AppState {
        ledger_channel,
        user_channel,
        hub,
    };

    let app = Router::new()
        .route("/api/login", post(users::login))
        .route("/api/noes", get(ledger::get_noes))
        .route("/api/request-no", post(ledger::request_no))
        .route("/api/approve-no", post(ledger::approve_no))
        .route("/api/deny-no", post(ledger::deny_no))
        .route("/api/share-noes", post(ledger::share_noes))
        .route("/api/activate-booster", post(ledger::activate_booster))
        .route("/ws", get(events_ws))
        .route("/health", get(|| async { "OK" }))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
