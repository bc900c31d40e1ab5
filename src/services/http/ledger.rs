use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{authenticate, error_response, internal_error, ApiResponse, AppState};
use crate::models::ledger::{Ledger, PartyId};
use crate::models::users::Profile;
use crate::services::ledger::{engine, LedgerRequest};
use crate::services::users::UserRequest;
use crate::services::ServiceError;
use crate::utils;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestNoPayload {
    target_user_id: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestIdPayload {
    request_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareNoesPayload {
    target_user_id: String,
    amount: u32,
}

fn parse_party(value: &str) -> Result<PartyId, ApiResponse> {
    PartyId::parse(value).ok_or((
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "User not found" })),
    ))
}

/// Sends one request to the ledger service and waits for the reply.
async fn call_ledger(
    state: &AppState,
    request: LedgerRequest,
    response_rx: oneshot::Receiver<Result<Ledger, ServiceError>>,
) -> ApiResponse {
    if let Err(e) = state.ledger_channel.send(request).await {
        return internal_error(e);
    }

    match response_rx.await {
        Ok(Ok(ledger)) => (StatusCode::OK, Json(json!(ledger))),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => internal_error(e),
    }
}

/// The read view attaches each party's display name and the whole days
/// left in user2's booster window, which clients show next to the balance.
fn ledger_view(ledger: &Ledger, profiles: &[Profile]) -> serde_json::Value {
    let mut body = json!(ledger);
    for profile in profiles {
        body[profile.id.as_str()]["name"] = json!(profile.name);
    }
    if ledger.user2.booster_active {
        if let Some(start) = ledger.user2.booster_start {
            body["user2"]["boosterDaysRemaining"] = json!(utils::whole_days_remaining(
                start,
                engine::BOOSTER_WINDOW_DAYS as i64,
                Utc::now(),
            ));
        }
    }
    body
}

/// Display names are decoration on the read view; a failure to load them
/// must not fail the ledger read itself.
async fn fetch_profiles(state: &AppState) -> Vec<Profile> {
    let (user_tx, user_rx) = oneshot::channel();
    let sent = state
        .user_channel
        .send(UserRequest::ListProfiles { response: user_tx })
        .await;
    if sent.is_err() {
        return Vec::new();
    }

    match user_rx.await {
        Ok(Ok(profiles)) => profiles,
        _ => {
            log::warn!("Could not load profiles for the ledger view.");
            Vec::new()
        }
    }
}

pub async fn get_noes(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    if let Err(rejection) = authenticate(&state, &headers).await {
        return rejection;
    }

    let (ledger_tx, ledger_rx) = oneshot::channel();
    let sent = state
        .ledger_channel
        .send(LedgerRequest::GetLedger {
            response: ledger_tx,
        })
        .await;
    if let Err(e) = sent {
        return internal_error(e);
    }

    match ledger_rx.await {
        Ok(Ok(ledger)) => {
            let profiles = fetch_profiles(&state).await;
            (StatusCode::OK, Json(ledger_view(&ledger, &profiles)))
        }
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => internal_error(e),
    }
}

pub async fn request_no(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RequestNoPayload>,
) -> ApiResponse {
    let caller = match authenticate(&state, &headers).await {
        Ok(profile) => profile,
        Err(rejection) => return rejection,
    };
    let target = match parse_party(&payload.target_user_id) {
        Ok(target) => target,
        Err(rejection) => return rejection,
    };

    let (request_tx, request_rx) = oneshot::channel();
    let sent = state
        .ledger_channel
        .send(LedgerRequest::RequestConsumption {
            requester: caller.id,
            target,
            requester_name: Some(caller.name),
            message: payload.message,
            photo_url: payload.photo_url,
            response: request_tx,
        })
        .await;
    if let Err(e) = sent {
        return internal_error(e);
    }

    match request_rx.await {
        Ok(Ok(request)) => (
            StatusCode::CREATED,
            Json(json!({ "success": true, "requestId": request.id })),
        ),
        Ok(Err(service_error)) => error_response(service_error),
        Err(e) => internal_error(e),
    }
}

pub async fn approve_no(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RequestIdPayload>,
) -> ApiResponse {
    let caller = match authenticate(&state, &headers).await {
        Ok(profile) => profile,
        Err(rejection) => return rejection,
    };

    let (ledger_tx, ledger_rx) = oneshot::channel();
    call_ledger(
        &state,
        LedgerRequest::ApproveConsumption {
            approver: caller.id,
            request_id: payload.request_id,
            response: ledger_tx,
        },
        ledger_rx,
    )
    .await
}

pub async fn deny_no(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RequestIdPayload>,
) -> ApiResponse {
    let caller = match authenticate(&state, &headers).await {
        Ok(profile) => profile,
        Err(rejection) => return rejection,
    };

    let (ledger_tx, ledger_rx) = oneshot::channel();
    call_ledger(
        &state,
        LedgerRequest::DenyConsumption {
            denier: caller.id,
            request_id: payload.request_id,
            response: ledger_tx,
        },
        ledger_rx,
    )
    .await
}

pub async fn share_noes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ShareNoesPayload>,
) -> ApiResponse {
    let caller = match authenticate(&state, &headers).await {
        Ok(profile) => profile,
        Err(rejection) => return rejection,
    };
    let target = match parse_party(&payload.target_user_id) {
        Ok(target) => target,
        Err(rejection) => return rejection,
    };

    let (ledger_tx, ledger_rx) = oneshot::channel();
    call_ledger(
        &state,
        LedgerRequest::ShareNoes {
            from: caller.id,
            to: target,
            amount: payload.amount,
            response: ledger_tx,
        },
        ledger_rx,
    )
    .await
}

pub async fn activate_booster(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    let caller = match authenticate(&state, &headers).await {
        Ok(profile) => profile,
        Err(rejection) => return rejection,
    };

    let (ledger_tx, ledger_rx) = oneshot::channel();
    call_ledger(
        &state,
        LedgerRequest::ActivateBooster {
            requester: caller.id,
            response: ledger_tx,
        },
        ledger_rx,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seeded_profiles() -> Vec<Profile> {
        vec![
            Profile {
                id: PartyId::UserOne,
                username: "user1".to_string(),
                name: "User One".to_string(),
            },
            Profile {
                id: PartyId::UserTwo,
                username: "user2".to_string(),
                name: "User Two".to_string(),
            },
        ]
    }

    #[test]
    fn read_view_attaches_display_names() {
        let ledger = Ledger::seeded(Utc::now());

        let body = ledger_view(&ledger, &seeded_profiles());

        assert_eq!(body["user1"]["name"], "User One");
        assert_eq!(body["user2"]["name"], "User Two");
        assert_eq!(body["user1"]["currentNoes"], 5);
    }

    #[test]
    fn read_view_attaches_booster_days_remaining() {
        let mut ledger = Ledger::seeded(Utc::now());
        ledger.user2.booster_active = true;
        ledger.user2.booster_start = Some(Utc::now() - Duration::hours(60));

        let body = ledger_view(&ledger, &seeded_profiles());

        assert_eq!(body["user2"]["boosterDaysRemaining"], 4);
    }

    #[test]
    fn read_view_survives_missing_profiles() {
        let ledger = Ledger::seeded(Utc::now());

        let body = ledger_view(&ledger, &[]);

        assert!(body["user1"]["name"].is_null());
        assert_eq!(body["user2"]["currentNoes"], 10);
    }
}
