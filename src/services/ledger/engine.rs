//! The token rules engine: pure state transitions over the two-account
//! ledger. Every mutating operation returns its outcome plus at most one
//! event for the caller to publish; on error the ledger the caller holds
//! must not be persisted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::ledger::{ConsumptionRequest, Ledger, LedgerEvent, PartyId, RequestStatus};
use crate::services::ServiceError;
use crate::utils;

pub const BOOSTER_GRANT: u32 = 5;
pub const BOOSTER_WINDOW_DAYS: f64 = 7.0;

/// Monthly refresh for both accounts, then booster lapse for user2.
/// Runs before every operation; returns whether anything changed so the
/// caller knows to persist. Idempotent within the same month/window.
pub fn maintain(ledger: &mut Ledger, now: DateTime<Utc>) -> bool {
    let mut changed = false;

    for id in PartyId::BOTH {
        let account = ledger.account_mut(id);
        if utils::months_elapsed(account.last_refresh, now) >= 1 {
            account.current_noes = account.max_noes;
            account.last_refresh = now;
            account.pending_requests.clear();
            changed = true;
        }
    }

    lapse_booster(ledger, now) || changed
}

/// Expires user2's booster once its 7-day window has passed, forfeiting
/// any unused bonus noes (floored at zero).
fn lapse_booster(ledger: &mut Ledger, now: DateTime<Utc>) -> bool {
    let account = ledger.account_mut(PartyId::UserTwo);
    if !account.booster_active {
        return false;
    }
    let Some(start) = account.booster_start else {
        return false;
    };
    if utils::days_elapsed(start, now) < BOOSTER_WINDOW_DAYS {
        return false;
    }

    account.current_noes = account.current_noes.saturating_sub(account.booster_noes);
    account.booster_active = false;
    account.booster_start = None;
    account.booster_noes = 0;
    true
}

/// Files a new consumption request in the target's pending list. There is
/// deliberately no balance precondition: reporting usage must stay
/// possible at a balance of zero, approval is what is gated.
pub fn request_consumption(
    ledger: &mut Ledger,
    requester: PartyId,
    target: PartyId,
    requester_name: Option<String>,
    message: Option<String>,
    photo_url: Option<String>,
    now: DateTime<Utc>,
) -> (ConsumptionRequest, LedgerEvent) {
    let request = ConsumptionRequest {
        id: Uuid::new_v4(),
        requester_id: requester,
        requester_name,
        target_user_id: target,
        message,
        photo_url,
        timestamp: now,
        status: RequestStatus::Pending,
        approvals: HashMap::new(),
    };

    ledger.account_mut(target).pending_requests.push(request.clone());
    let event = LedgerEvent::RequestCreated {
        request: request.clone(),
    };
    (request, event)
}

/// Records one party's approval. The no is consumed only once both the
/// requester and the target have approved; a self-request therefore
/// resolves on the first call. Consumption debits the account holding
/// the request (the target), drawing down booster noes first when the
/// target is user2 with an active booster.
pub fn approve_consumption(
    ledger: &mut Ledger,
    approver: PartyId,
    request_id: Uuid,
) -> Result<Option<LedgerEvent>, ServiceError> {
    let (holder, index) = PartyId::BOTH
        .into_iter()
        .find_map(|id| {
            ledger
                .account(id)
                .pending_requests
                .iter()
                .position(|r| r.id == request_id)
                .map(|index| (id, index))
        })
        .ok_or_else(|| ServiceError::NotFound(format!("request {request_id}")))?;

    let account = ledger.account_mut(holder);
    account.pending_requests[index]
        .approvals
        .insert(approver, true);

    if !account.pending_requests[index].fully_approved() {
        return Ok(None);
    }

    let mut request = account.pending_requests.remove(index);
    request.status = RequestStatus::Approved;

    if holder == PartyId::UserTwo && account.booster_active && account.booster_noes > 0 {
        account.booster_noes -= 1;
        account.current_noes = account.current_noes.saturating_sub(1);
        if account.booster_noes == 0 {
            account.booster_active = false;
            account.booster_start = None;
        }
    } else {
        account.current_noes = account.current_noes.saturating_sub(1);
    }

    Ok(Some(LedgerEvent::NoConsumed {
        user_id: holder,
        current_noes: account.current_noes,
        request,
    }))
}

/// Removes a request from the denier's own pending list unconditionally.
/// Denied requests are deleted, not archived, and no balance changes.
pub fn deny_consumption(
    ledger: &mut Ledger,
    denier: PartyId,
    request_id: Uuid,
) -> Result<LedgerEvent, ServiceError> {
    let account = ledger.account_mut(denier);
    let index = account
        .pending_requests
        .iter()
        .position(|r| r.id == request_id)
        .ok_or_else(|| ServiceError::NotFound(format!("request {request_id}")))?;

    account.pending_requests.remove(index);

    Ok(LedgerEvent::RequestDenied {
        request_id,
        denied_by: denier,
    })
}

/// Moves `amount` noes from the sender's spendable balance into the
/// recipient's cumulative shared counter. Shared noes are display-only
/// and never merge back into the spendable balance.
pub fn share_noes(
    ledger: &mut Ledger,
    from: PartyId,
    to: PartyId,
    amount: u32,
) -> Result<LedgerEvent, ServiceError> {
    let available = ledger.account(from).current_noes;
    if amount > available {
        return Err(ServiceError::InsufficientBalance {
            requested: amount,
            available,
        });
    }

    ledger.account_mut(from).current_noes -= amount;
    ledger.account_mut(to).shared_noes += amount;

    Ok(LedgerEvent::NoesShared {
        from_user_id: from,
        to_user_id: to,
        amount,
    })
}

/// Grants user2 five bonus noes for a 7-day window. Only user2 may
/// activate it, and never while a previous window is still running.
pub fn activate_booster(
    ledger: &mut Ledger,
    requester: PartyId,
    now: DateTime<Utc>,
) -> Result<LedgerEvent, ServiceError> {
    if requester != PartyId::UserTwo {
        return Err(ServiceError::Forbidden(format!(
            "only {} can activate the booster",
            PartyId::UserTwo
        )));
    }

    lapse_booster(ledger, now);

    let account = ledger.account_mut(PartyId::UserTwo);
    if account.booster_active {
        return Err(ServiceError::AlreadyActive);
    }

    account.current_noes += BOOSTER_GRANT;
    account.booster_active = true;
    account.booster_start = Some(now);
    account.booster_noes = BOOSTER_GRANT;

    Ok(LedgerEvent::BoosterActivated {
        user_id: PartyId::UserTwo,
        current_noes: account.current_noes,
    })
}
