use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two fixed parties. The whole design assumes exactly two; `other`
/// is the only way the counterpart is ever derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartyId {
    #[serde(rename = "user1")]
    UserOne,
    #[serde(rename = "user2")]
    UserTwo,
}

impl PartyId {
    pub const BOTH: [PartyId; 2] = [PartyId::UserOne, PartyId::UserTwo];

    pub fn other(self) -> PartyId {
        match self {
            PartyId::UserOne => PartyId::UserTwo,
            PartyId::UserTwo => PartyId::UserOne,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PartyId::UserOne => "user1",
            PartyId::UserTwo => "user2",
        }
    }

    pub fn parse(value: &str) -> Option<PartyId> {
        match value {
            "user1" => Some(PartyId::UserOne),
            "user2" => Some(PartyId::UserTwo),
            _ => None,
        }
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
}

/// A proposal that one "no" was used, kept in the target party's pending
/// list until both parties approve it or the target denies it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionRequest {
    pub id: Uuid,
    pub requester_id: PartyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_name: Option<String>,
    pub target_user_id: PartyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: RequestStatus,
    #[serde(default)]
    pub approvals: HashMap<PartyId, bool>,
}

impl ConsumptionRequest {
    /// True once both the requester and the target have approved. For a
    /// self-request the two keys coincide, so one approval resolves it.
    pub fn fully_approved(&self) -> bool {
        let approved = |party| self.approvals.get(&party).copied().unwrap_or(false);
        approved(self.requester_id) && approved(self.target_user_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub current_noes: u32,
    pub max_noes: u32,
    pub last_refresh: DateTime<Utc>,
    #[serde(default)]
    pub shared_noes: u32,
    #[serde(default)]
    pub pending_requests: Vec<ConsumptionRequest>,
    // Booster fields are only ever set on user2's account.
    #[serde(default)]
    pub booster_active: bool,
    #[serde(default)]
    pub booster_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub booster_noes: u32,
}

impl UserAccount {
    pub fn with_max(max_noes: u32, now: DateTime<Utc>) -> Self {
        UserAccount {
            current_noes: max_noes,
            max_noes,
            last_refresh: now,
            shared_noes: 0,
            pending_requests: Vec::new(),
            booster_active: false,
            booster_start: None,
            booster_noes: 0,
        }
    }
}

/// The whole persisted ledger: both accounts, read and written as one unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub user1: UserAccount,
    pub user2: UserAccount,
}

impl Ledger {
    pub fn seeded(now: DateTime<Utc>) -> Self {
        Ledger {
            user1: UserAccount::with_max(5, now),
            user2: UserAccount::with_max(10, now),
        }
    }

    pub fn account(&self, id: PartyId) -> &UserAccount {
        match id {
            PartyId::UserOne => &self.user1,
            PartyId::UserTwo => &self.user2,
        }
    }

    pub fn account_mut(&mut self, id: PartyId) -> &mut UserAccount {
        match id {
            PartyId::UserOne => &mut self.user1,
            PartyId::UserTwo => &mut self.user2,
        }
    }
}

/// State-change notifications fanned out to connected viewers. Every
/// mutating engine operation yields at most one of these.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum LedgerEvent {
    RequestCreated {
        request: ConsumptionRequest,
    },
    #[serde(rename_all = "camelCase")]
    NoConsumed {
        user_id: PartyId,
        current_noes: u32,
        request: ConsumptionRequest,
    },
    #[serde(rename_all = "camelCase")]
    RequestDenied {
        request_id: Uuid,
        denied_by: PartyId,
    },
    #[serde(rename_all = "camelCase")]
    NoesShared {
        from_user_id: PartyId,
        to_user_id: PartyId,
        amount: u32,
    },
    #[serde(rename_all = "camelCase")]
    BoosterActivated {
        user_id: PartyId,
        current_noes: u32,
    },
}
