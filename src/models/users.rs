use serde::{Deserialize, Serialize};

use crate::models::ledger::PartyId;

/// One persisted login record. Passwords are stored as sha256 hex digests.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Credential {
    pub id: PartyId,
    pub username: String,
    pub password_digest: String,
    pub name: String,
}

impl Credential {
    pub fn profile(&self) -> Profile {
        Profile {
            id: self.id,
            username: self.username.clone(),
            name: self.name.clone(),
        }
    }
}

/// The public slice of a credential, safe to return to clients.
#[derive(Clone, Debug, Serialize)]
pub struct Profile {
    pub id: PartyId,
    pub username: String,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// A bearer session issued on login.
#[derive(Clone, Debug, Serialize)]
pub struct Session {
    pub token: String,
    pub user: Profile,
}
