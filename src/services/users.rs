use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{RequestHandler, Service, ServiceError};
use crate::models::users::{Credential, Profile, Session};
use crate::repositories::users::UserRepository;

pub enum UserRequest {
    Login {
        username: String,
        password: String,
        response: oneshot::Sender<Result<Session, ServiceError>>,
    },
    Authenticate {
        token: String,
        response: oneshot::Sender<Result<Profile, ServiceError>>,
    },
    ListProfiles {
        response: oneshot::Sender<Result<Vec<Profile>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct UserRequestHandler {
    repository: UserRepository,
    // Bearer sessions live for the process lifetime; they are not persisted.
    sessions: Arc<DashMap<String, Credential>>,
}

impl UserRequestHandler {
    pub fn new(repository: UserRepository) -> Self {
        UserRequestHandler {
            repository,
            sessions: Arc::new(DashMap::new()),
        }
    }

    async fn login(&self, username: &str, password: &str) -> Result<Session, ServiceError> {
        let credential = self
            .repository
            .verify(username, password)
            .await
            .map_err(|e| ServiceError::Repository("UserService".to_string(), e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound("invalid credentials".to_string()))?;

        let token = Uuid::new_v4().hyphenated().to_string();
        let session = Session {
            token: token.clone(),
            user: credential.profile(),
        };
        self.sessions.insert(token, credential);

        log::info!("{} logged in.", session.user.id);
        Ok(session)
    }

    async fn authenticate(&self, token: &str) -> Result<Profile, ServiceError> {
        self.sessions
            .get(token)
            .map(|c| c.profile())
            .ok_or_else(|| ServiceError::NotFound("unknown session".to_string()))
    }

    /// Both parties' public profiles, for attaching display names to the
    /// ledger read view.
    async fn list_profiles(&self) -> Result<Vec<Profile>, ServiceError> {
        let credentials = self
            .repository
            .load()
            .await
            .map_err(|e| ServiceError::Repository("UserService".to_string(), e.to_string()))?;

        Ok(credentials.iter().map(Credential::profile).collect())
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::Login {
                username,
                password,
                response,
            } => {
                let result = self.login(&username, &password).await;
                let _ = response.send(result);
            }
            UserRequest::Authenticate { token, response } => {
                let result = self.authenticate(&token).await;
                let _ = response.send(result);
            }
            UserRequest::ListProfiles { response } => {
                let result = self.list_profiles().await;
                let _ = response.send(result);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}
