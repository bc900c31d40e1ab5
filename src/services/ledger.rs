use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::notifications::NotificationHub;
use super::{RequestHandler, Service, ServiceError};
use crate::models::ledger::{ConsumptionRequest, Ledger, PartyId};
use crate::repositories::ledger::LedgerRepository;

pub mod engine;

pub enum LedgerRequest {
    GetLedger {
        response: oneshot::Sender<Result<Ledger, ServiceError>>,
    },
    RequestConsumption {
        requester: PartyId,
        target: PartyId,
        requester_name: Option<String>,
        message: Option<String>,
        photo_url: Option<String>,
        response: oneshot::Sender<Result<ConsumptionRequest, ServiceError>>,
    },
    ApproveConsumption {
        approver: PartyId,
        request_id: Uuid,
        response: oneshot::Sender<Result<Ledger, ServiceError>>,
    },
    DenyConsumption {
        denier: PartyId,
        request_id: Uuid,
        response: oneshot::Sender<Result<Ledger, ServiceError>>,
    },
    ShareNoes {
        from: PartyId,
        to: PartyId,
        amount: u32,
        response: oneshot::Sender<Result<Ledger, ServiceError>>,
    },
    ActivateBooster {
        requester: PartyId,
        response: oneshot::Sender<Result<Ledger, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct LedgerRequestHandler {
    repository: LedgerRepository,
    hub: NotificationHub,
}

impl LedgerRequestHandler {
    pub fn new(repository: LedgerRepository, hub: NotificationHub) -> Self {
        LedgerRequestHandler { repository, hub }
    }

    fn repository_error(e: anyhow::Error) -> ServiceError {
        ServiceError::Repository("LedgerService".to_string(), e.to_string())
    }

    /// Loads the ledger and applies the maintenance pass (monthly refresh,
    /// booster lapse), persisting its effects before the operation proper
    /// runs. A failed operation therefore still leaves maintenance durable.
    async fn check_out(&self) -> Result<Ledger, ServiceError> {
        let mut ledger = self
            .repository
            .load()
            .await
            .map_err(Self::repository_error)?;

        if engine::maintain(&mut ledger, Utc::now()) {
            self.repository
                .save(&ledger)
                .await
                .map_err(Self::repository_error)?;
        }

        Ok(ledger)
    }

    async fn get_ledger(&self) -> Result<Ledger, ServiceError> {
        self.check_out().await
    }

    async fn request_consumption(
        &self,
        requester: PartyId,
        target: PartyId,
        requester_name: Option<String>,
        message: Option<String>,
        photo_url: Option<String>,
    ) -> Result<ConsumptionRequest, ServiceError> {
        let mut ledger = self.check_out().await?;
        let (request, event) = engine::request_consumption(
            &mut ledger,
            requester,
            target,
            requester_name,
            message,
            photo_url,
            Utc::now(),
        );

        self.repository
            .save(&ledger)
            .await
            .map_err(Self::repository_error)?;
        self.hub.publish(event);

        log::info!("{} filed a consumption request against {}.", requester, target);
        Ok(request)
    }

    async fn approve_consumption(
        &self,
        approver: PartyId,
        request_id: Uuid,
    ) -> Result<Ledger, ServiceError> {
        let mut ledger = self.check_out().await?;
        let event = engine::approve_consumption(&mut ledger, approver, request_id)?;

        self.repository
            .save(&ledger)
            .await
            .map_err(Self::repository_error)?;
        if let Some(event) = event {
            log::info!("Request {} fully approved, no consumed.", request_id);
            self.hub.publish(event);
        }

        Ok(ledger)
    }

    async fn deny_consumption(
        &self,
        denier: PartyId,
        request_id: Uuid,
    ) -> Result<Ledger, ServiceError> {
        let mut ledger = self.check_out().await?;
        let event = engine::deny_consumption(&mut ledger, denier, request_id)?;

        self.repository
            .save(&ledger)
            .await
            .map_err(Self::repository_error)?;
        self.hub.publish(event);

        log::info!("{} denied request {}.", denier, request_id);
        Ok(ledger)
    }

    async fn share_noes(
        &self,
        from: PartyId,
        to: PartyId,
        amount: u32,
    ) -> Result<Ledger, ServiceError> {
        let mut ledger = self.check_out().await?;
        let event = engine::share_noes(&mut ledger, from, to, amount)?;

        self.repository
            .save(&ledger)
            .await
            .map_err(Self::repository_error)?;
        self.hub.publish(event);

        log::info!("{} shared {} noes with {}.", from, amount, to);
        Ok(ledger)
    }

    async fn activate_booster(&self, requester: PartyId) -> Result<Ledger, ServiceError> {
        let mut ledger = self.check_out().await?;
        let event = engine::activate_booster(&mut ledger, requester, Utc::now())?;

        self.repository
            .save(&ledger)
            .await
            .map_err(Self::repository_error)?;
        self.hub.publish(event);

        log::info!("Booster activated by {}.", requester);
        Ok(ledger)
    }
}

#[async_trait]
impl RequestHandler<LedgerRequest> for LedgerRequestHandler {
    async fn handle_request(&self, request: LedgerRequest) {
        match request {
            LedgerRequest::GetLedger { response } => {
                let _ = response.send(self.get_ledger().await);
            }
            LedgerRequest::RequestConsumption {
                requester,
                target,
                requester_name,
                message,
                photo_url,
                response,
            } => {
                let result = self
                    .request_consumption(requester, target, requester_name, message, photo_url)
                    .await;
                let _ = response.send(result);
            }
            LedgerRequest::ApproveConsumption {
                approver,
                request_id,
                response,
            } => {
                let _ = response.send(self.approve_consumption(approver, request_id).await);
            }
            LedgerRequest::DenyConsumption {
                denier,
                request_id,
                response,
            } => {
                let _ = response.send(self.deny_consumption(denier, request_id).await);
            }
            LedgerRequest::ShareNoes {
                from,
                to,
                amount,
                response,
            } => {
                let _ = response.send(self.share_noes(from, to, amount).await);
            }
            LedgerRequest::ActivateBooster {
                requester,
                response,
            } => {
                let _ = response.send(self.activate_booster(requester).await);
            }
        }
    }
}

pub struct LedgerService;

impl LedgerService {
    pub fn new() -> Self {
        LedgerService {}
    }
}

#[async_trait]
impl Service<LedgerRequest, LedgerRequestHandler> for LedgerService {
    // The ledger is one read-modify-write resource; requests are handled
    // in arrival order on this loop instead of a spawn per request, so
    // overlapping operations cannot lose updates.
    async fn run(&mut self, handler: LedgerRequestHandler, receiver: &mut mpsc::Receiver<LedgerRequest>) {
        while let Some(request) = receiver.recv().await {
            handler.handle_request(request).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ledger::LedgerEvent;

    fn handler(dir: &tempfile::TempDir) -> (LedgerRequestHandler, NotificationHub) {
        let hub = NotificationHub::new(16);
        let repository = LedgerRepository::new(dir.path().join("noes.json"));
        (LedgerRequestHandler::new(repository, hub.clone()), hub)
    }

    #[tokio::test]
    async fn failed_share_leaves_persisted_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _hub) = handler(&dir);

        let before = handler.get_ledger().await.unwrap();
        let result = handler
            .share_noes(PartyId::UserOne, PartyId::UserTwo, 99)
            .await;

        assert!(matches!(result, Err(ServiceError::InsufficientBalance { .. })));
        assert_eq!(handler.get_ledger().await.unwrap(), before);
    }

    #[tokio::test]
    async fn mutations_are_durable_and_fanned_out() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, hub) = handler(&dir);
        let mut events = hub.subscribe();

        let request = handler
            .request_consumption(PartyId::UserOne, PartyId::UserTwo, None, None, None)
            .await
            .unwrap();

        let reloaded = handler.get_ledger().await.unwrap();
        assert_eq!(reloaded.user2.pending_requests.len(), 1);
        assert_eq!(reloaded.user2.pending_requests[0].id, request.id);

        match events.recv().await.unwrap() {
            LedgerEvent::RequestCreated { request: seen } => assert_eq!(seen.id, request.id),
            other => panic!("expected RequestCreated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn maintenance_persists_even_when_the_operation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _hub) = handler(&dir);

        // Push user1's refresh two months into the past, then fail a share.
        let mut ledger = handler.get_ledger().await.unwrap();
        ledger.user1.current_noes = 0;
        ledger.user1.last_refresh = Utc::now() - chrono::Duration::days(70);
        handler.repository.save(&ledger).await.unwrap();

        let result = handler
            .share_noes(PartyId::UserOne, PartyId::UserTwo, 99)
            .await;
        assert!(result.is_err());

        let reloaded = handler.repository.load().await.unwrap();
        assert_eq!(reloaded.user1.current_noes, 5);
    }
}
