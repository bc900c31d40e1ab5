use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::repositories::{ledger::LedgerRepository, users::UserRepository};
use crate::settings::Settings;

mod http;
pub mod ledger;
mod notifications;
mod users;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not enough noes to share: requested {requested}, available {available}")]
    InsufficientBalance { requested: u32, available: u32 },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Booster already active")]
    AlreadyActive,
    #[error("Repository error: {0} - {1}")]
    Repository(String, String),
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

pub async fn start_services(settings: Settings) -> Result<(), anyhow::Error> {
    let (ledger_tx, mut ledger_rx) = mpsc::channel(512);
    let (user_tx, mut user_rx) = mpsc::channel(512);
    let hub = notifications::NotificationHub::new(256);

    let mut ledger_service = ledger::LedgerService::new();
    let mut user_service = users::UserService::new();

    log::info!("Starting ledger service.");
    let ledger_repository = LedgerRepository::new(settings.storage.ledger_file());
    let ledger_hub = hub.clone();
    tokio::spawn(async move {
        ledger_service
            .run(
                ledger::LedgerRequestHandler::new(ledger_repository, ledger_hub),
                &mut ledger_rx,
            )
            .await;
    });

    log::info!("Starting user service.");
    let user_repository = UserRepository::new(settings.storage.users_file());
    tokio::spawn(async move {
        user_service
            .run(users::UserRequestHandler::new(user_repository), &mut user_rx)
            .await;
    });

    log::info!("Starting HTTP server.");
    http::start_http_server(&settings.server.listen, ledger_tx, user_tx, hub).await?;

    Ok(())
}
