use tokio::sync::broadcast;

use crate::models::ledger::LedgerEvent;

/// Best-effort fan-out of ledger events to connected viewers. Publishing
/// never blocks and never fails the operation that produced the event; a
/// viewer that lags far enough simply misses events.
#[derive(Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<LedgerEvent>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        NotificationHub { sender }
    }

    pub fn publish(&self, event: LedgerEvent) {
        match self.sender.send(event) {
            Ok(viewers) => log::debug!("Event delivered to {} viewer(s).", viewers),
            Err(_) => log::debug!("No viewers connected, event dropped."),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ledger::PartyId;

    #[tokio::test]
    async fn delivers_to_live_subscribers() {
        let hub = NotificationHub::new(8);
        let mut viewer = hub.subscribe();

        hub.publish(LedgerEvent::NoesShared {
            from_user_id: PartyId::UserOne,
            to_user_id: PartyId::UserTwo,
            amount: 2,
        });

        let event = viewer.recv().await.unwrap();
        assert!(matches!(event, LedgerEvent::NoesShared { amount: 2, .. }));
    }

    #[test]
    fn publishing_without_viewers_is_a_no_op() {
        let hub = NotificationHub::new(8);
        hub.publish(LedgerEvent::BoosterActivated {
            user_id: PartyId::UserTwo,
            current_noes: 15,
        });
    }
}
