use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use tokio::fs;

use crate::models::ledger::Ledger;

/// Flat-file JSON store for the two-account ledger. The whole ledger is
/// read and written as one unit per operation; saves go through a temp
/// file and a rename so a concurrent load never sees a partial write.
#[derive(Clone)]
pub struct LedgerRepository {
    path: PathBuf,
}

impl LedgerRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the persisted ledger, seeding and persisting the fixed
    /// defaults (user1 5/5, user2 10/10, booster inactive) when no state
    /// exists yet.
    pub async fn load(&self) -> Result<Ledger, anyhow::Error> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Malformed ledger file at {}", self.path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let ledger = Ledger::seeded(Utc::now());
                self.save(&ledger).await?;
                Ok(ledger)
            }
            Err(e) => {
                Err(e).with_context(|| format!("Could not read ledger file at {}", self.path.display()))
            }
        }
    }

    pub async fn save(&self, ledger: &Ledger) -> Result<(), anyhow::Error> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Could not create data directory {}", dir.display()))?;
        }

        let raw = serde_json::to_string_pretty(ledger)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)
            .await
            .with_context(|| format!("Could not write ledger file at {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Could not replace ledger file at {}", self.path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ledger::{ConsumptionRequest, PartyId, RequestStatus};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn repository(dir: &tempfile::TempDir) -> LedgerRepository {
        LedgerRepository::new(dir.path().join("noes.json"))
    }

    #[tokio::test]
    async fn first_load_seeds_and_persists_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir);

        let ledger = repo.load().await.unwrap();
        assert_eq!(ledger.user1.current_noes, 5);
        assert_eq!(ledger.user1.max_noes, 5);
        assert_eq!(ledger.user2.current_noes, 10);
        assert_eq!(ledger.user2.max_noes, 10);
        assert!(!ledger.user2.booster_active);

        // The seed must be durable, not just returned.
        let reloaded = repo.load().await.unwrap();
        assert_eq!(reloaded, ledger);
    }

    #[tokio::test]
    async fn save_round_trips_requests_and_booster_state() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir);

        let mut ledger = repo.load().await.unwrap();
        let now = Utc::now();
        ledger.user2.booster_active = true;
        ledger.user2.booster_start = Some(now);
        ledger.user2.booster_noes = 3;
        ledger.user2.pending_requests.push(ConsumptionRequest {
            id: Uuid::new_v4(),
            requester_id: PartyId::UserOne,
            requester_name: Some("User One".to_string()),
            target_user_id: PartyId::UserTwo,
            message: Some("counted one".to_string()),
            photo_url: None,
            timestamp: now,
            status: RequestStatus::Pending,
            approvals: HashMap::from([(PartyId::UserTwo, true)]),
        });

        repo.save(&ledger).await.unwrap();
        let reloaded = repo.load().await.unwrap();
        assert_eq!(reloaded, ledger);
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir);

        let ledger = repo.load().await.unwrap();
        repo.save(&ledger).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("noes.json")]);
    }
}
