use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::models::ledger::PartyId;
use crate::models::users::Credential;

/// Flat-file store for the two fixed login records. Seeded with default
/// credentials on first access, like the ledger file.
#[derive(Clone)]
pub struct UserRepository {
    path: PathBuf,
}

pub fn password_digest(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

fn default_credentials() -> Vec<Credential> {
    vec![
        Credential {
            id: PartyId::UserOne,
            username: "user1".to_string(),
            password_digest: password_digest("password1"),
            name: "User One".to_string(),
        },
        Credential {
            id: PartyId::UserTwo,
            username: "user2".to_string(),
            password_digest: password_digest("password2"),
            name: "User Two".to_string(),
        },
    ]
}

impl UserRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<Vec<Credential>, anyhow::Error> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Malformed users file at {}", self.path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let credentials = default_credentials();
                self.save(&credentials).await?;
                Ok(credentials)
            }
            Err(e) => {
                Err(e).with_context(|| format!("Could not read users file at {}", self.path.display()))
            }
        }
    }

    /// Returns the matching credential when both the username and the
    /// password check out, None otherwise.
    pub async fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Credential>, anyhow::Error> {
        let credentials = self.load().await?;
        let digest = password_digest(password);

        Ok(credentials
            .into_iter()
            .find(|c| c.username == username && c.password_digest == digest))
    }

    async fn save(&self, credentials: &[Credential]) -> Result<(), anyhow::Error> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Could not create data directory {}", dir.display()))?;
        }

        let raw = serde_json::to_string_pretty(credentials)?;
        fs::write(&self.path, raw)
            .await
            .with_context(|| format!("Could not write users file at {}", self.path.display()))?;

        Ok(())
    }
}
