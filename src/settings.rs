use std::path::PathBuf;

use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Server {
    pub listen: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
    pub data_dir: String,
}

impl Storage {
    pub fn ledger_file(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("noes.json")
    }

    pub fn users_file(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("users.json")
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub storage: Storage,
}

impl Settings {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.listen", "0.0.0.0:8080")?
            .set_default("storage.data_dir", "data")?
            .add_source(File::with_name(path).required(false))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = Settings::load("does-not-exist").unwrap();
        assert_eq!(settings.server.listen, "0.0.0.0:8080");
        assert_eq!(settings.storage.ledger_file(), PathBuf::from("data/noes.json"));
        assert_eq!(settings.storage.users_file(), PathBuf::from("data/users.json"));
    }
}
