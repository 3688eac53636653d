use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const CONFIG_NAME: &str = "config.json";
const META_NAME: &str = "meta.sql";
const BLOB_NAME: &str = "blob";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config has no valid account")]
    Invalid,
    #[error("home directory is unavailable")]
    MissingHome,
}

/// Configuration of a single mirrored account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    /// Local path the Drive tree is mounted at.
    pub local_path: String,
    /// File id of the remote folder to mirror.
    pub remote_id: String,
    /// OAuth 2.0 client id used for token refreshing.
    pub client_id: String,
    /// OAuth 2.0 client secret used for token refreshing.
    pub client_secret: String,
    /// OAuth 2.0 refresh token.
    pub refresh_token: String,
}

impl Account {
    pub fn validate(&self) -> bool {
        !self.local_path.is_empty()
            && !self.remote_id.is_empty()
            && !self.client_id.is_empty()
            && !self.client_secret.is_empty()
            && !self.refresh_token.is_empty()
    }
}

/// On-disk configuration plus the data directory layout around it:
/// `config.json`, the `meta.sql` database and the `blob/` cache all live
/// under one data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    data_dir: PathBuf,
    pub accounts: Vec<Account>,
}

impl Config {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        debug!(data_dir = %data_dir.display(), "using data directory");
        Self {
            data_dir,
            accounts: Vec::new(),
        }
    }

    pub fn load(data_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let data_dir = data_dir.into();
        let raw = std::fs::read(data_dir.join(CONFIG_NAME))?;
        let mut config: Config = serde_json::from_slice(&raw)?;
        config.data_dir = data_dir;
        if !config.validate() {
            return Err(ConfigError::Invalid);
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_dir)?;
        let raw = serde_json::to_vec_pretty(self)?;
        std::fs::write(self.config_path(), raw)?;
        Ok(())
    }

    pub fn validate(&self) -> bool {
        !self.accounts.is_empty() && self.accounts.iter().all(Account::validate)
    }

    /// Creates the directories the daemon needs before first use.
    pub fn setup(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(self.blob_path())?;
        Ok(())
    }

    // Single-account for now; multi-account multiplexing is out of scope.
    pub fn first_account(&self) -> &Account {
        &self.accounts[0]
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_NAME)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join(META_NAME)
    }

    pub fn blob_path(&self) -> PathBuf {
        self.data_dir.join(BLOB_NAME)
    }
}

/// Default data directory, `~/.gdrived`.
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    Ok(home_dir()?.join(".gdrived"))
}

/// Default mountpoint, `~/google-drive`.
pub fn default_mountpoint() -> Result<PathBuf, ConfigError> {
    Ok(home_dir()?.join("google-drive"))
}

fn home_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::MissingHome)
}
