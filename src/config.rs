/// Bot configuration, read once at startup from `ticker.json`.
///
/// Set `TICKER_CONFIG` to load a different file.
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::irc::Identity;
use crate::stream::Endpoint;

/// Default config file, relative to the working directory.
pub const DEFAULT_PATH: &str = "ticker.json";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// `host:port` of the IRC server.
    pub irc_server: String,
    pub irc_username: String,
    pub irc_realname: String,
    pub irc_nickname: String,
    /// NickServ password; empty disables auto-identify.
    #[serde(default)]
    pub irc_password: String,
    pub irc_channel: String,
    /// Push stream override. Defaults to the bitstamp USD market feed.
    #[serde(default)]
    pub stream: Endpoint,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Config {
    /// Load from `TICKER_CONFIG`, or `ticker.json` when unset.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("TICKER_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&json)?;
        info!(
            server = %config.irc_server,
            channel = %config.irc_channel,
            "loaded config from {}",
            path.display()
        );
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Registration identity for the chat connection.
    pub fn identity(&self) -> Identity {
        Identity {
            nick: self.irc_nickname.clone(),
            user: self.irc_username.clone(),
            realname: self.irc_realname.clone(),
            password: Some(self.irc_password.clone()).filter(|p| !p.is_empty()),
        }
    }
}
