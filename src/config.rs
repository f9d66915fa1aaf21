//! Configuration file support for habitbot
//!
//! Reads an optional `habitbot.toml`, then applies environment overrides.
//! Secrets are normally supplied through the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "habitbot.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Value Telegram sends in `X-Telegram-Bot-Api-Secret-Token`
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// The one chat allowed to use the bot
    #[serde(default)]
    pub allowed_chat_id: Option<String>,

    #[serde(default)]
    pub github: GithubConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Repository holding the habit files
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GithubConfig {
    /// Format: "owner/repo"
    #[serde(default)]
    pub repo: Option<String>,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default)]
    pub token: Option<String>,

    /// Directory of the per-year files
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    #[serde(default = "default_github_api")]
    pub api_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,

    #[serde(default = "default_telegram_api")]
    pub api_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_path_prefix() -> String {
    crate::store::DEFAULT_PATH_PREFIX.to_string()
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            repo: None,
            branch: default_branch(),
            token: None,
            path_prefix: default_path_prefix(),
            api_url: default_github_api(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_url: default_telegram_api(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load from `path`, or from `habitbot.toml` in the working directory when
    /// it exists, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override values from environment-style lookups. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("TELEGRAM_WEBHOOK_SECRET") {
            self.webhook_secret = Some(value);
        }
        if let Some(value) = get("ALLOWED_CHAT_ID") {
            self.allowed_chat_id = Some(value);
        }
        if let Some(value) = get("GITHUB_REPO") {
            self.github.repo = Some(value);
        }
        if let Some(value) = get("GITHUB_BRANCH") {
            self.github.branch = value;
        }
        if let Some(value) = get("GITHUB_TOKEN") {
            self.github.token = Some(value);
        }
        if let Some(value) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(value);
        }
        if let Some(value) = get("HABITBOT_PORT") {
            self.server.port = value.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "HABITBOT_PORT",
                value,
            })?;
        }
        Ok(())
    }

    /// Check what the webhook needs to admit requests
    pub fn validate_for_webhook(&self) -> Result<()> {
        require(&self.webhook_secret, "webhook_secret (TELEGRAM_WEBHOOK_SECRET)")?;
        require(&self.allowed_chat_id, "allowed_chat_id (ALLOWED_CHAT_ID)")?;
        Ok(())
    }

    /// Check what the GitHub store needs
    pub fn validate_for_github(&self) -> Result<()> {
        require(&self.github.repo, "github.repo (GITHUB_REPO)")?;
        require(&self.github.token, "github.token (GITHUB_TOKEN)")?;
        Ok(())
    }

    pub fn has_bot_token(&self) -> bool {
        self.telegram.bot_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

fn require(value: &Option<String>, name: &'static str) -> Result<()> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::Missing(name)),
    }
}
