//! Configuration and credential storage

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::api::client::DEFAULT_BASE_URL;
use crate::auth::{StoredToken, TokenStore};
use crate::engine::EngineSettings;
use crate::push::frames::MonitoredEvents;
use crate::reconcile;

pub const DEFAULT_PUSH_PORT: u16 = 19548;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST API base URL
    pub api_base_url: String,
    /// Port of the push server on the API host
    pub push_port: u16,
    /// Stored session token
    pub session_token: Option<StoredToken>,
    /// Push event classes to subscribe to
    pub monitored_events: MonitoredEvents,
    pub reconcile_interval_secs: u64,
    /// Let the remote prefix sent messages with the agent's name
    pub show_agent_name: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            push_port: DEFAULT_PUSH_PORT,
            session_token: None,
            monitored_events: MonitoredEvents::default(),
            reconcile_interval_secs: reconcile::DEFAULT_INTERVAL.as_secs(),
            show_agent_name: true,
        }
    }
}

impl Config {
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "macrochat-sync", "macrochat-sync")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Contains the session token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// `wss://<api host>:<push_port>`
    pub fn push_url(&self) -> Result<String> {
        let api = Url::parse(&self.api_base_url).context("Invalid api_base_url")?;
        let Some(host) = api.host_str() else {
            bail!("api_base_url has no host: {}", self.api_base_url);
        };
        Ok(format!("wss://{}:{}", host, self.push_port))
    }

    /// Settings for a sync engine using the stored session.
    pub fn engine_settings(&self) -> Result<EngineSettings> {
        let token = self
            .valid_session_token()
            .context("Not logged in. Run `macrochat-sync login` first.")?;
        Ok(EngineSettings {
            push_url: self.push_url()?,
            token,
            monitored_events: self.monitored_events,
            reconcile_interval: Duration::from_secs(self.reconcile_interval_secs.max(1)),
            show_agent_name: self.show_agent_name,
        })
    }
}

impl TokenStore for Config {
    fn session_token(&self) -> Option<StoredToken> {
        self.session_token.clone()
    }

    fn set_session_token(&mut self, token: StoredToken) {
        self.session_token = Some(token);
    }

    fn clear_tokens(&mut self) {
        self.session_token = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = Config::parse("show_agent_name = false\n").unwrap();
        assert_eq!(config.api_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.push_port, 19548);
        assert_eq!(config.reconcile_interval_secs, 30);
        assert!(!config.show_agent_name);
        assert!(config.monitored_events.chat_for_agent);
        assert!(!config.monitored_events.all_chats);
    }

    #[test]
    fn test_push_url_uses_api_host() {
        let config = Config {
            api_base_url: "https://api.example.com/v1".into(),
            push_port: 1234,
            ..Config::default()
        };
        assert_eq!(config.push_url().unwrap(), "wss://api.example.com:1234");
    }

    #[test]
    fn test_engine_settings_require_login() {
        let mut config = Config::default();
        assert!(config.engine_settings().is_err());

        config.set_session_token(StoredToken::new("tok").with_email("a@b.c"));
        let settings = config.engine_settings().unwrap();
        assert_eq!(settings.token, "tok");
        assert_eq!(settings.push_url, "wss://api.macrochat.com.br:19548");
        assert_eq!(settings.reconcile_interval, Duration::from_secs(30));
        assert!(config.logged_in_as("a@b.c"));
    }

    #[test]
    fn test_roundtrip_keeps_token() {
        let mut config = Config::default();
        config.set_session_token(StoredToken::new("tok").with_email("a@b.c"));
        let text = toml::to_string_pretty(&config).unwrap();
        let back = Config::parse(&text).unwrap();
        assert_eq!(back.session_token, config.session_token);
        assert!(!text.contains("expires_at"));
    }

    #[test]
    fn test_account_comes_from_token_only() {
        let config = Config::parse(
            "email = \"old@b.c\"\n[session_token]\ntoken = \"tok\"\nemail = \"a@b.c\"\n",
        )
        .unwrap();
        assert!(config.logged_in_as("a@b.c"));
        assert!(!config.logged_in_as("old@b.c"));
    }
}
