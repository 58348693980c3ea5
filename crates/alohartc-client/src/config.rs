//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/alohartc/config.toml` by default.
//!
//! The auth token supports secret references:
//! - `pass::path/in/store` resolved via `pass show`
//! - `env::VAR_NAME` resolved from the environment
//! - plain text used as-is

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use alohartc_protocol::IceServer;

use crate::engine::IceTransportPolicy;
use crate::options::DEFAULT_SIGNAL_SERVER;

/// Configuration for the alohartc client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Signaling server settings.
    pub server: ServerSettings,

    /// Authentication settings.
    pub auth: AuthSettings,

    /// ICE settings for calls.
    pub ice: IceSettings,
}

/// Signaling server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Signaling server base URL.
    pub url: Option<String>,

    /// Seconds to wait for a call to be established.
    pub timeout: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout: 10,
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Auth token (supports `pass::` and `env::` prefixes).
    pub token: Option<String>,
}

/// ICE settings for calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IceSettings {
    /// STUN/TURN servers. When empty, relay credentials are requested from
    /// the signaling server.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<IceServer>,

    /// Only use relay candidates.
    pub relay_only: bool,
}

impl IceSettings {
    /// Configured servers, or `None` to request relay credentials.
    pub fn servers(&self) -> Option<Vec<IceServer>> {
        if self.servers.is_empty() {
            None
        } else {
            Some(self.servers.clone())
        }
    }

    /// Candidate policy for the engine.
    pub fn policy(&self) -> IceTransportPolicy {
        if self.relay_only {
            IceTransportPolicy::Relay
        } else {
            IceTransportPolicy::All
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("alohartc")
    }

    /// Signaling server, preferring `override_url`.
    pub fn signal_server(&self, override_url: Option<&str>) -> String {
        override_url
            .map(str::to_string)
            .or_else(|| self.server.url.clone())
            .unwrap_or_else(|| DEFAULT_SIGNAL_SERVER.to_string())
    }

    /// Auth token, preferring `override_token`; config values are resolved
    /// through [`crate::secret::resolve`].
    pub fn resolve_token(&self, override_token: Option<&str>) -> Result<String, String> {
        if let Some(token) = override_token {
            return crate::secret::validate_token(token).map(str::to_string);
        }
        let raw = self
            .auth
            .token
            .as_deref()
            .ok_or_else(|| "no auth token: pass --token or set [auth] token".to_string())?;
        crate::secret::resolve_token(raw)
    }

    /// Call timeout, preferring `override_secs`.
    pub fn timeout(&self, override_secs: Option<u64>) -> Duration {
        Duration::from_secs(override_secs.unwrap_or(self.server.timeout))
    }

    /// Checks values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.timeout == 0 {
            return Err("server.timeout must be greater than zero".to_string());
        }
        if let Some(url) = &self.server.url {
            crate::options::signaling_url(url, &["devices"])
                .map_err(|e| format!("invalid server.url: {}", e))?;
        }
        for (i, server) in self.ice.servers.iter().enumerate() {
            if server.urls.is_empty() {
                return Err(format!("ice.servers[{}] has no urls", i));
            }
        }
        if self.ice.relay_only && !self.ice.servers.is_empty() {
            let has_relay = self.ice.servers.iter().any(IceServer::is_relay);
            if !has_relay {
                return Err("ice.relay_only is set but no ice.servers entry is a TURN relay".into());
            }
        }
        Ok(())
    }
}
