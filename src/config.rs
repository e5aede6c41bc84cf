//! Connection configuration
//!
//! `vaultsync.toml` carries the remote DNS, API version, and the cached
//! session id (plus credentials for transparent session renewal). Credential
//! acquisition itself is an external concern; this module only reads what a
//! login flow left behind and rewrites the file when a session is renewed.
//!
//! Environment variables override file values so CI can run without a config
//! file on disk.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Config file name, relative to the working directory
pub const CONFIG_FILE: &str = "vaultsync.toml";

/// Client id sent with every request
pub const CLIENT_ID: &str = "vaultsync-rust-client";

fn default_api_version() -> String {
    "v26.1".to_string()
}

/// Remote connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Host name of the remote service, without scheme
    pub vault_dns: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Session id cached by the last login or renewal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl VaultConfig {
    /// Load config from `dir`, applying environment overrides.
    ///
    /// `VAULT_DNS` is required when no config file exists.
    pub fn load(dir: &Path) -> SyncResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            toml::from_str(&content)
                .map_err(|e| SyncError::Config(format!("invalid {}: {}", CONFIG_FILE, e)))?
        } else {
            Self {
                vault_dns: String::new(),
                api_version: default_api_version(),
                username: None,
                password: None,
                session_id: None,
            }
        };

        if let Ok(dns) = std::env::var("VAULT_DNS") {
            config.vault_dns = dns;
        }
        if let Ok(version) = std::env::var("VAULT_API_VERSION") {
            config.api_version = version;
        }
        if let Ok(username) = std::env::var("VAULT_USERNAME") {
            config.username = Some(username);
        }
        if let Ok(password) = std::env::var("VAULT_PASSWORD") {
            config.password = Some(password);
        }
        if let Ok(session) = std::env::var("VAULT_SESSION_ID") {
            config.session_id = Some(session);
        }

        if config.vault_dns.is_empty() {
            return Err(SyncError::Config(format!(
                "no remote DNS configured - set VAULT_DNS or create {}",
                CONFIG_FILE
            )));
        }

        Ok(config)
    }

    /// Persist the config (used after session renewal)
    pub fn save(&self, dir: &Path) -> SyncResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SyncError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(dir.join(CONFIG_FILE), content)?;
        Ok(())
    }

    /// Endpoint path under the configured API version, e.g. `mdl/execute`
    pub fn api_path(&self, suffix: &str) -> String {
        format!("/api/{}/{}", self.api_version, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_parses_toml() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "vault_dns = \"example.veevavault.com\"\nsession_id = \"abc\"\n",
        )
        .unwrap();

        let config = VaultConfig::load(dir.path()).unwrap();
        assert_eq!(config.vault_dns, "example.veevavault.com");
        assert_eq!(config.session_id.as_deref(), Some("abc"));
        // Defaulted when absent from the file
        assert_eq!(config.api_version, "v26.1");
    }

    #[test]
    fn missing_dns_is_an_error() {
        let dir = tempdir().unwrap();
        // No file, no env override in this isolated dir
        if std::env::var("VAULT_DNS").is_ok() {
            return; // environment decides; skip
        }
        let result = VaultConfig::load(dir.path());
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let config = VaultConfig {
            vault_dns: "example.test".to_string(),
            api_version: "v26.1".to_string(),
            username: Some("dev@example.test".to_string()),
            password: None,
            session_id: Some("sess-1".to_string()),
        };
        config.save(dir.path()).unwrap();

        let loaded = VaultConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.vault_dns, config.vault_dns);
        assert_eq!(loaded.username, config.username);
        assert_eq!(loaded.session_id, config.session_id);
    }

    #[test]
    fn api_path_includes_version() {
        let config = VaultConfig {
            vault_dns: "example.test".to_string(),
            api_version: "v26.1".to_string(),
            username: None,
            password: None,
            session_id: None,
        };
        assert_eq!(config.api_path("mdl/execute"), "/api/v26.1/mdl/execute");
    }
}
