//! Session provider
//!
//! The gateway consumes sessions through the [`SessionProvider`] trait and
//! never cares where they come from. [`FileSession`] is the file-backed
//! implementation: it hands out the session id cached in `vaultsync.toml` and
//! renews it with the stored credentials when the gateway reports an invalid
//! session.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use crate::config::{VaultConfig, CLIENT_ID};
use crate::error::{SyncError, SyncResult};

/// Source of authenticated session ids
pub trait SessionProvider {
    /// The current session id
    fn session_id(&self) -> SyncResult<String>;

    /// Obtain a fresh session id, replacing the current one
    fn renew(&self) -> SyncResult<String>;
}

/// Session provider backed by `vaultsync.toml`
pub struct FileSession {
    config: RefCell<VaultConfig>,
    dir: PathBuf,
    client: reqwest::blocking::Client,
}

impl FileSession {
    pub fn new(config: VaultConfig, dir: &Path) -> Self {
        Self {
            config: RefCell::new(config),
            dir: dir.to_path_buf(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl SessionProvider for FileSession {
    fn session_id(&self) -> SyncResult<String> {
        self.config
            .borrow()
            .session_id
            .clone()
            .ok_or_else(|| SyncError::Config("no session id - log in first".to_string()))
    }

    fn renew(&self) -> SyncResult<String> {
        let (url, username, password) = {
            let config = self.config.borrow();
            let username = config.username.clone().ok_or_else(|| {
                SyncError::Config("cannot renew session without a stored username".to_string())
            })?;
            let password = config.password.clone().ok_or_else(|| {
                SyncError::Config("cannot renew session without a stored password".to_string())
            })?;
            let url = format!("https://{}{}", config.vault_dns, config.api_path("auth"));
            (url, username, password)
        };

        tracing::info!("session expired, requesting a new session id");
        let response = self
            .client
            .post(&url)
            .header("X-VaultAPI-ClientID", CLIENT_ID)
            .form(&[("username", username.as_str()), ("password", password.as_str())])
            .send()
            .map_err(|e| SyncError::Http {
                endpoint: "auth".to_string(),
                source: e,
            })?;

        let status = response.status().as_u16();
        let body: serde_json::Value = response.json().map_err(|e| SyncError::Http {
            endpoint: "auth".to_string(),
            source: e,
        })?;

        let session_id = body
            .get("sessionId")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| SyncError::Transport {
                endpoint: "auth".to_string(),
                status,
                detail: "authentication failed".to_string(),
            })?;

        let mut config = self.config.borrow_mut();
        config.session_id = Some(session_id.clone());
        config.save(&self.dir)?;
        Ok(session_id)
    }
}

/// Fixed session id, for tests and pre-provisioned environments
pub struct StaticSession(pub String);

impl SessionProvider for StaticSession {
    fn session_id(&self) -> SyncResult<String> {
        Ok(self.0.clone())
    }

    fn renew(&self) -> SyncResult<String> {
        Err(SyncError::Config(
            "static session cannot be renewed".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_session_returns_fixed_id() {
        let session = StaticSession("sess-42".to_string());
        assert_eq!(session.session_id().unwrap(), "sess-42");
        assert!(session.renew().is_err());
    }

    #[test]
    fn file_session_without_id_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config = VaultConfig {
            vault_dns: "example.test".to_string(),
            api_version: "v26.1".to_string(),
            username: None,
            password: None,
            session_id: None,
        };
        let session = FileSession::new(config, dir.path());
        assert!(session.session_id().is_err());
    }

    #[test]
    fn renew_without_credentials_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config = VaultConfig {
            vault_dns: "example.test".to_string(),
            api_version: "v26.1".to_string(),
            username: None,
            password: None,
            session_id: Some("stale".to_string()),
        };
        let session = FileSession::new(config, dir.path());
        assert!(matches!(session.renew(), Err(SyncError::Config(_))));
    }
}
