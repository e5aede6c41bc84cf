//! Error types for vaultsync
//!
//! Library errors use `thiserror`; the binary boundary wraps them in `anyhow`.
//! Transport and remote-logical failures are adapter-local by design: callers
//! log them and continue with sibling items rather than aborting the run.

use thiserror::Error;

/// Result type alias for vaultsync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Main error type for vaultsync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Non-2xx HTTP status or an unreadable response body
    #[error("HTTP {status} from {endpoint}: {detail}")]
    Transport {
        endpoint: String,
        status: u16,
        detail: String,
    },

    /// 2xx response whose body carries a failure indicator
    #[error("remote reported failure for {endpoint}: {detail}")]
    RemoteLogical { endpoint: String, detail: String },

    /// The request never produced a response
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// A remote job reached FAILURE or CANCELLED
    #[error("job {job_id} finished with status {status}")]
    JobFailed { job_id: String, status: String },

    /// A remote job stayed non-terminal past the polling bound
    #[error("timed out waiting for job {job_id} after {attempts} attempts")]
    JobTimeout { job_id: String, attempts: u32 },

    /// A tracked path does not fit its adapter's layout
    #[error("path '{path}' is not a valid {kind} path: {reason}")]
    PathIdentity {
        path: String,
        kind: &'static str,
        reason: String,
    },

    /// Missing or unusable connection configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Another command holds the state lock
    #[error("state file is locked - is another vaultsync command running?")]
    StateLocked,

    /// Archive read/write error
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_transport() {
        let err = SyncError::Transport {
            endpoint: "/api/v26.1/query/components".to_string(),
            status: 500,
            detail: "internal error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP 500 from /api/v26.1/query/components: internal error"
        );
    }

    #[test]
    fn test_error_display_job_timeout() {
        let err = SyncError::JobTimeout {
            job_id: "4451".to_string(),
            attempts: 60,
        };
        assert_eq!(
            err.to_string(),
            "timed out waiting for job 4451 after 60 attempts"
        );
    }
}
