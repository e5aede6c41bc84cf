//! Remote Access Gateway
//!
//! All remote traffic funnels through the [`Gateway`] trait: a single blocking
//! `request` call plus the API version the caller should build endpoint paths
//! with. The production implementation wraps a blocking `reqwest` client and
//! performs exactly one transparent session-renewal retry when the remote
//! signals an invalid session (HTTP 401 or the `INVALID_SESSION_ID` sentinel
//! in the body). No other retry happens anywhere.
//!
//! Callers treat non-2xx statuses and body-level failure indicators as
//! adapter-local failures, never a crash.

use serde_json::Value;

use crate::config::{VaultConfig, CLIENT_ID};
use crate::error::{SyncError, SyncResult};
use crate::session::SessionProvider;

/// Body sentinel that marks an expired session even under HTTP 200/400
pub const SESSION_INVALID_SENTINEL: &str = "INVALID_SESSION_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// Uploaded file part of a multipart request
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Request payload variants the remote API uses
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    /// URL-encoded form fields
    Form(Vec<(String, String)>),
    /// Raw body with an explicit content type (MDL scripts, code source)
    Raw {
        content_type: &'static str,
        bytes: Vec<u8>,
    },
    /// Multipart upload: plain fields plus one file part named `file`
    Multipart {
        fields: Vec<(String, String)>,
        file: FilePart,
    },
}

/// One remote call. `endpoint` is either a path (joined onto the configured
/// DNS) or an absolute URL followed verbatim (pagination links).
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub endpoint: String,
    pub body: Body,
}

impl ApiRequest {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            endpoint: endpoint.into(),
            body: Body::Empty,
        }
    }

    pub fn post(endpoint: impl Into<String>, body: Body) -> Self {
        Self {
            method: Method::Post,
            endpoint: endpoint.into(),
            body,
        }
    }

    pub fn put(endpoint: impl Into<String>, body: Body) -> Self {
        Self {
            method: Method::Put,
            endpoint: endpoint.into(),
            body,
        }
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            endpoint: endpoint.into(),
            body: Body::Empty,
        }
    }
}

/// Response surface the rest of the crate consumes
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
    /// Parsed body, when it is JSON
    pub json: Option<Value>,
}

impl ApiResponse {
    pub fn from_bytes(status: u16, bytes: Vec<u8>) -> Self {
        let json = serde_json::from_slice(&bytes).ok();
        Self {
            status,
            bytes,
            json,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Lossy text view of the body, for logs and error details
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Whether the body carries the remote's success indicator.
    ///
    /// Bodies without a `responseStatus` field (binary downloads, empty DELETE
    /// responses) count as successful when the HTTP status is.
    pub fn body_status_ok(&self) -> bool {
        match self.json.as_ref().and_then(|v| v.get("responseStatus")) {
            Some(status) => status.as_str() == Some("SUCCESS"),
            None => true,
        }
    }

    /// Promote transport and body-level failure to `SyncError`
    pub fn ensure_ok(&self, endpoint: &str) -> SyncResult<()> {
        if !self.is_success() {
            return Err(SyncError::Transport {
                endpoint: endpoint.to_string(),
                status: self.status,
                detail: truncate(&self.text(), 200),
            });
        }
        if !self.body_status_ok() {
            return Err(SyncError::RemoteLogical {
                endpoint: endpoint.to_string(),
                detail: truncate(&self.text(), 200),
            });
        }
        Ok(())
    }

    /// `data` field of the JSON body, if any
    pub fn data(&self) -> Option<&Value> {
        self.json.as_ref().and_then(|v| v.get("data"))
    }

    /// Job id handed back by asynchronous operations, at either the top level
    /// or inside `data`. Numeric ids are stringified.
    pub fn job_id(&self) -> Option<String> {
        self.json
            .as_ref()
            .and_then(|v| {
                v.get("job_id")
                    .or_else(|| v.get("data").and_then(|d| d.get("job_id")))
            })
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// Authenticated request execution
pub trait Gateway {
    fn request(&self, request: &ApiRequest) -> SyncResult<ApiResponse>;

    /// API version for endpoint construction, e.g. `v26.1`
    fn api_version(&self) -> &str;

    /// Convenience: `/api/{version}/{suffix}`
    fn api_path(&self, suffix: &str) -> String {
        format!("/api/{}/{}", self.api_version(), suffix)
    }
}

/// Wire-level request execution, below the session-retry logic.
///
/// Split out of the gateway so the renew-and-replay path can be driven
/// without a live server.
pub trait Transport {
    fn send(&self, request: &ApiRequest, session_id: &str) -> SyncResult<ApiResponse>;
}

/// Blocking HTTP transport
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    dns: String,
}

impl ReqwestTransport {
    pub fn new(dns: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            dns: dns.into(),
        }
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("https://{}{}", self.dns, endpoint)
        }
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &ApiRequest, session_id: &str) -> SyncResult<ApiResponse> {
        let url = self.url_for(&request.endpoint);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        builder = builder
            .header("Authorization", session_id)
            .header("X-VaultAPI-ClientID", CLIENT_ID);

        builder = match &request.body {
            Body::Empty => builder,
            Body::Form(fields) => builder.form(fields),
            Body::Raw {
                content_type,
                bytes,
            } => builder
                .header("Content-Type", *content_type)
                .body(bytes.clone()),
            Body::Multipart { fields, file } => {
                let mut form = reqwest::blocking::multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                let part = reqwest::blocking::multipart::Part::bytes(file.bytes.clone())
                    .file_name(file.file_name.clone())
                    .mime_str(file.mime)
                    .map_err(|e| SyncError::Config(format!("invalid mime type: {}", e)))?;
                form = form.part("file", part);
                builder.multipart(form)
            }
        };

        let response = builder.send().map_err(|e| SyncError::Http {
            endpoint: request.endpoint.clone(),
            source: e,
        })?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .map_err(|e| SyncError::Http {
                endpoint: request.endpoint.clone(),
                source: e,
            })?
            .to_vec();
        Ok(ApiResponse::from_bytes(status, bytes))
    }
}

fn session_invalid(response: &ApiResponse) -> bool {
    response.status == 401
        || (response.status == 400 && response.text().contains(SESSION_INVALID_SENTINEL))
}

/// Production gateway: session handling over a [`Transport`]
pub struct HttpGateway<S: SessionProvider, T: Transport = ReqwestTransport> {
    transport: T,
    api_version: String,
    session: S,
}

impl<S: SessionProvider> HttpGateway<S> {
    pub fn new(config: &VaultConfig, session: S) -> Self {
        Self {
            transport: ReqwestTransport::new(config.vault_dns.clone()),
            api_version: config.api_version.clone(),
            session,
        }
    }
}

impl<S: SessionProvider, T: Transport> HttpGateway<S, T> {
    /// Gateway over an arbitrary transport
    pub fn with_transport(transport: T, api_version: impl Into<String>, session: S) -> Self {
        Self {
            transport,
            api_version: api_version.into(),
            session,
        }
    }
}

impl<S: SessionProvider, T: Transport> Gateway for HttpGateway<S, T> {
    fn request(&self, request: &ApiRequest) -> SyncResult<ApiResponse> {
        let session_id = self.session.session_id()?;
        tracing::debug!(method = request.method.as_str(), endpoint = %request.endpoint, "remote call");
        let response = self.transport.send(request, &session_id)?;

        if session_invalid(&response) {
            // The one automatic retry in the whole tool. A second invalid
            // response comes back to the caller untouched.
            let renewed = self.session.renew()?;
            return self.transport.send(request, &renewed);
        }
        Ok(response)
    }

    fn api_version(&self) -> &str {
        &self.api_version
    }
}
