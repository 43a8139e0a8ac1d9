//! HTTP client for the Nessus REST API

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::error::Error as StdError;
use std::fs;
use std::time::Duration;

use super::pinning::PinnedKeys;
use super::types::{
    error_message, ExportRequestBody, ExportResponse, ExportStatusResponse, LaunchResponse,
    LoginRequest, LoginResponse, ScanDetails,
};
use crate::config::ServiceConfig;
use crate::core::{
    Credentials, ExportFormat, ExportId, RunHandle, ScanId, ScanService, ScanStatus, Session,
    TemplateId,
};
use crate::error::{ExportError, ExportResult};

/// Header carrying the session token
const SESSION_HEADER: &str = "X-Cookie";

/// `ScanService` backed by a Nessus server
#[derive(Debug, Clone)]
pub struct NessusClient {
    http: reqwest::Client,
    base_url: Url,
    pins: Option<PinnedKeys>,
    request_timeout: Duration,
}

impl NessusClient {
    /// Build a client from an explicit connection descriptor
    pub fn new(config: &ServiceConfig) -> ExportResult<Self> {
        config.validate()?;
        let base_url = config.base_url()?;

        let pins = if config.fingerprints.is_empty() {
            None
        } else {
            Some(PinnedKeys::parse(&config.fingerprints)?)
        };

        let request_timeout = config.request_timeout_duration();
        let mut builder = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .user_agent(concat!("nessie-export/", env!("CARGO_PKG_VERSION")));

        if let Some(path) = &config.ca_cert {
            let pem = fs::read(path).map_err(|e| {
                ExportError::ConfigError(format!("Failed to read CA certificate {}: {}", path.display(), e))
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                ExportError::ConfigError(format!("Invalid CA certificate {}: {}", path.display(), e))
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        if let Some(pins) = &pins {
            builder = builder.use_preconfigured_tls(pins.tls_config());
        } else if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| ExportError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            pins,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn is_pinned(&self) -> bool {
        self.pins.is_some()
    }

    fn endpoint(&self, path: &str) -> ExportResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ExportError::ConfigError(format!("Invalid endpoint '{}': {}", path, e)))
    }

    /// Build a request bounded by the configured request timeout
    fn request(&self, method: Method, path: &str) -> ExportResult<RequestBuilder> {
        Ok(self.unbounded(method, path)?.timeout(self.request_timeout))
    }

    /// Build a request with no overall time limit, only a connect timeout
    fn unbounded(&self, method: Method, path: &str) -> ExportResult<RequestBuilder> {
        let url = self.endpoint(path)?;
        debug!("{} {}", method, url);
        Ok(self.http.request(method, url))
    }

    fn authorized(&self, method: Method, path: &str, session: &Session) -> ExportResult<RequestBuilder> {
        Ok(Self::with_session(self.request(method, path)?, session))
    }

    fn with_session(request: RequestBuilder, session: &Session) -> RequestBuilder {
        request.header(SESSION_HEADER, format!("token={}", session.token()))
    }

    /// Send a request and map non-2xx statuses to errors
    async fn send(&self, request: RequestBuilder, operation: &str) -> ExportResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ExportError::RemoteError(format!("{}: {}", operation, describe(&e))))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ExportError::RemoteError(format!(
            "{} failed with HTTP {}: {}",
            operation,
            status,
            error_message(&body)
        )))
    }

    async fn read_json<T: DeserializeOwned>(response: Response, operation: &str) -> ExportResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| ExportError::RemoteError(format!("{}: unexpected response: {}", operation, e)))
    }
}

/// Error text including its causes; a rejected handshake is only visible in the source chain
fn describe(error: &reqwest::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[async_trait]
impl ScanService for NessusClient {
    async fn authenticate(&self, credentials: &Credentials) -> ExportResult<Session> {
        let as_auth_error = |e: ExportError| match e {
            ExportError::RemoteError(message)
            | ExportError::ParseError(message)
            | ExportError::TimeoutError(message) => ExportError::AuthenticationError(message),
            other => other,
        };

        let request = self.request(Method::POST, "session")?.json(&LoginRequest {
            username: &credentials.username,
            password: &credentials.password,
        });
        let response = self.send(request, "login").await.map_err(as_auth_error)?;
        let login: LoginResponse = Self::read_json(response, "login").await.map_err(as_auth_error)?;

        Ok(Session::new(login.token))
    }

    async fn end_session(&self, session: &Session) -> ExportResult<()> {
        let request = self.authorized(Method::DELETE, "session", session)?;
        self.send(request, "logout")
            .await
            .map(|_| ())
            .map_err(|e| ExportError::LogoutError(e.to_string()))
    }

    async fn launch_scan(&self, session: &Session, scan: ScanId) -> ExportResult<RunHandle> {
        let request = self.authorized(Method::POST, &format!("scans/{}/launch", scan), session)?;
        let response = self.send(request, "launch scan").await?;
        let launched: LaunchResponse = Self::read_json(response, "launch scan").await?;

        Ok(RunHandle::new(launched.scan_uuid))
    }

    async fn fetch_scan_status(
        &self,
        session: &Session,
        scan: ScanId,
        run: Option<&RunHandle>,
    ) -> ExportResult<ScanStatus> {
        let request = self.authorized(Method::GET, &format!("scans/{}", scan), session)?;
        let response = self.send(request, "scan details").await?;
        let details: ScanDetails = Self::read_json(response, "scan details").await?;

        Ok(details.status_for(run))
    }

    async fn request_export(
        &self,
        session: &Session,
        scan: ScanId,
        template: Option<TemplateId>,
        format: ExportFormat,
    ) -> ExportResult<ExportId> {
        let request = self
            .authorized(Method::POST, &format!("scans/{}/export", scan), session)?
            .json(&ExportRequestBody {
                format,
                template_id: template,
            });
        let response = self.send(request, "export scan").await?;
        let export: ExportResponse = Self::read_json(response, "export scan").await?;

        Ok(ExportId(export.file))
    }

    async fn fetch_export_ready(
        &self,
        session: &Session,
        scan: ScanId,
        export: ExportId,
    ) -> ExportResult<bool> {
        let path = format!("scans/{}/export/{}/status", scan, export);
        let request = self.authorized(Method::GET, &path, session)?;
        let response = self.send(request, "export status").await?;
        let status: ExportStatusResponse = Self::read_json(response, "export status").await?;

        Ok(status.is_ready())
    }

    async fn fetch_export_artifact(
        &self,
        session: &Session,
        scan: ScanId,
        export: ExportId,
    ) -> ExportResult<Bytes> {
        // Reports can be large; only connecting is time limited
        let path = format!("scans/{}/export/{}/download", scan, export);
        let request = Self::with_session(self.unbounded(Method::GET, &path)?, session);
        let response = self.send(request, "download export").await?;

        response
            .bytes()
            .await
            .map_err(|e| ExportError::RemoteError(format!("download export: {}", describe(&e))))
    }

    fn name(&self) -> &str {
        "Nessus"
    }
}
