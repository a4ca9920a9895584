//! Attestation backend client and session state
//!
//! The backend issues short-lived tokens only inside an established
//! session. A session is created by `POST /session` with the fixed site
//! parameters, and the backend binds it to the device evidence supplied
//! on the first token fetch that follows. Sessions are invalidated
//! unilaterally by the backend; the only signal is a session-classified
//! failure on a later fetch.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fingerprint::Evidence;

/// Fixed parameters for establishing an attestation session.
///
/// These come from configuration, never computed at runtime.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Attestation backend hostname.
    pub host: String,

    /// Site key registered with the attestation backend.
    pub site_key: String,

    /// Public API key of the fingerprint provider the session will be
    /// bound to.
    pub fingerprint_public_key: String,
}

/// An established trust context with the attestation backend.
///
/// Sessions are immutable: recovery replaces the current session with a
/// freshly initialized one rather than mutating it in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationSession {
    id: String,
}

impl AttestationSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Opaque session identifier issued by the backend.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Holds the process-wide current session.
///
/// Concurrent recovery cycles may race to publish a replacement; the
/// last writer wins. Sessions are immutable, initialization is
/// idempotent on the backend, and each racer keeps the handle for the
/// session it created.
#[derive(Default)]
pub struct SessionStore {
    current: RwLock<Option<Arc<AttestationSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session tokens are currently fetched against, if any.
    pub fn current(&self) -> Option<Arc<AttestationSession>> {
        self.current.read().expect("session lock poisoned").clone()
    }

    /// Publish a freshly initialized session, returning the stored handle.
    pub fn replace(&self, session: AttestationSession) -> Arc<AttestationSession> {
        let session = Arc::new(session);
        *self.current.write().expect("session lock poisoned") = Some(session.clone());
        session
    }
}

/// Client contract for the attestation backend.
#[async_trait]
pub trait AttestationService: Send + Sync {
    /// Request a token scoped to `target` under the given session context.
    ///
    /// Evidence is supplied only on the recovery retry, where the backend
    /// binds the new session to the evaluating device. Failures are
    /// classified: [`Error::Session`] when the session is missing,
    /// expired, or rejected; [`Error::Fetch`] when the backend could not
    /// be reached; [`Error::Service`] for everything else.
    async fn fetch_token(
        &self,
        target: &str,
        session: Option<&AttestationSession>,
        evidence: Option<&Evidence>,
    ) -> Result<String>;

    /// Establish a new session with the backend.
    async fn initialize_session(&self, config: &SessionConfig) -> Result<AttestationSession>;
}

/// [`AttestationService`] speaking JSON over HTTPS to the attester host.
pub struct HttpAttestationService {
    http: reqwest::Client,
    host: String,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    api: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    evidence: Option<&'a Evidence>,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    #[serde(rename = "siteKey")]
    site_key: &'a str,

    #[serde(rename = "fingerprintPublicKey")]
    fingerprint_public_key: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    session: String,
}

impl HttpAttestationService {
    pub fn new(http: reqwest::Client, host: impl Into<String>) -> Self {
        Self {
            http,
            host: host.into(),
        }
    }
}

#[async_trait]
impl AttestationService for HttpAttestationService {
    async fn fetch_token(
        &self,
        target: &str,
        session: Option<&AttestationSession>,
        evidence: Option<&Evidence>,
    ) -> Result<String> {
        // The backend rejects session-less fetches outright; skip the
        // doomed round trip and let the caller run its recovery cycle.
        let Some(session) = session else {
            return Err(Error::Session("no attestation session established".into()));
        };

        let url = format!("https://{}/token", self.host);
        let request = TokenRequest {
            api: target,
            session: Some(session.id()),
            evidence,
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_token_failure(status, &message));
        }

        response
            .json::<TokenResponse>()
            .await
            .map(|r| r.token)
            .map_err(|e| Error::Service(format!("malformed token response: {e}")))
    }

    async fn initialize_session(&self, config: &SessionConfig) -> Result<AttestationSession> {
        let url = format!("https://{}/session", config.host);
        let request = SessionRequest {
            site_key: &config.site_key,
            fingerprint_public_key: &config.fingerprint_public_key,
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("session request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Service(format!("HTTP {status}: {message}")));
        }

        response
            .json::<SessionResponse>()
            .await
            .map(|r| AttestationSession::new(r.session))
            .map_err(|e| Error::Service(format!("malformed session response: {e}")))
    }
}

/// Classify a non-2xx token fetch.
///
/// 401 and 410 are the backend's session signals (never initialized and
/// expired, respectively); anything else is a service-side failure.
fn classify_token_failure(status: StatusCode, message: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::GONE => {
            Error::Session(format!("HTTP {status}: {message}"))
        }
        _ => Error::Service(format!("HTTP {status}: {message}")),
    }
}
