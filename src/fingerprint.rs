//! Device-fingerprint evidence collection
//!
//! Wraps an asynchronous fingerprint provider behind a process-wide,
//! lazily created bootstrap: the provider agent is loaded at most once
//! and shared by every caller, while each evidence request performs a
//! fresh evaluation against the loaded agent. The attestation backend
//! binds a session to the evidence captured at initialization time, so
//! evidence is never cached across acquisitions.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::{Error, Result};

/// Identifier pair produced by one fingerprint evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "visitorId")]
    pub visitor_id: String,

    #[serde(rename = "requestId")]
    pub request_id: String,
}

/// A loaded fingerprint agent, ready to evaluate the current device.
#[async_trait]
pub trait FingerprintAgent: Send + Sync {
    /// Run one evaluation and return the resulting identifier pair.
    ///
    /// Implementations report failures as [`Error::Evaluation`].
    async fn evaluate(&self) -> Result<Evidence>;
}

/// Bootstraps a fingerprint agent.
#[async_trait]
pub trait AgentLoader: Send + Sync {
    /// Download and initialize the provider agent.
    ///
    /// Implementations report failures as [`Error::ProviderUnavailable`].
    async fn load(&self) -> Result<Arc<dyn FingerprintAgent>>;
}

/// Provides fresh device evidence on demand, hiding the provider's own
/// asynchronous bootstrap.
///
/// The bootstrap runs at most once per source: callers racing into the
/// first load all await the same in-flight future, and a completed load
/// is reused for the rest of the process lifetime. A failed load is not
/// memoized, so the next caller retries it.
pub struct FingerprintSource {
    loader: Arc<dyn AgentLoader>,
    agent: OnceCell<Arc<dyn FingerprintAgent>>,
}

impl FingerprintSource {
    pub fn new(loader: Arc<dyn AgentLoader>) -> Self {
        Self {
            loader,
            agent: OnceCell::new(),
        }
    }

    /// Start the provider bootstrap if it has not run yet.
    ///
    /// Calling this eagerly at startup overlaps the agent download with
    /// the rest of application initialization; otherwise the first
    /// [`evidence`](Self::evidence) request triggers it.
    pub async fn initialize(&self) -> Result<()> {
        self.agent().await.map(|_| ())
    }

    /// Collect a fresh identifier pair from the loaded agent.
    pub async fn evidence(&self) -> Result<Evidence> {
        let agent = self.agent().await?;
        agent.evaluate().await
    }

    async fn agent(&self) -> Result<&Arc<dyn FingerprintAgent>> {
        self.agent.get_or_try_init(|| self.loader.load()).await
    }
}

/// Fingerprint provider backed by the hosted agent service.
///
/// Loading fetches the agent bundle published for the configured public
/// API key, the same bootstrap the browser agent performs against the
/// provider CDN; evaluation posts to the identification endpoint.
pub struct RemoteAgentLoader {
    http: reqwest::Client,
    host: String,
    public_api_key: String,
}

impl RemoteAgentLoader {
    pub fn new(
        http: reqwest::Client,
        host: impl Into<String>,
        public_api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            host: host.into(),
            public_api_key: public_api_key.into(),
        }
    }
}

#[async_trait]
impl AgentLoader for RemoteAgentLoader {
    async fn load(&self) -> Result<Arc<dyn FingerprintAgent>> {
        let url = format!("https://{}/v3/{}", self.host, self.public_api_key);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("agent download failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::ProviderUnavailable(format!(
                "agent download failed: HTTP {}",
                response.status()
            )));
        }

        Ok(Arc::new(RemoteAgent {
            http: self.http.clone(),
            host: self.host.clone(),
            public_api_key: self.public_api_key.clone(),
        }))
    }
}

struct RemoteAgent {
    http: reqwest::Client,
    host: String,
    public_api_key: String,
}

#[derive(Serialize)]
struct IdentifyRequest<'a> {
    #[serde(rename = "apiKey")]
    api_key: &'a str,
}

#[async_trait]
impl FingerprintAgent for RemoteAgent {
    async fn evaluate(&self) -> Result<Evidence> {
        let url = format!("https://{}/v3/identify", self.host);
        let request = IdentifyRequest {
            api_key: &self.public_api_key,
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Evaluation(format!("identification request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Evaluation(format!(
                "identification request failed: HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Evaluation(format!("malformed identification response: {e}")))
    }
}
