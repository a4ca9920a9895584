//! Shapes API client
//!
//! Assembles outbound requests over the token-acquisition core: every
//! call carries the static API key, plus one proof-of-legitimacy header
//! chosen by the protection mode. Proof acquisition is best-effort: when
//! it fails, the request still goes out with only the API key, the
//! failure is logged, and the backend is left to reject the unproven
//! call.

use std::sync::Arc;

use base64::prelude::*;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;

use crate::api::{HelloResponse, ShapeResponse};
use crate::attestation::HttpAttestationService;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fingerprint::{Evidence, FingerprintSource, RemoteAgentLoader};
use crate::token::TokenAcquirer;

/// Header carrying the static API key.
pub const API_KEY_HEADER: &str = "Api-Key";

/// Header carrying the short-lived attestation token.
pub const ATTESTATION_TOKEN_HEADER: &str = "Approov-Token";

/// Header carrying base64-encoded fingerprint evidence.
pub const EVIDENCE_HEADER: &str = "FingerprintJS-Token";

/// How outbound requests prove their legitimacy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    /// Attach a short-lived attestation token from the acquirer.
    AttestationToken,

    /// Attach the device's fingerprint evidence directly, base64-encoded
    /// over its JSON form.
    EvidenceHeader,
}

/// Client for the attestation-protected shapes API.
pub struct ShapesClient {
    config: Config,
    http: reqwest::Client,
    acquirer: TokenAcquirer,
    fingerprint: Arc<FingerprintSource>,
    protection: Protection,
}

impl ShapesClient {
    /// Build a client that proves legitimacy with attestation tokens.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_protection(config, Protection::AttestationToken)
    }

    /// Build a client with an explicit protection mode.
    ///
    /// This wires the hosted fingerprint provider and the HTTP
    /// attestation backend together; both share one pooled HTTP client
    /// with the configured per-request timeout.
    pub fn with_protection(config: Config, protection: Protection) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let fingerprint = Arc::new(FingerprintSource::new(Arc::new(RemoteAgentLoader::new(
            http.clone(),
            config.fingerprint_host.clone(),
            config.fingerprint_public_key.clone(),
        ))));

        let service = Arc::new(HttpAttestationService::new(
            http.clone(),
            config.attester_host.clone(),
        ));
        let acquirer = TokenAcquirer::new(service, fingerprint.clone(), config.session_config());

        Ok(Self {
            config,
            http,
            acquirer,
            fingerprint,
            protection,
        })
    }

    /// The protection mode requests are sent with.
    pub fn protection(&self) -> Protection {
        self.protection
    }

    /// Start the fingerprint provider bootstrap ahead of the first
    /// request. Optional; the first evidence request triggers it
    /// otherwise.
    pub async fn initialize(&self) -> Result<()> {
        self.fingerprint.initialize().await
    }

    /// Fetch the connectivity-check greeting.
    pub async fn hello(&self) -> Result<HelloResponse> {
        self.get_json("hello").await
    }

    /// Fetch a shape. Succeeds with a shape only when the backend
    /// accepts the attached proof of legitimacy.
    pub async fn shape(&self) -> Result<ShapeResponse> {
        self.get_json("shapes").await
    }

    async fn get_json<T: DeserializeOwned>(&self, resource: &str) -> Result<T> {
        let response = self.send_request(resource).await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api { status, message });
        }

        Ok(response.json().await?)
    }

    async fn send_request(&self, resource: &str) -> Result<reqwest::Response> {
        let url = format!(
            "{}/{}/{}",
            self.config.base_url(),
            self.config.api_version,
            resource
        );

        let mut request = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .header(API_KEY_HEADER, self.config.api_key.as_str());

        match self.proof_header().await {
            Ok((name, value)) => request = request.header(name, value),
            Err(error) => {
                tracing::warn!(%error, resource, "proceeding without proof of legitimacy");
            }
        }

        Ok(request.send().await?)
    }

    async fn proof_header(&self) -> Result<(&'static str, String)> {
        match self.protection {
            Protection::AttestationToken => {
                let token = self.acquirer.acquire(&self.config.api_domain).await?;
                Ok((ATTESTATION_TOKEN_HEADER, token))
            }
            Protection::EvidenceHeader => {
                let evidence = self.fingerprint.evidence().await?;
                Ok((EVIDENCE_HEADER, encode_evidence(&evidence)?))
            }
        }
    }
}

/// Encode evidence the way the browser agent does: base64 over the JSON
/// document.
fn encode_evidence(evidence: &Evidence) -> Result<String> {
    Ok(BASE64_STANDARD.encode(serde_json::to_vec(evidence)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ShapesClient::new(Config::new("api-key", "site-key", "fp-key")).unwrap();
        assert_eq!(client.protection(), Protection::AttestationToken);
    }

    #[test]
    fn test_evidence_mode_creation() {
        let client = ShapesClient::with_protection(
            Config::new("api-key", "site-key", "fp-key"),
            Protection::EvidenceHeader,
        )
        .unwrap();
        assert_eq!(client.protection(), Protection::EvidenceHeader);
    }

    #[test]
    fn test_encode_evidence_round_trips() {
        let evidence = Evidence {
            visitor_id: "v1".into(),
            request_id: "r1".into(),
        };

        let encoded = encode_evidence(&evidence).unwrap();
        let decoded: Evidence =
            serde_json::from_slice(&BASE64_STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded, evidence);
    }

    #[test]
    fn test_evidence_header_uses_agent_field_names() {
        let evidence = Evidence {
            visitor_id: "v1".into(),
            request_id: "r1".into(),
        };

        let encoded = encode_evidence(&evidence).unwrap();
        let json = String::from_utf8(BASE64_STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(json.contains("\"visitorId\""));
        assert!(json.contains("\"requestId\""));
    }
}
