//! Attestation token acquisition with one-shot session recovery
//!
//! Acquisition is a two-phase protocol. Phase one fetches a token
//! against the current session. When the backend classifies the failure
//! as session-scoped, phase two collects fresh device evidence,
//! initializes a replacement session, and retries the fetch exactly
//! once. The retry is terminal either way, and non-session failures
//! (network, backend outage) are never retried.

use std::sync::Arc;

use crate::attestation::{AttestationService, SessionConfig, SessionStore};
use crate::error::Result;
use crate::fingerprint::FingerprintSource;

/// Returns valid attestation tokens for outgoing API calls, recovering
/// from a stale or missing session without burdening the caller.
pub struct TokenAcquirer {
    service: Arc<dyn AttestationService>,
    fingerprint: Arc<FingerprintSource>,
    session_config: SessionConfig,
    sessions: SessionStore,
}

impl TokenAcquirer {
    pub fn new(
        service: Arc<dyn AttestationService>,
        fingerprint: Arc<FingerprintSource>,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            service,
            fingerprint,
            session_config,
            sessions: SessionStore::new(),
        }
    }

    /// Acquire a token scoped to `target`.
    ///
    /// A session failure on the first attempt triggers exactly one
    /// recovery cycle: fresh evidence, a replacement session, one
    /// retried fetch. The retry outcome is terminal either way. Every
    /// other failure, and any failure inside recovery, propagates
    /// unchanged.
    pub async fn acquire(&self, target: &str) -> Result<String> {
        let current = self.sessions.current();

        match self
            .service
            .fetch_token(target, current.as_deref(), None)
            .await
        {
            Ok(token) => Ok(token),
            Err(error) if error.is_session() => {
                tracing::debug!(api = target, %error, "re-establishing attestation session");

                // No evidence, no session: a provider failure aborts
                // recovery before the initialize call.
                let evidence = self.fingerprint.evidence().await?;
                let session = self.service.initialize_session(&self.session_config).await?;
                let session = self.sessions.replace(session);

                self.service
                    .fetch_token(target, Some(&session), Some(&evidence))
                    .await
            }
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::AttestationSession;
    use crate::error::Error;
    use crate::fingerprint::{AgentLoader, Evidence, FingerprintAgent};

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    struct FetchCall {
        session: Option<String>,
        evidence: Option<Evidence>,
    }

    /// Attestation backend double that replays scripted results and
    /// records every call it sees.
    #[derive(Default)]
    struct ScriptedService {
        fetch_results: Mutex<VecDeque<Result<String>>>,
        init_results: Mutex<VecDeque<Result<AttestationSession>>>,
        fetch_calls: Mutex<Vec<FetchCall>>,
        init_count: AtomicUsize,
    }

    impl ScriptedService {
        fn with_fetches(results: Vec<Result<String>>) -> Arc<Self> {
            let service = Self::default();
            *service.fetch_results.lock().unwrap() = results.into();
            Arc::new(service)
        }

        fn script_init(&self, result: Result<AttestationSession>) {
            self.init_results.lock().unwrap().push_back(result);
        }

        fn fetch_count(&self) -> usize {
            self.fetch_calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AttestationService for ScriptedService {
        async fn fetch_token(
            &self,
            _target: &str,
            session: Option<&AttestationSession>,
            evidence: Option<&Evidence>,
        ) -> Result<String> {
            self.fetch_calls.lock().unwrap().push(FetchCall {
                session: session.map(|s| s.id().to_string()),
                evidence: evidence.cloned(),
            });
            self.fetch_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected fetch_token call")
        }

        async fn initialize_session(&self, _config: &SessionConfig) -> Result<AttestationSession> {
            self.init_count.fetch_add(1, Ordering::SeqCst);
            self.init_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected initialize_session call")
        }
    }

    struct TestAgent {
        evaluations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FingerprintAgent for TestAgent {
        async fn evaluate(&self) -> Result<Evidence> {
            self.evaluations.fetch_add(1, Ordering::SeqCst);
            Ok(Evidence {
                visitor_id: "v1".into(),
                request_id: "r1".into(),
            })
        }
    }

    struct TestLoader {
        evaluations: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl AgentLoader for TestLoader {
        async fn load(&self) -> Result<Arc<dyn FingerprintAgent>> {
            if self.fail {
                return Err(Error::ProviderUnavailable("agent download failed".into()));
            }
            Ok(Arc::new(TestAgent {
                evaluations: self.evaluations.clone(),
            }))
        }
    }

    struct Fixture {
        service: Arc<ScriptedService>,
        evaluations: Arc<AtomicUsize>,
        acquirer: TokenAcquirer,
    }

    fn fixture(service: Arc<ScriptedService>) -> Fixture {
        fixture_with_provider(service, false)
    }

    fn fixture_with_provider(service: Arc<ScriptedService>, provider_fails: bool) -> Fixture {
        let evaluations = Arc::new(AtomicUsize::new(0));
        let fingerprint = Arc::new(FingerprintSource::new(Arc::new(TestLoader {
            evaluations: evaluations.clone(),
            fail: provider_fails,
        })));
        let acquirer = TokenAcquirer::new(
            service.clone(),
            fingerprint,
            SessionConfig {
                host: "attester.example".into(),
                site_key: "site-key".into(),
                fingerprint_public_key: "fp-key".into(),
            },
        );
        Fixture {
            service,
            evaluations,
            acquirer,
        }
    }

    fn session_error() -> Error {
        Error::Session("HTTP 410 Gone: expired".into())
    }

    #[tokio::test]
    async fn test_first_attempt_success_skips_recovery() {
        let service = ScriptedService::with_fetches(vec![Ok("tok-direct".into())]);
        let f = fixture(service);

        let token = f.acquirer.acquire("shapes.example.io").await.unwrap();

        assert_eq!(token, "tok-direct");
        assert_eq!(f.service.fetch_count(), 1);
        assert_eq!(f.service.init_count.load(Ordering::SeqCst), 0);
        assert_eq!(f.evaluations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_session_failure_runs_one_recovery_cycle() {
        let service =
            ScriptedService::with_fetches(vec![Err(session_error()), Ok("tok-123".into())]);
        service.script_init(Ok(AttestationSession::new("s-1")));
        let f = fixture(service);

        let token = f.acquirer.acquire("shapes.example.io").await.unwrap();

        assert_eq!(token, "tok-123");
        assert_eq!(f.service.fetch_count(), 2);
        assert_eq!(f.service.init_count.load(Ordering::SeqCst), 1);
        assert_eq!(f.evaluations.load(Ordering::SeqCst), 1);

        // The retry runs against the replacement session with the fresh
        // evidence attached.
        let calls = f.service.fetch_calls.lock().unwrap();
        assert!(calls[0].evidence.is_none());
        assert_eq!(calls[1].session.as_deref(), Some("s-1"));
        let evidence = calls[1].evidence.as_ref().unwrap();
        assert_eq!(evidence.visitor_id, "v1");
        assert_eq!(evidence.request_id, "r1");
    }

    #[tokio::test]
    async fn test_non_session_failure_propagates_unchanged() {
        let service =
            ScriptedService::with_fetches(vec![Err(Error::Fetch("network down".into()))]);
        let f = fixture(service);

        let error = f.acquirer.acquire("shapes.example.io").await.unwrap_err();

        assert!(matches!(error, Error::Fetch(message) if message == "network down"));
        assert_eq!(f.service.fetch_count(), 1);
        assert_eq!(f.service.init_count.load(Ordering::SeqCst), 0);
        assert_eq!(f.evaluations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_evidence_failure_aborts_before_session_init() {
        let service = ScriptedService::with_fetches(vec![Err(session_error())]);
        let f = fixture_with_provider(service, true);

        let error = f.acquirer.acquire("shapes.example.io").await.unwrap_err();

        assert!(matches!(error, Error::ProviderUnavailable(_)));
        assert_eq!(f.service.fetch_count(), 1);
        assert_eq!(f.service.init_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_init_failure_aborts_before_retry() {
        let service = ScriptedService::with_fetches(vec![Err(session_error())]);
        service.script_init(Err(Error::Service("HTTP 500: boom".into())));
        let f = fixture(service);

        let error = f.acquirer.acquire("shapes.example.io").await.unwrap_err();

        assert!(matches!(error, Error::Service(_)));
        assert_eq!(f.service.fetch_count(), 1);
        assert_eq!(f.evaluations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_failure_is_terminal() {
        let service =
            ScriptedService::with_fetches(vec![Err(session_error()), Err(session_error())]);
        service.script_init(Ok(AttestationSession::new("s-1")));
        let f = fixture(service);

        let error = f.acquirer.acquire("shapes.example.io").await.unwrap_err();

        // A session failure on the retry does not start a second cycle.
        assert!(error.is_session());
        assert_eq!(f.service.fetch_count(), 2);
        assert_eq!(f.service.init_count.load(Ordering::SeqCst), 1);
        assert_eq!(f.evaluations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovered_session_is_reused_on_later_acquisitions() {
        let service = ScriptedService::with_fetches(vec![
            Err(session_error()),
            Ok("tok-1".into()),
            Ok("tok-2".into()),
        ]);
        service.script_init(Ok(AttestationSession::new("s-1")));
        let f = fixture(service);

        f.acquirer.acquire("shapes.example.io").await.unwrap();
        f.acquirer.acquire("shapes.example.io").await.unwrap();

        // The third fetch is the second acquisition's first attempt; it
        // runs against the session published by the earlier recovery.
        assert_eq!(f.service.init_count.load(Ordering::SeqCst), 1);
        let calls = f.service.fetch_calls.lock().unwrap();
        assert_eq!(calls[2].session.as_deref(), Some("s-1"));
        assert!(calls[2].evidence.is_none());
    }
}
