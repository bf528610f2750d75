//! Credential Manager
//!
//! Keeps exactly one usable bearer credential alive for every poller in
//! the process. Acquisition is evaluated in precedence order:
//!
//! 1. cached credential that has not expired (no I/O)
//! 2. latest stored credential issued less than the check interval ago
//! 3. full authorization once the refresh chain is older than a week
//! 4. validity probe of an unexpired credential, then refresh, then full
//!    authorization
//!
//! Steps 2-4 run single-flight: concurrent callers queue on one async
//! mutex and reuse whatever credential the first caller produced.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::application::ports::{
    ConsentPrompt, CredentialError, CredentialSource, CredentialStore, TokenEndpoint,
};
use crate::domain::{Clock, Credential, CredentialOrigin};
use crate::infrastructure::metrics::{AcquisitionOutcome, record_credential_acquisition};

/// Validation intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialPolicy {
    /// Stored credentials younger than this are reused without validation.
    pub check_interval: Duration,
    /// Refresh chains older than this require a new authorization.
    pub reauthorization_interval: Duration,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            check_interval: Duration::minutes(30),
            reauthorization_interval: Duration::weeks(1),
        }
    }
}

/// Process-wide owner of the bearer credential.
pub struct CredentialManager {
    endpoint: Arc<dyn TokenEndpoint>,
    consent: Arc<dyn ConsentPrompt>,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    policy: CredentialPolicy,
    cached: RwLock<Option<Credential>>,
    revalidate: AtomicBool,
    terminal: Mutex<Option<CredentialError>>,
    flight: tokio::sync::Mutex<()>,
}

impl CredentialManager {
    /// Create a manager with the default policy.
    #[must_use]
    pub fn new(
        endpoint: Arc<dyn TokenEndpoint>,
        consent: Arc<dyn ConsentPrompt>,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            endpoint,
            consent,
            store,
            clock,
            policy: CredentialPolicy::default(),
            cached: RwLock::new(None),
            revalidate: AtomicBool::new(false),
            terminal: Mutex::new(None),
            flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Override the validation intervals.
    #[must_use]
    pub const fn with_policy(mut self, policy: CredentialPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Acquire a credential, authorizing or refreshing if needed.
    ///
    /// # Errors
    ///
    /// Returns a terminal [`CredentialError`] when authorization is required
    /// but cannot complete, or a transient one when the token endpoint or
    /// the credential store is unreachable.
    pub async fn acquire(&self) -> Result<Credential, CredentialError> {
        if let Some(credential) = self.cached_valid() {
            record_credential_acquisition(AcquisitionOutcome::Cached);
            return Ok(credential);
        }

        let _flight = self.flight.lock().await;

        let latched = self.terminal.lock().clone();
        if let Some(err) = latched {
            return Err(err);
        }

        // Another caller may have landed a credential while we waited.
        if let Some(credential) = self.cached_valid() {
            record_credential_acquisition(AcquisitionOutcome::Cached);
            return Ok(credential);
        }

        match self.acquire_uncached().await {
            Ok((credential, outcome)) => {
                record_credential_acquisition(outcome);
                *self.cached.write() = Some(credential.clone());
                self.revalidate.store(false, Ordering::Release);
                Ok(credential)
            }
            Err(err) => {
                record_credential_acquisition(AcquisitionOutcome::Failed);
                if err.is_terminal() {
                    error!(error = %err, "Credential acquisition failed permanently");
                    *self.terminal.lock() = Some(err.clone());
                } else {
                    warn!(error = %err, "Credential acquisition failed");
                }
                Err(err)
            }
        }
    }

    /// Drop the cached credential and force validation on the next acquire.
    pub fn invalidate(&self) {
        self.revalidate.store(true, Ordering::Release);
        *self.cached.write() = None;
        debug!("Cached credential invalidated");
    }

    fn cached_valid(&self) -> Option<Credential> {
        if self.revalidate.load(Ordering::Acquire) {
            return None;
        }
        let now = self.clock.now();
        self.cached
            .read()
            .as_ref()
            .filter(|credential| credential.is_valid_at(now))
            .cloned()
    }

    async fn acquire_uncached(&self) -> Result<(Credential, AcquisitionOutcome), CredentialError> {
        let latest = self
            .store
            .latest_credential()
            .await
            .map_err(|e| CredentialError::Store {
                message: e.to_string(),
            })?;

        let Some(latest) = latest else {
            info!("No stored credential, starting authorization");
            return self.authorize().await;
        };

        let now = self.clock.now();
        let forced = self.revalidate.load(Ordering::Acquire);

        if !forced
            && now - latest.issued_at() < self.policy.check_interval
            && latest.is_valid_at(now)
        {
            debug!(issued_at = %latest.issued_at(), "Reusing recently issued credential");
            return Ok((latest, AcquisitionOutcome::Stored));
        }

        if now - latest.authenticated_at() >= self.policy.reauthorization_interval {
            info!(
                authenticated_at = %latest.authenticated_at(),
                "Refresh chain expired, starting authorization"
            );
            return self.authorize().await;
        }

        // Expired tokens skip the probe and go straight to refresh.
        if latest.is_valid_at(now) && self.endpoint.probe(latest.access_token()).await? {
            debug!("Stored credential passed validity probe");
            return Ok((latest, AcquisitionOutcome::Probed));
        }

        match self.endpoint.refresh(latest.refresh_token()).await {
            Ok(grant) => {
                let credential = Credential::refreshed(grant, &latest, self.clock.now());
                self.persist(&credential, CredentialOrigin::Refresh).await;
                Ok((credential, AcquisitionOutcome::Refreshed))
            }
            Err(CredentialError::RefreshRejected { status, message }) => {
                warn!(status, message = %message, "Refresh rejected, starting authorization");
                self.authorize().await
            }
            Err(err) => Err(err),
        }
    }

    async fn authorize(&self) -> Result<(Credential, AcquisitionOutcome), CredentialError> {
        let url = self.endpoint.authorization_url();
        let code = self.consent.authorization_code(&url).await?;
        let grant = self.endpoint.exchange_code(&code).await?;
        let credential = Credential::authorized(grant, self.clock.now());
        self.persist(&credential, CredentialOrigin::Authorization)
            .await;
        Ok((credential, AcquisitionOutcome::Authorized))
    }

    async fn persist(&self, credential: &Credential, origin: CredentialOrigin) {
        match self.store.append_credential(credential).await {
            Ok(()) => info!(
                origin = origin.as_str(),
                expires_at = %credential.expires_at(),
                "New credential stored"
            ),
            Err(e) => error!(
                origin = origin.as_str(),
                error = %e,
                "Failed to store new credential"
            ),
        }
    }

    /// Expiry of the cached credential, if any.
    #[must_use]
    pub fn cached_expiry(&self) -> Option<DateTime<Utc>> {
        self.cached.read().as_ref().map(Credential::expires_at)
    }
}

#[async_trait]
impl CredentialSource for CredentialManager {
    async fn acquire(&self) -> Result<Credential, CredentialError> {
        Self::acquire(self).await
    }

    fn invalidate(&self) {
        Self::invalidate(self);
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("policy", &self.policy)
            .field("cached_expiry", &self.cached_expiry())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use chrono::TimeZone;

    use super::*;
    use crate::application::ports::MockTokenEndpoint;
    use crate::domain::{ManualClock, TokenGrant};
    use crate::infrastructure::persistence::InMemoryStore;

    struct FixedConsent {
        calls: AtomicUsize,
        code: Option<&'static str>,
    }

    impl FixedConsent {
        fn answering(code: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                code: Some(code),
            })
        }

        fn unavailable() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                code: None,
            })
        }
    }

    #[async_trait]
    impl ConsentPrompt for FixedConsent {
        async fn authorization_code(&self, _url: &str) -> Result<String, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.code
                .map(str::to_string)
                .ok_or_else(|| CredentialError::ConsentUnavailable {
                    reason: "no terminal".to_string(),
                })
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 6, 12, 0, 0).unwrap()
    }

    fn grant(access: &str) -> TokenGrant {
        TokenGrant {
            access_token: access.to_string(),
            refresh_token: format!("{access}-refresh"),
            token_type: "Bearer".to_string(),
            scope: "api".to_string(),
            expires_in: 1800,
            id_token: None,
        }
    }

    fn endpoint() -> MockTokenEndpoint {
        let mut endpoint = MockTokenEndpoint::new();
        endpoint
            .expect_authorization_url()
            .returning(|| "https://auth.example/authorize".to_string());
        endpoint
    }

    async fn seeded_store(credential: &Credential) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.append_credential(credential).await.unwrap();
        store
    }

    fn manager(
        endpoint: MockTokenEndpoint,
        consent: Arc<FixedConsent>,
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
    ) -> CredentialManager {
        CredentialManager::new(Arc::new(endpoint), consent, store, clock)
    }

    #[tokio::test]
    async fn unexpired_credential_needs_no_network() {
        let issued = start() - Duration::minutes(20);
        let stored = Credential::authorized(grant("a1"), issued);
        let store = seeded_store(&stored).await;
        let clock = Arc::new(ManualClock::new(start()));
        let consent = FixedConsent::answering("code");

        // No probe/refresh/exchange expectations: any network call panics.
        let manager = manager(endpoint(), consent.clone(), store, clock);

        let first = manager.acquire().await.unwrap();
        let second = manager.acquire().await.unwrap();
        assert_eq!(first, stored);
        assert_eq!(second, stored);
        assert_eq!(first.expires_at() - start(), Duration::minutes(10));
        assert_eq!(consent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_store_starts_authorization() {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let consent = FixedConsent::answering("auth-code");

        let mut endpoint = endpoint();
        endpoint
            .expect_exchange_code()
            .times(1)
            .returning(|_| Ok(grant("fresh")));

        let manager = manager(endpoint, consent.clone(), store.clone(), clock);
        let credential = manager.acquire().await.unwrap();

        assert_eq!(credential.access_token(), "fresh");
        assert_eq!(credential.authenticated_at(), start());
        assert_eq!(consent.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.latest_credential().await.unwrap(), Some(credential));
    }

    #[tokio::test]
    async fn week_old_chain_forces_authorization_without_refresh() {
        let login = start() - Duration::days(8);
        let first = Credential::authorized(grant("a1"), login);
        let refreshed = Credential::refreshed(grant("a2"), &first, start() - Duration::minutes(45));
        let store = seeded_store(&refreshed).await;
        let clock = Arc::new(ManualClock::new(start()));

        let mut endpoint = endpoint();
        endpoint.expect_probe().never();
        endpoint.expect_refresh().never();
        endpoint
            .expect_exchange_code()
            .times(1)
            .returning(|_| Ok(grant("weekly")));

        let manager = manager(endpoint, FixedConsent::answering("c"), store, clock);
        let credential = manager.acquire().await.unwrap();
        assert_eq!(credential.access_token(), "weekly");
        assert_eq!(credential.authenticated_at(), start());
    }

    #[tokio::test]
    async fn passing_probe_reuses_stored_credential() {
        let long = TokenGrant {
            expires_in: 7200,
            ..grant("a1")
        };
        let stored = Credential::authorized(long, start() - Duration::minutes(31));
        let store = seeded_store(&stored).await;
        let clock = Arc::new(ManualClock::new(start()));

        let mut endpoint = endpoint();
        endpoint.expect_probe().times(1).returning(|_| Ok(true));
        endpoint.expect_refresh().never();

        let manager = manager(endpoint, FixedConsent::answering("c"), store, clock);
        assert_eq!(manager.acquire().await.unwrap(), stored);
    }

    #[tokio::test]
    async fn expired_credential_refreshes_without_probe() {
        let login = start() - Duration::days(2);
        let stored = Credential::authorized(grant("a1"), login);
        let store = seeded_store(&stored).await;
        let clock = Arc::new(ManualClock::new(start()));

        let mut endpoint = endpoint();
        endpoint.expect_probe().never();
        endpoint
            .expect_refresh()
            .times(1)
            .returning(|_| Ok(grant("a2")));
        endpoint.expect_exchange_code().never();

        let manager = manager(endpoint, FixedConsent::answering("c"), store.clone(), clock);
        let credential = manager.acquire().await.unwrap();

        assert_eq!(credential.access_token(), "a2");
        assert_eq!(credential.issued_at(), start());
        assert_eq!(credential.authenticated_at(), login);
        assert_eq!(store.credential_count(), 2);
    }

    #[tokio::test]
    async fn rejected_refresh_falls_back_to_authorization() {
        let stored = Credential::authorized(grant("a1"), start() - Duration::days(1));
        let store = seeded_store(&stored).await;
        let clock = Arc::new(ManualClock::new(start()));
        let consent = FixedConsent::answering("c");

        let mut endpoint = endpoint();
        endpoint.expect_probe().returning(|_| Ok(false));
        endpoint.expect_refresh().times(1).returning(|_| {
            Err(CredentialError::RefreshRejected {
                status: 400,
                message: "invalid_grant".to_string(),
            })
        });
        endpoint
            .expect_exchange_code()
            .times(1)
            .returning(|_| Ok(grant("reauth")));

        let manager = manager(endpoint, consent.clone(), store, clock);
        assert_eq!(manager.acquire().await.unwrap().access_token(), "reauth");
        assert_eq!(consent.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_transport_error_is_returned() {
        let stored = Credential::authorized(grant("a1"), start() - Duration::days(1));
        let store = seeded_store(&stored).await;
        let clock = Arc::new(ManualClock::new(start()));
        let consent = FixedConsent::answering("c");

        let mut endpoint = endpoint();
        endpoint.expect_probe().returning(|_| Ok(false));
        endpoint.expect_refresh().returning(|_| {
            Err(CredentialError::Transport {
                message: "connection reset".to_string(),
            })
        });

        let manager = manager(endpoint, consent.clone(), store, clock);
        let err = manager.acquire().await.unwrap_err();
        assert!(matches!(err, CredentialError::Transport { .. }));
        assert!(!err.is_terminal());
        assert_eq!(consent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn terminal_failure_is_latched() {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let consent = FixedConsent::unavailable();

        let manager = manager(endpoint(), consent.clone(), store, clock);
        let first = manager.acquire().await.unwrap_err();
        let second = manager.acquire().await.unwrap_err();

        assert!(first.is_terminal());
        assert_eq!(first, second);
        assert_eq!(consent.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_bypasses_check_interval() {
        let stored = Credential::authorized(grant("a1"), start() - Duration::minutes(5));
        let store = seeded_store(&stored).await;
        let clock = Arc::new(ManualClock::new(start()));

        let mut endpoint = endpoint();
        endpoint.expect_probe().times(1).returning(|_| Ok(false));
        endpoint
            .expect_refresh()
            .times(1)
            .returning(|_| Ok(grant("a2")));

        let manager = manager(endpoint, FixedConsent::answering("c"), store, clock);
        assert_eq!(manager.acquire().await.unwrap().access_token(), "a1");

        manager.invalidate();
        assert!(manager.cached_expiry().is_none());
        assert_eq!(manager.acquire().await.unwrap().access_token(), "a2");
        // Cached again afterwards.
        assert_eq!(manager.acquire().await.unwrap().access_token(), "a2");
    }

    #[tokio::test]
    async fn expired_credential_within_check_interval_is_refreshed() {
        let short = TokenGrant {
            expires_in: 60,
            ..grant("short")
        };
        let stored = Credential::authorized(short, start() - Duration::minutes(10));
        let store = seeded_store(&stored).await;
        let clock = Arc::new(ManualClock::new(start()));

        let mut endpoint = endpoint();
        endpoint.expect_probe().never();
        endpoint
            .expect_refresh()
            .times(1)
            .returning(|_| Ok(grant("long")));

        let manager = manager(endpoint, FixedConsent::answering("c"), store, clock);
        assert_eq!(manager.acquire().await.unwrap().access_token(), "long");
    }

    #[tokio::test]
    async fn rejected_unexpired_credential_is_refreshed() {
        let long = TokenGrant {
            expires_in: 7200,
            ..grant("a1")
        };
        let stored = Credential::authorized(long, start() - Duration::hours(1));
        let store = seeded_store(&stored).await;
        let clock = Arc::new(ManualClock::new(start()));

        let mut endpoint = endpoint();
        endpoint.expect_probe().times(1).returning(|_| Ok(false));
        endpoint
            .expect_refresh()
            .times(1)
            .returning(|_| Ok(grant("a2")));

        let manager = manager(endpoint, FixedConsent::answering("c"), store.clone(), clock);
        assert_eq!(manager.acquire().await.unwrap().access_token(), "a2");
        assert_eq!(store.credential_count(), 2);
    }
}
