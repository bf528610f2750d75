//! Credential Manager Concurrency Tests
//!
//! Many pollers asking for a credential at once must trigger at most one
//! authorization, refresh or probe, and never receive an expired token.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use market_scanner::application::ports::{
    ConsentPrompt, CredentialError, CredentialSource, CredentialStore, TokenEndpoint,
};
use market_scanner::domain::TokenGrant;
use market_scanner::infrastructure::persistence::InMemoryStore;
use market_scanner::{Clock, Credential, CredentialManager, ManualClock};

const CALLERS: usize = 16;

#[derive(Default)]
struct SlowEndpoint {
    probes: AtomicUsize,
    refreshes: AtomicUsize,
    exchanges: AtomicUsize,
    probe_passes: bool,
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

impl SlowEndpoint {
    fn accepting_stored_tokens() -> Self {
        Self {
            probe_passes: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl TokenEndpoint for SlowEndpoint {
    fn authorization_url(&self) -> String {
        "https://auth.test/authorize".to_string()
    }

    async fn probe(&self, _access_token: &str) -> Result<bool, CredentialError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(self.probe_passes)
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, CredentialError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(grant("refreshed"))
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, CredentialError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(grant("authorized"))
    }
}

struct Consent {
    prompts: AtomicUsize,
    available: bool,
}

impl Consent {
    fn new(available: bool) -> Arc<Self> {
        Arc::new(Self {
            prompts: AtomicUsize::new(0),
            available,
        })
    }
}

#[async_trait]
impl ConsentPrompt for Consent {
    async fn authorization_code(&self, _url: &str) -> Result<String, CredentialError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if self.available {
            Ok("code".to_string())
        } else {
            Err(CredentialError::ConsentUnavailable {
                reason: "headless".to_string(),
            })
        }
    }
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 10, 13, 0, 0).unwrap(),
    ))
}

async fn acquire_concurrently(
    manager: &Arc<CredentialManager>,
) -> Vec<Result<Credential, CredentialError>> {
    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let manager = Arc::clone(manager);
            tokio::spawn(async move { CredentialSource::acquire(manager.as_ref()).await })
        })
        .collect();

    let mut results = Vec::with_capacity(CALLERS);
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_authorization() {
    let endpoint = Arc::new(SlowEndpoint::default());
    let consent = Consent::new(true);
    let store = Arc::new(InMemoryStore::new());
    let manager = Arc::new(CredentialManager::new(
        endpoint.clone(),
        consent.clone(),
        store.clone(),
        clock(),
    ));

    let results = acquire_concurrently(&manager).await;

    for result in results {
        assert_eq!(result.unwrap().access_token(), "authorized");
    }
    assert_eq!(consent.prompts.load(Ordering::SeqCst), 1);
    assert_eq!(endpoint.exchanges.load(Ordering::SeqCst), 1);
    assert_eq!(store.credential_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_refresh() {
    let clock = clock();
    let store = Arc::new(InMemoryStore::new());
    // issued two hours ago, so long expired and past the check interval
    let previous = Credential::authorized(grant("stale"), clock.now() - chrono::Duration::hours(2));
    store.append_credential(&previous).await.unwrap();

    // an endpoint that accepts the stale token still yields a fresh one
    let endpoint = Arc::new(SlowEndpoint::accepting_stored_tokens());
    let consent = Consent::new(true);
    let manager = Arc::new(CredentialManager::new(
        endpoint.clone(),
        consent.clone(),
        store.clone(),
        clock.clone(),
    ));

    let results = acquire_concurrently(&manager).await;

    for result in results {
        let credential = result.unwrap();
        assert_eq!(credential.access_token(), "refreshed");
        assert!(credential.is_valid_at(clock.now()));
    }
    assert_eq!(endpoint.probes.load(Ordering::SeqCst), 0);
    assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(consent.prompts.load(Ordering::SeqCst), 0);
    assert_eq!(store.credential_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_validity_check() {
    let clock = clock();
    let store = Arc::new(InMemoryStore::new());
    // issued an hour ago: past the check interval, still an hour from expiry
    let long_lived = TokenGrant {
        expires_in: 7200,
        ..grant("probed")
    };
    let previous = Credential::authorized(long_lived, clock.now() - chrono::Duration::hours(1));
    store.append_credential(&previous).await.unwrap();

    let endpoint = Arc::new(SlowEndpoint::accepting_stored_tokens());
    let consent = Consent::new(true);
    let manager = Arc::new(CredentialManager::new(
        endpoint.clone(),
        consent.clone(),
        store.clone(),
        clock.clone(),
    ));

    let results = acquire_concurrently(&manager).await;

    for result in results {
        let credential = result.unwrap();
        assert_eq!(credential, previous);
        assert!(credential.is_valid_at(clock.now()));
    }
    assert_eq!(endpoint.probes.load(Ordering::SeqCst), 1);
    assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 0);
    assert_eq!(consent.prompts.load(Ordering::SeqCst), 0);
    assert_eq!(store.credential_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unavailable_consent_is_reported_to_every_caller_once() {
    let endpoint = Arc::new(SlowEndpoint::default());
    let consent = Consent::new(false);
    let manager = Arc::new(CredentialManager::new(
        endpoint.clone(),
        consent.clone(),
        Arc::new(InMemoryStore::new()),
        clock(),
    ));

    let results = acquire_concurrently(&manager).await;

    for result in results {
        let err = result.unwrap_err();
        assert!(err.is_terminal());
        assert!(matches!(err, CredentialError::ConsentUnavailable { .. }));
    }
    // the failure is latched, later callers do not prompt again
    assert_eq!(consent.prompts.load(Ordering::SeqCst), 1);
    assert_eq!(endpoint.exchanges.load(Ordering::SeqCst), 0);
}
