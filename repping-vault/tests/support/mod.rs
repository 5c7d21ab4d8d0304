//! Shared fixtures for the service integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use repping_vault::{
    CryptoConfig, CryptoService, EncryptedData, InMemoryKeyRegistry, KdfParams, KeyRegistry,
    RegistryError, RegistryResult, ScopeMarker,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ACCOUNT: &str = "acct-7f3c";
pub const PASSPHRASE: &str = "correct horse battery staple";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn test_config(account_id: &str) -> CryptoConfig {
    CryptoConfig::for_account(account_id).with_kdf(KdfParams::insecure_fast())
}

pub fn service_with(registry: Arc<dyn KeyRegistry>) -> CryptoService {
    init_tracing();
    CryptoService::new(test_config(ACCOUNT), registry).unwrap()
}

pub fn new_service() -> (CryptoService, InMemoryKeyRegistry) {
    let registry = InMemoryKeyRegistry::new();
    (service_with(Arc::new(registry.clone())), registry)
}

pub async fn unlocked_service() -> (CryptoService, InMemoryKeyRegistry) {
    let (service, registry) = new_service();
    service.unlock(PASSPHRASE).await.unwrap();
    (service, registry)
}

/// Registry that fails a configurable number of calls before delegating,
/// and counts marker registrations.
#[derive(Default)]
pub struct FlakyRegistry {
    inner: InMemoryKeyRegistry,
    failures_left: AtomicUsize,
    register_calls: AtomicUsize,
    marker_delay: Option<Duration>,
}

impl FlakyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every marker lookup so concurrent callers overlap.
    pub fn with_marker_delay(mut self, delay: Duration) -> Self {
        self.marker_delay = Some(delay);
        self
    }

    pub fn fail_next(&self, calls: usize) {
        self.failures_left.store(calls, Ordering::SeqCst);
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryKeyRegistry {
        &self.inner
    }

    fn trip(&self) -> RegistryResult<()> {
        let tripped = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(RegistryError::Unavailable("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyRegistry for FlakyRegistry {
    async fn load_verifier(&self, account_id: &str) -> RegistryResult<Option<EncryptedData>> {
        self.trip()?;
        self.inner.load_verifier(account_id).await
    }

    async fn store_verifier(
        &self,
        account_id: &str,
        verifier: &EncryptedData,
    ) -> RegistryResult<EncryptedData> {
        self.trip()?;
        self.inner.store_verifier(account_id, verifier).await
    }

    async fn scope_marker(
        &self,
        account_id: &str,
        scope: &str,
    ) -> RegistryResult<Option<ScopeMarker>> {
        self.trip()?;
        if let Some(delay) = self.marker_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.scope_marker(account_id, scope).await
    }

    async fn register_scope(
        &self,
        account_id: &str,
        marker: &ScopeMarker,
    ) -> RegistryResult<ScopeMarker> {
        self.trip()?;
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.register_scope(account_id, marker).await
    }
}
