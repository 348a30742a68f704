//! Play Integrity attestation (prepare-then-request).
//!
//! Owns the cached token provider handle:
//! `Uninitialized -> (prepare ok) -> Ready -> (provider invalid) -> Uninitialized -> ...`
//!
//! The handle is swapped, never mutated. Concurrent callers may race to
//! prepare; the last successful prepare wins and the extra one is harmless.

use crate::attestation::platform::{IntegrityTokenPlatform, IntegrityTokenProvider, PlatformError};
use crate::attestation::{AttestationProvider, AttestationState, AttestationStatus};
use crate::clock::{Clock, SystemClock};
use crate::identity::anonymous::AnonymousIdentity;
use crate::policy::retry::RetryPolicy;
use crate::GatewayError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Device type tag for Play Integrity devices.
pub const DEVICE_TYPE: &str = "android";

#[derive(Clone)]
struct PreparedHandle {
    provider: Arc<dyn IntegrityTokenProvider>,
    prepared_at: DateTime<Utc>,
}

impl PreparedHandle {
    fn is_same(&self, other: &PreparedHandle) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.provider) as *const (),
            Arc::as_ptr(&other.provider) as *const (),
        )
    }
}

/// Token manager for the Play Integrity standard API.
pub struct PlayIntegrityAttestation {
    platform: Arc<dyn IntegrityTokenPlatform>,
    cloud_project_number: Option<u64>,
    retry: RetryPolicy,
    identity: AnonymousIdentity,
    clock: Arc<dyn Clock>,
    handle: RwLock<Option<PreparedHandle>>,
    reinitializations: AtomicU64,
}

impl PlayIntegrityAttestation {
    /// Create a token manager. Nothing is prepared until [`warm_up`](AttestationProvider::warm_up).
    pub fn new(
        platform: Arc<dyn IntegrityTokenPlatform>,
        cloud_project_number: Option<u64>,
        retry: RetryPolicy,
        identity: AnonymousIdentity,
    ) -> Self {
        Self::with_clock(
            platform,
            cloud_project_number,
            retry,
            identity,
            Arc::new(SystemClock),
        )
    }

    /// Create a token manager with a custom clock (for testing).
    #[cfg(any(test, feature = "test-seams"))]
    pub fn new_with_clock(
        platform: Arc<dyn IntegrityTokenPlatform>,
        cloud_project_number: Option<u64>,
        retry: RetryPolicy,
        identity: AnonymousIdentity,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_clock(platform, cloud_project_number, retry, identity, clock)
    }

    fn with_clock(
        platform: Arc<dyn IntegrityTokenPlatform>,
        cloud_project_number: Option<u64>,
        retry: RetryPolicy,
        identity: AnonymousIdentity,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            platform,
            cloud_project_number,
            retry,
            identity,
            clock,
            handle: RwLock::new(None),
            reinitializations: AtomicU64::new(0),
        }
    }

    fn current(&self) -> Option<PreparedHandle> {
        self.handle
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn is_retryable(&self, error: &PlatformError) -> bool {
        self.platform.retryable_codes().contains(&error.code)
    }

    /// Prepare a new provider with retries and cache it, replacing any previous one.
    async fn prepare_handle(&self) -> Result<PreparedHandle, GatewayError> {
        let number = self
            .cloud_project_number
            .ok_or(GatewayError::MissingCloudProjectNumber)?;

        let provider = self
            .retry
            .run("prepare", |e| self.is_retryable(e), || self.platform.prepare(number))
            .await?;

        let prepared = PreparedHandle {
            provider,
            prepared_at: self.clock.now_utc(),
        };
        *self.handle.write().unwrap_or_else(|e| e.into_inner()) = Some(prepared.clone());

        tracing::info!("Prepared Integrity Token Provider successfully");
        Ok(prepared)
    }

    /// Request a token from `handle` with retries.
    ///
    /// Provider-invalid ends the loop at once: the same handle cannot recover.
    async fn request_with(&self, handle: &PreparedHandle) -> Result<String, GatewayError> {
        self.retry
            .run(
                "request",
                |e| !e.is_provider_invalid() && self.is_retryable(e),
                || handle.provider.request(),
            )
            .await
    }

    /// Drop `stale` if it is still the cached handle.
    fn invalidate(&self, stale: &PreparedHandle) {
        let mut slot = self.handle.write().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|current| current.is_same(stale)) {
            *slot = None;
        }
    }

    /// Replace a stale handle and request one more token with the new one.
    async fn reinitialize_and_request(&self, stale: &PreparedHandle) -> String {
        self.invalidate(stale);

        let fresh = match self.prepare_handle().await {
            Ok(fresh) => {
                self.reinitializations.fetch_add(1, Ordering::SeqCst);
                fresh
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to re-initialize Integrity Token Provider");
                return String::new();
            }
        };

        match self.request_with(&fresh).await {
            Ok(token) => {
                tracing::info!("Requested integrity token after re-initialization");
                token
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to request integrity token after re-initialization");
                String::new()
            }
        }
    }
}

#[async_trait]
impl AttestationProvider for PlayIntegrityAttestation {
    async fn warm_up(&self) {
        self.identity.initialize().await;

        if self.current().is_some() {
            return;
        }

        if self.cloud_project_number.is_none() {
            tracing::warn!(
                "Google Cloud project number not configured, Play Integrity attestation unavailable"
            );
            return;
        }

        if let Err(e) = self.prepare_handle().await {
            tracing::error!(error = %e, "Failed to prepare Integrity Token Provider");
        }
    }

    async fn integrity_token(&self) -> String {
        let Some(handle) = self.current() else {
            tracing::debug!("Integrity Token Provider not prepared, sending empty token");
            return String::new();
        };

        tracing::debug!("Requesting integrity token");
        match self.request_with(&handle).await {
            Ok(token) => token,
            Err(GatewayError::Platform(e)) if e.is_provider_invalid() => {
                tracing::warn!("Integrity Token Provider invalid, re-initializing and retrying");
                self.reinitialize_and_request(&handle).await
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to request integrity token");
                String::new()
            }
        }
    }

    async fn anonymous_id(&self) -> String {
        self.identity.get()
    }

    fn device_type(&self) -> &'static str {
        DEVICE_TYPE
    }

    fn status(&self) -> AttestationStatus {
        let current = self.current();
        AttestationStatus {
            state: if current.is_some() {
                AttestationState::Ready
            } else {
                AttestationState::Uninitialized
            },
            prepared_at: current.map(|h| h.prepared_at),
            reinitializations: self.reinitializations.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::mock::ScriptedIntegrityPlatform;
    use crate::attestation::platform::play_integrity_codes::*;
    use crate::clock::MockClock;
    use crate::identity::anonymous::ANON_ID_KEY;
    use crate::identity::store::{KeyValueStore, MemoryStore};

    fn identity(enabled: bool) -> AnonymousIdentity {
        AnonymousIdentity::new(enabled, Arc::new(MemoryStore::new()))
    }

    fn manager(platform: &Arc<ScriptedIntegrityPlatform>) -> PlayIntegrityAttestation {
        PlayIntegrityAttestation::new(
            platform.clone(),
            Some(123_456_789),
            RetryPolicy::default(),
            identity(false),
        )
    }

    fn err(code: i32) -> PlatformError {
        PlatformError::new(code, "scripted")
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_up_prepares_once() {
        let platform = Arc::new(ScriptedIntegrityPlatform::new());
        let manager = manager(&platform);

        manager.warm_up().await;
        manager.warm_up().await;

        assert_eq!(platform.prepare_calls(), 1);
        assert_eq!(manager.status().state, AttestationState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_without_warm_up_is_empty() {
        let platform = Arc::new(ScriptedIntegrityPlatform::new());
        let manager = manager(&platform);

        assert_eq!(manager.integrity_token().await, "");
        assert_eq!(platform.request_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_project_number_disables_attestation() {
        let platform = Arc::new(ScriptedIntegrityPlatform::new());
        let manager = PlayIntegrityAttestation::new(
            platform.clone(),
            None,
            RetryPolicy::default(),
            identity(true),
        );

        manager.warm_up().await;

        assert_eq!(manager.integrity_token().await, "");
        assert_eq!(platform.prepare_calls(), 0);
        assert_eq!(platform.request_calls(), 0);
        assert!(!manager.anonymous_id().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failures_then_success() {
        let platform = Arc::new(ScriptedIntegrityPlatform::new());
        let manager = manager(&platform);
        manager.warm_up().await;

        platform.script_requests([Err(err(NETWORK_ERROR)), Err(err(INTERNAL_ERROR))]);

        assert_eq!(manager.integrity_token().await, "token-gen1");
        assert_eq!(platform.request_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_empty() {
        let platform = Arc::new(ScriptedIntegrityPlatform::new());
        let manager = manager(&platform);
        manager.warm_up().await;

        platform.script_requests([
            Err(err(NETWORK_ERROR)),
            Err(err(NETWORK_ERROR)),
            Err(err(NETWORK_ERROR)),
        ]);

        assert_eq!(manager.integrity_token().await, "");
        assert_eq!(platform.request_calls(), 3);
        // Handle survives transient failures.
        assert_eq!(manager.status().state, AttestationState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_immediately() {
        let platform = Arc::new(ScriptedIntegrityPlatform::new());
        let manager = manager(&platform);
        manager.warm_up().await;

        platform.script_requests([Err(err(APP_UID_MISMATCH))]);

        assert_eq!(manager.integrity_token().await, "");
        assert_eq!(platform.request_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_invalid_reprepares_once_and_uses_new_handle() {
        let platform = Arc::new(ScriptedIntegrityPlatform::new());
        let manager = manager(&platform);
        manager.warm_up().await;

        platform.script_requests([Err(err(INTEGRITY_TOKEN_PROVIDER_INVALID))]);

        assert_eq!(manager.integrity_token().await, "token-gen2");
        assert_eq!(platform.prepare_calls(), 2);
        assert_eq!(platform.requested_generations(), vec![1, 2]);
        assert_eq!(manager.status().reinitializations, 1);
        assert_eq!(manager.status().state, AttestationState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_invalid_twice_gives_up() {
        let platform = Arc::new(ScriptedIntegrityPlatform::new());
        let manager = manager(&platform);
        manager.warm_up().await;

        platform.script_requests([
            Err(err(INTEGRITY_TOKEN_PROVIDER_INVALID)),
            Err(err(INTEGRITY_TOKEN_PROVIDER_INVALID)),
        ]);

        assert_eq!(manager.integrity_token().await, "");
        assert_eq!(platform.prepare_calls(), 2);
        assert_eq!(platform.request_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reprepare_leaves_uninitialized() {
        let platform = Arc::new(ScriptedIntegrityPlatform::new());
        let manager = manager(&platform);
        manager.warm_up().await;

        platform.script_requests([Err(err(INTEGRITY_TOKEN_PROVIDER_INVALID))]);
        platform.script_prepare([Err(err(CLOUD_PROJECT_NUMBER_IS_INVALID))]);

        assert_eq!(manager.integrity_token().await, "");
        let status = manager.status();
        assert_eq!(status.state, AttestationState::Uninitialized);
        assert_eq!(status.reinitializations, 0);
        assert_eq!(manager.integrity_token().await, "");
        assert_eq!(platform.request_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prepare_retries_then_succeeds() {
        let platform = Arc::new(ScriptedIntegrityPlatform::new());
        platform.script_prepare([Err(err(NETWORK_ERROR)), Err(err(PLAY_STORE_NOT_FOUND))]);
        let manager = manager(&platform);

        manager.warm_up().await;

        assert_eq!(platform.prepare_calls(), 3);
        assert_eq!(manager.status().state, AttestationState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prepare_exhausted_leaves_no_handle() {
        let platform = Arc::new(ScriptedIntegrityPlatform::new());
        platform.script_prepare([
            Err(err(INTERNAL_ERROR)),
            Err(err(INTERNAL_ERROR)),
            Err(err(INTERNAL_ERROR)),
        ]);
        let manager = manager(&platform);

        manager.warm_up().await;

        assert_eq!(platform.prepare_calls(), 3);
        assert_eq!(manager.status().state, AttestationState::Uninitialized);
        assert_eq!(manager.integrity_token().await, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_supplied_retryable_codes() {
        let platform = Arc::new(
            ScriptedIntegrityPlatform::new().with_retryable_codes(vec![TOO_MANY_REQUESTS]),
        );
        let manager = manager(&platform);
        manager.warm_up().await;

        platform.script_requests([Err(err(TOO_MANY_REQUESTS)), Err(err(NETWORK_ERROR))]);

        assert_eq!(manager.integrity_token().await, "");
        assert_eq!(platform.request_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_records_prepare_time() {
        let platform = Arc::new(ScriptedIntegrityPlatform::new());
        let clock = Arc::new(MockClock::from_rfc3339("2025-06-01T09:00:00Z"));
        let manager = PlayIntegrityAttestation::new_with_clock(
            platform.clone(),
            Some(42),
            RetryPolicy::default(),
            identity(false),
            clock.clone(),
        );

        assert_eq!(manager.status().prepared_at, None);
        manager.warm_up().await;

        let status = manager.status();
        assert_eq!(
            status.prepared_at.map(|t| t.to_rfc3339()),
            Some("2025-06-01T09:00:00+00:00".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_up_persists_anonymous_id() {
        let platform = Arc::new(ScriptedIntegrityPlatform::new());
        let store = Arc::new(MemoryStore::new());
        let manager = PlayIntegrityAttestation::new(
            platform,
            Some(42),
            RetryPolicy::default(),
            AnonymousIdentity::new(true, store.clone()),
        );

        manager.warm_up().await;

        let stored = store.get(ANON_ID_KEY).unwrap().unwrap();
        assert_eq!(manager.anonymous_id().await, stored);
        assert_eq!(manager.device_type(), "android");
    }
}
