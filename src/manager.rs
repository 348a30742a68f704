//! Gateway - the main public API.
//!
//! The `Gateway` context object owns the configuration and the attestation
//! provider for the process:
//! - configure once at startup (warm-up runs in the background)
//! - hand out protected and direct provider services
//! - reset for test isolation

use crate::attestation::{
    AttestationProvider, AttestationStatus, DeviceCheckAttestation, DeviceCheckPlatform,
    DisabledAttestation, IntegrityTokenPlatform, PlayIntegrityAttestation,
};
use crate::client::headers::SDK_VERSION;
use crate::client::service::{DirectService, ProtectedService, ServiceOptions, ServiceProvider};
use crate::config::GatewayConfig;
use crate::identity::anonymous::AnonymousIdentity;
use crate::identity::store::{FileStore, KeyValueStore, MemoryStore};
use crate::GatewayError;
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Platform attestation primitives supplied by the host.
#[derive(Clone)]
pub enum Platform {
    /// Play Integrity standard API (prepare-then-request).
    PlayIntegrity(Arc<dyn IntegrityTokenPlatform>),
    /// DeviceCheck (stateless generate).
    DeviceCheck(Arc<dyn DeviceCheckPlatform>),
    /// No attestation on this host.
    Unsupported,
}

/// Host integration handed to [`Gateway::configure_with`].
#[derive(Clone)]
pub struct Host {
    /// Attestation primitives.
    pub platform: Platform,

    /// Durable store for the anonymous id. `None` opens a [`FileStore`]
    /// under the configured namespace.
    pub store: Option<Arc<dyn KeyValueStore>>,
}

impl Host {
    /// Host with the default durable store.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            store: None,
        }
    }

    /// Use `store` for the anonymous id.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }
}

struct Configured {
    config: GatewayConfig,
    attestation: Arc<dyn AttestationProvider>,
}

/// Gateway client context.
///
/// Create one instance per application and share it. Until
/// [`configure`](Gateway::configure) is called every factory method
/// returns [`GatewayError::NotConfigured`].
#[derive(Default)]
pub struct Gateway {
    state: RwLock<Option<Configured>>,
    warm_up_task: Mutex<Option<JoinHandle<()>>>,
}

impl Gateway {
    /// SDK version.
    pub const VERSION: &'static str = SDK_VERSION;

    /// Create an unconfigured gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the gateway for `platform` and start warm-up.
    ///
    /// Warm-up is spawned on the current tokio runtime. Called outside a
    /// runtime, nothing is prepared until [`wait_for_warm_up`](Gateway::wait_for_warm_up)
    /// is awaited, and Play Integrity tokens stay empty until then.
    ///
    /// # Errors
    /// `ConfigError` if the configuration is invalid.
    pub fn configure(&self, config: GatewayConfig, platform: Platform) -> Result<(), GatewayError> {
        self.configure_with(config, || Ok(Host::new(platform)))
    }

    /// Configure the gateway with a host connector and start warm-up.
    ///
    /// A failing connector does not fail configuration: attestation is
    /// disabled for the session and anonymous ids keep working. Warm-up
    /// follows the same runtime rule as [`configure`](Gateway::configure).
    ///
    /// # Errors
    /// `ConfigError` if the configuration is invalid.
    pub fn configure_with<F>(&self, config: GatewayConfig, connect: F) -> Result<(), GatewayError>
    where
        F: FnOnce() -> Result<Host, GatewayError>,
    {
        config.validate()?;

        let attestation = match connect() {
            Ok(host) => {
                let identity = AnonymousIdentity::new(
                    config.enable_anonymous_id,
                    open_store(&config, host.store),
                );
                build_provider(&config, host.platform, identity)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Attestation platform unavailable, falling back to disabled attestation");
                let identity =
                    AnonymousIdentity::new(config.enable_anonymous_id, open_store(&config, None));
                Arc::new(DisabledAttestation::new(identity)) as Arc<dyn AttestationProvider>
            }
        };

        *self.state.write().unwrap_or_else(|e| e.into_inner()) = Some(Configured {
            config,
            attestation: attestation.clone(),
        });

        self.spawn_warm_up(attestation);
        Ok(())
    }

    fn spawn_warm_up(&self, attestation: Arc<dyn AttestationProvider>) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!("No tokio runtime, warm-up deferred until wait_for_warm_up()");
                return;
            }
        };

        let task = runtime.spawn(async move {
            attestation.warm_up().await;
        });
        if let Some(previous) = lock(&self.warm_up_task).replace(task) {
            previous.abort();
        }
    }

    /// Wait for background warm-up to finish.
    ///
    /// Runs warm-up inline if no background task was started.
    pub async fn wait_for_warm_up(&self) {
        let task = lock(&self.warm_up_task).take();
        match task {
            Some(task) => {
                if let Err(e) = task.await {
                    if !e.is_cancelled() {
                        tracing::error!(error = %e, "Attestation warm-up task failed");
                    }
                }
            }
            None => {
                if let Ok(attestation) = self.attestation() {
                    attestation.warm_up().await;
                }
            }
        }
    }

    /// Whether [`configure`](Gateway::configure) has been called.
    pub fn is_configured(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Forget the configuration and the cached attestation handle.
    pub fn reset(&self) {
        if let Some(task) = lock(&self.warm_up_task).take() {
            task.abort();
        }
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = None;
        tracing::debug!("Gateway reset");
    }

    /// Current configuration.
    pub fn config(&self) -> Result<GatewayConfig, GatewayError> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|configured| configured.config.clone())
            .ok_or(GatewayError::NotConfigured)
    }

    /// Active attestation provider.
    pub fn attestation(&self) -> Result<Arc<dyn AttestationProvider>, GatewayError> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|configured| configured.attestation.clone())
            .ok_or(GatewayError::NotConfigured)
    }

    /// Fetch an integrity token (`""` when attestation is unavailable).
    pub async fn integrity_token(&self) -> Result<String, GatewayError> {
        let attestation = self.attestation()?;
        Ok(attestation.integrity_token().await)
    }

    /// Anonymous installation id (`""` when the feature is off).
    pub async fn anonymous_id(&self) -> Result<String, GatewayError> {
        let attestation = self.attestation()?;
        Ok(attestation.anonymous_id().await)
    }

    /// Attestation status snapshot.
    pub fn status(&self) -> Result<AttestationStatus, GatewayError> {
        Ok(self.attestation()?.status())
    }

    /// Create a gateway-protected service for `provider`.
    ///
    /// `partial_key` and `service_url` come from the gateway dashboard.
    ///
    /// # Errors
    /// - `NotConfigured` - `configure` was not called
    /// - `ConfigError` - `service_url` is not a valid URL
    pub fn create_protected_service(
        &self,
        provider: ServiceProvider,
        partial_key: &str,
        service_url: &str,
        options: &ServiceOptions,
    ) -> Result<ProtectedService, GatewayError> {
        let attestation = self.attestation()?;
        ProtectedService::new(provider, partial_key, service_url, options, attestation)
    }

    /// Create an unprotected BYOK service talking straight to `provider`.
    ///
    /// Only meant for development or user-supplied keys.
    ///
    /// # Errors
    /// - `NotConfigured` - `configure` was not called
    /// - `EmptyApiKey` - `api_key` is blank
    pub fn create_direct_service(
        &self,
        provider: ServiceProvider,
        api_key: &str,
        options: &ServiceOptions,
    ) -> Result<DirectService, GatewayError> {
        self.attestation()?;
        DirectService::new(provider, api_key, options)
    }
}

fn open_store(
    config: &GatewayConfig,
    store: Option<Arc<dyn KeyValueStore>>,
) -> Arc<dyn KeyValueStore> {
    if let Some(store) = store {
        return store;
    }
    if !config.enable_anonymous_id {
        return Arc::new(MemoryStore::new());
    }

    match FileStore::new(config.storage_namespace) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "Durable store unavailable, anonymous id kept in memory");
            Arc::new(MemoryStore::new())
        }
    }
}

fn build_provider(
    config: &GatewayConfig,
    platform: Platform,
    identity: AnonymousIdentity,
) -> Arc<dyn AttestationProvider> {
    match platform {
        Platform::PlayIntegrity(platform) => Arc::new(PlayIntegrityAttestation::new(
            platform,
            config.cloud_project_number,
            config.retry.clone(),
            identity,
        )),
        Platform::DeviceCheck(platform) => Arc::new(DeviceCheckAttestation::new(
            platform,
            config.retry.clone(),
            identity,
        )),
        Platform::Unsupported => Arc::new(DisabledAttestation::new(identity)),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
