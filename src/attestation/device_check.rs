//! DeviceCheck attestation (stateless generate).
//!
//! No handle to prepare: warm-up only loads the anonymous id, and every
//! token request calls the generation primitive. Simulators and devices
//! without DeviceCheck get [`SIMULATOR_TOKEN`] instead.

use crate::attestation::platform::{DeviceCheckPlatform, PlatformError};
use crate::attestation::{AttestationProvider, AttestationState, AttestationStatus};
use crate::identity::anonymous::AnonymousIdentity;
use crate::policy::retry::RetryPolicy;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;

/// Device type tag for DeviceCheck devices.
pub const DEVICE_TYPE: &str = "ios";

/// Token sent from simulators and unsupported devices.
pub const SIMULATOR_TOKEN: &str = "DUMMY_TOKEN";

/// Token provider for DeviceCheck.
pub struct DeviceCheckAttestation {
    platform: Arc<dyn DeviceCheckPlatform>,
    retry: RetryPolicy,
    identity: AnonymousIdentity,
}

impl DeviceCheckAttestation {
    /// Create a DeviceCheck provider.
    pub fn new(
        platform: Arc<dyn DeviceCheckPlatform>,
        retry: RetryPolicy,
        identity: AnonymousIdentity,
    ) -> Self {
        Self {
            platform,
            retry,
            identity,
        }
    }

    fn is_retryable(&self, error: &PlatformError) -> bool {
        self.platform.retryable_codes().contains(&error.code)
    }
}

#[async_trait]
impl AttestationProvider for DeviceCheckAttestation {
    async fn warm_up(&self) {
        self.identity.initialize().await;
        tracing::info!("DeviceCheck attestation warmed up");
    }

    async fn integrity_token(&self) -> String {
        let simulator = self.platform.is_simulator();
        let supported = self.platform.is_supported();
        if simulator || !supported {
            tracing::debug!(
                simulator,
                supported,
                "Simulator or unsupported device, sending placeholder DeviceCheck token"
            );
            return SIMULATOR_TOKEN.to_string();
        }

        tracing::debug!("Generating DeviceCheck token");
        match self
            .retry
            .run("generate", |e| self.is_retryable(e), || self.platform.generate_token())
            .await
        {
            Ok(bytes) => STANDARD.encode(bytes),
            Err(e) => {
                tracing::error!(error = %e, "Failed to generate DeviceCheck token");
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
        AttestationStatus::simple(AttestationState::Stateless)
    }
}
