//! Fallback provider used when the platform integration could not be built.
//!
//! Attestation is off for the session; anonymous ids keep working.

use crate::attestation::{AttestationProvider, AttestationState, AttestationStatus};
use crate::identity::anonymous::AnonymousIdentity;
use async_trait::async_trait;

/// No-op attestation provider.
pub struct DisabledAttestation {
    identity: AnonymousIdentity,
    device_type: &'static str,
}

impl DisabledAttestation {
    /// Create a disabled provider reporting the host OS as device type.
    pub fn new(identity: AnonymousIdentity) -> Self {
        Self::with_device_type(identity, std::env::consts::OS)
    }

    /// Create a disabled provider that still reports the intended device type.
    pub fn with_device_type(identity: AnonymousIdentity, device_type: &'static str) -> Self {
        Self {
            identity,
            device_type,
        }
    }
}

#[async_trait]
impl AttestationProvider for DisabledAttestation {
    async fn warm_up(&self) {
        self.identity.initialize().await;
        tracing::info!("Attestation disabled for this session");
    }

    async fn integrity_token(&self) -> String {
        tracing::debug!("Integrity token unavailable, attestation disabled");
        String::new()
    }

    async fn anonymous_id(&self) -> String {
        self.identity.get()
    }

    fn device_type(&self) -> &'static str {
        self.device_type
    }

    fn status(&self) -> AttestationStatus {
        AttestationStatus::simple(AttestationState::Disabled)
    }
}
