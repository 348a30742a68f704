//! Attestation providers.
//!
//! Every platform variant exposes the same small capability set behind
//! [`AttestationProvider`]:
//! - `warm_up` prepares what can be prepared ahead of the first request
//! - `integrity_token` returns a token, or `""` when attestation is unavailable
//! - `anonymous_id` returns the installation id, or `""` when disabled
//!
//! Failures never cross this boundary; they are logged and degraded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod device_check;
pub mod disabled;
pub mod platform;
pub mod play_integrity;

#[cfg(any(test, feature = "test-seams"))]
pub mod mock;

pub use device_check::{DeviceCheckAttestation, SIMULATOR_TOKEN};
pub use disabled::DisabledAttestation;
pub use platform::{DeviceCheckPlatform, IntegrityTokenPlatform, IntegrityTokenProvider, PlatformError};
pub use play_integrity::PlayIntegrityAttestation;

/// Lifecycle state of the attestation handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationState {
    /// No prepared handle; token requests return `""` until warm-up succeeds.
    Uninitialized,
    /// A prepared handle is cached.
    Ready,
    /// The platform has no handle; every token is generated on demand.
    Stateless,
    /// Attestation is switched off for this session.
    Disabled,
}

/// Point-in-time view of a provider, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttestationStatus {
    /// Handle state.
    pub state: AttestationState,

    /// When the current handle was prepared.
    pub prepared_at: Option<DateTime<Utc>>,

    /// How many times a stale handle was replaced.
    pub reinitializations: u64,
}

impl AttestationStatus {
    pub(crate) fn simple(state: AttestationState) -> Self {
        Self {
            state,
            prepared_at: None,
            reinitializations: 0,
        }
    }
}

/// Capability interface shared by all platform variants.
#[async_trait]
pub trait AttestationProvider: Send + Sync {
    /// Prepare attestation and the anonymous id. Idempotent, never fails.
    async fn warm_up(&self);

    /// A fresh integrity token, or `""` if attestation is unavailable.
    async fn integrity_token(&self) -> String;

    /// The anonymous installation id, or `""` if the feature is disabled.
    async fn anonymous_id(&self) -> String;

    /// Device type tag sent with every request.
    fn device_type(&self) -> &'static str;

    /// Current handle status.
    fn status(&self) -> AttestationStatus;
}
