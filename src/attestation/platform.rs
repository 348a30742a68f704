//! Capability contracts consumed from the host's attestation services.
//!
//! The host wires the OS primitive (Play Integrity, DeviceCheck) behind
//! these traits; the crate never talks to the platform directly.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error reported by a platform attestation primitive.
///
/// `code` is the platform's own numeric error code, see
/// [`play_integrity_codes`] and [`device_check_codes`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("platform error {code}: {message}")]
pub struct PlatformError {
    /// Platform error code.
    pub code: i32,

    /// Human-readable description from the platform.
    pub message: String,
}

impl PlatformError {
    /// Create a platform error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether this error says a prepared Play Integrity provider went stale.
    pub fn is_provider_invalid(&self) -> bool {
        self.code == play_integrity_codes::INTEGRITY_TOKEN_PROVIDER_INVALID
    }
}

/// Play Integrity standard API error codes.
pub mod play_integrity_codes {
    /// Integrity API is not available.
    pub const API_NOT_AVAILABLE: i32 = -1;
    /// No official Play Store app was found on the device.
    pub const PLAY_STORE_NOT_FOUND: i32 = -2;
    /// No available network was found.
    pub const NETWORK_ERROR: i32 = -3;
    /// The calling app is not installed.
    pub const APP_NOT_INSTALLED: i32 = -5;
    /// Play services is unavailable or needs to be updated.
    pub const PLAY_SERVICES_NOT_FOUND: i32 = -6;
    /// The calling app UID does not match the one from the package manager.
    pub const APP_UID_MISMATCH: i32 = -7;
    /// The calling app is making too many requests.
    pub const TOO_MANY_REQUESTS: i32 = -8;
    /// Binding to the service in the Play Store has failed.
    pub const CANNOT_BIND_TO_SERVICE: i32 = -9;
    /// Transient error on the Google servers.
    pub const GOOGLE_SERVER_UNAVAILABLE: i32 = -12;
    /// The Play Store needs to be updated.
    pub const PLAY_STORE_VERSION_OUTDATED: i32 = -14;
    /// Play services needs to be updated.
    pub const PLAY_SERVICES_VERSION_OUTDATED: i32 = -15;
    /// The provided cloud project number is invalid.
    pub const CLOUD_PROJECT_NUMBER_IS_INVALID: i32 = -16;
    /// The provided request hash is too long.
    pub const REQUEST_HASH_TOO_LONG: i32 = -17;
    /// The prepared token provider is no longer valid and must be prepared again.
    pub const INTEGRITY_TOKEN_PROVIDER_INVALID: i32 = -19;
    /// Unknown internal error.
    pub const INTERNAL_ERROR: i32 = -100;

    /// Codes treated as transient unless the host overrides them.
    pub const DEFAULT_RETRYABLE: &[i32] = &[
        INTERNAL_ERROR,
        NETWORK_ERROR,
        PLAY_STORE_NOT_FOUND,
        PLAY_STORE_VERSION_OUTDATED,
        INTEGRITY_TOKEN_PROVIDER_INVALID,
    ];
}

/// DeviceCheck `DCError` codes.
pub mod device_check_codes {
    /// A failure has occurred, such as the failure to generate a token.
    pub const UNKNOWN_SYSTEM_FAILURE: i32 = 0;
    /// DeviceCheck is unavailable on this device.
    pub const FEATURE_UNSUPPORTED: i32 = 1;
    /// An error code that indicates when your app provides data that isn't formatted correctly.
    pub const INVALID_INPUT: i32 = 2;
    /// An error caused by a failed attempt to use the App Attest key.
    pub const INVALID_KEY: i32 = 3;
    /// An error that indicates a failed attempt to contact the App Attest service.
    pub const SERVER_UNAVAILABLE: i32 = 4;

    /// Codes treated as transient unless the host overrides them.
    pub const DEFAULT_RETRYABLE: &[i32] = &[UNKNOWN_SYSTEM_FAILURE, SERVER_UNAVAILABLE];
}

/// A prepared, reusable integrity token provider.
///
/// Produced by [`IntegrityTokenPlatform::prepare`]. Once the platform reports
/// [`play_integrity_codes::INTEGRITY_TOKEN_PROVIDER_INVALID`] it is replaced,
/// never repaired.
#[async_trait]
pub trait IntegrityTokenProvider: Send + Sync + fmt::Debug {
    /// Request a fresh integrity token.
    async fn request(&self) -> Result<String, PlatformError>;
}

/// Prepare-then-request attestation primitive (Play Integrity standard requests).
#[async_trait]
pub trait IntegrityTokenPlatform: Send + Sync {
    /// Prepare a token provider bound to a cloud project.
    ///
    /// Expensive; the result is cached by the caller.
    async fn prepare(
        &self,
        cloud_project_number: u64,
    ) -> Result<Arc<dyn IntegrityTokenProvider>, PlatformError>;

    /// Error codes worth retrying.
    fn retryable_codes(&self) -> &[i32] {
        play_integrity_codes::DEFAULT_RETRYABLE
    }
}

/// Stateless attestation primitive (DeviceCheck).
#[async_trait]
pub trait DeviceCheckPlatform: Send + Sync {
    /// Whether DeviceCheck is supported on this device.
    fn is_supported(&self) -> bool;

    /// Whether the app runs in a simulator.
    fn is_simulator(&self) -> bool {
        false
    }

    /// Generate a device token. Raw bytes, encoded by the caller.
    async fn generate_token(&self) -> Result<Vec<u8>, PlatformError>;

    /// Error codes worth retrying.
    fn retryable_codes(&self) -> &[i32] {
        device_check_codes::DEFAULT_RETRYABLE
    }
}
