//! Gateway error types.

use crate::attestation::platform::PlatformError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while configuring the gateway or talking to a provider.
///
/// Attestation failures are only visible through this type inside the crate
/// and to hosts calling the lower-level retry helpers directly: the
/// [`AttestationProvider`](crate::attestation::AttestationProvider) boundary
/// degrades them to an empty token.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The gateway was used before `configure()` was called.
    #[error("Gateway must be configured before use. Call Gateway::configure() first.")]
    NotConfigured,

    /// Play Integrity needs a cloud project number and none was configured.
    #[error("Google Cloud project number must be provided for Play Integrity attestation")]
    MissingCloudProjectNumber,

    /// The platform attestation primitive reported an error.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// A single attempt did not finish within the per-attempt timeout.
    #[error("{operation} timed out after {timeout:?}")]
    AttemptTimedOut {
        /// Operation that timed out.
        operation: &'static str,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// Every attempt allowed by the retry policy failed with a retryable error.
    #[error("{operation} failed after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        /// Operation that was retried.
        operation: &'static str,
        /// Number of attempts performed.
        attempts: u32,
        /// Error from the final attempt.
        last: Box<GatewayError>,
    },

    /// Durable storage I/O error.
    #[error("Storage I/O error: {0}")]
    StorageIO(String),

    /// A header value could not be encoded.
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    /// HTTP transport error.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider answered with a non-success status.
    #[error("API error: HTTP {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// A BYOK service was requested with an empty key.
    #[error("API key cannot be empty")]
    EmptyApiKey,
}

impl GatewayError {
    /// The platform error at the root of this error, if any.
    pub fn platform_error(&self) -> Option<&PlatformError> {
        match self {
            GatewayError::Platform(e) => Some(e),
            GatewayError::RetriesExhausted { last, .. } => last.platform_error(),
            _ => None,
        }
    }
}
