//! Gateway configuration.

use crate::policy::retry::RetryPolicy;
use crate::GatewayError;

/// Default namespace for the durable preferences store.
pub const DEFAULT_STORAGE_NAMESPACE: &str = "gateway_prefs";

/// Configuration for the gateway client.
///
/// Set once through [`Gateway::configure`](crate::Gateway::configure) and
/// immutable afterwards.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Google Cloud project number for Play Integrity.
    /// Required for attestation on Android, ignored elsewhere.
    pub cloud_project_number: Option<u64>,

    /// Send a per-installation anonymous id with every request.
    pub enable_anonymous_id: bool,

    /// Namespace for the durable preferences store.
    /// Each app should use a unique namespace to avoid collisions.
    pub storage_namespace: &'static str,

    /// Retry policy for prepare, request and generate calls.
    pub retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cloud_project_number: None,
            enable_anonymous_id: false,
            storage_namespace: DEFAULT_STORAGE_NAMESPACE,
            retry: RetryPolicy::default(),
        }
    }
}

impl GatewayConfig {
    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.cloud_project_number == Some(0) {
            return Err(GatewayError::ConfigError(
                "cloud_project_number cannot be 0".to_string(),
            ));
        }
        if self.storage_namespace.trim().is_empty() {
            return Err(GatewayError::ConfigError(
                "storage_namespace cannot be empty".to_string(),
            ));
        }
        self.retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cloud_project_number, None);
        assert!(!config.enable_anonymous_id);
        assert_eq!(config.storage_namespace, "gateway_prefs");
    }

    #[test]
    fn test_rejects_zero_project_number() {
        let config = GatewayConfig {
            cloud_project_number: Some(0),
            ..GatewayConfig::default()
        };
        assert!(matches!(config.validate(), Err(GatewayError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_empty_namespace() {
        let config = GatewayConfig {
            storage_namespace: " ",
            ..GatewayConfig::default()
        };
        assert!(matches!(config.validate(), Err(GatewayError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_bad_retry_policy() {
        let config = GatewayConfig {
            retry: RetryPolicy {
                base_delay: Duration::from_secs(10),
                max_delay: Duration::from_secs(1),
                ..RetryPolicy::default()
            },
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
