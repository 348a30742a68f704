//! Gateway request headers.
//!
//! Every protected request carries the integrity token, SDK version, device
//! type and provider name, plus the anonymous id and bearer credential when
//! they are available.

use crate::attestation::AttestationProvider;
use crate::GatewayError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

/// Integrity token header.
pub const INTEGRITY_HEADER: &str = "gateway-integrity";

/// SDK version header.
pub const SDK_VERSION_HEADER: &str = "gateway-sdk-version";

/// Device type header.
pub const DEVICE_TYPE_HEADER: &str = "gateway-device-type";

/// Provider name header.
pub const PROVIDER_HEADER: &str = "gateway-provider";

/// Anonymous installation id header.
pub const ANONYMOUS_ID_HEADER: &str = "gateway-anonymous-id";

/// Version of this SDK, from Cargo.toml.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the User-Agent string sent by gateway services.
///
/// Format: `gateway-client/<version> (<device type>)`
pub fn build_user_agent(device_type: &str) -> String {
    format!("gateway-client/{} ({})", SDK_VERSION, device_type)
}

/// Attach gateway headers to an outgoing request.
///
/// Never blocks on warm-up: a provider that is not ready yields an empty
/// token. An empty anonymous id (feature off or unavailable) is skipped.
/// A token or anonymous id that cannot be sent as a header degrades the
/// same way instead of failing the request.
///
/// # Errors
/// `InvalidHeader` if the provider name or bearer credential contains bytes
/// not allowed in a header.
pub async fn inject_gateway_headers(
    headers: &mut HeaderMap,
    attestation: &dyn AttestationProvider,
    provider_name: &str,
    bearer: Option<&str>,
) -> Result<(), GatewayError> {
    let token = attestation.integrity_token().await;
    let token = header_value(&token).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Integrity token is not a valid header value, sending empty token");
        HeaderValue::from_static("")
    });
    headers.insert(INTEGRITY_HEADER, token);
    headers.insert(SDK_VERSION_HEADER, HeaderValue::from_static(SDK_VERSION));
    headers.insert(
        DEVICE_TYPE_HEADER,
        HeaderValue::from_static(attestation.device_type()),
    );
    headers.insert(PROVIDER_HEADER, header_value(provider_name)?);

    let anonymous_id = attestation.anonymous_id().await;
    if !anonymous_id.is_empty() {
        match header_value(&anonymous_id) {
            Ok(value) => {
                headers.insert(ANONYMOUS_ID_HEADER, value);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Anonymous ID is not a valid header value, skipping it");
            }
        }
    }

    if let Some(key) = bearer.filter(|key| !key.is_empty()) {
        let mut value = header_value(&format!("Bearer {}", key))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Ok(())
}

fn header_value(value: &str) -> Result<HeaderValue, GatewayError> {
    HeaderValue::from_str(value).map_err(|e| GatewayError::InvalidHeader(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::{AttestationState, AttestationStatus};
    use async_trait::async_trait;

    struct StaticAttestation {
        token: &'static str,
        anonymous_id: &'static str,
    }

    #[async_trait]
    impl AttestationProvider for StaticAttestation {
        async fn warm_up(&self) {}

        async fn integrity_token(&self) -> String {
            self.token.to_string()
        }

        async fn anonymous_id(&self) -> String {
            self.anonymous_id.to_string()
        }

        fn device_type(&self) -> &'static str {
            "android"
        }

        fn status(&self) -> AttestationStatus {
            AttestationStatus::simple(AttestationState::Ready)
        }
    }

    fn value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
        headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_injects_all_headers() {
        let attestation = StaticAttestation {
            token: "tok-123",
            anonymous_id: "anon-1",
        };
        let mut headers = HeaderMap::new();

        inject_gateway_headers(&mut headers, &attestation, "OpenAI", Some("partial-key"))
            .await
            .unwrap();

        assert_eq!(value(&headers, INTEGRITY_HEADER), Some("tok-123"));
        assert_eq!(value(&headers, SDK_VERSION_HEADER), Some(SDK_VERSION));
        assert_eq!(value(&headers, DEVICE_TYPE_HEADER), Some("android"));
        assert_eq!(value(&headers, PROVIDER_HEADER), Some("OpenAI"));
        assert_eq!(value(&headers, ANONYMOUS_ID_HEADER), Some("anon-1"));
        assert_eq!(value(&headers, "authorization"), Some("Bearer partial-key"));
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[tokio::test]
    async fn test_empty_values_degrade_gracefully() {
        let attestation = StaticAttestation {
            token: "",
            anonymous_id: "",
        };
        let mut headers = HeaderMap::new();

        inject_gateway_headers(&mut headers, &attestation, "Groq", None)
            .await
            .unwrap();

        assert_eq!(value(&headers, INTEGRITY_HEADER), Some(""));
        assert!(headers.get(ANONYMOUS_ID_HEADER).is_none());
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_unencodable_values_degrade() {
        let attestation = StaticAttestation {
            token: "line\nbreak",
            anonymous_id: "corrupt\nvalue",
        };
        let mut headers = HeaderMap::new();

        inject_gateway_headers(&mut headers, &attestation, "OpenAI", Some("partial-key"))
            .await
            .unwrap();

        assert_eq!(value(&headers, INTEGRITY_HEADER), Some(""));
        assert!(headers.get(ANONYMOUS_ID_HEADER).is_none());
        assert_eq!(value(&headers, PROVIDER_HEADER), Some("OpenAI"));
        assert_eq!(value(&headers, "authorization"), Some("Bearer partial-key"));
    }

    #[tokio::test]
    async fn test_invalid_provider_name_is_reported() {
        let attestation = StaticAttestation {
            token: "tok",
            anonymous_id: "",
        };
        let mut headers = HeaderMap::new();

        let result = inject_gateway_headers(&mut headers, &attestation, "bad\nname", None).await;

        assert!(matches!(result, Err(GatewayError::InvalidHeader(_))));
    }

    #[test]
    fn test_build_user_agent() {
        let ua = build_user_agent("ios");
        assert_eq!(ua, format!("gateway-client/{} (ios)", SDK_VERSION));
    }
}
