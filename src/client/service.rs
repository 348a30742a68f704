//! Provider services.
//!
//! A [`ProtectedService`] talks to the gateway proxy and runs every request
//! through the header injector. A [`DirectService`] is the unprotected BYOK
//! path straight to the provider's own API.

use crate::attestation::AttestationProvider;
use crate::client::headers::{build_user_agent, inject_gateway_headers};
use crate::GatewayError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request, RequestBuilder, Response, Url};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

/// Organization header understood by OpenAI-compatible APIs (`OpenAI-Organization`).
pub const ORGANIZATION_HEADER: &str = "openai-organization";

/// Default request timeout for services.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An AI provider reachable through the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceProvider {
    /// Name sent in the `gateway-provider` header.
    pub name: Cow<'static, str>,

    /// Provider API domain (and path prefix) used for direct access.
    pub proxy_domain: Cow<'static, str>,
}

impl ServiceProvider {
    /// OpenAI.
    pub const OPENAI: ServiceProvider = ServiceProvider::known("OpenAI", "api.openai.com/v1");
    /// Anthropic Claude.
    pub const CLAUDE: ServiceProvider =
        ServiceProvider::known("Anthropic Claude", "api.anthropic.com/v1");
    /// Google Gemini (OpenAI-compatible endpoint).
    pub const GEMINI: ServiceProvider = ServiceProvider::known(
        "Google Gemini",
        "generativelanguage.googleapis.com/v1beta/openai",
    );
    /// Mistral AI.
    pub const MISTRAL: ServiceProvider = ServiceProvider::known("Mistral AI", "api.mistral.ai/v1");
    /// Groq.
    pub const GROQ: ServiceProvider = ServiceProvider::known("Groq", "api.groq.com");
    /// Together AI.
    pub const TOGETHER: ServiceProvider =
        ServiceProvider::known("Together AI", "api.together.xyz/v1");
    /// AI/ML API.
    pub const AIML_API: ServiceProvider = ServiceProvider::known("AI/ML API", "api.aimlapi.com/v1");

    const fn known(name: &'static str, proxy_domain: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            proxy_domain: Cow::Borrowed(proxy_domain),
        }
    }

    /// Any other OpenAI-compatible provider.
    pub fn custom(name: impl Into<String>, proxy_domain: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            proxy_domain: Cow::Owned(proxy_domain.into()),
        }
    }

    /// Base URL for direct (BYOK) access.
    fn direct_base_url(&self) -> String {
        let domain = self.proxy_domain.trim_end_matches('/');
        if domain.starts_with("https://") || domain.starts_with("http://") {
            format!("{}/", domain)
        } else {
            format!("https://{}/", domain)
        }
    }
}

/// HTTP options shared by both service kinds.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Whole-request timeout.
    pub timeout: Duration,

    /// Organization id, sent as [`ORGANIZATION_HEADER`].
    pub organization: Option<String>,

    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            organization: None,
            headers: Vec::new(),
        }
    }
}

/// HTTP client rooted at a base URL.
struct Endpoint {
    http: Client,
    base_url: Url,
}

impl Endpoint {
    fn new(base_url: &str, options: &ServiceOptions, device_type: &str) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| GatewayError::ConfigError(format!("Invalid base URL {}: {}", base_url, e)))?;

        let mut default_headers = HeaderMap::new();
        if let Some(organization) = &options.organization {
            default_headers.insert(ORGANIZATION_HEADER, header_value(organization)?);
        }
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| GatewayError::InvalidHeader(format!("{}: {}", name, e)))?;
            default_headers.insert(name, header_value(value)?);
        }

        let http = Client::builder()
            .timeout(options.timeout)
            .user_agent(build_user_agent(device_type))
            .default_headers(default_headers)
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to create client: {}", e)))?;

        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| GatewayError::ConfigError(format!("Invalid path {}: {}", path, e)))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, GatewayError> {
        Ok(self.http.request(method, self.url(path)?))
    }

    async fn send(&self, request: Request) -> Result<Response, GatewayError> {
        self.http
            .execute(request)
            .await
            .map_err(|e| GatewayError::Transport(format!("Request failed: {}", e)))
    }
}

/// Gateway-protected provider service.
pub struct ProtectedService {
    endpoint: Endpoint,
    partial_key: String,
    provider: ServiceProvider,
    attestation: Arc<dyn AttestationProvider>,
}

impl ProtectedService {
    /// Create a service rooted at `<service_url>/v1/`.
    pub fn new(
        provider: ServiceProvider,
        partial_key: &str,
        service_url: &str,
        options: &ServiceOptions,
        attestation: Arc<dyn AttestationProvider>,
    ) -> Result<Self, GatewayError> {
        let base_url = format!("{}/v1/", service_url.trim_end_matches('/'));
        let endpoint = Endpoint::new(&base_url, options, attestation.device_type())?;

        Ok(Self {
            endpoint,
            partial_key: partial_key.to_string(),
            provider,
            attestation,
        })
    }

    /// Provider this service talks to.
    pub fn provider(&self) -> &ServiceProvider {
        &self.provider
    }

    /// Base URL of the gateway proxy.
    pub fn base_url(&self) -> &Url {
        &self.endpoint.base_url
    }

    /// Start a request relative to the base URL.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, GatewayError> {
        self.endpoint.request(method, path)
    }

    /// Attach gateway headers to a built request.
    pub async fn authorize(&self, request: &mut Request) -> Result<(), GatewayError> {
        inject_gateway_headers(
            request.headers_mut(),
            self.attestation.as_ref(),
            &self.provider.name,
            Some(&self.partial_key),
        )
        .await
    }

    /// Attach gateway headers and send.
    pub async fn execute(&self, mut request: Request) -> Result<Response, GatewayError> {
        self.authorize(&mut request).await?;
        self.endpoint.send(request).await
    }

    /// POST a JSON body and parse the JSON answer.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<serde_json::Value, GatewayError> {
        let request = build(self.request(Method::POST, path)?.json(body))?;
        read_json(self.execute(request).await?).await
    }
}

/// Unprotected BYOK provider service.
pub struct DirectService {
    endpoint: Endpoint,
    api_key: String,
    provider: ServiceProvider,
}

impl DirectService {
    /// Create a service talking straight to the provider.
    ///
    /// # Errors
    /// `EmptyApiKey` if `api_key` is blank.
    pub fn new(
        provider: ServiceProvider,
        api_key: &str,
        options: &ServiceOptions,
    ) -> Result<Self, GatewayError> {
        if api_key.trim().is_empty() {
            tracing::error!(provider = %provider.name, "Empty API key provided for direct service");
            return Err(GatewayError::EmptyApiKey);
        }

        let endpoint = Endpoint::new(&provider.direct_base_url(), options, std::env::consts::OS)?;

        Ok(Self {
            endpoint,
            api_key: api_key.to_string(),
            provider,
        })
    }

    /// Provider this service talks to.
    pub fn provider(&self) -> &ServiceProvider {
        &self.provider
    }

    /// Base URL of the provider API.
    pub fn base_url(&self) -> &Url {
        &self.endpoint.base_url
    }

    /// Start a request relative to the base URL.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, GatewayError> {
        self.endpoint.request(method, path)
    }

    /// Attach the API key.
    pub fn authorize(&self, request: &mut Request) -> Result<(), GatewayError> {
        let mut value = header_value(&format!("Bearer {}", self.api_key))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Attach the API key and send.
    pub async fn execute(&self, mut request: Request) -> Result<Response, GatewayError> {
        self.authorize(&mut request)?;
        self.endpoint.send(request).await
    }

    /// POST a JSON body and parse the JSON answer.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<serde_json::Value, GatewayError> {
        let request = build(self.request(Method::POST, path)?.json(body))?;
        read_json(self.execute(request).await?).await
    }
}

fn header_value(value: &str) -> Result<HeaderValue, GatewayError> {
    HeaderValue::from_str(value).map_err(|e| GatewayError::InvalidHeader(e.to_string()))
}

fn build(builder: RequestBuilder) -> Result<Request, GatewayError> {
    builder
        .build()
        .map_err(|e| GatewayError::Transport(format!("Failed to build request: {}", e)))
}

async fn read_json(response: Response) -> Result<serde_json::Value, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        });
    }

    response
        .json()
        .await
        .map_err(|e| GatewayError::Transport(format!("Failed to read body: {}", e)))
}
