//! # gateway-client
//!
//! **Attested access to LLM provider APIs through a protective gateway proxy.**
//!
//! Every request sent through a protected service carries a platform
//! integrity token (Play Integrity on Android, DeviceCheck on iOS), so the
//! gateway can tell a genuine app instance from a scraped API key.
//!
//! ## Features
//!
//! - **Background warm-up** - the attestation provider is prepared at configure time
//! - **Retry with backoff** - transient platform errors are retried with capped, jittered backoff
//! - **Self-healing handles** - an invalidated provider is re-prepared transparently
//! - **Never fails a request** - attestation problems degrade to an empty token
//! - **Anonymous installation id** - optional, persisted once per installation
//!
//! ## Quickstart
//!
//! ```no_run
//! use gateway_client::{Gateway, GatewayConfig, Platform, ServiceOptions, ServiceProvider};
//!
//! # async fn run() -> Result<(), gateway_client::GatewayError> {
//! let gateway = Gateway::new();
//! gateway.configure(
//!     GatewayConfig {
//!         enable_anonymous_id: true,
//!         ..GatewayConfig::default()
//!     },
//!     Platform::Unsupported,
//! )?;
//!
//! let openai = gateway.create_protected_service(
//!     ServiceProvider::OPENAI,
//!     "partial-key-from-dashboard",
//!     "https://your-service.gateway.example",
//!     &ServiceOptions::default(),
//! )?;
//! let reply = openai
//!     .post_json(
//!         "chat/completions",
//!         &serde_json::json!({
//!             "model": "gpt-4o-mini",
//!             "messages": [{ "role": "user", "content": "Hello" }],
//!         }),
//!     )
//!     .await?;
//! println!("{}", reply);
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! The crate logs through [`tracing`] and never installs a subscriber.
//! Install one in the host application to choose the sink and level.
//!
//! ## Threat Model
//!
//! Attestation is a defense-in-depth signal checked by the gateway. It does
//! not prevent binary patching; a device that cannot attest still sends its
//! requests, with an empty integrity token.

#![warn(missing_docs)]
#![doc(html_root_url = "https://docs.rs/gateway-client/0.3.0")]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Policy layer
pub mod policy;

// Identity layer
pub mod identity;

// Attestation layer
pub mod attestation;

// Client layer
pub mod client;

// Manager (main public API)
pub mod manager;

// Re-exports for public API
pub use attestation::{
    AttestationProvider, AttestationState, AttestationStatus, DeviceCheckPlatform,
    IntegrityTokenPlatform, IntegrityTokenProvider, PlatformError,
};
pub use client::service::{DirectService, ProtectedService, ServiceOptions, ServiceProvider};
pub use clock::{Clock, SystemClock};
pub use config::GatewayConfig;
pub use errors::GatewayError;
pub use identity::store::{FileStore, KeyValueStore, MemoryStore};
pub use manager::{Gateway, Host, Platform};
pub use policy::retry::RetryPolicy;

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
