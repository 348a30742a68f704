//! Protected chat completion example.
//!
//! Configures the gateway, waits for attestation warm-up and sends one chat
//! completion through the gateway proxy.
//!
//! # Running
//!
//! ```bash
//! export GATEWAY_PARTIAL_KEY="partial-key-from-dashboard"
//! export GATEWAY_SERVICE_URL="https://your-service.gateway.example"
//! cargo run --example protected_request
//! ```
//!
//! # Note
//!
//! A desktop host has no Play Integrity or DeviceCheck, so the request goes
//! out with an empty integrity token. On a device the host passes its
//! platform primitives through `Platform::PlayIntegrity` or
//! `Platform::DeviceCheck`.

use gateway_client::{
    Gateway, GatewayConfig, GatewayError, Platform, ServiceOptions, ServiceProvider,
};

#[tokio::main]
async fn main() {
    let partial_key = std::env::var("GATEWAY_PARTIAL_KEY").unwrap_or_default();
    let service_url = match std::env::var("GATEWAY_SERVICE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Set GATEWAY_SERVICE_URL environment variable");
            std::process::exit(1);
        }
    };

    let gateway = Gateway::new();
    let config = GatewayConfig {
        enable_anonymous_id: true,
        ..GatewayConfig::default()
    };
    if let Err(e) = gateway.configure(config, Platform::Unsupported) {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }
    gateway.wait_for_warm_up().await;

    if let Ok(status) = gateway.status() {
        println!("Attestation: {:?}", status.state);
    }

    let service = match gateway.create_protected_service(
        ServiceProvider::OPENAI,
        &partial_key,
        &service_url,
        &ServiceOptions::default(),
    ) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Could not create service: {}", e);
            std::process::exit(1);
        }
    };

    let body = serde_json::json!({
        "model": "gpt-4o-mini",
        "messages": [{ "role": "user", "content": "Say hello" }],
    });

    match service.post_json("chat/completions", &body).await {
        Ok(reply) => {
            let text = reply["choices"][0]["message"]["content"]
                .as_str()
                .unwrap_or_default();
            println!("Reply: {}", text);
        }
        Err(e) => {
            match &e {
                GatewayError::Api { status, message } => {
                    eprintln!("Gateway rejected the request ({}): {}", status, message);
                }
                GatewayError::Transport(_) => {
                    eprintln!("Network error: {}", e);
                }
                _ => {
                    eprintln!("Request error: {}", e);
                }
            }
            std::process::exit(1);
        }
    }
}
