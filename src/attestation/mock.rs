//! Scripted platform primitives for tests.
//!
//! Results are consumed in order; once a script runs dry every call succeeds.

use crate::attestation::platform::{
    DeviceCheckPlatform, IntegrityTokenPlatform, IntegrityTokenProvider, PlatformError,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct RequestLog {
    script: Mutex<VecDeque<Result<String, PlatformError>>>,
    generations: Mutex<Vec<usize>>,
}

/// Scripted Play Integrity platform.
///
/// The n-th successful `prepare` yields a provider of generation n (from 1);
/// its default token is `token-gen<n>`.
#[derive(Debug, Default)]
pub struct ScriptedIntegrityPlatform {
    prepare_script: Mutex<VecDeque<Result<(), PlatformError>>>,
    prepare_calls: AtomicUsize,
    generations: AtomicUsize,
    requests: Arc<RequestLog>,
    retryable: Option<Vec<i32>>,
}

impl ScriptedIntegrityPlatform {
    /// Platform whose calls all succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the retryable code set.
    pub fn with_retryable_codes(mut self, codes: Vec<i32>) -> Self {
        self.retryable = Some(codes);
        self
    }

    /// Queue outcomes for upcoming `prepare` calls.
    pub fn script_prepare(&self, results: impl IntoIterator<Item = Result<(), PlatformError>>) {
        lock(&self.prepare_script).extend(results);
    }

    /// Queue outcomes for upcoming token requests, across all providers.
    pub fn script_requests(
        &self,
        results: impl IntoIterator<Item = Result<String, PlatformError>>,
    ) {
        lock(&self.requests.script).extend(results);
    }

    /// Number of `prepare` calls so far.
    pub fn prepare_calls(&self) -> usize {
        self.prepare_calls.load(Ordering::SeqCst)
    }

    /// Number of token requests so far.
    pub fn request_calls(&self) -> usize {
        lock(&self.requests.generations).len()
    }

    /// Provider generation used by each token request, in order.
    pub fn requested_generations(&self) -> Vec<usize> {
        lock(&self.requests.generations).clone()
    }
}

#[async_trait]
impl IntegrityTokenPlatform for ScriptedIntegrityPlatform {
    async fn prepare(
        &self,
        _cloud_project_number: u64,
    ) -> Result<Arc<dyn IntegrityTokenProvider>, PlatformError> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = lock(&self.prepare_script).pop_front().unwrap_or(Ok(()));
        outcome?;
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(ScriptedTokenProvider {
            generation,
            log: self.requests.clone(),
        }))
    }

    fn retryable_codes(&self) -> &[i32] {
        match &self.retryable {
            Some(codes) => codes,
            None => crate::attestation::platform::play_integrity_codes::DEFAULT_RETRYABLE,
        }
    }
}

/// Provider handed out by [`ScriptedIntegrityPlatform`].
#[derive(Debug)]
pub struct ScriptedTokenProvider {
    generation: usize,
    log: Arc<RequestLog>,
}

#[async_trait]
impl IntegrityTokenProvider for ScriptedTokenProvider {
    async fn request(&self) -> Result<String, PlatformError> {
        lock(&self.log.generations).push(self.generation);
        lock(&self.log.script)
            .pop_front()
            .unwrap_or_else(|| Ok(format!("token-gen{}", self.generation)))
    }
}

/// Scripted DeviceCheck platform. Default token bytes are `b"device-token"`.
#[derive(Debug)]
pub struct ScriptedDeviceCheck {
    supported: bool,
    simulator: bool,
    script: Mutex<VecDeque<Result<Vec<u8>, PlatformError>>>,
    generate_calls: AtomicUsize,
}

impl ScriptedDeviceCheck {
    /// A supported physical device.
    pub fn supported() -> Self {
        Self {
            supported: true,
            simulator: false,
            script: Mutex::new(VecDeque::new()),
            generate_calls: AtomicUsize::new(0),
        }
    }

    /// A device without DeviceCheck support.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::supported()
        }
    }

    /// A simulator that claims support.
    pub fn simulator() -> Self {
        Self {
            simulator: true,
            ..Self::supported()
        }
    }

    /// Queue outcomes for upcoming `generate_token` calls.
    pub fn script(&self, results: impl IntoIterator<Item = Result<Vec<u8>, PlatformError>>) {
        lock(&self.script).extend(results);
    }

    /// Number of `generate_token` calls so far.
    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceCheckPlatform for ScriptedDeviceCheck {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn is_simulator(&self) -> bool {
        self.simulator
    }

    async fn generate_token(&self) -> Result<Vec<u8>, PlatformError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Ok(b"device-token".to_vec()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
