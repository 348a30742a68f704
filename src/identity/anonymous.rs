//! Per-installation anonymous identifier.
//!
//! Created once, persisted under [`ANON_ID_KEY`], read-mostly afterwards.
//! Initialization is single-flight so concurrent warm-ups persist one id.

use crate::identity::store::KeyValueStore;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Storage key of the persisted anonymous id.
pub const ANON_ID_KEY: &str = "gateway_anon_id";

/// Generate a fresh anonymous id (hyphenated v4 UUID).
pub fn new_anonymous_id() -> String {
    Uuid::new_v4().to_string()
}

/// Anonymous identity backed by a key/value store.
pub struct AnonymousIdentity {
    enabled: bool,
    store: Arc<dyn KeyValueStore>,
    cached: OnceCell<String>,
    temporary: OnceLock<String>,
}

impl AnonymousIdentity {
    /// Create an identity over `store`; `enabled = false` always yields `""`.
    pub fn new(enabled: bool, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            enabled,
            store,
            cached: OnceCell::new(),
            temporary: OnceLock::new(),
        }
    }

    /// Whether a persisted (or session fallback) id has been loaded.
    pub fn is_initialized(&self) -> bool {
        self.cached.initialized()
    }

    /// Load the persisted id, creating and persisting one if absent.
    ///
    /// Idempotent and safe to call concurrently.
    pub async fn initialize(&self) {
        if !self.enabled {
            return;
        }
        self.cached
            .get_or_init(|| async { self.load_or_create() })
            .await;
    }

    /// Current anonymous id.
    ///
    /// Returns `""` when disabled. Before initialization, falls back to the
    /// stored value or a session-scoped temporary id that is never persisted.
    pub fn get(&self) -> String {
        if !self.enabled {
            return String::new();
        }
        if let Some(id) = self.cached.get() {
            return id.clone();
        }
        match self.store.get(ANON_ID_KEY) {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::debug!("Anonymous ID not initialized, using temporary ID");
                self.temporary_id()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read anonymous ID, using temporary ID");
                self.temporary_id()
            }
        }
    }

    fn load_or_create(&self) -> String {
        match self.store.get(ANON_ID_KEY) {
            Ok(Some(id)) => id,
            Ok(None) => {
                let id = new_anonymous_id();
                if let Err(e) = self.store.set(ANON_ID_KEY, &id) {
                    tracing::warn!(error = %e, "Failed to persist anonymous ID, keeping it for this session");
                } else {
                    tracing::info!("Created anonymous ID");
                }
                id
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load anonymous ID, using temporary ID");
                self.temporary_id()
            }
        }
    }

    fn temporary_id(&self) -> String {
        self.temporary.get_or_init(new_anonymous_id).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::store::MemoryStore;
    use crate::GatewayError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store that counts writes.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        writes: AtomicUsize,
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), GatewayError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value)
        }
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, GatewayError> {
            Err(GatewayError::StorageIO("disk gone".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), GatewayError> {
            Err(GatewayError::StorageIO("disk gone".to_string()))
        }
    }

    #[test]
    fn test_new_id_is_uuid() {
        let id = new_anonymous_id();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(id.len(), 36);
    }

    #[tokio::test]
    async fn test_initialize_creates_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let identity = AnonymousIdentity::new(true, store.clone());

        identity.initialize().await;

        let stored = store.get(ANON_ID_KEY).unwrap().unwrap();
        assert_eq!(identity.get(), stored);
        assert!(identity.is_initialized());
    }

    #[tokio::test]
    async fn test_initialize_keeps_existing_id() {
        let store = Arc::new(MemoryStore::new());
        store.set(ANON_ID_KEY, "existing-id").unwrap();
        let identity = AnonymousIdentity::new(true, store.clone());

        identity.initialize().await;

        assert_eq!(identity.get(), "existing-id");
        assert_eq!(store.get(ANON_ID_KEY).unwrap().as_deref(), Some("existing-id"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_initialize_persists_once() {
        let store = Arc::new(CountingStore::default());
        let identity = Arc::new(AnonymousIdentity::new(true, store.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let identity = identity.clone();
                tokio::spawn(async move { identity.initialize().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(identity.get(), store.get(ANON_ID_KEY).unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_disabled_returns_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(ANON_ID_KEY, "existing-id").unwrap();
        let identity = AnonymousIdentity::new(false, store.clone());

        identity.initialize().await;

        assert_eq!(identity.get(), "");
        assert!(!identity.is_initialized());
    }

    #[test]
    fn test_uninitialized_uses_stable_temporary_id() {
        let store = Arc::new(MemoryStore::new());
        let identity = AnonymousIdentity::new(true, store.clone());

        let first = identity.get();
        let second = identity.get();

        assert!(!first.is_empty());
        assert_eq!(first, second);
        assert!(store.get(ANON_ID_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_broken_store_falls_back_to_session_id() {
        let identity = AnonymousIdentity::new(true, Arc::new(BrokenStore));

        identity.initialize().await;

        let id = identity.get();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(identity.get(), id);
    }
}
