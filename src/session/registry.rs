//! Name Registries
//!
//! Process-wide name → live-object maps for sessions and player endpoints.
//! A registry is shared between all connection tasks; the server owns one
//! for players and one for sessions so tests can run with isolated
//! registries instead of hidden global state.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

/// Registry errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// The name is already registered.
    #[error("Name '{0}' is already registered")]
    NameTaken(String),
}

/// Concurrent name → object map with uniqueness enforcement.
pub struct Registry<T> {
    entries: RwLock<BTreeMap<String, Arc<T>>>,
}

impl<T> Registry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register `obj` under `name`. Fails if the name is taken.
    pub async fn register(&self, name: &str, obj: Arc<T>) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(name) {
            return Err(RegistryError::NameTaken(name.to_string()));
        }
        entries.insert(name.to_string(), obj);
        Ok(())
    }

    /// Register `obj` under a generated name, regenerating on collision.
    ///
    /// The check-and-insert happens under one write lock, so two concurrent
    /// callers can never claim the same generated name. Returns the name
    /// that was claimed.
    pub async fn register_generated<F>(&self, mut generate: F, obj: Arc<T>) -> String
    where
        F: FnMut() -> String,
    {
        let mut entries = self.entries.write().await;
        loop {
            let name = generate();
            if entries.contains_key(&name) {
                warn!(name = %name, "generated name collided, regenerating");
                continue;
            }
            entries.insert(name.clone(), obj);
            return name;
        }
    }

    /// Look up a live object by name.
    pub async fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.read().await.get(name).cloned()
    }

    /// Remove a name. No-op (returning `None`) if absent.
    pub async fn unregister(&self, name: &str) -> Option<Arc<T>> {
        self.entries.write().await.remove(name)
    }

    /// Whether the name is currently registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// Number of registered objects.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = Registry::new();
        registry.register("alice", Arc::new(42u32)).await.unwrap();

        assert_eq!(registry.get("alice").await.as_deref(), Some(&42));
        assert!(registry.get("bob").await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let registry = Registry::new();
        registry.register("alice", Arc::new(1u32)).await.unwrap();

        let err = registry.register("alice", Arc::new(2u32)).await.unwrap_err();
        assert!(matches!(err, RegistryError::NameTaken(name) if name == "alice"));

        // the original registration is untouched
        assert_eq!(registry.get("alice").await.as_deref(), Some(&1));
    }

    #[tokio::test]
    async fn test_unregister_is_noop_when_absent() {
        let registry = Registry::<u32>::new();
        assert!(registry.unregister("ghost").await.is_none());

        registry.register("alice", Arc::new(1u32)).await.unwrap();
        assert!(registry.unregister("alice").await.is_some());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_generated_name_collision_regenerates() {
        let registry = Registry::new();
        registry.register("fixed", Arc::new(1u32)).await.unwrap();

        // first candidate collides, second does not
        let mut candidates = vec!["fresh", "fixed"];
        let name = registry
            .register_generated(|| candidates.pop().unwrap_or("fresh").to_string(), Arc::new(2u32))
            .await;

        assert_eq!(name, "fresh");
        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.get("fixed").await.as_deref(), Some(&1));
    }

    #[tokio::test]
    async fn test_concurrent_registration() {
        let registry = Arc::new(Registry::new());
        let mut handles = Vec::new();

        for i in 0..16u32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.register(&format!("player-{i}"), Arc::new(i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(registry.len().await, 16);
    }
}
