//! Registry of named caches shared by plugins.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{CacheConfig, TypedCache};

/// Hands out typed caches by name so plugins don't need to thread every
/// cache through `AppState` by hand.
#[derive(Clone, Default)]
pub struct CacheRegistry {
    caches: Arc<RwLock<HashMap<String, Box<dyn Any + Send + Sync>>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache registered as `name`, created with `config` on first use.
    ///
    /// A name reused with different key/value types gets a fresh cache
    /// that replaces the old registration.
    pub fn get_or_create<K, V>(&self, name: &str, config: CacheConfig) -> TypedCache<K, V>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        if let Some(cache) = self.get(name) {
            return cache;
        }

        let mut caches = self.caches.write();
        if let Some(existing) = caches.get(name) {
            if let Some(cache) = existing.downcast_ref::<TypedCache<K, V>>() {
                return cache.clone();
            }
            warn!(
                "Cache {} re-registered as {}",
                name,
                std::any::type_name::<TypedCache<K, V>>()
            );
        }

        debug!("Creating cache {}", name);
        let cache = TypedCache::<K, V>::new(name, config);
        caches.insert(name.to_string(), Box::new(cache.clone()));
        cache
    }

    pub fn get<K, V>(&self, name: &str) -> Option<TypedCache<K, V>>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.caches
            .read()
            .get(name)
            .and_then(|entry| entry.downcast_ref::<TypedCache<K, V>>())
            .cloned()
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let caches = self.caches.read();
        f.debug_struct("CacheRegistry")
            .field("cache_names", &caches.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_shares_entries() {
        let registry = CacheRegistry::new();
        let a: TypedCache<u64, i64> = registry.get_or_create("balances", CacheConfig::balances());
        let b: TypedCache<u64, i64> = registry.get_or_create("balances", CacheConfig::balances());

        a.insert(7, 2100);
        assert_eq!(b.get(&7), Some(2100));
    }

    #[test]
    fn test_type_mismatch_gets_fresh_cache() {
        let registry = CacheRegistry::new();
        let ints: TypedCache<u64, i64> = registry.get_or_create("x", CacheConfig::default());
        ints.insert(1, 1);

        let strings: TypedCache<u64, String> = registry.get_or_create("x", CacheConfig::default());
        assert!(strings.get(&1).is_none());
        assert!(registry.get::<u64, i64>("x").is_none());
    }
}
