//! In-memory store for tests and single-process chains.
//!
//! The store is [`Clone`] so tests can hold a handle for direct inspection while the function
//! owns a shared copy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use super::{ObjectStore, StoreError};

type Objects = HashMap<(String, String), Bytes>;

/// An [`ObjectStore`] backed by a `HashMap`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    objects: Arc<Mutex<Objects>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the keys stored in `bucket`, in no particular order.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Objects> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryStore {
    async fn put(&self, bucket: &str, key: &str, payload: Bytes) -> Result<(), StoreError> {
        self.lock()
            .insert((bucket.to_owned(), key.to_owned()), payload);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self
            .lock()
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_per_bucket() {
        let store = InMemoryStore::new();
        store.put("a", "key", Bytes::from_static(b"one")).await.unwrap();
        store.put("b", "key", Bytes::from_static(b"two")).await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a", "key").await.unwrap().unwrap(), "one");
        assert_eq!(store.get("b", "key").await.unwrap().unwrap(), "two");
        assert_eq!(store.keys("a"), ["key"]);
    }

    #[tokio::test]
    async fn missing_object() {
        let store = InMemoryStore::new();
        assert!(store.get("a", "missing").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn clones_share_objects() {
        let store = InMemoryStore::new();
        let handle = store.clone();
        store.put("a", "key", Bytes::new()).await.unwrap();

        assert_eq!(handle.len(), 1);
    }
}
