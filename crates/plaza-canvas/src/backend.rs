//! Key-value backends for chunk storage.
//!
//! The chunk store only needs whole-value reads and writes plus two atomic
//! primitives: create-if-absent and single-byte bit-field access. Each call
//! is atomic on its own; nothing above this layer takes locks.

use futures::future::BoxFuture;
use plaza_common::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub trait KeyValueStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>>;

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<()>>;

    /// Writes `value` only if `key` does not exist yet. Returns whether the
    /// write happened.
    fn set_if_absent<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<bool>>;

    /// Atomically replaces the byte at `offset`, zero-extending the value if
    /// it is shorter. Returns the previous byte.
    fn bitfield_set_u8<'a>(
        &'a self,
        key: &'a str,
        offset: usize,
        value: u8,
    ) -> BoxFuture<'a, Result<u8>>;

    /// Atomically reads the byte at `offset`. `None` if the key does not exist;
    /// reads past the end of an existing value yield 0.
    fn bitfield_get_u8<'a>(&'a self, key: &'a str, offset: usize)
        -> BoxFuture<'a, Result<Option<u8>>>;

    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>>;

    fn keys<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;
}

/// In-process backend. Every primitive holds the lock for exactly one
/// operation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(async move { Ok(self.entries.read().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.entries.write().await.insert(key.to_owned(), value);
            Ok(())
        })
    }

    fn set_if_absent<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut entries = self.entries.write().await;
            if entries.contains_key(key) {
                return Ok(false);
            }
            entries.insert(key.to_owned(), value);
            Ok(true)
        })
    }

    fn bitfield_set_u8<'a>(
        &'a self,
        key: &'a str,
        offset: usize,
        value: u8,
    ) -> BoxFuture<'a, Result<u8>> {
        Box::pin(async move {
            let mut entries = self.entries.write().await;
            let buffer = entries.entry(key.to_owned()).or_default();
            if buffer.len() <= offset {
                buffer.resize(offset + 1, 0);
            }
            let previous = buffer[offset];
            buffer[offset] = value;
            Ok(previous)
        })
    }

    fn bitfield_get_u8<'a>(
        &'a self,
        key: &'a str,
        offset: usize,
    ) -> BoxFuture<'a, Result<Option<u8>>> {
        Box::pin(async move {
            let entries = self.entries.read().await;
            Ok(entries
                .get(key)
                .map(|buffer| buffer.get(offset).copied().unwrap_or(0)))
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.entries.read().await.contains_key(key)) })
    }

    fn keys<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let entries = self.entries.read().await;
            let mut keys: Vec<String> = entries
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            keys.sort();
            Ok(keys)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_if_absent_never_overwrites() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", vec![1, 2]).await.unwrap());
        assert!(!store.set_if_absent("k", vec![9, 9]).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_bitfield_access() {
        let store = MemoryStore::new();
        assert_eq!(store.bitfield_get_u8("k", 3).await.unwrap(), None);
        assert_eq!(store.bitfield_set_u8("k", 3, 7).await.unwrap(), 0);
        assert_eq!(store.get("k").await.unwrap(), Some(vec![0, 0, 0, 7]));
        assert_eq!(store.bitfield_set_u8("k", 3, 8).await.unwrap(), 7);
        assert_eq!(store.bitfield_get_u8("k", 3).await.unwrap(), Some(8));
        assert_eq!(store.bitfield_get_u8("k", 100).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_concurrent_bitfield_writes_keep_every_byte() {
        let store = Arc::new(MemoryStore::new());
        store.set("k", vec![0; 64]).await.unwrap();
        let mut handles = Vec::new();
        for offset in 0..64usize {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.bitfield_set_u8("k", offset, offset as u8).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let expected: Vec<u8> = (0..64u8).collect();
        assert_eq!(store.get("k").await.unwrap(), Some(expected));
    }

    #[test]
    fn test_exists_tracks_writes() {
        let store = MemoryStore::new();
        tokio_test::block_on(async {
            assert!(!store.exists("k").await.unwrap());
            store.set("k", vec![1]).await.unwrap();
            assert!(store.exists("k").await.unwrap());
            assert!(!store.is_empty().await);
        });
    }

    #[tokio::test]
    async fn test_keys_by_prefix() {
        let store = MemoryStore::new();
        store.set("ch:0:1:1", vec![]).await.unwrap();
        store.set("ch:0:0:1", vec![]).await.unwrap();
        store.set("other", vec![]).await.unwrap();
        assert_eq!(store.keys("ch:").await.unwrap(), vec!["ch:0:0:1", "ch:0:1:1"]);
        assert!(store.exists("other").await.unwrap());
        assert_eq!(store.len().await, 3);
    }
}
