// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::convert::Infallible;
use std::hash::Hash as StdHash;

use crate::cache::CacheStore;
#[cfg(any(test, feature = "test_utils"))]
use crate::cache::CacheStoreTestExt;
use crate::memory::MemoryStore;

impl<K, V> CacheStore<K, V> for MemoryStore<K, V>
where
    K: Clone + Eq + StdHash + Send + Sync,
    V: Clone + Send + Sync,
{
    type Error = Infallible;

    async fn get_all(&self, keys: &[K]) -> Result<HashMap<K, V>, Self::Error> {
        let entries = self.entries.read().await;
        let result = keys
            .iter()
            .filter_map(|key| {
                entries
                    .get(key)
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect();
        Ok(result)
    }

    async fn put_all(&self, entries: HashMap<K, V>) -> Result<(), Self::Error> {
        self.entries.write().await.extend(entries);
        Ok(())
    }

    async fn remove_all(&self, keys: &[K]) -> Result<usize, Self::Error> {
        let mut entries = self.entries.write().await;
        let removed = keys
            .iter()
            .filter(|key| entries.remove(*key).is_some())
            .count();
        Ok(removed)
    }

    async fn update_all(&self, entries: HashMap<K, V>, removals: &[K]) -> Result<(), Self::Error> {
        // Hold the write lock for the whole batch so readers never see it half-applied.
        let mut current = self.entries.write().await;
        for key in removals {
            current.remove(key);
        }
        current.extend(entries);
        Ok(())
    }
}

#[cfg(any(test, feature = "test_utils"))]
impl<K, V> CacheStoreTestExt for MemoryStore<K, V> {
    async fn entries_len(&self) -> usize {
        self.entries.read().await.len()
    }
}
