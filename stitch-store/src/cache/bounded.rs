// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::convert::Infallible;
use std::hash::Hash as StdHash;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::cache::CacheStore;
#[cfg(any(test, feature = "test_utils"))]
use crate::cache::CacheStoreTestExt;

/// In-memory store holding at most `capacity` entries.
///
/// When a write exceeds the capacity the least recently used entries are evicted. Reads and
/// writes both count as "use". Evicted entries simply become cache misses again, so this store
/// trades memory for additional fetches from the underlying source.
///
/// Recency is tracked in a slab-backed doubly-linked list, every lookup, insertion and eviction
/// is O(1).
#[derive(Debug)]
pub struct BoundedMemoryStore<K, V> {
    inner: Arc<Mutex<Inner<K, V>>>,
    capacity: usize,
}

/// Null pointer of the recency list.
const SENTINEL: usize = usize::MAX;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    slot: usize,
}

/// Slab node of the recency list.
#[derive(Debug)]
struct Link<K> {
    key: K,
    prev: usize,
    next: usize,
}

#[derive(Debug)]
struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    links: Vec<Link<K>>,
    /// Recycled slab slots.
    free: Vec<usize>,
    /// Most recently used entry.
    head: usize,
    /// Least recently used entry.
    tail: usize,
    evictions: u64,
}

impl<K, V> Inner<K, V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            links: Vec::new(),
            free: Vec::new(),
            head: SENTINEL,
            tail: SENTINEL,
            evictions: 0,
        }
    }
}

impl<K, V> Inner<K, V>
where
    K: Clone + Eq + StdHash,
{
    fn get(&mut self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let entry = self.entries.get(key)?;
        let (slot, value) = (entry.slot, entry.value.clone());
        self.promote(slot);
        Some(value)
    }

    fn insert(&mut self, key: K, value: V) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            let slot = entry.slot;
            self.promote(slot);
            return;
        }

        let link = Link {
            key: key.clone(),
            prev: SENTINEL,
            next: SENTINEL,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.links[slot] = link;
                slot
            }
            None => {
                self.links.push(link);
                self.links.len() - 1
            }
        };
        self.push_front(slot);
        self.entries.insert(key, Entry { value, slot });
    }

    fn forget(&mut self, key: &K) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        self.detach(entry.slot);
        self.free.push(entry.slot);
        true
    }

    fn evict(&mut self, capacity: usize) {
        while self.entries.len() > capacity && self.tail != SENTINEL {
            let key = self.links[self.tail].key.clone();
            self.forget(&key);
            self.evictions += 1;
        }
    }

    fn promote(&mut self, slot: usize) {
        self.detach(slot);
        self.push_front(slot);
    }

    fn detach(&mut self, slot: usize) {
        let prev = self.links[slot].prev;
        let next = self.links[slot].next;

        if prev == SENTINEL {
            self.head = next;
        } else {
            self.links[prev].next = next;
        }

        if next == SENTINEL {
            self.tail = prev;
        } else {
            self.links[next].prev = prev;
        }

        self.links[slot].prev = SENTINEL;
        self.links[slot].next = SENTINEL;
    }

    fn push_front(&mut self, slot: usize) {
        self.links[slot].prev = SENTINEL;
        self.links[slot].next = self.head;

        if self.head != SENTINEL {
            self.links[self.head].prev = slot;
        }
        self.head = slot;

        if self.tail == SENTINEL {
            self.tail = slot;
        }
    }
}

impl<K, V> BoundedMemoryStore<K, V> {
    /// Returns a new store keeping at most `capacity` entries, at least one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of entries evicted since this store was created.
    pub async fn evictions(&self) -> u64 {
        self.inner.lock().await.evictions
    }
}

impl<K, V> Clone for BoundedMemoryStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            capacity: self.capacity,
        }
    }
}

impl<K, V> CacheStore<K, V> for BoundedMemoryStore<K, V>
where
    K: Clone + Eq + StdHash + Send + Sync,
    V: Clone + Send + Sync,
{
    type Error = Infallible;

    async fn get_all(&self, keys: &[K]) -> Result<HashMap<K, V>, Self::Error> {
        let mut inner = self.inner.lock().await;
        let mut result = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = inner.get(key) {
                result.insert(key.clone(), value);
            }
        }
        Ok(result)
    }

    async fn put_all(&self, entries: HashMap<K, V>) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock().await;
        for (key, value) in entries {
            inner.insert(key, value);
        }
        inner.evict(self.capacity);
        Ok(())
    }

    async fn remove_all(&self, keys: &[K]) -> Result<usize, Self::Error> {
        let mut inner = self.inner.lock().await;
        Ok(keys.iter().filter(|key| inner.forget(key)).count())
    }

    async fn update_all(&self, entries: HashMap<K, V>, removals: &[K]) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock().await;
        for key in removals {
            inner.forget(key);
        }
        for (key, value) in entries {
            inner.insert(key, value);
        }
        inner.evict(self.capacity);
        Ok(())
    }
}

#[cfg(any(test, feature = "test_utils"))]
impl<K, V> CacheStoreTestExt for BoundedMemoryStore<K, V> {
    async fn entries_len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}
