// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

/// In-memory store.
///
/// This does not persist data permanently, all entries are lost when the process ends. Clones
/// share the same underlying map, which makes it possible to hand the same store to multiple
/// caches or keep a handle around to inspect it.
#[derive(Debug)]
pub struct MemoryStore<K, V> {
    pub(crate) entries: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> MemoryStore<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K, V> Clone for MemoryStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<K, V> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// Trait implementations are in the regarding modules, see for example `cache`.
