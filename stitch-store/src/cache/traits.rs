// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::error::Error;

/// Trait defining a batched key-value store API backing caches.
///
/// Keys are correlation ids and values whatever a cache keeps per id (usually the list of child
/// items resolved for it). Every method works on a whole batch of keys and implementations need
/// to make each write batch visible atomically: a concurrent `get_all` either observes all
/// changes of a `put_all`, `remove_all` or `update_all` call or none of them.
///
/// Writes are "last writer wins" per key, values are replaced and never merged.
pub trait CacheStore<K, V> {
    type Error: Error + Send + Sync + 'static;

    /// Returns the values of all given keys which are present in the store.
    ///
    /// Keys without a value are simply missing in the returned map.
    fn get_all(
        &self,
        keys: &[K],
    ) -> impl Future<Output = Result<HashMap<K, V>, Self::Error>> + Send;

    /// Inserts or replaces the values of all given keys.
    fn put_all(&self, entries: HashMap<K, V>)
    -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Removes all given keys from the store.
    ///
    /// Returns the number of entries which actually got removed.
    fn remove_all(&self, keys: &[K]) -> impl Future<Output = Result<usize, Self::Error>> + Send;

    /// Removes and inserts entries in one atomic batch.
    ///
    /// Removals are applied first, a key which is both removed and inserted ends up with the
    /// inserted value.
    fn update_all(
        &self,
        entries: HashMap<K, V>,
        removals: &[K],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Helper methods to inspect the state of a store in tests.
#[cfg(any(test, feature = "test_utils"))]
pub trait CacheStoreTestExt {
    /// Number of entries currently held by the store.
    fn entries_len(&self) -> impl Future<Output = usize>;
}
