// SPDX-License-Identifier: MIT OR Apache-2.0

/// Macro to run the same test logic against all in-memory store implementations.
///
/// This macro takes a closure that will be executed against each store type:
/// - Unbounded in-memory store (`MemoryStore`)
/// - Size-bounded in-memory store (`BoundedMemoryStore`) with a capacity large enough to never
///   evict during the test
///
/// ## Example
///
/// ```rust
/// # use std::collections::HashMap;
/// # use stitch_store::assert_all_stores;
/// # use stitch_store::cache::{CacheStore, CacheStoreTestExt};
/// # async fn run() {
/// assert_all_stores!(|store| async {
///     store.put_all(HashMap::from([(1u64, "one".to_string())])).await.unwrap();
///     assert_eq!(store.entries_len().await, 1);
/// });
/// # }
/// ```
#[macro_export]
macro_rules! assert_all_stores {
    (|$store:ident| $test_body:expr) => {
        // Test with MemoryStore.
        {
            let $store = $crate::memory::MemoryStore::default();
            $test_body.await;
        }

        // Test with BoundedMemoryStore.
        {
            let $store = $crate::cache::BoundedMemoryStore::new(1024);
            $test_body.await;
        }
    };
}
