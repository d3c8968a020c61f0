// SPDX-License-Identifier: MIT OR Apache-2.0

#[cfg(feature = "memory")]
mod bounded;
#[cfg(feature = "memory")]
mod memory;
mod traits;

#[cfg(feature = "memory")]
pub use bounded::BoundedMemoryStore;
pub use traits::CacheStore;
#[cfg(any(test, feature = "test_utils"))]
pub use traits::CacheStoreTestExt;
