// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces and in-memory implementations for the key-value stores backing stitch caches.
//!
//! Every store is batched: values are read, written and removed for a whole set of keys at once
//! and each batch becomes visible atomically to concurrent readers.
pub mod cache;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
