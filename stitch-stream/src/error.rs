// SPDX-License-Identifier: MIT OR Apache-2.0

use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

/// Type-erased error returned by caller-supplied data sources and change event feeds.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Shared, type-erased error.
///
/// Errors of long-lived resources like an auto-cache are observed by every window depending on
/// them, this is why they need to be cheaply cloneable.
pub type SharedError = Arc<dyn Error + Send + Sync + 'static>;

/// Error resolving a window of parents.
///
/// Any of these fail the whole window, no aggregates are emitted for it. Failures of a data
/// source or store are local to the window they occurred in, auto-cache failures are sticky and
/// hit every window resolving against that cache.
#[derive(Clone, Debug, Error)]
pub enum AssemblyError {
    /// Data source call returned an error.
    #[error("data source failed: {0}")]
    Source(SharedError),

    /// Underlying cache store rejected a read or write.
    #[error("cache store failed: {0}")]
    CacheStore(SharedError),

    /// Change event feed of an auto-cache failed before the first batch of events was applied.
    ///
    /// The auto-cache is unusable from here on and needs to be re-created.
    #[error("auto-cache could not be initialised: {0}")]
    AutoCacheInit(SharedError),

    /// Change event feed of an already initialised auto-cache failed.
    #[error("auto-cache change event feed failed: {0}")]
    AutoCacheFeed(SharedError),

    /// Background task applying change events to an auto-cache ended without reporting.
    #[error("auto-cache background task terminated unexpectedly")]
    AutoCacheTerminated,
}

impl AssemblyError {
    pub(crate) fn source_failed(err: impl Into<BoxError>) -> Self {
        Self::Source(Arc::from(err.into()))
    }

    pub(crate) fn store_failed(err: impl Into<BoxError>) -> Self {
        Self::CacheStore(Arc::from(err.into()))
    }
}
