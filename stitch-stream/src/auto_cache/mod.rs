// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cache layer kept up-to-date by a feed of change events.
//!
//! An auto-cache is authoritative for its rule: lookups never fall through to the data source, an
//! id the feed never mentioned resolves to the rule's default. The feed is subscribed lazily on
//! the first lookup and then consumed in a background task, grouped into windows of events. Each
//! window is merged into the backing cache store in one atomic update.
//!
//! Lookups wait until the first window of events was applied or the feed completed, but never
//! longer than the initialisation timeout. An idle feed is not an error: once the timeout passed,
//! lookups resolve against the (possibly empty) cache. A feed failing before its first window
//! makes the cache unusable ([`AssemblyError::AutoCacheInit`]), a failure afterwards stops updates
//! and fails every following lookup ([`AssemblyError::AutoCacheFeed`]).
//!
//! [`AssemblyError::AutoCacheInit`]: crate::AssemblyError::AutoCacheInit
//! [`AssemblyError::AutoCacheFeed`]: crate::AssemblyError::AutoCacheFeed
mod cache;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use tokio::sync::watch;

use crate::CorrelationId;
use crate::cache::{self as layers, CacheContext, CacheFactory};
use crate::config::{DEFAULT_AUTO_CACHE_INIT_TIMEOUT, WindowConfig};
use crate::error::{AssemblyError, BoxError};

pub use cache::AutoCache;

/// Change of a child entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEvent<R> {
    /// Child was created or modified.
    Updated(R),

    /// Child was deleted.
    Removed(R),
}

impl<R> CacheEvent<R> {
    pub fn item(&self) -> &R {
        match self {
            CacheEvent::Updated(item) | CacheEvent::Removed(item) => item,
        }
    }
}

/// Lifecycle of an auto-cache.
#[derive(Clone, Debug)]
pub enum AutoCacheState {
    /// No lookup happened yet, the feed is not subscribed.
    Unstarted,

    /// Feed is subscribed, waiting for the first window of events.
    Starting,

    /// First window of events was applied, updates are ongoing.
    Running,

    /// Feed completed, the cache keeps serving its last state.
    Stopped,

    /// Feed failed, every lookup fails with the contained error.
    Failed(AssemblyError),
}

impl AutoCacheState {
    pub fn is_ready(&self) -> bool {
        !matches!(self, Self::Unstarted | Self::Starting)
    }
}

/// Read-only handle observing the state of an auto-cache.
#[derive(Clone, Debug)]
pub struct AutoCacheStatus {
    rx: watch::Receiver<AutoCacheState>,
}

impl AutoCacheStatus {
    pub fn current(&self) -> AutoCacheState {
        self.rx.borrow().clone()
    }

    /// Waits until the auto-cache is usable or failed.
    pub async fn ready(&mut self) -> AutoCacheState {
        self.wait_for(AutoCacheState::is_ready).await
    }

    /// Waits until the feed completed or failed.
    pub async fn finished(&mut self) -> AutoCacheState {
        self.wait_for(|state| matches!(state, AutoCacheState::Stopped | AutoCacheState::Failed(_)))
            .await
    }

    async fn wait_for(&mut self, f: impl FnMut(&AutoCacheState) -> bool) -> AutoCacheState {
        match self.rx.wait_for(f).await {
            Ok(state) => state.clone(),
            Err(_) => AutoCacheState::Failed(AssemblyError::AutoCacheTerminated),
        }
    }
}

pub(crate) type EventFeed<R> = BoxStream<'static, Result<CacheEvent<R>, BoxError>>;

/// Configures an auto-cache, which is then handed to a rule source as a cache layer.
///
/// ```rust
/// # use futures_util::stream;
/// # use stitch_stream::auto_cache::{AutoCacheBuilder, CacheEvent};
/// # #[derive(Clone)] struct Billing { customer_id: u64 }
/// let events = stream::iter([CacheEvent::Updated(Billing { customer_id: 1 })]);
/// let auto_cache = AutoCacheBuilder::<u64, Billing>::new(events).max_window_size(50);
/// ```
pub struct AutoCacheBuilder<ID, R> {
    feed: EventFeed<R>,
    window: WindowConfig,
    init_timeout: Duration,
    store: Box<dyn CacheFactory<ID, R>>,
    state: Arc<watch::Sender<AutoCacheState>>,
}

impl<ID, R> AutoCacheBuilder<ID, R>
where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
{
    /// Auto-cache fed by a stream of [`CacheEvent`]s.
    pub fn new<S>(feed: S) -> Self
    where
        S: Stream<Item = CacheEvent<R>> + Send + 'static,
    {
        Self::with_feed(feed.map(Ok).boxed())
    }

    /// Auto-cache fed by a stream of [`CacheEvent`]s which can fail.
    pub fn from_try_stream<S, E>(feed: S) -> Self
    where
        S: Stream<Item = Result<CacheEvent<R>, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::with_feed(feed.map_err(Into::into).boxed())
    }

    /// Auto-cache fed by a stream of custom change events.
    ///
    /// `is_upsert` tells if an event creates or updates its child, otherwise it is treated as a
    /// removal. `item` extracts the child from the event.
    pub fn from_events<S, T, U, I>(feed: S, is_upsert: U, item: I) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
        U: Fn(&T) -> bool + Send + 'static,
        I: Fn(T) -> R + Send + 'static,
    {
        let feed = feed.map(move |event| {
            let event = if is_upsert(&event) {
                CacheEvent::Updated(item(event))
            } else {
                CacheEvent::Removed(item(event))
            };
            Ok(event)
        });
        Self::with_feed(feed.boxed())
    }

    fn with_feed(feed: EventFeed<R>) -> Self {
        let (state, _) = watch::channel(AutoCacheState::Unstarted);
        Self {
            feed,
            window: WindowConfig::default(),
            init_timeout: DEFAULT_AUTO_CACHE_INIT_TIMEOUT,
            store: Box::new(layers::memory()),
            state: Arc::new(state),
        }
    }
}

impl<ID, R> AutoCacheBuilder<ID, R> {
    /// Maximum number of events merged into the cache in one update.
    pub fn max_window_size(mut self, max_size: usize) -> Self {
        self.window.max_size = max_size;
        self
    }

    /// Maximum time events are held back to fill up a window.
    pub fn max_window_delay(mut self, max_delay: Duration) -> Self {
        self.window.max_delay = max_delay;
        self
    }

    pub fn window(mut self, window: WindowConfig) -> Self {
        self.window = window;
        self
    }

    /// Maximum time lookups wait for the first window of events after subscribing.
    ///
    /// Lookups after this point are served from the events applied so far, even if the feed did
    /// not deliver anything yet.
    pub fn init_timeout(mut self, init_timeout: Duration) -> Self {
        self.init_timeout = init_timeout;
        self
    }

    /// Cache layer holding the entries, defaults to an unbounded in-memory cache.
    pub fn store(mut self, store: impl CacheFactory<ID, R> + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    /// Handle to observe the state of the auto-cache once it is created.
    pub fn status(&self) -> AutoCacheStatus {
        AutoCacheStatus {
            rx: self.state.subscribe(),
        }
    }
}

impl<ID, R> CacheFactory<ID, R> for AutoCacheBuilder<ID, R>
where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
{
    fn create(self: Box<Self>, context: &CacheContext<ID, R>) -> Arc<dyn layers::Cache<ID, R>> {
        let AutoCacheBuilder {
            feed,
            window,
            init_timeout,
            store,
            state,
        } = *self;
        Arc::new(AutoCache::new(
            feed,
            window,
            init_timeout,
            store.create(context),
            context.clone(),
            state,
        ))
    }
}
