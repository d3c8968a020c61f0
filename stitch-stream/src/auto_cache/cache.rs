// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, OnceCell, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, trace};

use crate::CorrelationId;
use crate::auto_cache::{AutoCacheState, CacheEvent, EventFeed};
use crate::cache::{Cache, CacheContext, Lookup};
use crate::config::WindowConfig;
use crate::error::{AssemblyError, SharedError};
use crate::utils::distinct;

/// Cache layer kept up-to-date by a change event feed.
///
/// Created from an [`AutoCacheBuilder`](crate::auto_cache::AutoCacheBuilder). The background task
/// consuming the feed is started by the first lookup and aborted when the cache is dropped.
///
/// Lookups arriving before the first window of events was applied wait for it, at most until the
/// initialisation timeout has passed since subscribing. Afterwards they are served from whatever
/// the feed delivered so far, an idle feed simply means no children exist yet.
pub struct AutoCache<ID, R> {
    feed: Mutex<Option<EventFeed<R>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    window: WindowConfig,
    init_timeout: Duration,
    init_deadline: OnceCell<Instant>,
    backing: Arc<dyn Cache<ID, R>>,
    context: CacheContext<ID, R>,
    state: Arc<watch::Sender<AutoCacheState>>,
}

impl<ID, R> AutoCache<ID, R>
where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        feed: EventFeed<R>,
        window: WindowConfig,
        init_timeout: Duration,
        backing: Arc<dyn Cache<ID, R>>,
        context: CacheContext<ID, R>,
        state: Arc<watch::Sender<AutoCacheState>>,
    ) -> Self {
        Self {
            feed: Mutex::new(Some(feed)),
            task: Mutex::new(None),
            window,
            init_timeout,
            init_deadline: OnceCell::new(),
            backing,
            context,
            state,
        }
    }

    /// Subscribes to the change event feed, unless this already happened.
    async fn ensure_started(&self) {
        let mut feed = self.feed.lock().await;
        let Some(feed) = feed.take() else {
            return;
        };

        debug!(
            max_window_size = self.window.max_size,
            max_window_delay = ?self.window.max_delay,
            "subscribe auto-cache to change event feed"
        );
        self.state.send_replace(AutoCacheState::Starting);
        let _ = self.init_deadline.set(Instant::now() + self.init_timeout);

        let handle = tokio::spawn(apply_feed(
            feed,
            self.window.clone(),
            self.backing.clone(),
            self.context.clone(),
            self.state.clone(),
        ));
        *self.task.lock().await = Some(handle);
    }

    /// Waits until the first window of events was applied or the initialisation timeout passed,
    /// returns an error if the cache is not usable.
    async fn ready(&self) -> Result<(), AssemblyError> {
        self.ensure_started().await;

        let deadline = self
            .init_deadline
            .get()
            .copied()
            .unwrap_or_else(Instant::now);
        let mut rx = self.state.subscribe();
        let state = match timeout_at(deadline, rx.wait_for(AutoCacheState::is_ready)).await {
            Ok(Ok(state)) => state.clone(),
            Ok(Err(_)) => return Err(AssemblyError::AutoCacheTerminated),
            Err(_) => {
                trace!("auto-cache change event feed idle, serve current state");
                return Ok(());
            }
        };

        match state {
            AutoCacheState::Failed(err) => Err(err),
            _ => Ok(()),
        }
    }
}

impl<ID, R> Cache<ID, R> for AutoCache<ID, R>
where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
{
    fn get_all<'a>(&'a self, ids: &'a [ID]) -> BoxFuture<'a, Result<Lookup<ID, R>, AssemblyError>> {
        Box::pin(async move {
            self.ready().await?;
            let lookup = self.backing.get_all(ids).await?;

            // Everything not known to the feed does not exist, the data source is never asked.
            Ok(Lookup {
                hits: lookup.hits,
                misses: Vec::new(),
            })
        })
    }

    fn put_all(&self, entries: HashMap<ID, Vec<R>>) -> BoxFuture<'_, Result<(), AssemblyError>> {
        self.backing.put_all(entries)
    }

    fn remove_all<'a>(&'a self, ids: &'a [ID]) -> BoxFuture<'a, Result<(), AssemblyError>> {
        self.backing.remove_all(ids)
    }

    fn update_all<'a>(
        &'a self,
        entries: HashMap<ID, Vec<R>>,
        removals: &'a [ID],
    ) -> BoxFuture<'a, Result<(), AssemblyError>> {
        self.backing.update_all(entries, removals)
    }
}

impl<ID, R> Drop for AutoCache<ID, R> {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

/// Consumes the change event feed until it completes or fails.
async fn apply_feed<ID, R>(
    feed: EventFeed<R>,
    window: WindowConfig,
    backing: Arc<dyn Cache<ID, R>>,
    context: CacheContext<ID, R>,
    state: Arc<watch::Sender<AutoCacheState>>,
) where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
{
    let mut windows = pin!(tokio_stream::StreamExt::chunks_timeout(
        feed,
        window.effective_max_size(),
        window.max_delay,
    ));
    let mut initialised = false;

    while let Some(events) = windows.next().await {
        // Events arriving after a feed error are never applied.
        let mut failure = None;
        let events: Vec<CacheEvent<R>> = events
            .into_iter()
            .map_while(|event| match event {
                Ok(event) => Some(event),
                Err(err) => {
                    failure.get_or_insert(err);
                    None
                }
            })
            .collect();

        if let Err(err) = apply_events(backing.as_ref(), &context, events).await {
            error!(%err, "applying change events to auto-cache failed");
            state.send_replace(AutoCacheState::Failed(err));
            return;
        }

        if let Some(err) = failure {
            let err: SharedError = Arc::from(err);
            let err = if initialised {
                AssemblyError::AutoCacheFeed(err)
            } else {
                AssemblyError::AutoCacheInit(err)
            };
            error!(%err, "auto-cache change event feed failed");
            state.send_replace(AutoCacheState::Failed(err));
            return;
        }

        if !initialised {
            initialised = true;
            debug!("auto-cache initialised");
            state.send_replace(AutoCacheState::Running);
        }
    }

    debug!("auto-cache change event feed completed");
    state.send_replace(AutoCacheState::Stopped);
}

/// Merges one window of events into the backing cache, strictly in delivery order.
///
/// The affected entries are read once, all events are applied to them in memory and the result is
/// written back in a single update. Entries left empty are removed.
pub(crate) async fn apply_events<ID, R>(
    backing: &dyn Cache<ID, R>,
    context: &CacheContext<ID, R>,
    events: Vec<CacheEvent<R>>,
) -> Result<(), AssemblyError>
where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
{
    if events.is_empty() {
        return Ok(());
    }

    let ids = distinct(events.iter().map(|event| context.correlation_id(event.item())));
    let mut entries = backing.get_all(&ids).await?.hits;

    for event in events {
        let entry = entries
            .entry(context.correlation_id(event.item()))
            .or_default();
        match event {
            CacheEvent::Updated(item) => context.upsert(entry, item),
            CacheEvent::Removed(item) => context.remove(entry, &item),
        }
    }

    let (removals, updates): (Vec<_>, Vec<_>) =
        entries.into_iter().partition(|(_, entry)| entry.is_empty());
    let removals: Vec<ID> = removals.into_iter().map(|(id, _)| id).collect();
    let updates: HashMap<ID, Vec<R>> = updates.into_iter().collect();

    trace!(
        updates = updates.len(),
        removals = removals.len(),
        "apply change events to auto-cache"
    );
    backing.update_all(updates, &removals).await
}
