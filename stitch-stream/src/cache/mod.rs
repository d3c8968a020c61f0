// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cache layers sitting between a rule and its data source.
//!
//! Every cache maps a correlation id to the full list of children known for it. Caches are
//! created per rule from a [`CacheFactory`], which receives a [`CacheContext`] describing how
//! children of that rule are keyed and merged.
//!
//! Available layers:
//! - [`memory`]: unbounded in-memory cache
//! - [`bounded`]: in-memory cache evicting the least recently used entries
//! - [`store`]: any [`CacheStore`] implementation
//! - [`observable`]: decorator reporting every operation of another layer
//! - [`AutoCache`](crate::auto_cache::AutoCache): cache kept up-to-date by a change event feed
mod layered;
mod observable;
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use stitch_store::cache::{BoundedMemoryStore, CacheStore};
use stitch_store::memory::MemoryStore;

use crate::CorrelationId;
use crate::error::AssemblyError;
use crate::source::Fetch;

pub(crate) use layered::CachedSource;
pub use observable::{ObservableCache, ObservableCacheBuilder, observable};

/// Result of looking up a set of ids in a cache.
#[derive(Debug)]
pub struct Lookup<ID, R> {
    /// Entries found in the cache.
    pub hits: HashMap<ID, Vec<R>>,

    /// Ids which need to be resolved elsewhere.
    pub misses: Vec<ID>,
}

impl<ID, R> Default for Lookup<ID, R> {
    fn default() -> Self {
        Self {
            hits: HashMap::new(),
            misses: Vec::new(),
        }
    }
}

/// Cache layer in front of a data source.
pub trait Cache<ID, R>: Send + Sync {
    /// Looks up entries for the given ids.
    ///
    /// A cache which returns no misses is authoritative: layers behind it and the data source are
    /// not consulted anymore.
    fn get_all<'a>(&'a self, ids: &'a [ID]) -> BoxFuture<'a, Result<Lookup<ID, R>, AssemblyError>>;

    /// Inserts entries, replacing existing ones.
    fn put_all(&self, entries: HashMap<ID, Vec<R>>) -> BoxFuture<'_, Result<(), AssemblyError>>;

    /// Removes the entries of the given ids.
    fn remove_all<'a>(&'a self, ids: &'a [ID]) -> BoxFuture<'a, Result<(), AssemblyError>>;

    /// Removes entries and inserts new ones in one atomic step.
    fn update_all<'a>(
        &'a self,
        entries: HashMap<ID, Vec<R>>,
        removals: &'a [ID],
    ) -> BoxFuture<'a, Result<(), AssemblyError>>;

    /// Returns cached entries and resolves the misses with `fetch`, caching what was fetched.
    ///
    /// Requested ids for which `fetch` had no children get cached as empty entries, so they are not
    /// looked up again. This is how every layer of a rule source resolves, with `fetch` being the
    /// layers behind it.
    fn compute_all<'a>(
        &'a self,
        ids: &'a [ID],
        fetch: &'a dyn Fetch<ID, R>,
    ) -> BoxFuture<'a, Result<HashMap<ID, Vec<R>>, AssemblyError>>
    where
        ID: CorrelationId,
        R: Clone + Send + Sync + 'static,
    {
        Box::pin(async move {
            let Lookup { mut hits, misses } = self.get_all(ids).await?;
            if misses.is_empty() {
                return Ok(hits);
            }

            let mut fetched = fetch.fetch(misses.clone()).await?;
            for id in misses {
                fetched.entry(id).or_default();
            }
            self.put_all(fetched.clone()).await?;

            hits.extend(fetched);
            Ok(hits)
        })
    }
}

/// Creates the cache layer of a rule.
pub trait CacheFactory<ID, R>: Send {
    fn create(self: Box<Self>, context: &CacheContext<ID, R>) -> Arc<dyn Cache<ID, R>>;
}

type CorrelationIdFn<ID, R> = Arc<dyn Fn(&R) -> ID + Send + Sync>;

type SameElementFn<R> = Arc<dyn Fn(&R, &R) -> bool + Send + Sync>;

/// Describes how children of a rule are keyed and how change events are merged into entries.
pub struct CacheContext<ID, R> {
    correlation_id: CorrelationIdFn<ID, R>,
    same_element: Option<SameElementFn<R>>,
}

impl<ID, R> CacheContext<ID, R> {
    /// Context of a rule resolving one child per parent.
    pub fn one_to_one(correlation_id: CorrelationIdFn<ID, R>) -> Self {
        Self {
            correlation_id,
            same_element: None,
        }
    }

    /// Context of a rule resolving many children per parent.
    ///
    /// `same_element` tells if two children are versions of the same element.
    pub fn one_to_many(correlation_id: CorrelationIdFn<ID, R>, same_element: SameElementFn<R>) -> Self {
        Self {
            correlation_id,
            same_element: Some(same_element),
        }
    }

    pub fn correlation_id(&self, item: &R) -> ID {
        (self.correlation_id)(item)
    }

    pub(crate) fn correlation_id_fn(&self) -> CorrelationIdFn<ID, R> {
        self.correlation_id.clone()
    }

    pub fn is_one_to_many(&self) -> bool {
        self.same_element.is_some()
    }

    /// Merges a new or updated child into the entry of its correlation id.
    ///
    /// One-to-one entries are replaced. One-to-many entries replace the element with the same
    /// element id or get the child appended.
    pub fn upsert(&self, entry: &mut Vec<R>, item: R) {
        match &self.same_element {
            None => {
                entry.clear();
                entry.push(item);
            }
            Some(same_element) => {
                match entry.iter_mut().find(|existing| same_element(existing, &item)) {
                    Some(existing) => *existing = item,
                    None => entry.push(item),
                }
            }
        }
    }

    /// Removes a child from the entry of its correlation id.
    ///
    /// One-to-one entries are cleared. One-to-many entries lose the element with the same element
    /// id. An entry left empty is meant to be dropped from the cache.
    pub fn remove(&self, entry: &mut Vec<R>, item: &R) {
        match &self.same_element {
            None => entry.clear(),
            Some(same_element) => entry.retain(|existing| !same_element(existing, item)),
        }
    }
}

impl<ID, R> Clone for CacheContext<ID, R> {
    fn clone(&self) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            same_element: self.same_element.clone(),
        }
    }
}

/// Cache layer backed by a [`CacheStore`].
pub struct StoreCache<S> {
    store: S,
}

impl<S> StoreCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<ID, R, S> Cache<ID, R> for StoreCache<S>
where
    ID: CorrelationId,
    R: Send + Sync + 'static,
    S: CacheStore<ID, Vec<R>> + Send + Sync,
{
    fn get_all<'a>(&'a self, ids: &'a [ID]) -> BoxFuture<'a, Result<Lookup<ID, R>, AssemblyError>> {
        Box::pin(async move {
            let hits = self
                .store
                .get_all(ids)
                .await
                .map_err(AssemblyError::store_failed)?;
            let misses = ids
                .iter()
                .filter(|id| !hits.contains_key(*id))
                .cloned()
                .collect();
            Ok(Lookup { hits, misses })
        })
    }

    fn put_all(&self, entries: HashMap<ID, Vec<R>>) -> BoxFuture<'_, Result<(), AssemblyError>> {
        Box::pin(async move {
            self.store
                .put_all(entries)
                .await
                .map_err(AssemblyError::store_failed)
        })
    }

    fn remove_all<'a>(&'a self, ids: &'a [ID]) -> BoxFuture<'a, Result<(), AssemblyError>> {
        Box::pin(async move {
            self.store
                .remove_all(ids)
                .await
                .map(|_| ())
                .map_err(AssemblyError::store_failed)
        })
    }

    fn update_all<'a>(
        &'a self,
        entries: HashMap<ID, Vec<R>>,
        removals: &'a [ID],
    ) -> BoxFuture<'a, Result<(), AssemblyError>> {
        Box::pin(async move {
            self.store
                .update_all(entries, removals)
                .await
                .map_err(AssemblyError::store_failed)
        })
    }
}

/// Factory creating a [`StoreCache`] per rule.
///
/// Every rule gets a clone of the store. Stores sharing their state between clones, like the
/// in-memory ones, need a separate instance per rule.
pub struct StoreCacheFactory<S> {
    store: S,
}

impl<ID, R, S> CacheFactory<ID, R> for StoreCacheFactory<S>
where
    ID: CorrelationId,
    R: Send + Sync + 'static,
    S: CacheStore<ID, Vec<R>> + Send + Sync + 'static,
{
    fn create(self: Box<Self>, _context: &CacheContext<ID, R>) -> Arc<dyn Cache<ID, R>> {
        Arc::new(StoreCache::new(self.store))
    }
}

/// Unbounded in-memory cache layer.
pub fn memory<ID, R>() -> StoreCacheFactory<MemoryStore<ID, Vec<R>>> {
    store(MemoryStore::new())
}

/// In-memory cache layer holding at most `capacity` correlation ids.
pub fn bounded<ID, R>(capacity: usize) -> StoreCacheFactory<BoundedMemoryStore<ID, Vec<R>>> {
    store(BoundedMemoryStore::new(capacity))
}

/// Cache layer backed by the given store.
pub fn store<S>(store: S) -> StoreCacheFactory<S> {
    StoreCacheFactory { store }
}
