// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batched data sources resolving child entities for a set of correlation ids.
//!
//! A [`Source`] is the caller-supplied query: it receives every distinct id of a window at once
//! and returns a stream of matching children, in any order. Sources are adapted from plain
//! functions returning either a stream ([`from_stream`]) or a future of a collection
//! ([`from_future`]).
//!
//! Sources are bound to a rule through [`RuleMapperSource`], which optionally stacks cache layers
//! in front of the source.
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use futures_core::Stream;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use tracing::{debug, trace};

use crate::CorrelationId;
use crate::cache::{CacheContext, CacheFactory, CachedSource};
use crate::error::{AssemblyError, BoxError};

/// Batched query for child entities.
pub trait Source<ID, R>: Send + Sync {
    /// Returns all children belonging to any of the given ids.
    ///
    /// Ids are distinct. Children may arrive in any order and children which do not belong to any
    /// of the requested ids are ignored.
    fn fetch(&self, ids: Vec<ID>) -> BoxStream<'static, Result<R, BoxError>>;
}

/// Source backed by a function returning a stream of children.
pub struct StreamSource<F>(F);

impl<ID, R, F, S, E> Source<ID, R> for StreamSource<F>
where
    F: Fn(Vec<ID>) -> S + Send + Sync,
    S: Stream<Item = Result<R, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn fetch(&self, ids: Vec<ID>) -> BoxStream<'static, Result<R, BoxError>> {
        (self.0)(ids).map_err(Into::into).boxed()
    }
}

/// Source backed by a function resolving all children at once.
pub struct FutureSource<F>(F);

impl<ID, R, F, Fut, I, E> Source<ID, R> for FutureSource<F>
where
    F: Fn(Vec<ID>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<I, E>> + Send + 'static,
    I: IntoIterator<Item = R> + Send + 'static,
    I::IntoIter: Send,
    R: Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn fetch(&self, ids: Vec<ID>) -> BoxStream<'static, Result<R, BoxError>> {
        let query = (self.0)(ids);
        stream::once(async move { query.await.map_err(Into::into) })
            .map_ok(|items| stream::iter(items.into_iter().map(Ok::<R, BoxError>)))
            .try_flatten()
            .boxed()
    }
}

/// Adapts a function returning a stream of children into a [`Source`].
pub fn from_stream<F>(query: F) -> StreamSource<F> {
    StreamSource(query)
}

/// Adapts a function returning a future of a collection of children into a [`Source`].
pub fn from_future<F>(query: F) -> FutureSource<F> {
    FutureSource(query)
}

/// Resolves children for a set of correlation ids, grouped by id.
///
/// The returned map contains only requested ids. Ids can map to an empty list, which means the
/// lookup was done but nothing was found.
pub trait Fetch<ID, R>: Send + Sync {
    fn fetch(&self, ids: Vec<ID>) -> BoxFuture<'_, Result<HashMap<ID, Vec<R>>, AssemblyError>>;
}

/// Source paired with the function extracting the correlation id from each child.
pub(crate) struct KeyedSource<ID, R> {
    source: Arc<dyn Source<ID, R>>,
    correlation_id: Arc<dyn Fn(&R) -> ID + Send + Sync>,
}

impl<ID, R> Fetch<ID, R> for KeyedSource<ID, R>
where
    ID: CorrelationId,
    R: Send + 'static,
{
    fn fetch(&self, ids: Vec<ID>) -> BoxFuture<'_, Result<HashMap<ID, Vec<R>>, AssemblyError>> {
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(HashMap::new());
            }

            trace!(ids = ids.len(), "query data source");
            let requested: HashSet<ID> = ids.iter().cloned().collect();
            let mut children = self.source.fetch(ids);

            let mut grouped: HashMap<ID, Vec<R>> = HashMap::new();
            let mut unmatched = 0usize;
            while let Some(child) = children
                .try_next()
                .await
                .map_err(AssemblyError::source_failed)?
            {
                let id = (self.correlation_id)(&child);
                if requested.contains(&id) {
                    grouped.entry(id).or_default().push(child);
                } else {
                    unmatched += 1;
                }
            }

            if unmatched > 0 {
                debug!(unmatched, "data source returned children for ids which were not requested");
            }

            Ok(grouped)
        })
    }
}

/// Data source of a rule, with an optional chain of cache layers in front of it.
///
/// Cache layers are consulted in the order they were added: the first layer is checked first,
/// only ids it misses are passed on to the next one and finally to the source itself. Ids
/// resolved further down are written back into every layer which missed them.
///
/// ```rust
/// # use stitch_stream::cache;
/// # use stitch_stream::source::RuleMapperSource;
/// # #[derive(Clone)] struct Billing { customer_id: u64 }
/// let source = RuleMapperSource::from_future(|ids: Vec<u64>| async move {
///     Ok::<_, std::io::Error>(ids.into_iter().map(|customer_id| Billing { customer_id }).collect::<Vec<_>>())
/// })
/// .cached(cache::memory());
/// ```
pub struct RuleMapperSource<ID, R> {
    source: Arc<dyn Source<ID, R>>,
    caches: Vec<Box<dyn CacheFactory<ID, R>>>,
}

impl<ID, R> RuleMapperSource<ID, R>
where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
{
    pub fn new(source: impl Source<ID, R> + 'static) -> Self {
        Self {
            source: Arc::new(source),
            caches: Vec::new(),
        }
    }

    pub fn from_stream<F, S, E>(query: F) -> Self
    where
        F: Fn(Vec<ID>) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<R, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::new(from_stream(query))
    }

    pub fn from_future<F, Fut, I, E>(query: F) -> Self
    where
        F: Fn(Vec<ID>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<I, E>> + Send + 'static,
        I: IntoIterator<Item = R> + Send + 'static,
        I::IntoIter: Send,
        E: Into<BoxError> + 'static,
    {
        Self::new(from_future(query))
    }

    /// Adds a cache layer behind all previously added ones.
    pub fn cached(mut self, cache: impl CacheFactory<ID, R> + 'static) -> Self {
        self.caches.push(Box::new(cache));
        self
    }

    /// Binds the source to the way children of a rule are keyed and merged.
    ///
    /// Cache layers are created here, each rule gets its own instances.
    pub(crate) fn bind(self, context: CacheContext<ID, R>) -> Arc<dyn Fetch<ID, R>> {
        let keyed = KeyedSource {
            source: self.source,
            correlation_id: context.correlation_id_fn(),
        };

        if self.caches.is_empty() {
            return Arc::new(keyed);
        }

        let layers = self
            .caches
            .into_iter()
            .map(|factory| factory.create(&context))
            .collect();
        Arc::new(CachedSource::new(layers, keyed))
    }
}
