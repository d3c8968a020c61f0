// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::trace;

use crate::CorrelationId;
use crate::cache::{Cache, Lookup};
use crate::error::AssemblyError;
use crate::source::{Fetch, KeyedSource};

/// Data source with a chain of cache layers in front of it.
///
/// Every layer resolves its misses through the layers behind it and finally the source, see
/// [`Cache::compute_all`]. Whatever a layer missed is written back into it afterwards, so the
/// innermost layer is filled first.
///
/// Lookups answered completely by the first layer run concurrently. Everything else holds the
/// chain exclusively from the first lookup until the last write-back, so concurrent windows
/// missing the same ids query the source only once.
pub(crate) struct CachedSource<ID, R> {
    layers: Vec<Arc<dyn Cache<ID, R>>>,
    source: KeyedSource<ID, R>,
    lock: RwLock<()>,
}

impl<ID, R> CachedSource<ID, R> {
    pub fn new(layers: Vec<Arc<dyn Cache<ID, R>>>, source: KeyedSource<ID, R>) -> Self {
        Self {
            layers,
            source,
            lock: RwLock::new(()),
        }
    }

    fn chain(&self) -> Chain<'_, ID, R> {
        Chain {
            layers: &self.layers,
            source: &self.source,
        }
    }
}

impl<ID, R> Fetch<ID, R> for CachedSource<ID, R>
where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
{
    fn fetch(&self, ids: Vec<ID>) -> BoxFuture<'_, Result<HashMap<ID, Vec<R>>, AssemblyError>> {
        Box::pin(async move {
            if let Some(first) = self.layers.first() {
                let _shared = self.lock.read().await;
                let Lookup { hits, misses } = first.get_all(&ids).await?;
                if misses.is_empty() {
                    trace!(hits = hits.len(), "served from first cache layer");
                    return Ok(hits);
                }
            }

            let _exclusive = self.lock.write().await;
            self.chain().fetch(ids).await
        })
    }
}

/// Remaining layers of a chain, resolving through the first of them.
struct Chain<'a, ID, R> {
    layers: &'a [Arc<dyn Cache<ID, R>>],
    source: &'a KeyedSource<ID, R>,
}

impl<ID, R> Fetch<ID, R> for Chain<'_, ID, R>
where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
{
    fn fetch(&self, ids: Vec<ID>) -> BoxFuture<'_, Result<HashMap<ID, Vec<R>>, AssemblyError>> {
        Box::pin(async move {
            let Some((layer, rest)) = self.layers.split_first() else {
                return self.source.fetch(ids).await;
            };

            trace!(ids = ids.len(), remaining_layers = rest.len(), "cache lookup");
            let next = Chain {
                layers: rest,
                source: self.source,
            };
            layer.compute_all(&ids, &next).await
        })
    }
}
