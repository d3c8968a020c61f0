// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::CorrelationId;
use crate::cache::{Cache, CacheContext, CacheFactory, Lookup};
use crate::error::AssemblyError;

type EntriesCallback<ID, R> = Arc<dyn Fn(&HashMap<ID, Vec<R>>) + Send + Sync>;

type IdsCallback<ID> = Arc<dyn Fn(&[ID]) + Send + Sync>;

type UpdateCallback<ID, R> = Arc<dyn Fn(&HashMap<ID, Vec<R>>, &[ID]) + Send + Sync>;

/// Wraps a cache layer and reports each of its operations to callbacks.
///
/// Callbacks run after the wrapped operation succeeded. `on_get_all` receives the hits of a
/// lookup.
pub fn observable<ID, R>(delegate: impl CacheFactory<ID, R> + 'static) -> ObservableCacheBuilder<ID, R> {
    ObservableCacheBuilder {
        delegate: Box::new(delegate),
        callbacks: Callbacks::default(),
    }
}

pub struct ObservableCacheBuilder<ID, R> {
    delegate: Box<dyn CacheFactory<ID, R>>,
    callbacks: Callbacks<ID, R>,
}

impl<ID, R> ObservableCacheBuilder<ID, R> {
    pub fn on_get_all(mut self, callback: impl Fn(&HashMap<ID, Vec<R>>) + Send + Sync + 'static) -> Self {
        self.callbacks.get_all = Some(Arc::new(callback));
        self
    }

    pub fn on_put_all(mut self, callback: impl Fn(&HashMap<ID, Vec<R>>) + Send + Sync + 'static) -> Self {
        self.callbacks.put_all = Some(Arc::new(callback));
        self
    }

    pub fn on_remove_all(mut self, callback: impl Fn(&[ID]) + Send + Sync + 'static) -> Self {
        self.callbacks.remove_all = Some(Arc::new(callback));
        self
    }

    pub fn on_update_all(
        mut self,
        callback: impl Fn(&HashMap<ID, Vec<R>>, &[ID]) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.update_all = Some(Arc::new(callback));
        self
    }
}

impl<ID, R> CacheFactory<ID, R> for ObservableCacheBuilder<ID, R>
where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
{
    fn create(self: Box<Self>, context: &CacheContext<ID, R>) -> Arc<dyn Cache<ID, R>> {
        let ObservableCacheBuilder {
            delegate,
            callbacks,
        } = *self;
        Arc::new(ObservableCache {
            delegate: delegate.create(context),
            callbacks,
        })
    }
}

struct Callbacks<ID, R> {
    get_all: Option<EntriesCallback<ID, R>>,
    put_all: Option<EntriesCallback<ID, R>>,
    remove_all: Option<IdsCallback<ID>>,
    update_all: Option<UpdateCallback<ID, R>>,
}

impl<ID, R> Default for Callbacks<ID, R> {
    fn default() -> Self {
        Self {
            get_all: None,
            put_all: None,
            remove_all: None,
            update_all: None,
        }
    }
}

/// Cache layer reporting every successful operation of the layer it wraps.
pub struct ObservableCache<ID, R> {
    delegate: Arc<dyn Cache<ID, R>>,
    callbacks: Callbacks<ID, R>,
}

impl<ID, R> Cache<ID, R> for ObservableCache<ID, R>
where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
{
    fn get_all<'a>(&'a self, ids: &'a [ID]) -> BoxFuture<'a, Result<Lookup<ID, R>, AssemblyError>> {
        Box::pin(async move {
            let lookup = self.delegate.get_all(ids).await?;
            if let Some(callback) = &self.callbacks.get_all {
                callback(&lookup.hits);
            }
            Ok(lookup)
        })
    }

    fn put_all(&self, entries: HashMap<ID, Vec<R>>) -> BoxFuture<'_, Result<(), AssemblyError>> {
        Box::pin(async move {
            let Some(callback) = &self.callbacks.put_all else {
                return self.delegate.put_all(entries).await;
            };
            self.delegate.put_all(entries.clone()).await?;
            callback(&entries);
            Ok(())
        })
    }

    fn remove_all<'a>(&'a self, ids: &'a [ID]) -> BoxFuture<'a, Result<(), AssemblyError>> {
        Box::pin(async move {
            self.delegate.remove_all(ids).await?;
            if let Some(callback) = &self.callbacks.remove_all {
                callback(ids);
            }
            Ok(())
        })
    }

    fn update_all<'a>(
        &'a self,
        entries: HashMap<ID, Vec<R>>,
        removals: &'a [ID],
    ) -> BoxFuture<'a, Result<(), AssemblyError>> {
        Box::pin(async move {
            let Some(callback) = &self.callbacks.update_all else {
                return self.delegate.update_all(entries, removals).await;
            };
            self.delegate.update_all(entries.clone(), removals).await?;
            callback(&entries, removals);
            Ok(())
        })
    }
}
