// SPDX-License-Identifier: MIT OR Apache-2.0

//! Joins each parent of a stream with the children resolved by a set of rules.
//!
//! Parents are processed in windows. For every window the distinct correlation ids of all parents
//! are resolved once per rule, then one aggregate per parent is built, in parent order. Parents
//! sharing a correlation id each get their own copy of the resolved values.
mod builder;
mod stream;
#[cfg(test)]
mod tests;

use std::marker::PhantomData;
use std::sync::Arc;

use futures_core::Stream;
use futures_util::FutureExt;
use tracing::debug;

use crate::CorrelationId;
use crate::config::{AssembleConfig, WindowConfig};
use crate::error::AssemblyError;
use crate::rules::{Constructor, Rules};
use crate::utils::distinct;

pub use builder::{AssemblerBuilder, RulesBuilder};
pub use stream::{Assemble, AssembleExt, windows};
use stream::ProcessFn;

pub(crate) struct Inner<P, ID, Rs, C> {
    pub(crate) correlation_id: Arc<dyn Fn(&P) -> ID + Send + Sync>,
    pub(crate) rules: Rs,
    pub(crate) constructor: C,
}

/// Builds aggregates of type `A` from parents of type `P`, keyed by `ID`.
///
/// Assemblers are cheap to clone, clones share their rules and caches.
pub struct Assembler<P, ID, Rs, C, A> {
    pub(crate) inner: Arc<Inner<P, ID, Rs, C>>,
    pub(crate) _marker: PhantomData<fn() -> A>,
}

impl<P, ID, Rs, C, A> Clone for Assembler<P, ID, Rs, C, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<P, ID, Rs, C, A> Assembler<P, ID, Rs, C, A>
where
    P: Send + 'static,
    ID: CorrelationId,
    Rs: Rules<ID> + 'static,
    C: Constructor<P, Rs::Fields, A> + 'static,
    A: Send + 'static,
{
    /// Builds the aggregates of one window of parents.
    ///
    /// Each rule queries its source at most once for the window, with every distinct correlation
    /// id of it. Aggregates are returned in the order of their parents. If any rule fails, the
    /// whole window fails and nothing is returned for it.
    pub async fn process(&self, window: Vec<P>) -> Result<Vec<A>, AssemblyError> {
        if window.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ID> = window
            .iter()
            .map(|parent| (self.inner.correlation_id)(parent))
            .collect();
        let distinct_ids = distinct(ids.iter().cloned());

        debug!(
            parents = window.len(),
            ids = distinct_ids.len(),
            "resolve window"
        );
        let resolved = self.inner.rules.resolve_all(&distinct_ids).await?;

        let aggregates = window
            .into_iter()
            .zip(ids.iter())
            .map(|(parent, id)| {
                self.inner
                    .constructor
                    .construct(parent, Rs::fields(&resolved, id))
            })
            .collect();
        Ok(aggregates)
    }

    /// Builds aggregates for a stream of windows, one window at a time.
    pub fn assemble<S>(&self, windows: S) -> Assemble<S, P, A>
    where
        S: Stream<Item = Vec<P>>,
    {
        self.assemble_with(windows, AssembleConfig::default())
    }

    /// Builds aggregates for a stream of windows, resolving multiple windows concurrently.
    pub fn assemble_with<S>(&self, windows: S, config: AssembleConfig) -> Assemble<S, P, A>
    where
        S: Stream<Item = Vec<P>>,
    {
        let assembler = self.clone();
        let process: ProcessFn<P, A> = Box::new(move |window: Vec<P>| {
            let assembler = assembler.clone();
            async move { assembler.process(window).await }.boxed()
        });
        Assemble::new(windows, process, config)
    }

    /// Groups a stream of parents into windows and builds aggregates for them.
    pub fn assemble_parents<S>(
        &self,
        parents: S,
        window: WindowConfig,
        config: AssembleConfig,
    ) -> Assemble<impl Stream<Item = Vec<P>>, P, A>
    where
        S: Stream<Item = P>,
    {
        self.assemble_with(windows(parents, window), config)
    }
}
