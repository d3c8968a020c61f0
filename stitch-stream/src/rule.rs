// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rules describe how one field of an aggregate is resolved from a data source.
//!
//! A rule is resolved once per window with the distinct correlation ids of all parents in it. Its
//! result provides a value for every id, falling back to a default where the source had nothing.
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash as StdHash;
use std::sync::Arc;

use crate::CorrelationId;
use crate::cache::CacheContext;
use crate::error::AssemblyError;
use crate::source::{Fetch, RuleMapperSource};

/// Resolves one field of an aggregate for a batch of correlation ids.
pub trait Rule<ID>: Send + Sync {
    type Output: Clone + Send + Sync + 'static;

    fn resolve(
        &self,
        ids: &[ID],
    ) -> impl Future<Output = Result<Resolved<ID, Self::Output>, AssemblyError>> + Send;
}

type DefaultFn<ID, T> = Arc<dyn Fn(&ID) -> T + Send + Sync>;

/// Field values of a rule, resolved for one window.
pub struct Resolved<ID, T> {
    values: HashMap<ID, T>,
    default: DefaultFn<ID, T>,
}

impl<ID, T> Resolved<ID, T>
where
    ID: Eq + StdHash,
    T: Clone,
{
    pub fn new(values: HashMap<ID, T>, default: DefaultFn<ID, T>) -> Self {
        Self { values, default }
    }

    /// Value for the given id, or the default when the source had nothing for it.
    ///
    /// Every call returns a separate clone, parents sharing an id never share field values.
    pub fn get(&self, id: &ID) -> T {
        match self.values.get(id) {
            Some(value) => value.clone(),
            None => (self.default)(id),
        }
    }
}

/// Rule resolving at most one child per correlation id.
///
/// If the source returns multiple children for an id, the first one is used.
pub struct OneToOne<ID, R, T> {
    fetch: Arc<dyn Fetch<ID, R>>,
    convert: fn(R) -> T,
    default: DefaultFn<ID, T>,
}

impl<ID, R, T> Rule<ID> for OneToOne<ID, R, T>
where
    ID: CorrelationId,
    R: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    async fn resolve(&self, ids: &[ID]) -> Result<Resolved<ID, T>, AssemblyError> {
        let grouped = self.fetch.fetch(ids.to_vec()).await?;
        let values = grouped
            .into_iter()
            .filter_map(|(id, children)| {
                let first = children.into_iter().next()?;
                Some((id, (self.convert)(first)))
            })
            .collect();
        Ok(Resolved::new(values, self.default.clone()))
    }
}

/// Rule resolving a collection of children per correlation id.
///
/// Ids without children resolve to an empty collection.
pub struct OneToMany<ID, R, C> {
    fetch: Arc<dyn Fetch<ID, R>>,
    collection: Arc<dyn Fn() -> C + Send + Sync>,
}

impl<ID, R, C> Rule<ID> for OneToMany<ID, R, C>
where
    ID: CorrelationId,
    R: Send + 'static,
    C: Extend<R> + Clone + Send + Sync + 'static,
{
    type Output = C;

    async fn resolve(&self, ids: &[ID]) -> Result<Resolved<ID, C>, AssemblyError> {
        let grouped = self.fetch.fetch(ids.to_vec()).await?;
        let values = grouped
            .into_iter()
            .filter(|(_, children)| !children.is_empty())
            .map(|(id, children)| {
                let mut collection = (self.collection)();
                collection.extend(children);
                (id, collection)
            })
            .collect();

        let collection = self.collection.clone();
        Ok(Resolved::new(values, Arc::new(move |_: &ID| collection())))
    }
}

/// One child per parent, `default` is used for ids the source has nothing for.
pub fn one_to_one<ID, R>(
    correlation_id: impl Fn(&R) -> ID + Send + Sync + 'static,
    source: RuleMapperSource<ID, R>,
    default: impl Fn(&ID) -> R + Send + Sync + 'static,
) -> OneToOne<ID, R, R>
where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
{
    let context = CacheContext::one_to_one(Arc::new(correlation_id));
    OneToOne {
        fetch: source.bind(context),
        convert: std::convert::identity,
        default: Arc::new(default),
    }
}

/// One optional child per parent, `None` for ids the source has nothing for.
pub fn optional<ID, R>(
    correlation_id: impl Fn(&R) -> ID + Send + Sync + 'static,
    source: RuleMapperSource<ID, R>,
) -> OneToOne<ID, R, Option<R>>
where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
{
    let context = CacheContext::one_to_one(Arc::new(correlation_id));
    OneToOne {
        fetch: source.bind(context),
        convert: Some,
        default: Arc::new(|_: &ID| None),
    }
}

/// Any number of children per parent, collected into a `Vec`.
///
/// `element_id` identifies a child within its parent's collection. Caches use it to merge change
/// events: an update replaces the child with the same element id, a removal deletes it.
pub fn one_to_many<ID, R, EID>(
    correlation_id: impl Fn(&R) -> ID + Send + Sync + 'static,
    element_id: impl Fn(&R) -> EID + Send + Sync + 'static,
    source: RuleMapperSource<ID, R>,
) -> OneToMany<ID, R, Vec<R>>
where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
    EID: PartialEq,
{
    one_to_many_with(correlation_id, element_id, source, Vec::new)
}

/// Any number of children per parent, collected into a custom collection.
pub fn one_to_many_with<ID, R, EID, C>(
    correlation_id: impl Fn(&R) -> ID + Send + Sync + 'static,
    element_id: impl Fn(&R) -> EID + Send + Sync + 'static,
    source: RuleMapperSource<ID, R>,
    collection: impl Fn() -> C + Send + Sync + 'static,
) -> OneToMany<ID, R, C>
where
    ID: CorrelationId,
    R: Clone + Send + Sync + 'static,
    EID: PartialEq,
    C: Extend<R> + Clone + Send + Sync + 'static,
{
    let context = CacheContext::one_to_many(
        Arc::new(correlation_id),
        Arc::new(move |a: &R, b: &R| element_id(a) == element_id(b)),
    );
    OneToMany {
        fetch: source.bind(context),
        collection: Arc::new(collection),
    }
}
