// SPDX-License-Identifier: MIT OR Apache-2.0

use std::marker::PhantomData;
use std::sync::Arc;

use crate::CorrelationId;
use crate::assembler::{Assembler, Inner};
use crate::rules::{Constructor, Rules};

/// Builder for an [`Assembler`].
///
/// ```rust
/// # use std::convert::Infallible;
/// # use futures_util::stream;
/// # use stitch_stream::{AssemblerBuilder, rule};
/// # use stitch_stream::source::RuleMapperSource;
/// #[derive(Clone)]
/// struct Customer { id: u64 }
///
/// #[derive(Clone)]
/// struct Billing { customer_id: u64 }
///
/// struct Statement { customer: Customer, billing: Option<Billing> }
///
/// let billings = RuleMapperSource::from_stream(|ids: Vec<u64>| {
///     stream::iter(ids.into_iter().map(|customer_id| Ok::<_, Infallible>(Billing { customer_id })))
/// });
///
/// let assembler = AssemblerBuilder::new(|customer: &Customer| customer.id)
///     .rules((rule::optional(|billing: &Billing| billing.customer_id, billings),))
///     .build(|customer: Customer, billing: Option<Billing>| Statement { customer, billing });
/// ```
pub struct AssemblerBuilder<P, ID> {
    correlation_id: Arc<dyn Fn(&P) -> ID + Send + Sync>,
}

impl<P, ID> AssemblerBuilder<P, ID>
where
    ID: CorrelationId,
{
    /// Starts building an assembler for parents keyed by `correlation_id`.
    pub fn new(correlation_id: impl Fn(&P) -> ID + Send + Sync + 'static) -> Self {
        Self {
            correlation_id: Arc::new(correlation_id),
        }
    }

    /// Sets the rules, given as a tuple with one rule per field of the aggregate.
    pub fn rules<Rs>(self, rules: Rs) -> RulesBuilder<P, ID, Rs>
    where
        Rs: Rules<ID>,
    {
        RulesBuilder {
            correlation_id: self.correlation_id,
            rules,
        }
    }
}

pub struct RulesBuilder<P, ID, Rs> {
    correlation_id: Arc<dyn Fn(&P) -> ID + Send + Sync>,
    rules: Rs,
}

impl<P, ID, Rs> RulesBuilder<P, ID, Rs>
where
    ID: CorrelationId,
    Rs: Rules<ID>,
{
    /// Completes the assembler with the function building aggregates.
    ///
    /// The constructor is called with the parent followed by one field value per rule, in rule
    /// order.
    pub fn build<C, A>(self, constructor: C) -> Assembler<P, ID, Rs, C, A>
    where
        C: Constructor<P, Rs::Fields, A>,
    {
        Assembler {
            inner: Arc::new(Inner {
                correlation_id: self.correlation_id,
                rules: self.rules,
                constructor,
            }),
            _marker: PhantomData,
        }
    }
}
