// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stream-based assembler joining parent entities with child entities from batched data sources.
//!
//! An [`Assembler`] consumes windows of parents (for example customers) and emits one aggregate per
//! parent (for example a transaction with the customer's billing info and order items). Children
//! are described by [rules](rule): each rule binds a batched [source](source::RuleMapperSource)
//! to one field of the aggregate and says how many children a parent has and what to use when
//! there are none.
//!
//! Every rule queries its source at most once per window, with all distinct correlation ids of
//! the parents in it. Sources can be fronted by [cache layers](cache), including an
//! [auto-cache](auto_cache) which is kept up-to-date by a stream of change events and never
//! queries the source at all.
//!
//! ```rust
//! # use std::convert::Infallible;
//! # use futures_util::{stream, StreamExt};
//! # use stitch_stream::{AssemblerBuilder, AssembleExt, cache, rule};
//! # use stitch_stream::source::RuleMapperSource;
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! #[derive(Clone, Debug)]
//! struct Customer { id: u64 }
//!
//! #[derive(Clone, Debug)]
//! struct Order { id: u64, customer_id: u64 }
//!
//! #[derive(Debug)]
//! struct Summary { customer: Customer, orders: Vec<Order> }
//!
//! let orders = RuleMapperSource::from_future(|ids: Vec<u64>| async move {
//!     let orders: Vec<_> = ids
//!         .into_iter()
//!         .map(|customer_id| Order { id: customer_id * 10, customer_id })
//!         .collect();
//!     Ok::<_, Infallible>(orders)
//! })
//! .cached(cache::memory());
//!
//! let assembler = AssemblerBuilder::new(|customer: &Customer| customer.id)
//!     .rules((rule::one_to_many(
//!         |order: &Order| order.customer_id,
//!         |order: &Order| order.id,
//!         orders,
//!     ),))
//!     .build(|customer: Customer, orders: Vec<Order>| Summary { customer, orders });
//!
//! let windows = stream::iter([vec![Customer { id: 1 }, Customer { id: 2 }]]);
//! let summaries: Vec<_> = windows.assemble(&assembler).collect().await;
//! assert_eq!(summaries.len(), 2);
//! # }
//! ```
mod assembler;
pub mod auto_cache;
pub mod cache;
pub mod config;
mod error;
pub mod rule;
mod rules;
pub mod source;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
mod utils;

use std::fmt::Debug;
use std::hash::Hash as StdHash;

pub use assembler::{Assemble, AssembleExt, Assembler, AssemblerBuilder, RulesBuilder, windows};
pub use error::{AssemblyError, BoxError, SharedError};
pub use rules::{Constructor, Rules};

/// Identifier correlating parents with their children, for example a customer id.
pub trait CorrelationId: Clone + Eq + StdHash + Debug + Send + Sync + 'static {}

impl<T> CorrelationId for T where T: Clone + Eq + StdHash + Debug + Send + Sync + 'static {}
