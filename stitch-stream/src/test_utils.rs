// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixtures shared by unit and integration tests: customers joined with their billing info and
//! order items, and data sources recording how they were called.
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use futures_util::stream;

use crate::assembler::{Assembler, AssemblerBuilder};
use crate::rule::{self, OneToMany, OneToOne};
use crate::source::RuleMapperSource;

pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Customer {
    pub customer_id: u64,
    pub name: String,
}

impl Customer {
    pub fn new(customer_id: u64) -> Self {
        Self {
            customer_id,
            name: format!("customer-{customer_id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BillingInfo {
    pub customer_id: u64,
    pub credit_card: String,
}

impl BillingInfo {
    pub fn new(customer_id: u64, credit_card: &str) -> Self {
        Self {
            customer_id,
            credit_card: credit_card.to_string(),
        }
    }

    /// Placeholder for customers without billing info.
    pub fn missing(customer_id: &u64) -> Self {
        Self::new(*customer_id, "none")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderItem {
    pub order_item_id: u64,
    pub customer_id: u64,
    pub product: String,
}

impl OrderItem {
    pub fn new(order_item_id: u64, customer_id: u64, product: &str) -> Self {
        Self {
            order_item_id,
            customer_id,
            product: product.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub customer: Customer,
    pub billing_info: BillingInfo,
    pub order_items: Vec<OrderItem>,
}

impl Transaction {
    pub fn new(customer: Customer, billing_info: BillingInfo, order_items: Vec<OrderItem>) -> Self {
        Self {
            customer,
            billing_info,
            order_items,
        }
    }
}

/// Records the ids every call of a data source was made with.
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Vec<u64>>>>,
}

impl CallLog {
    pub fn record(&self, ids: &[u64]) {
        self.calls.lock().unwrap().push(ids.to_vec());
    }

    /// Number of calls made so far.
    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Ids of every call, in call order.
    pub fn calls(&self) -> Vec<Vec<u64>> {
        self.calls.lock().unwrap().clone()
    }
}

/// Streaming source returning one billing info per requested customer.
///
/// Customers with ids in `without_billing` have none.
pub fn billing_infos(log: CallLog, without_billing: &[u64]) -> RuleMapperSource<u64, BillingInfo> {
    let without_billing = without_billing.to_vec();
    RuleMapperSource::from_stream(move |ids: Vec<u64>| {
        log.record(&ids);
        let billing_infos: Vec<_> = ids
            .into_iter()
            .filter(|id| !without_billing.contains(id))
            .map(|id| Ok::<_, Infallible>(BillingInfo::new(id, &format!("card-{id}"))))
            .collect();
        stream::iter(billing_infos)
    })
}

/// Non-streaming source returning two order items per requested customer.
///
/// Customers with ids in `without_orders` have none.
pub fn order_items(log: CallLog, without_orders: &[u64]) -> RuleMapperSource<u64, OrderItem> {
    let without_orders = without_orders.to_vec();
    RuleMapperSource::from_future(move |ids: Vec<u64>| {
        log.record(&ids);
        let ids: Vec<u64> = ids
            .into_iter()
            .filter(|id| !without_orders.contains(id))
            .collect();
        async move {
            let order_items: Vec<_> = ids
                .into_iter()
                .flat_map(|id| {
                    [
                        OrderItem::new(id * 10 + 1, id, "book"),
                        OrderItem::new(id * 10 + 2, id, "lamp"),
                    ]
                })
                .collect();
            Ok::<_, Infallible>(order_items)
        }
    })
}

/// Customers 1, 2 and 3, repeated `times` times.
pub fn repeated_customers(times: usize) -> Vec<Customer> {
    (0..times)
        .flat_map(|_| (1..=3).map(Customer::new))
        .collect()
}

pub type TransactionAssembler = Assembler<
    Customer,
    u64,
    (
        OneToOne<u64, BillingInfo, BillingInfo>,
        OneToMany<u64, OrderItem, Vec<OrderItem>>,
    ),
    fn(Customer, BillingInfo, Vec<OrderItem>) -> Transaction,
    Transaction,
>;

/// Assembler joining customers with their billing info and order items.
pub fn transaction_assembler(
    billing_infos: RuleMapperSource<u64, BillingInfo>,
    order_items: RuleMapperSource<u64, OrderItem>,
) -> TransactionAssembler {
    AssemblerBuilder::new(|customer: &Customer| customer.customer_id)
        .rules((
            rule::one_to_one(
                |billing: &BillingInfo| billing.customer_id,
                billing_infos,
                BillingInfo::missing,
            ),
            rule::one_to_many(
                |order: &OrderItem| order.customer_id,
                |order: &OrderItem| order.order_item_id,
                order_items,
            ),
        ))
        .build(Transaction::new as fn(_, _, _) -> _)
}
