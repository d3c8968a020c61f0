// SPDX-License-Identifier: MIT OR Apache-2.0

use std::convert::Infallible;
use std::io;
use std::pin::pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_test::task::noop_context;
use futures_util::{StreamExt, future, stream};

use crate::assembler::AssembleExt;
use crate::cache;
use crate::config::{AssembleConfig, WindowConfig};
use crate::error::AssemblyError;
use crate::source::RuleMapperSource;
use crate::test_utils::{
    BillingInfo, CallLog, Customer, Transaction, billing_infos, order_items, repeated_customers,
    setup_logging, transaction_assembler,
};

fn windows_of_three(times: usize) -> Vec<Vec<Customer>> {
    repeated_customers(times)
        .chunks(3)
        .map(|window| window.to_vec())
        .collect()
}

fn assert_transactions(transactions: &[Transaction]) {
    assert_eq!(transactions.len(), 9);
    for (index, transaction) in transactions.iter().enumerate() {
        let customer_id = index as u64 % 3 + 1;
        assert_eq!(transaction.customer, Customer::new(customer_id));
        assert_eq!(transaction.billing_info.customer_id, customer_id);
        assert!(
            transaction
                .order_items
                .iter()
                .all(|order| order.customer_id == customer_id)
        );
    }

    // Customer 2 has no billing info and gets the default.
    assert_eq!(transactions[1].billing_info, BillingInfo::missing(&2));
    assert_eq!(transactions[0].billing_info, BillingInfo::new(1, "card-1"));

    // Customer 3 has no orders and gets an empty collection.
    assert!(transactions[2].order_items.is_empty());
    assert_eq!(transactions[1].order_items.len(), 2);
}

#[tokio::test]
async fn resolve_every_window() {
    setup_logging();

    let billing_log = CallLog::default();
    let orders_log = CallLog::default();
    let assembler = transaction_assembler(
        billing_infos(billing_log.clone(), &[2]),
        order_items(orders_log.clone(), &[3]),
    );

    let transactions: Vec<Transaction> = stream::iter(windows_of_three(3))
        .assemble(&assembler)
        .map(Result::unwrap)
        .collect()
        .await;

    assert_transactions(&transactions);
    assert_eq!(billing_log.count(), 3);
    assert_eq!(orders_log.count(), 3);
}

#[tokio::test]
async fn cached_sources_are_queried_once() {
    let billing_log = CallLog::default();
    let orders_log = CallLog::default();
    let assembler = transaction_assembler(
        billing_infos(billing_log.clone(), &[2]).cached(cache::memory()),
        order_items(orders_log.clone(), &[3]).cached(cache::memory()),
    );

    let transactions: Vec<Transaction> = stream::iter(windows_of_three(3))
        .assemble(&assembler)
        .map(Result::unwrap)
        .collect()
        .await;

    assert_transactions(&transactions);
    assert_eq!(billing_log.count(), 1);
    assert_eq!(orders_log.count(), 1);
}

#[tokio::test]
async fn duplicates_keep_order() {
    let billing_log = CallLog::default();
    let assembler = transaction_assembler(
        billing_infos(billing_log.clone(), &[]),
        order_items(CallLog::default(), &[]),
    );

    let transactions = assembler
        .process(vec![Customer::new(1), Customer::new(2), Customer::new(1)])
        .await
        .unwrap();

    assert_eq!(transactions.len(), 3);
    assert_eq!(transactions[0].customer.customer_id, 1);
    assert_eq!(transactions[1].customer.customer_id, 2);
    assert_eq!(transactions[0], transactions[2]);

    // One call with the distinct ids only.
    assert_eq!(billing_log.calls(), vec![vec![1, 2]]);
}

#[tokio::test]
async fn empty_windows() {
    let billing_log = CallLog::default();
    let assembler = transaction_assembler(
        billing_infos(billing_log.clone(), &[]),
        order_items(CallLog::default(), &[]),
    );

    assert!(assembler.process(Vec::new()).await.unwrap().is_empty());
    assert_eq!(billing_log.count(), 0);
}

#[tokio::test]
async fn failing_window_does_not_stop_stream() {
    let billing = RuleMapperSource::from_stream(|ids: Vec<u64>| {
        stream::iter(ids.into_iter().map(|id| {
            if id == 99 {
                Err(io::Error::other("billing service unavailable"))
            } else {
                Ok(BillingInfo::new(id, "card"))
            }
        }))
    });
    let assembler = transaction_assembler(billing, order_items(CallLog::default(), &[]));

    let windows = vec![
        vec![Customer::new(1)],
        vec![Customer::new(99), Customer::new(2)],
        vec![Customer::new(3)],
    ];
    let results: Vec<_> = stream::iter(windows).assemble(&assembler).collect().await;

    // The failing window yields a single error and none of its aggregates.
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().customer.customer_id, 1);
    assert!(matches!(results[1], Err(AssemblyError::Source(_))));
    assert_eq!(results[2].as_ref().unwrap().customer.customer_id, 3);
}

#[tokio::test]
async fn concurrent_windows_keep_order() {
    let completed = Arc::new(Mutex::new(Vec::new()));
    let billing = RuleMapperSource::from_future({
        let completed = completed.clone();
        move |ids: Vec<u64>| {
            let completed = completed.clone();
            async move {
                // First window takes the longest.
                let delay = if ids.contains(&1) { 50 } else { 5 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                completed.lock().unwrap().extend(ids.iter().copied());
                let billing_infos: Vec<_> = ids
                    .into_iter()
                    .map(|id| BillingInfo::new(id, "card"))
                    .collect();
                Ok::<_, Infallible>(billing_infos)
            }
        }
    });
    let assembler = transaction_assembler(billing, order_items(CallLog::default(), &[]));

    let windows = (1..=3).map(|id| vec![Customer::new(id)]);
    let transactions: Vec<Transaction> = assembler
        .assemble_with(
            stream::iter(windows),
            AssembleConfig::default().max_concurrent_windows(3),
        )
        .map(Result::unwrap)
        .collect()
        .await;

    let ids: Vec<u64> = transactions
        .iter()
        .map(|transaction| transaction.customer.customer_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);

    // Later windows finished first but were held back.
    assert_eq!(completed.lock().unwrap().last(), Some(&1));
}

#[tokio::test]
async fn no_partial_aggregates() {
    let billing = RuleMapperSource::from_future(|_ids: Vec<u64>| {
        future::pending::<Result<Vec<BillingInfo>, Infallible>>()
    });
    let assembler = transaction_assembler(billing, order_items(CallLog::default(), &[]));

    let mut transactions =
        stream::iter([vec![Customer::new(1), Customer::new(2)]]).assemble(&assembler);

    // Orders are resolved, billing never is: nothing may be emitted.
    let mut cx = noop_context();
    assert!(transactions.poll_next_unpin(&mut cx).is_pending());
    assert!(transactions.poll_next_unpin(&mut cx).is_pending());
}

#[tokio::test]
async fn window_parent_stream() {
    let billing_log = CallLog::default();
    let orders_log = CallLog::default();
    let assembler = transaction_assembler(
        billing_infos(billing_log.clone(), &[2]),
        order_items(orders_log.clone(), &[3]),
    );

    let transactions = pin!(assembler.assemble_parents(
        stream::iter(repeated_customers(3)),
        WindowConfig::default().max_size(3),
        AssembleConfig::default(),
    ));
    let transactions: Vec<Transaction> = transactions.map(Result::unwrap).collect().await;

    assert_transactions(&transactions);
    assert!(billing_log.calls().iter().all(|ids| ids.len() <= 3));
    assert_eq!(orders_log.count(), 3);
}

#[tokio::test]
async fn concurrent_windows_share_cache() {
    let log = CallLog::default();
    let billing = RuleMapperSource::from_future({
        let log = log.clone();
        move |ids: Vec<u64>| {
            log.record(&ids);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let billing_infos: Vec<_> = ids
                    .into_iter()
                    .map(|id| BillingInfo::new(id, "card"))
                    .collect();
                Ok::<_, Infallible>(billing_infos)
            }
        }
    })
    .cached(cache::memory());
    let assembler = transaction_assembler(billing, order_items(CallLog::default(), &[]));

    let transactions: Vec<Transaction> = assembler
        .assemble_with(
            stream::iter(windows_of_three(3)),
            AssembleConfig::default().max_concurrent_windows(3),
        )
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(transactions.len(), 9);
    // Windows waiting for the first one find everything cached.
    assert_eq!(log.calls(), vec![vec![1, 2, 3]]);
}
