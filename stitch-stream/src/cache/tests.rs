// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stitch_store::cache::{CacheStore, CacheStoreTestExt};
use stitch_store::memory::MemoryStore;

use crate::cache::{self, CacheContext, CacheFactory, observable};
use crate::test_utils::{BillingInfo, CallLog, OrderItem, billing_infos, order_items};

fn billing_context() -> CacheContext<u64, BillingInfo> {
    CacheContext::one_to_one(Arc::new(|billing: &BillingInfo| billing.customer_id))
}

fn order_context() -> CacheContext<u64, OrderItem> {
    CacheContext::one_to_many(
        Arc::new(|order: &OrderItem| order.customer_id),
        Arc::new(|a: &OrderItem, b: &OrderItem| a.order_item_id == b.order_item_id),
    )
}

#[tokio::test]
async fn cache_hits_skip_source() {
    let log = CallLog::default();
    let fetch = billing_infos(log.clone(), &[])
        .cached(cache::memory())
        .bind(billing_context());

    let result = fetch.fetch(vec![1, 2]).await.unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(log.calls(), vec![vec![1, 2]]);

    // Only the missing id is requested from the source.
    let result = fetch.fetch(vec![1, 2, 3]).await.unwrap();
    assert_eq!(result.len(), 3);
    assert_eq!(result[&3], vec![BillingInfo::new(3, "card-3")]);
    assert_eq!(log.calls(), vec![vec![1, 2], vec![3]]);

    // Everything is cached now.
    fetch.fetch(vec![3, 2, 1]).await.unwrap();
    assert_eq!(log.count(), 2);
}

#[tokio::test]
async fn remember_ids_without_children() {
    let log = CallLog::default();
    let fetch = billing_infos(log.clone(), &[2])
        .cached(cache::memory())
        .bind(billing_context());

    let result = fetch.fetch(vec![1, 2]).await.unwrap();
    assert_eq!(result[&1].len(), 1);
    assert!(result[&2].is_empty());

    let result = fetch.fetch(vec![2]).await.unwrap();
    assert!(result[&2].is_empty());
    assert_eq!(log.count(), 1);
}

#[tokio::test]
async fn write_through_chained_layers() {
    let log = CallLog::default();
    let outer_puts = Arc::new(Mutex::new(Vec::new()));
    let inner_puts = Arc::new(Mutex::new(Vec::new()));
    let inner_store = MemoryStore::<u64, Vec<BillingInfo>>::new();

    let outer = observable(cache::memory()).on_put_all({
        let outer_puts = outer_puts.clone();
        move |entries: &HashMap<u64, Vec<BillingInfo>>| {
            let mut ids: Vec<u64> = entries.keys().copied().collect();
            ids.sort();
            outer_puts.lock().unwrap().push(ids);
        }
    });
    let inner = observable(cache::store(inner_store.clone())).on_put_all({
        let inner_puts = inner_puts.clone();
        move |entries: &HashMap<u64, Vec<BillingInfo>>| {
            let mut ids: Vec<u64> = entries.keys().copied().collect();
            ids.sort();
            inner_puts.lock().unwrap().push(ids);
        }
    });

    // Pre-fill the inner layer with one entry.
    inner_store
        .put_all(HashMap::from([(1, vec![BillingInfo::new(1, "stored")])]))
        .await
        .unwrap();

    let fetch = billing_infos(log.clone(), &[])
        .cached(outer)
        .cached(inner)
        .bind(billing_context());

    let result = fetch.fetch(vec![1, 2]).await.unwrap();
    assert_eq!(result[&1], vec![BillingInfo::new(1, "stored")]);
    assert_eq!(result[&2], vec![BillingInfo::new(2, "card-2")]);

    // Source was only asked for what both layers missed.
    assert_eq!(log.calls(), vec![vec![2]]);

    // Inner layer receives what the source returned, outer layer additionally the inner hits.
    assert_eq!(*inner_puts.lock().unwrap(), vec![vec![2]]);
    assert_eq!(*outer_puts.lock().unwrap(), vec![vec![1, 2]]);
    assert_eq!(inner_store.entries_len().await, 2);

    // Outer layer answers everything by itself now.
    fetch.fetch(vec![1, 2]).await.unwrap();
    assert_eq!(inner_puts.lock().unwrap().len(), 1);
    assert_eq!(outer_puts.lock().unwrap().len(), 1);
    assert_eq!(log.count(), 1);
}

#[tokio::test]
async fn bounded_layer_refetches_evicted() {
    let log = CallLog::default();
    let fetch = billing_infos(log.clone(), &[])
        .cached(cache::bounded(2))
        .bind(billing_context());

    fetch.fetch(vec![1]).await.unwrap();
    fetch.fetch(vec![2]).await.unwrap();
    fetch.fetch(vec![3]).await.unwrap();

    // Id 1 was evicted to make space for 3.
    fetch.fetch(vec![3, 1]).await.unwrap();
    assert_eq!(log.calls(), vec![vec![1], vec![2], vec![3], vec![1]]);
}

#[tokio::test]
async fn compute_all_caches_fetched() {
    let log = CallLog::default();
    let context = order_context();
    let layer = Box::new(cache::memory::<u64, OrderItem>()).create(&context);
    let fetch = order_items(log.clone(), &[]).bind(context);

    let result = layer.compute_all(&[1, 2], fetch.as_ref()).await.unwrap();
    assert_eq!(result[&1].len(), 2);
    assert_eq!(result[&2].len(), 2);

    let result = layer.compute_all(&[2, 1], fetch.as_ref()).await.unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(log.count(), 1);
}

#[test]
fn merge_one_to_one() {
    let context = billing_context();
    let mut entry = vec![BillingInfo::new(1, "a")];

    context.upsert(&mut entry, BillingInfo::new(1, "b"));
    assert_eq!(entry, vec![BillingInfo::new(1, "b")]);

    context.remove(&mut entry, &BillingInfo::new(1, "whatever"));
    assert!(entry.is_empty());
    assert!(!context.is_one_to_many());
}

#[test]
fn merge_one_to_many() {
    let context = order_context();
    let mut entry = vec![OrderItem::new(11, 1, "book")];

    // Same element id replaces, new element id appends.
    context.upsert(&mut entry, OrderItem::new(11, 1, "novel"));
    context.upsert(&mut entry, OrderItem::new(12, 1, "lamp"));
    assert_eq!(
        entry,
        vec![OrderItem::new(11, 1, "novel"), OrderItem::new(12, 1, "lamp")]
    );

    context.remove(&mut entry, &OrderItem::new(11, 1, "novel"));
    assert_eq!(entry, vec![OrderItem::new(12, 1, "lamp")]);
    assert!(context.is_one_to_many());
}
