// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use futures_util::stream;
use stitch_store::cache::CacheStoreTestExt;
use stitch_store::memory::MemoryStore;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::auto_cache::{AutoCacheBuilder, AutoCacheState, CacheEvent};
use crate::cache::{self, CacheContext, CacheFactory};
use crate::error::AssemblyError;
use crate::rule::{self, Rule};
use crate::test_utils::{BillingInfo, CallLog, OrderItem, billing_infos, order_items, setup_logging};

/// Feed which stays open until the returned sender is dropped.
fn channel_feed<T>() -> (mpsc::UnboundedSender<T>, impl Stream<Item = T> + Send + 'static)
where
    T: Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, UnboundedReceiverStream::new(rx))
}

#[tokio::test]
async fn never_queries_source() {
    setup_logging();

    let log = CallLog::default();
    let auto_cache = AutoCacheBuilder::new(stream::iter([
        CacheEvent::Updated(BillingInfo::new(1, "a")),
        CacheEvent::Updated(BillingInfo::new(2, "b")),
    ]));
    let status = auto_cache.status();
    assert!(matches!(status.current(), AutoCacheState::Unstarted));

    let rule = rule::one_to_one(
        |billing: &BillingInfo| billing.customer_id,
        billing_infos(log.clone(), &[]).cached(auto_cache),
        BillingInfo::missing,
    );

    let resolved = rule.resolve(&[1, 2, 3]).await.unwrap();
    assert_eq!(resolved.get(&1), BillingInfo::new(1, "a"));
    assert_eq!(resolved.get(&2), BillingInfo::new(2, "b"));
    // Unknown to the feed, resolves to the default.
    assert_eq!(resolved.get(&3), BillingInfo::missing(&3));
    assert_eq!(log.count(), 0);

    assert!(matches!(status.current(), AutoCacheState::Running | AutoCacheState::Stopped));
}

#[tokio::test]
async fn apply_events_in_delivery_order() {
    for max_window_size in [1, 10] {
        let auto_cache = AutoCacheBuilder::new(stream::iter([
            CacheEvent::Updated(BillingInfo::new(2, "A")),
            CacheEvent::Updated(BillingInfo::new(2, "B")),
        ]))
        .max_window_size(max_window_size);
        let mut status = auto_cache.status();

        let rule = rule::optional(
            |billing: &BillingInfo| billing.customer_id,
            billing_infos(CallLog::default(), &[]).cached(auto_cache),
        );

        // Trigger the subscription and wait until the whole feed was consumed.
        rule.resolve(&[2]).await.unwrap();
        assert!(matches!(status.finished().await, AutoCacheState::Stopped));

        let resolved = rule.resolve(&[2]).await.unwrap();
        assert_eq!(resolved.get(&2), Some(BillingInfo::new(2, "B")));
    }
}

#[tokio::test]
async fn merge_elements_by_id() {
    let store = MemoryStore::<u64, Vec<OrderItem>>::new();
    let auto_cache = AutoCacheBuilder::new(stream::iter([
        CacheEvent::Updated(OrderItem::new(11, 1, "book")),
        CacheEvent::Updated(OrderItem::new(12, 1, "lamp")),
        CacheEvent::Updated(OrderItem::new(21, 2, "chair")),
        CacheEvent::Removed(OrderItem::new(11, 1, "book")),
        CacheEvent::Updated(OrderItem::new(12, 1, "desk lamp")),
        CacheEvent::Removed(OrderItem::new(21, 2, "chair")),
    ]))
    .store(cache::store(store.clone()));
    let mut status = auto_cache.status();

    let log = CallLog::default();
    let rule = rule::one_to_many(
        |order: &OrderItem| order.customer_id,
        |order: &OrderItem| order.order_item_id,
        order_items(log.clone(), &[]).cached(auto_cache),
    );

    rule.resolve(&[1]).await.unwrap();
    status.finished().await;

    let resolved = rule.resolve(&[1, 2]).await.unwrap();
    assert_eq!(resolved.get(&1), vec![OrderItem::new(12, 1, "desk lamp")]);
    assert!(resolved.get(&2).is_empty());

    // Entry of customer 2 was dropped once its last element got removed.
    assert_eq!(store.entries_len().await, 1);
    assert_eq!(log.count(), 0);
}

#[tokio::test]
async fn init_failure() {
    let auto_cache = AutoCacheBuilder::<u64, BillingInfo>::from_try_stream(stream::iter([Err(
        io::Error::other("subscription refused"),
    )]));

    let rule = rule::optional(
        |billing: &BillingInfo| billing.customer_id,
        billing_infos(CallLog::default(), &[]).cached(auto_cache),
    );

    let result = rule.resolve(&[1]).await;
    assert!(matches!(result, Err(AssemblyError::AutoCacheInit(_))));

    // Failure is sticky.
    let result = rule.resolve(&[1]).await;
    assert!(matches!(result, Err(AssemblyError::AutoCacheInit(_))));
}

#[tokio::test]
async fn feed_failure_after_init() {
    let (tx, feed) = channel_feed::<Result<CacheEvent<BillingInfo>, io::Error>>();
    let auto_cache = AutoCacheBuilder::from_try_stream(feed)
        .max_window_size(10)
        .max_window_delay(Duration::from_millis(10));
    let mut status = auto_cache.status();

    let rule = rule::optional(
        |billing: &BillingInfo| billing.customer_id,
        billing_infos(CallLog::default(), &[]).cached(auto_cache),
    );

    tx.send(Ok(CacheEvent::Updated(BillingInfo::new(1, "a")))).unwrap();
    let resolved = rule.resolve(&[1]).await.unwrap();
    assert_eq!(resolved.get(&1), Some(BillingInfo::new(1, "a")));
    assert!(matches!(status.current(), AutoCacheState::Running));

    tx.send(Err(io::Error::other("connection lost"))).unwrap();
    assert!(matches!(
        status.finished().await,
        AutoCacheState::Failed(AssemblyError::AutoCacheFeed(_))
    ));

    let result = rule.resolve(&[1]).await;
    assert!(matches!(result, Err(AssemblyError::AutoCacheFeed(_))));
}

#[tokio::test]
async fn subscribe_on_first_lookup() {
    let (tx, feed) = channel_feed::<CacheEvent<BillingInfo>>();
    let auto_cache = AutoCacheBuilder::new(feed).max_window_delay(Duration::from_millis(10));
    let status = auto_cache.status();

    let context = CacheContext::one_to_one(Arc::new(|billing: &BillingInfo| billing.customer_id));
    let cache = Box::new(auto_cache).create(&context);

    // Creating the cache does not subscribe yet.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(matches!(status.current(), AutoCacheState::Unstarted));

    tx.send(CacheEvent::Updated(BillingInfo::new(1, "a"))).unwrap();
    let lookup = cache.get_all(&[1, 2]).await.unwrap();
    assert_eq!(lookup.hits.len(), 1);
    assert!(lookup.misses.is_empty());

    // Dropping the cache aborts the task consuming the feed.
    drop(cache);
    tokio::time::timeout(Duration::from_secs(1), tx.closed())
        .await
        .expect("feed should be dropped");
}

#[tokio::test]
async fn custom_event_types() {
    #[derive(Clone)]
    enum BillingChange {
        Created(BillingInfo),
        Deleted(BillingInfo),
    }

    let auto_cache = AutoCacheBuilder::from_events(
        stream::iter([
            BillingChange::Created(BillingInfo::new(1, "a")),
            BillingChange::Created(BillingInfo::new(2, "b")),
            BillingChange::Deleted(BillingInfo::new(1, "a")),
        ]),
        |change: &BillingChange| matches!(change, BillingChange::Created(_)),
        |change: BillingChange| match change {
            BillingChange::Created(billing) | BillingChange::Deleted(billing) => billing,
        },
    );
    let mut status = auto_cache.status();

    let rule = rule::optional(
        |billing: &BillingInfo| billing.customer_id,
        billing_infos(CallLog::default(), &[]).cached(auto_cache),
    );

    rule.resolve(&[1]).await.unwrap();
    status.finished().await;

    let resolved = rule.resolve(&[1, 2]).await.unwrap();
    assert_eq!(resolved.get(&1), None);
    assert_eq!(resolved.get(&2), Some(BillingInfo::new(2, "b")));
}

#[tokio::test]
async fn completed_feed_keeps_serving() {
    let auto_cache = AutoCacheBuilder::new(stream::empty::<CacheEvent<BillingInfo>>());
    let mut status = auto_cache.status();

    let log = CallLog::default();
    let rule = rule::one_to_one(
        |billing: &BillingInfo| billing.customer_id,
        billing_infos(log.clone(), &[]).cached(auto_cache),
        BillingInfo::missing,
    );

    let resolved = rule.resolve(&[7]).await.unwrap();
    assert_eq!(resolved.get(&7), BillingInfo::missing(&7));
    assert!(matches!(status.ready().await, AutoCacheState::Stopped));
    assert_eq!(log.count(), 0);
}

#[tokio::test]
async fn idle_feed_resolves_defaults() {
    let log = CallLog::default();
    let auto_cache = AutoCacheBuilder::new(stream::pending::<CacheEvent<BillingInfo>>());
    let status = auto_cache.status();

    let rule = rule::optional(
        |billing: &BillingInfo| billing.customer_id,
        billing_infos(log.clone(), &[]).cached(auto_cache),
    );

    // First lookup waits at most for the initialisation timeout.
    let resolved = tokio::time::timeout(Duration::from_secs(2), rule.resolve(&[1]))
        .await
        .expect("lookup against idle feed should not hang")
        .unwrap();
    assert_eq!(resolved.get(&1), None);
    assert!(matches!(status.current(), AutoCacheState::Starting));

    // Once the timeout passed, lookups do not wait anymore.
    let resolved = tokio::time::timeout(Duration::from_millis(100), rule.resolve(&[1, 2]))
        .await
        .expect("lookup after timeout should not wait")
        .unwrap();
    assert_eq!(resolved.get(&2), None);
    assert_eq!(log.count(), 0);
}

#[tokio::test]
async fn events_after_idle_start() {
    let (tx, feed) = channel_feed::<CacheEvent<BillingInfo>>();
    let auto_cache = AutoCacheBuilder::new(feed)
        .init_timeout(Duration::from_millis(10))
        .max_window_delay(Duration::from_millis(5));
    let mut status = auto_cache.status();

    let rule = rule::optional(
        |billing: &BillingInfo| billing.customer_id,
        billing_infos(CallLog::default(), &[]).cached(auto_cache),
    );

    assert_eq!(rule.resolve(&[1]).await.unwrap().get(&1), None);

    tx.send(CacheEvent::Updated(BillingInfo::new(1, "a"))).unwrap();
    assert!(matches!(status.ready().await, AutoCacheState::Running));

    let resolved = rule.resolve(&[1]).await.unwrap();
    assert_eq!(resolved.get(&1), Some(BillingInfo::new(1, "a")));
}
