//! Single-tick drain behavior.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sum_outbox::bus::{InMemoryBus, PARTITION_HEADER};
use sum_outbox::outbox::{DrainerConfig, InMemoryOutboxStore, OutboxStore, StorageError};

use crate::support::{drainer_for, fast_config, seed, FlakyStore};

#[tokio::test]
async fn single_record_is_published_and_marked() {
    let store = InMemoryOutboxStore::new();
    let bus = InMemoryBus::new();
    let records = seed(&store, &[30]).await;
    assert_eq!(store.list_pending().await.unwrap().len(), 1);

    let result = drainer_for(Arc::new(store.clone()), &bus, fast_config())
        .drain_once()
        .await
        .unwrap();

    assert_eq!(result.pending, 1);
    assert_eq!(result.published, 1);
    assert!(store.list_pending().await.unwrap().is_empty());

    let stored = store.get(records[0].id).unwrap().unwrap();
    assert!(stored.sent_at.is_some());

    let messages = bus.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].key, records[0].id.to_string());
    assert_eq!(messages[0].partition, Some(1));
    assert_eq!(messages[0].header(PARTITION_HEADER), Some("1"));
    assert_eq!(messages[0].decode().unwrap().sum, 30);
}

#[tokio::test]
async fn rejected_record_stays_pending_until_next_tick() {
    let store = InMemoryOutboxStore::new();
    let bus = InMemoryBus::new();
    let records = seed(&store, &[10, 20]).await;
    bus.reject_when(|m| m.decode().map(|e| e.sum == 10).unwrap_or(false));

    let drainer = drainer_for(Arc::new(store.clone()), &bus, fast_config());
    let first = drainer.drain_once().await.unwrap();

    assert_eq!(first.published, 1);
    assert_eq!(first.publish_failed, 1);
    let pending = store.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, records[0].id);
    assert_eq!(pending[0].attempts, 1);

    bus.accept_all();
    let second = drainer.drain_once().await.unwrap();

    assert_eq!(second.pending, 1);
    assert_eq!(second.published, 1);
    assert!(store.list_pending().await.unwrap().is_empty());
    assert_eq!(bus.count_key(&records[0].id.to_string()), 1);
    assert_eq!(bus.count_key(&records[1].id.to_string()), 1);
}

#[tokio::test]
async fn outage_leaves_everything_pending() {
    let store = InMemoryOutboxStore::new();
    let bus = InMemoryBus::new();
    seed(&store, &[1, 2, 3]).await;
    bus.set_available(false);

    let drainer = drainer_for(Arc::new(store.clone()), &bus, fast_config());
    let result = drainer.drain_once().await.unwrap();

    assert_eq!(result.publish_failed, 3);
    assert_eq!(store.list_pending().await.unwrap().len(), 3);
    assert!(bus.is_empty());

    bus.set_available(true);
    let result = drainer.drain_once().await.unwrap();
    assert_eq!(result.published, 3);
    assert!(store.list_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn unmarked_record_is_published_again() {
    let store = Arc::new(FlakyStore::new(InMemoryOutboxStore::new()));
    let bus = InMemoryBus::new();
    let records = seed(&store, &[7]).await;
    let key = records[0].id.to_string();

    let drainer = drainer_for(store.clone(), &bus, fast_config());

    store.fail_mark(true);
    let result = drainer.drain_once().await.unwrap();
    assert_eq!(result.mark_failed, 1);
    assert_eq!(store.inner.list_pending().await.unwrap().len(), 1);
    assert_eq!(bus.count_key(&key), 1);

    store.fail_mark(false);
    let result = drainer.drain_once().await.unwrap();
    assert_eq!(result.published, 1);
    assert!(store.inner.list_pending().await.unwrap().is_empty());

    // Delivered twice under the same key; consumers deduplicate.
    assert_eq!(bus.count_key(&key), 2);
}

#[tokio::test]
async fn listing_failure_aborts_the_tick() {
    let store = Arc::new(FlakyStore::new(InMemoryOutboxStore::new()));
    let bus = InMemoryBus::new();
    seed(&store, &[5]).await;
    store.fail_list(true);

    let err = drainer_for(store.clone(), &bus, fast_config())
        .drain_once()
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Unavailable(_)));
    assert_eq!(bus.write_attempts(), 0);
    assert_eq!(store.mark_calls(), 0);
}

#[tokio::test]
async fn slow_ack_times_out_and_stays_pending() {
    let store = InMemoryOutboxStore::new();
    let bus = InMemoryBus::new();
    let records = seed(&store, &[4]).await;
    bus.set_latency(Duration::from_millis(200));

    let config = DrainerConfig {
        send_timeout: Duration::from_millis(20),
        ..fast_config()
    };
    let result = drainer_for(Arc::new(store.clone()), &bus, config)
        .drain_once()
        .await
        .unwrap();

    assert_eq!(result.publish_failed, 1);
    let stored = store.get(records[0].id).unwrap().unwrap();
    assert!(stored.is_pending());
    assert_eq!(stored.attempts, 1);
    assert!(stored.last_error.unwrap().contains("acknowledgment"));
}

#[tokio::test]
async fn in_flight_sends_are_bounded() {
    let store = InMemoryOutboxStore::new();
    let bus = InMemoryBus::new();
    seed(&store, &[1, 2, 3, 4, 5, 6]).await;
    bus.set_latency(Duration::from_millis(40));

    let config = DrainerConfig {
        max_in_flight: 2,
        ..fast_config()
    };
    let started = Instant::now();
    let result = drainer_for(Arc::new(store.clone()), &bus, config)
        .drain_once()
        .await
        .unwrap();

    assert_eq!(result.published, 6);
    // Six sends, two at a time, 40ms each.
    assert!(started.elapsed() >= Duration::from_millis(120));
}

#[tokio::test]
async fn overlapping_drains_deliver_at_least_once() {
    let store = InMemoryOutboxStore::new();
    let bus = InMemoryBus::new();
    let records = seed(&store, &[1, 2, 3]).await;
    bus.set_latency(Duration::from_millis(10));

    let a = drainer_for(Arc::new(store.clone()), &bus, fast_config());
    let b = drainer_for(Arc::new(store.clone()), &bus, fast_config());
    let (ra, rb) = tokio::join!(a.drain_once(), b.drain_once());
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert!(store.list_pending().await.unwrap().is_empty());
    assert!(ra.published + rb.published >= 3);
    for record in &records {
        assert!(bus.count_key(&record.id.to_string()) >= 1);
        assert!(store.get(record.id).unwrap().unwrap().sent_at.is_some());
    }
}
