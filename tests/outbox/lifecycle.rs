//! The spawned drainer loop.

use std::sync::Arc;
use std::time::Duration;

use sum_outbox::bus::InMemoryBus;
use sum_outbox::outbox::{
    DrainerConfig, DrainerState, DrainerStats, InMemoryOutboxStore, OutboxStore,
};
use tokio_util::sync::CancellationToken;

use crate::support::{drainer_for, eventually, fast_config, seed, FlakyStore, PanickingStore};

#[tokio::test]
async fn background_drainer_publishes_new_records() {
    let store = InMemoryOutboxStore::new();
    let bus = InMemoryBus::new();
    let handle = drainer_for(Arc::new(store.clone()), &bus, fast_config()).spawn(CancellationToken::new());

    seed(&store, &[30]).await;
    let check = store.clone();
    assert!(eventually(Duration::from_secs(2), || check.all().unwrap().iter().all(|r| !r.is_pending())).await);

    let stats = handle.stop().await;
    assert_eq!(stats.published, 1);
    assert!(stats.ticks >= 1);
    assert_eq!(bus.len(), 1);
}

#[tokio::test]
async fn storage_errors_do_not_stop_the_loop() {
    let store = Arc::new(FlakyStore::new(InMemoryOutboxStore::new()));
    let bus = InMemoryBus::new();
    seed(&store, &[1]).await;
    store.fail_list(true);

    let handle = drainer_for(store.clone(), &bus, fast_config()).spawn(CancellationToken::new());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(bus.is_empty());

    store.fail_list(false);
    let watcher = bus.clone();
    assert!(eventually(Duration::from_secs(2), || watcher.len() == 1).await);

    let stats = handle.stop().await;
    assert!(stats.poll_errors >= 1);
    assert_eq!(stats.published, 1);
}

#[tokio::test]
async fn cancellation_token_stops_the_drainer() {
    let store = InMemoryOutboxStore::new();
    let bus = InMemoryBus::new();
    let cancel = CancellationToken::new();
    let handle = drainer_for(Arc::new(store.clone()), &bus, fast_config()).spawn(cancel.clone());
    let mut state = handle.subscribe();

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| *s == DrainerState::Stopped))
        .await
        .unwrap()
        .unwrap();

    // Records saved after shutdown are left for the next process.
    seed(&store, &[2]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.list_pending().await.unwrap().len(), 1);
    assert_eq!(handle.state(), DrainerState::Stopped);
}

#[tokio::test]
async fn zero_interval_falls_back_to_default() {
    let store = InMemoryOutboxStore::new();
    let bus = InMemoryBus::new();
    seed(&store, &[3]).await;
    let config = DrainerConfig {
        poll_interval: Duration::ZERO,
        ..fast_config()
    };

    // The first tick fires immediately, the next one only after the default interval.
    let handle = drainer_for(Arc::new(store.clone()), &bus, config).spawn(CancellationToken::new());
    let watcher = bus.clone();
    assert!(eventually(Duration::from_secs(2), || watcher.len() == 1).await);

    let stats = handle.stop().await;
    assert_eq!(stats.ticks, 1);
}

#[tokio::test]
async fn next_drainer_picks_up_what_a_stopped_one_left() {
    let store = InMemoryOutboxStore::new();
    let bus = InMemoryBus::new();

    let first = drainer_for(Arc::new(store.clone()), &bus, fast_config()).spawn(CancellationToken::new());
    let first_stats = first.stop().await;
    assert_eq!(first_stats.published, 0);

    let records = seed(&store, &[4, 5]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.list_pending().await.unwrap().len(), 2);

    // A restarted process sees the same table.
    let second = drainer_for(Arc::new(store.clone()), &bus, fast_config()).spawn(CancellationToken::new());
    let check = store.clone();
    assert!(eventually(Duration::from_secs(2), || check.all().unwrap().iter().all(|r| !r.is_pending())).await);

    let stats = second.stop().await;
    assert_eq!(stats.published, 2);
    for record in &records {
        assert_eq!(bus.count_key(&record.id.to_string()), 1);
    }
}

#[tokio::test]
async fn panicked_drainer_stops_with_empty_stats() {
    let bus = InMemoryBus::new();
    let handle = drainer_for(Arc::new(PanickingStore), &bus, fast_config()).spawn(CancellationToken::new());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = handle.stop().await;

    assert_eq!(stats, DrainerStats::default());
    assert!(bus.is_empty());
}
