//! Producer and drainer end to end.

use std::sync::Arc;

use sum_outbox::bus::InMemoryBus;
use sum_outbox::outbox::{InMemoryOutboxStore, OutboxStore};
use sum_outbox::producer::{Durability, Summation};

use crate::support::{drainer_for, fast_config};

#[tokio::test]
async fn computed_sum_reaches_the_bus() {
    let store = Arc::new(InMemoryOutboxStore::new());
    let bus = InMemoryBus::new();
    let summation = Summation::new(store.clone(), Durability::Required);

    let outcome = summation.calculate(10, 20).await.unwrap();
    assert_eq!(outcome.result, 30);
    assert!(bus.is_empty());

    drainer_for(store.clone(), &bus, fast_config())
        .drain_once()
        .await
        .unwrap();

    let record_id = outcome.record_id.unwrap();
    let message = bus.find_by_key(&record_id.to_string()).unwrap();
    let event = message.decode().unwrap();
    assert_eq!(event.sum, 30);
    assert!(store.list_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn every_call_stages_its_own_record() {
    let store = Arc::new(InMemoryOutboxStore::new());
    let summation = Summation::new(store.clone(), Durability::Required);

    let a = summation.calculate(1, 1).await.unwrap();
    let b = summation.calculate(1, 1).await.unwrap();

    assert_ne!(a.record_id, b.record_id);
    assert_eq!(store.list_pending().await.unwrap().len(), 2);
}
