use chrono::{TimeZone, Utc};
use sum_outbox::outbox::{OutboxRecord, OutboxStore, StorageError};
use uuid::Uuid;

use crate::support::{connect, sent_at};

#[tokio::test]
async fn saved_record_is_listed_pending() {
    let Some(store) = connect().await else { return };
    let record = OutboxRecord::new(30);
    store.save(&record).await.unwrap();

    let pending: Vec<_> = store
        .list_pending()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.id == record.id)
        .collect();

    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].sum, 30);
    assert_eq!(pending[0].attempts, 0);
    assert!(pending[0].last_error.is_none());
    assert!(pending[0].is_pending());
}

#[tokio::test]
async fn mark_sent_keeps_the_first_timestamp() {
    let Some(store) = connect().await else { return };
    let record = OutboxRecord::new(7);
    store.save(&record).await.unwrap();

    let first = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let second = Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap();
    store.mark_sent(record.id, first).await.unwrap();
    store.mark_sent(record.id, second).await.unwrap();

    assert_eq!(sent_at(&store, record.id).await, Some(first));
    let still_pending = store.list_pending().await.unwrap();
    assert!(still_pending.iter().all(|r| r.id != record.id));
}

#[tokio::test]
async fn mark_sent_for_unknown_id_is_a_noop() {
    let Some(store) = connect().await else { return };
    store.mark_sent(Uuid::new_v4(), Utc::now()).await.unwrap();
}

#[tokio::test]
async fn duplicate_id_is_rejected() {
    let Some(store) = connect().await else { return };
    let record = OutboxRecord::new(1);
    store.save(&record).await.unwrap();

    let err = store.save(&record).await.unwrap_err();

    assert!(matches!(err, StorageError::Duplicate(id) if id == record.id));
}

#[tokio::test]
async fn record_failure_counts_up() {
    let Some(store) = connect().await else { return };
    let record = OutboxRecord::new(2);
    store.save(&record).await.unwrap();

    assert_eq!(store.record_failure(record.id, "broker down").await.unwrap(), 1);
    assert_eq!(store.record_failure(record.id, "timed out").await.unwrap(), 2);
    assert_eq!(store.record_failure(Uuid::new_v4(), "nope").await.unwrap(), 0);

    let stored = store
        .list_pending()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.id == record.id)
        .unwrap();
    assert_eq!(stored.attempts, 2);
    assert_eq!(stored.last_error.as_deref(), Some("timed out"));
    assert!(stored.is_pending());
}

#[tokio::test]
async fn concurrent_migrations_do_not_conflict() {
    let Some(store) = connect().await else { return };
    let (a, b) = tokio::join!(store.migrate(), store.migrate());
    a.unwrap();
    b.unwrap();
}
