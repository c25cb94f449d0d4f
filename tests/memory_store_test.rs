//! Integration tests for the SQLite shared memory store.

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use swarmlord::adapters::sqlite::{create_test_pool, run_migrations, SqliteMemoryStore};
use swarmlord::domain::errors::DomainError;
use swarmlord::domain::models::{
    ChangeKind, MemoryMetadata, MemoryQuery, SubscriptionFilter,
};
use swarmlord::domain::ports::SharedMemoryStore;

async fn setup_store() -> SqliteMemoryStore {
    let pool = create_test_pool().await.expect("test pool");
    run_migrations(&pool).await.expect("migrations");
    SqliteMemoryStore::new(pool)
}

#[tokio::test]
async fn store_and_get_round_trip() {
    let store = setup_store().await;

    let entry = store
        .store(
            "agent:settings",
            json!({"mode": "dark"}),
            MemoryMetadata::default().with_tag("settings"),
            None,
            None,
        )
        .await
        .expect("store");

    let fetched = store
        .get("agent:settings")
        .await
        .expect("get")
        .expect("entry present");
    assert_eq!(fetched.id, entry.id);
    assert_eq!(fetched.value, json!({"mode": "dark"}));
    assert_eq!(fetched.metadata.tags, vec!["settings"]);
}

#[tokio::test]
async fn keys_accumulate_versions_and_get_returns_latest() {
    let store = setup_store().await;

    for n in 0..3 {
        store
            .store("counter", json!(n), MemoryMetadata::default(), None, None)
            .await
            .expect("store");
    }

    let latest = store.get("counter").await.unwrap().unwrap();
    assert_eq!(latest.value, json!(2));

    let all = store.get_all("counter").await.unwrap();
    assert_eq!(all.len(), 3);
    // Newest first; the head equals what get() returns.
    assert_eq!(all[0].id, latest.id);
    assert_eq!(all[2].value, json!(0));
}

#[tokio::test]
async fn update_mutates_in_place_and_bumps_updated_at() {
    let store = setup_store().await;
    let entry = store
        .store("doc", json!("v1"), MemoryMetadata::default(), None, None)
        .await
        .unwrap();

    let updated = store
        .update(entry.id, json!("v2"), None)
        .await
        .expect("update");
    assert_eq!(updated.id, entry.id);
    assert_eq!(updated.value, json!("v2"));
    assert!(updated.updated_at >= entry.updated_at);
    assert_eq!(updated.created_at, entry.created_at);

    // Still one entry under the key.
    assert_eq!(store.get_all("doc").await.unwrap().len(), 1);
}

#[tokio::test]
async fn update_of_absent_id_errors() {
    let store = setup_store().await;
    let err = store
        .update(Uuid::new_v4(), json!(1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::MemoryNotFound(_)));
}

#[tokio::test]
async fn delete_removes_from_every_read() {
    let store = setup_store().await;
    let entry = store
        .store("gone", json!(1), MemoryMetadata::default(), None, None)
        .await
        .unwrap();

    store.delete(entry.id).await.expect("delete");
    assert!(store.get("gone").await.unwrap().is_none());
    assert!(store.get_all("gone").await.unwrap().is_empty());
    assert!(matches!(
        store.delete(entry.id).await.unwrap_err(),
        DomainError::MemoryNotFound(_)
    ));
}

#[tokio::test]
async fn delete_by_key_counts_removals() {
    let store = setup_store().await;
    for n in 0..4 {
        store
            .store("bulk", json!(n), MemoryMetadata::default(), None, None)
            .await
            .unwrap();
    }
    let removed = store.delete_by_key("bulk").await.unwrap();
    assert_eq!(removed, 4);
    assert!(store.get_all("bulk").await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_entries_are_invisible_until_cleanup() {
    let store = setup_store().await;

    store
        .store(
            "session",
            json!("stale"),
            MemoryMetadata::default(),
            None,
            Some(Utc::now() - Duration::seconds(5)),
        )
        .await
        .unwrap();
    store
        .store(
            "session",
            json!("live"),
            MemoryMetadata::default(),
            None,
            Some(Utc::now() + Duration::hours(1)),
        )
        .await
        .unwrap();

    // Reads skip the expired version entirely.
    let latest = store.get("session").await.unwrap().unwrap();
    assert_eq!(latest.value, json!("live"));
    assert_eq!(store.get_all("session").await.unwrap().len(), 1);

    let removed = store.cleanup_expired().await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.get_all("session").await.unwrap().len(), 1);
}

#[tokio::test]
async fn fully_expired_key_reads_as_absent() {
    let store = setup_store().await;
    store
        .store(
            "ephemeral",
            json!(1),
            MemoryMetadata::default(),
            None,
            Some(Utc::now() - Duration::seconds(1)),
        )
        .await
        .unwrap();
    assert!(store.get("ephemeral").await.unwrap().is_none());
}

#[tokio::test]
async fn query_filters_compose() {
    let store = setup_store().await;
    let agent = Uuid::new_v4();

    store
        .store(
            "a",
            json!(1),
            MemoryMetadata::default()
                .with_context("swarm:1")
                .with_tag("result")
                .with_tag("final"),
            Some(agent),
            None,
        )
        .await
        .unwrap();
    store
        .store(
            "b",
            json!(2),
            MemoryMetadata::default()
                .with_context("swarm:1")
                .with_tag("result"),
            None,
            None,
        )
        .await
        .unwrap();
    store
        .store(
            "c",
            json!(3),
            MemoryMetadata::default().with_context("swarm:2"),
            Some(agent),
            None,
        )
        .await
        .unwrap();

    let by_context = store
        .query(MemoryQuery::new().context("swarm:1"))
        .await
        .unwrap();
    assert_eq!(by_context.len(), 2);

    // Tag filters require every listed tag.
    let by_tags = store
        .query(MemoryQuery::new().with_tag("result").with_tag("final"))
        .await
        .unwrap();
    assert_eq!(by_tags.len(), 1);
    assert_eq!(by_tags[0].key, "a");

    let by_agent = store.query(MemoryQuery::new().agent(agent)).await.unwrap();
    assert_eq!(by_agent.len(), 2);

    let limited = store.query(MemoryQuery::new().limit(1)).await.unwrap();
    assert_eq!(limited.len(), 1);
    // Default order is newest first.
    assert_eq!(limited[0].key, "c");
}

#[tokio::test]
async fn change_feed_delivers_inserts_updates_deletes() {
    let store = setup_store().await;
    let mut subscription = store.subscribe(SubscriptionFilter::default());

    let entry = store
        .store("feed", json!(1), MemoryMetadata::default(), None, None)
        .await
        .unwrap();
    store.update(entry.id, json!(2), None).await.unwrap();
    store.delete(entry.id).await.unwrap();

    let insert = subscription.recv().await.expect("insert event");
    assert_eq!(insert.kind, ChangeKind::Insert);
    assert_eq!(insert.entry.value, json!(1));

    let update = subscription.recv().await.expect("update event");
    assert_eq!(update.kind, ChangeKind::Update);
    assert_eq!(update.entry.value, json!(2));

    let delete = subscription.recv().await.expect("delete event");
    assert_eq!(delete.kind, ChangeKind::Delete);
}

#[tokio::test]
async fn change_feed_respects_key_filter() {
    let store = setup_store().await;
    let mut subscription = store.subscribe(SubscriptionFilter {
        key: Some("watched".to_string()),
        agent_id: None,
    });

    store
        .store("ignored", json!(1), MemoryMetadata::default(), None, None)
        .await
        .unwrap();
    store
        .store("watched", json!(2), MemoryMetadata::default(), None, None)
        .await
        .unwrap();

    let event = subscription.recv().await.expect("filtered event");
    assert_eq!(event.entry.key, "watched");
}

#[tokio::test]
async fn unsubscribe_is_idempotent() {
    let store = setup_store().await;
    let mut subscription = store.subscribe(SubscriptionFilter::default());
    assert!(subscription.is_active());

    subscription.unsubscribe();
    subscription.unsubscribe();
    assert!(!subscription.is_active());
    assert!(subscription.recv().await.is_none());
}
