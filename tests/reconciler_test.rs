//! Reconciliation pipeline with fake collaborators.
//!
//! Run with: cargo test --test reconciler_test

mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use cip_functions::error::AppError;
use cip_functions::functions::{EntityKind, HandleError, WasteContainer};
use cip_functions::messaging::{IncomingMessage, PublishError};
use cip_functions::reconciler::{KeyedLocks, Reconciler};
use cip_functions::storage::{self, MemoryStore};
use cip_functions::things::ThingsError;
use common::{message, thing, CountingStore, FakeThings, RecordingPublisher};

fn level(current: f64) -> IncomingMessage {
    message(
        "function.updated",
        "application/vnd.diwise.level",
        json!({ "id": "dev-1", "level": { "current": current, "percent": 50.0 } }),
    )
}

struct Harness {
    things: Arc<FakeThings>,
    store: Arc<CountingStore>,
    publisher: Arc<RecordingPublisher>,
    reconciler: Reconciler,
}

fn harness(things: FakeThings, store: CountingStore, publisher: RecordingPublisher) -> Harness {
    let things = Arc::new(things);
    let store = Arc::new(store);
    let publisher = Arc::new(publisher);

    let reconciler = Reconciler::new(things.clone(), store.clone(), publisher.clone());

    Harness {
        things,
        store,
        publisher,
        reconciler,
    }
}

fn waste_registry() -> FakeThings {
    FakeThings::new().relate("dev-1", thing("wc-1", "WasteContainer", Some("city")))
}

#[tokio::test]
async fn subject_without_related_entity_of_type_is_a_no_op() {
    let h = harness(
        FakeThings::new().relate("dev-1", thing("sewer-1", "Sewer", None)),
        CountingStore::new(),
        RecordingPublisher::new(),
    );

    let changed = h
        .reconciler
        .process(EntityKind::WasteContainer, "dev-1", &level(10.0))
        .await
        .unwrap();

    assert!(!changed);
    assert_eq!(h.store.calls(), 0);
    assert!(h.publisher.messages().is_empty());
}

#[tokio::test]
async fn unknown_subject_is_a_no_op() {
    let h = harness(FakeThings::new(), CountingStore::new(), RecordingPublisher::new());

    let changed = h
        .reconciler
        .process(EntityKind::Sewer, "nobody", &level(1.0))
        .await
        .unwrap();

    assert!(!changed);
    assert_eq!(h.store.calls(), 0);
    assert!(h.publisher.messages().is_empty());
}

#[tokio::test]
async fn changed_entity_is_persisted_and_published() {
    let h = harness(waste_registry(), CountingStore::new(), RecordingPublisher::new());

    let changed = h
        .reconciler
        .process(EntityKind::WasteContainer, "dev-1", &level(10.0))
        .await
        .unwrap();
    assert!(changed);

    let stored: WasteContainer =
        storage::get(h.store.as_ref(), "wc-1", "WasteContainer").await.unwrap();
    assert_eq!(stored.level, Some(10.0));
    assert_eq!(stored.tenant, "city");

    let messages = h.publisher.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].topic, "cip-function.updated");
    assert_eq!(
        messages[0].content_type,
        "application/vnd.diwise.wastecontainer+json"
    );

    let body = &h.publisher.bodies()[0];
    assert_eq!(body["id"], "wc-1");
    assert_eq!(body["type"], "WasteContainer");
    assert_eq!(body["level"], 10.0);
    assert_eq!(body["tenant"], "city");
}

#[tokio::test]
async fn unchanged_entity_is_neither_persisted_nor_published() {
    let h = harness(waste_registry(), CountingStore::new(), RecordingPublisher::new());

    h.reconciler
        .process(EntityKind::WasteContainer, "dev-1", &level(10.0))
        .await
        .unwrap();
    let writes = h.store.write_count();

    let changed = h
        .reconciler
        .process(EntityKind::WasteContainer, "dev-1", &level(10.0))
        .await
        .unwrap();

    assert!(!changed);
    assert_eq!(h.store.write_count(), writes);
    assert_eq!(h.publisher.messages().len(), 1);
}

#[tokio::test]
async fn type_match_ignores_case() {
    let h = harness(
        FakeThings::new().relate("dev-1", thing("wc-1", "wastecontainer", None)),
        CountingStore::new(),
        RecordingPublisher::new(),
    );

    assert!(
        h.reconciler
            .process(EntityKind::WasteContainer, "dev-1", &level(3.0))
            .await
            .unwrap()
    );

    let stored: WasteContainer =
        storage::get(h.store.as_ref(), "wc-1", "WasteContainer").await.unwrap();
    assert_eq!(stored.tenant, "default");
}

#[tokio::test]
async fn persist_failure_still_publishes() {
    let h = harness(
        waste_registry(),
        CountingStore::failing_writes(),
        RecordingPublisher::new(),
    );

    let changed = h
        .reconciler
        .process(EntityKind::WasteContainer, "dev-1", &level(10.0))
        .await
        .unwrap();

    assert!(changed);
    assert_eq!(h.store.write_count(), 1);
    assert_eq!(h.publisher.messages().len(), 1);
}

#[tokio::test]
async fn publish_failure_is_returned() {
    let h = harness(
        waste_registry(),
        CountingStore::new(),
        RecordingPublisher::failing(),
    );

    let err = h
        .reconciler
        .process(EntityKind::WasteContainer, "dev-1", &level(10.0))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Publish(PublishError::Transport(_))));
}

#[tokio::test]
async fn registry_failure_aborts_reconciliation() {
    let h = harness(
        FakeThings::failing(ThingsError::Unauthorized),
        CountingStore::new(),
        RecordingPublisher::new(),
    );

    let err = h
        .reconciler
        .process(EntityKind::Sewer, "dev-1", &level(1.0))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Things(ThingsError::Unauthorized)));
    assert_eq!(h.store.calls(), 0);
}

#[tokio::test]
async fn rejected_transition_is_not_persisted_or_published() {
    let h = harness(
        FakeThings::new().relate("cso-dev", thing("cso-1", "CombinedSewageOverflow", None)),
        CountingStore::new(),
        RecordingPublisher::new(),
    );

    let open = message(
        "function.updated",
        "application/vnd.diwise.stopwatch",
        json!({
            "id": "cso-dev",
            "stopwatch": { "state": true, "startTime": "2024-03-11T10:00:00Z" }
        }),
    );
    let close = message(
        "function.updated",
        "application/vnd.diwise.stopwatch",
        json!({
            "id": "cso-dev",
            "stopwatch": {
                "state": false,
                "startTime": "2024-03-11T10:00:00Z",
                "stopTime": "2024-03-11T11:00:00Z"
            }
        }),
    );

    for msg in [&open, &close] {
        assert!(
            h.reconciler
                .process(EntityKind::CombinedSewageOverflow, "cso-dev", msg)
                .await
                .unwrap()
        );
    }
    let writes = h.store.write_count();

    let err = h
        .reconciler
        .process(EntityKind::CombinedSewageOverflow, "cso-dev", &close)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Handle(HandleError::OverflowAlreadyEnded)
    ));
    assert_eq!(h.store.write_count(), writes);
    assert_eq!(h.publisher.messages().len(), 2);
}

#[tokio::test]
async fn concurrent_updates_to_one_entity_are_serialized() {
    let h = Arc::new(harness(
        waste_registry(),
        CountingStore::new(),
        RecordingPublisher::new(),
    ));

    let tasks: Vec<_> = (1..=8)
        .map(|i| {
            let h = h.clone();
            tokio::spawn(async move {
                h.reconciler
                    .process(EntityKind::WasteContainer, "dev-1", &level(f64::from(i)))
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().unwrap());
    }

    assert_eq!(h.publisher.messages().len(), 8);
    assert!(h.reconciler.locks().is_empty());
    assert!(h.things.lookups() >= 16);
}

#[tokio::test]
async fn lock_table_serializes_same_key_only() {
    let locks = KeyedLocks::new();

    let held = locks.lock(EntityKind::Sewer, "sewer-1").await;
    assert_eq!(locks.len(), 1);

    let blocked =
        tokio::time::timeout(Duration::from_millis(50), locks.lock(EntityKind::Sewer, "SEWER-1"))
            .await;
    assert!(blocked.is_err());

    let other = tokio::time::timeout(
        Duration::from_millis(50),
        locks.lock(EntityKind::WasteContainer, "sewer-1"),
    )
    .await;
    assert!(other.is_ok());
    drop(other);

    drop(held);
    assert!(locks.is_empty());
}

#[tokio::test]
async fn memory_store_backs_the_pipeline() {
    let things = Arc::new(waste_registry());
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let reconciler = Reconciler::new(things, store.clone(), publisher);

    reconciler
        .process(EntityKind::WasteContainer, "dev-1", &level(4.0))
        .await
        .unwrap();

    assert_eq!(store.len().await, 1);
}
