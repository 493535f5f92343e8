//! Waste container level and temperature fusion.
//!
//! Run with: cargo test --test wastecontainer_test

mod common;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;

use cip_functions::functions::WasteContainer;
use common::{message, thing, FakeThings};

const LEVEL: &str = "application/vnd.diwise.level";
const TEMPERATURE: &str = "application/vnd.oma.lwm2m.ext.3303";

fn registry() -> FakeThings {
    FakeThings::new().relate("wc-dev", thing("wc-1", "WasteContainer", None))
}

fn level(current: f64, percent: f64) -> cip_functions::messaging::IncomingMessage {
    message(
        "function.updated",
        LEVEL,
        json!({ "id": "wc-dev", "level": { "current": current, "percent": percent } }),
    )
}

#[tokio::test]
async fn same_level_twice_changes_once() {
    let things = registry();
    let mut wc = WasteContainer::new("wc-1", "default");

    assert!(wc.handle(&level(10.0, 60.0), &things).await.unwrap());
    assert!(!wc.handle(&level(10.0, 60.0), &things).await.unwrap());

    assert_eq!(wc.level, Some(10.0));
    assert_eq!(wc.percent, Some(60.0));
    assert!(wc.date_observed.is_some());
}

#[tokio::test]
async fn first_empty_reading_is_a_change() {
    let things = registry();
    let mut wc = WasteContainer::new("wc-1", "default");
    let empty = message(
        "function.updated",
        LEVEL,
        json!({ "id": "wc-dev", "level": { "current": 0.0 } }),
    );

    assert!(wc.handle(&empty, &things).await.unwrap());
    assert_eq!(wc.level, Some(0.0));
    assert_eq!(wc.percent, None);
    assert!(wc.date_observed.is_some());

    assert!(!wc.handle(&empty, &things).await.unwrap());
}

#[tokio::test]
async fn differences_within_tolerance_are_not_changes() {
    let things = registry();
    let mut wc = WasteContainer::new("wc-1", "default");

    wc.handle(&level(10.0, 60.0), &things).await.unwrap();

    assert!(!wc.handle(&level(10.00005, 60.3), &things).await.unwrap());
    assert_eq!(wc.level, Some(10.0));

    assert!(wc.handle(&level(10.5, 60.0), &things).await.unwrap());
    assert_eq!(wc.level, Some(10.5));
}

#[tokio::test]
async fn percent_is_rounded() {
    let things = registry();
    let mut wc = WasteContainer::new("wc-1", "default");

    wc.handle(&level(3.0, 59.6), &things).await.unwrap();
    assert_eq!(wc.percent, Some(60.0));
}

#[tokio::test]
async fn date_observed_never_moves_backwards() {
    let things = registry();
    let mut wc = WasteContainer::new("wc-1", "default");
    let t1: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().unwrap();
    let t0 = t1 - TimeDelta::hours(1);

    let newer = message(
        "function.updated",
        LEVEL,
        json!({ "id": "wc-dev", "level": { "current": 1.0 }, "timestamp": t1 }),
    );
    let older = message(
        "function.updated",
        LEVEL,
        json!({ "id": "wc-dev", "level": { "current": 2.0 }, "timestamp": t0 }),
    );

    wc.handle(&newer, &things).await.unwrap();
    assert_eq!(wc.date_observed, Some(t1));

    assert!(wc.handle(&older, &things).await.unwrap());
    assert_eq!(wc.level, Some(2.0));
    assert_eq!(wc.date_observed, Some(t1));
}

#[tokio::test]
async fn temperature_pack_updates_temperature_and_time() {
    let things = registry();
    let mut wc = WasteContainer::new("wc-1", "default");

    let msg = message(
        "message.accepted",
        TEMPERATURE,
        json!({
            "pack": [
                { "bn": "wc-dev/3303/", "bt": 1_710_151_647, "n": "0", "vs": "urn:oma:lwm2m:ext:3303" },
                { "n": "5700", "v": 21.5 }
            ]
        }),
    );

    assert!(wc.handle(&msg, &things).await.unwrap());
    assert_eq!(wc.temperature, Some(21.5));
    assert_eq!(
        wc.date_observed,
        DateTime::from_timestamp(1_710_151_647, 0)
    );

    assert!(!wc.handle(&msg, &things).await.unwrap());
}

#[tokio::test]
async fn payload_without_readings_is_ignored() {
    let things = registry();
    let mut wc = WasteContainer::new("wc-1", "default");

    let msg = message("function.updated", LEVEL, json!({ "id": "wc-dev" }));

    assert!(!wc.handle(&msg, &things).await.unwrap());
    assert_eq!(wc, WasteContainer::new("wc-1", "default"));
    assert_eq!(things.lookups(), 0);
}

#[tokio::test]
async fn malformed_body_is_an_error() {
    let things = registry();
    let mut wc = WasteContainer::new("wc-1", "default");

    let msg = cip_functions::messaging::IncomingMessage::new("function.updated", LEVEL, "{ nope");
    assert!(wc.handle(&msg, &things).await.is_err());
}

#[tokio::test]
async fn failed_registry_lookup_is_retried_later() {
    let mut wc = WasteContainer::new("wc-1", "default");

    let unreachable = FakeThings::failing(cip_functions::things::ThingsError::Status(503));
    assert!(wc.handle(&level(1.0, 10.0), &unreachable).await.unwrap());
    assert!(wc.waste_container.is_none());

    wc.handle(&level(2.0, 20.0), &registry()).await.unwrap();
    assert_eq!(
        wc.waste_container.as_ref().map(|t| t.id.as_str()),
        Some("wc-1")
    );
}
