//! Retention sweeps over seeded, aged entries

mod common;

use automation_event_bus::streams::{EntryId, Priority, StreamMessage, StreamStore};
use chrono::Utc;
use common::faulty_client;
use serde_json::json;

const HOUR_MS: u64 = 3_600_000;

fn aged_fields(stream: &str) -> Vec<(String, String)> {
    StreamMessage::new(stream, "system.notification", "ops", json!({"level": "info", "message": "old"}))
        .to_fields()
        .unwrap()
}

#[tokio::test]
async fn test_cleanup_keeps_recent_and_drops_aged_entries() {
    let (store, client) = faulty_client("retention").await;
    let now_ms = Utc::now().timestamp_millis() as u64;

    let streams = ["assets", "system", "dead_letter"];
    for logical in streams {
        let physical = client.registry().physical_name(logical);
        store
            .inner
            .insert_with_id(&physical, EntryId::new(now_ms - 48 * HOUR_MS, 0), &aged_fields(logical));
        store
            .inner
            .insert_with_id(&physical, EntryId::new(now_ms - 30 * HOUR_MS, 0), &aged_fields(logical));
    }
    let recent = client
        .publish("assets", "asset.discovered", "svc", json!({}), Priority::Normal, None, None)
        .await
        .unwrap();

    let mut before = Vec::new();
    for logical in client.registry().provisioned_streams() {
        let physical = client.registry().physical_name(&logical);
        before.push((physical.clone(), store.inner.len(&physical).await.unwrap()));
    }

    let report = client.cleanup(24).await;
    assert_eq!(report.total_trimmed(), 6);
    assert!(report.failed.is_empty());

    for (physical, len) in before {
        assert!(store.inner.len(&physical).await.unwrap() <= len);
    }

    let info = client.stream_info("assets").await.unwrap();
    assert_eq!(info.last_entry_id.as_deref(), Some(recent.as_str()));
    // marker plus the fresh event
    assert_eq!(info.length, 2);
}

#[tokio::test]
async fn test_cleanup_window_keeps_entries_inside_it() {
    let (store, client) = faulty_client("retention-window").await;
    let now_ms = Utc::now().timestamp_millis() as u64;
    let physical = client.registry().physical_name("identity");

    store
        .inner
        .insert_with_id(&physical, EntryId::new(now_ms - 2 * HOUR_MS, 0), &aged_fields("identity"));

    let report = client.cleanup(24).await;
    assert_eq!(report.trimmed["identity"], 0);
    assert_eq!(store.inner.len(&physical).await.unwrap(), 2);

    let report = client.cleanup(1).await;
    assert_eq!(report.trimmed["identity"], 1);
}

#[tokio::test]
async fn test_cleanup_continues_past_failing_stream() {
    let (store, client) = faulty_client("retention-failure").await;
    let now_ms = Utc::now().timestamp_millis() as u64;

    for logical in ["assets", "automation"] {
        let physical = client.registry().physical_name(logical);
        store
            .inner
            .insert_with_id(&physical, EntryId::new(now_ms - 72 * HOUR_MS, 0), &aged_fields(logical));
    }
    store.fail_trims_of(&client.registry().physical_name("assets"));

    let report = client.cleanup(24).await;
    assert!(report.failed.contains_key("assets"));
    assert!(!report.trimmed.contains_key("assets"));
    assert_eq!(report.trimmed["automation"], 1);
}
