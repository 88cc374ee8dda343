//! End-to-end tests for the stream client over the in-memory store

mod common;

use automation_event_bus::streams::{
    AssetDiscovered, DeadLetterRecord, EntryId, GroupRead, PlatformEvent, Priority, StreamClient,
    StreamError, StreamMessage, StreamStore, DEAD_LETTER_STATUS,
};
use common::{faulty_client, test_config};
use serde_json::json;

#[tokio::test]
async fn test_publish_and_consume_single_message() {
    let client = StreamClient::connect(test_config("scenario-a")).await.unwrap();

    let id = client
        .publish(
            "assets",
            "asset.discovered",
            "asset-service",
            json!({"host": "10.0.0.5"}),
            Priority::Normal,
            None,
            None,
        )
        .await
        .unwrap();
    assert!(!id.is_empty());

    let messages = client.consume(&["assets"], "test-consumer", 10, 100).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, id);
    assert_eq!(messages[0].event_type, "asset.discovered");
    assert_eq!(messages[0].data, json!({"host": "10.0.0.5"}));

    let pending = client.pending_messages("assets", None, 10).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].consumer, "test-consumer");

    assert!(client.acknowledge_message(&messages[0]).await);
    assert!(client.pending_messages("assets", None, 10).await.is_empty());
}

#[tokio::test]
async fn test_each_message_delivered_once_per_group() {
    let client = StreamClient::connect(test_config("competing")).await.unwrap();
    // drain the topology marker first
    assert!(client.consume(&["automation"], "warmup", 10, 10).await.is_empty());

    for i in 0..6 {
        client
            .publish("automation", "automation.job_started", "automation", json!({"n": i}), Priority::Normal, None, None)
            .await
            .unwrap();
    }

    let first = client.consume(&["automation"], "worker-a", 4, 10).await;
    let second = client.consume(&["automation"], "worker-b", 4, 10).await;
    assert_eq!(first.len(), 4);
    assert_eq!(second.len(), 2);

    let mut ids: Vec<_> = first.iter().chain(second.iter()).map(|m| m.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 6);
}

#[tokio::test]
async fn test_retry_budget_then_dead_letter() {
    let client = StreamClient::connect(test_config("scenario-b")).await.unwrap();
    let dead_letter = client.registry().dead_letter_stream().to_string();

    client
        .publish("automation", "automation.job_completed", "automation", json!({"job_id": "j-1"}), Priority::Critical, Some("u-1"), Some("corr-b"))
        .await
        .unwrap();
    let mut message = client.consume(&["automation"], "worker", 10, 10).await.remove(0);
    assert_eq!(message.max_retries, 3);

    for expected in 1..=3 {
        assert!(client.retry(&mut message).await);
        assert_eq!(message.retry_count, expected);
        assert_eq!(message.correlation_id, "corr-b");
    }

    let before = client.store().len(&dead_letter).await.unwrap();
    assert!(!client.retry(&mut message).await);
    assert_eq!(client.store().len(&dead_letter).await.unwrap(), before + 1);

    // three successors were republished, none after the budget ran out
    let republished = client.consume(&["automation"], "worker", 10, 10).await;
    assert_eq!(republished.len(), 3);
    assert_eq!(
        republished.iter().map(|m| m.retry_count).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn test_dead_letter_record_contents() {
    let (store, client) = faulty_client("dead-letter").await;
    let dead_letter = client.registry().dead_letter_stream().to_string();

    let mut message = StreamMessage::new("identity", "identity.user_created", "identity", json!({"user_id": "u-9"}))
        .with_max_retries(0)
        .with_correlation_id("corr-dl");
    client.publish_message(&mut message).await.unwrap();
    let mut consumed = client.consume(&["identity"], "worker", 10, 10).await.remove(0);

    assert!(!client.retry(&mut consumed).await);

    assert_eq!(store.inner.len(&dead_letter).await.unwrap(), 2);

    let records = client.consume(&["dead_letter"], "auditor", 10, 10).await;
    assert_eq!(records.len(), 1);

    let info = client.stream_info("dead_letter").await.unwrap();
    let last_id = info.last_entry_id.unwrap();
    assert_eq!(records[0].id, last_id);
    assert_eq!(records[0].correlation_id, "corr-dl");
    assert_eq!(records[0].stream, "dead_letter");

    assert!(client.acknowledge_message(&records[0]).await);
    assert!(client.pending_messages("dead_letter", None, 10).await.is_empty());
    assert!(client.pending_messages("identity", None, 10).await.iter().any(|p| p.id == consumed.id));
}

#[tokio::test]
async fn test_dead_letter_record_decodes_with_metadata() {
    let client = StreamClient::connect(test_config("dead-letter-fields")).await.unwrap();
    let message = StreamMessage::new("assets", "asset.updated", "asset-service", json!({}));

    let id = client.dead_letter(&message, "handler exploded").await.unwrap();
    assert!(id.parse::<EntryId>().is_ok());

    let store = client.store();
    let dead_letter = client.registry().dead_letter_stream().to_string();
    let read = store
        .read_group(&dead_letter, "dead_letter_processors", "auditor", 10, None)
        .await
        .unwrap();
    let GroupRead::Entries(entries) = read else {
        panic!("dead-letter group missing");
    };
    let entry = entries.iter().find(|e| e.id == id).unwrap();

    let record = DeadLetterRecord::from_fields(&entry.id, &entry.fields).unwrap();
    assert_eq!(record.original_stream, "assets");
    assert_eq!(record.failure_reason, "handler exploded");
    assert!(record.failed_at >= message.timestamp);
    assert_eq!(entry.fields["status"], DEAD_LETTER_STATUS);
}

#[tokio::test]
async fn test_missing_group_self_heals() {
    let client = StreamClient::connect(test_config("scenario-c")).await.unwrap();
    let physical = client.registry().physical_name("network_analyzer");

    assert!(client
        .store()
        .destroy_group(&physical, "network_analyzer_processors")
        .await
        .unwrap());

    client
        .publish("network_analyzer", "network.scan_completed", "scanner", json!({"scan_id": "s-1", "subnet": "10.0.0.0/24", "hosts_found": 12}), Priority::Normal, None, None)
        .await
        .unwrap();

    let first = client.consume(&["network_analyzer"], "worker", 10, 10).await;
    assert!(first.is_empty());

    let second = client.consume(&["network_analyzer"], "worker", 10, 10).await;
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].event_type, "network.scan_completed");
}

#[tokio::test]
async fn test_consume_on_missing_stream_does_not_fail() {
    let client = StreamClient::connect(test_config("missing-stream")).await.unwrap();
    assert!(client.consume(&["never_created"], "worker", 10, 10).await.is_empty());

    client
        .publish("never_created", "custom.event", "svc", json!({}), Priority::Low, None, None)
        .await
        .unwrap();
    assert_eq!(client.consume(&["never_created"], "worker", 10, 10).await.len(), 1);
}

#[tokio::test]
async fn test_publish_failure_surfaces_to_caller() {
    let (store, client) = faulty_client("publish-failure").await;
    store.fail_appends_to(&client.registry().physical_name("system"));

    let result = client
        .publish("system", "system.notification", "ops", json!({}), Priority::High, None, None)
        .await;
    assert!(matches!(result, Err(StreamError::PublishFailed(_))));

    // other streams are unaffected
    client
        .publish("assets", "asset.discovered", "svc", json!({}), Priority::Normal, None, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_metrics_failure_does_not_fail_publish() {
    let (store, client) = faulty_client("metrics-failure").await;
    store.fail_appends_to(client.registry().metrics_stream());

    let id = client
        .publish("assets", "asset.discovered", "svc", json!({}), Priority::Normal, None, None)
        .await
        .unwrap();
    assert!(!id.is_empty());

    let message = client.consume(&["assets"], "worker", 10, 10).await.remove(0);
    assert!(client.acknowledge_message(&message).await);
}

#[tokio::test]
async fn test_read_errors_yield_empty_batches() {
    let (store, client) = faulty_client("read-errors").await;
    client
        .publish("communication", "system.notification", "mailer", json!({}), Priority::Normal, None, None)
        .await
        .unwrap();

    store.fail_reads(true);
    assert!(client.consume(&["communication"], "worker", 10, 10).await.is_empty());

    store.fail_reads(false);
    assert_eq!(client.consume(&["communication"], "worker", 10, 10).await.len(), 1);
}

#[tokio::test]
async fn test_failed_republish_goes_to_dead_letter() {
    let (store, client) = faulty_client("republish-failure").await;
    let dead_letter = client.registry().dead_letter_stream().to_string();
    client
        .publish("automation", "automation.job_started", "automation", json!({}), Priority::Normal, None, None)
        .await
        .unwrap();
    let mut message = client.consume(&["automation"], "worker", 10, 10).await.remove(0);
    let before = client.store().len(&dead_letter).await.unwrap();

    store.fail_appends_to(&client.registry().physical_name("automation"));
    assert!(!client.retry(&mut message).await);
    assert_eq!(client.store().len(&dead_letter).await.unwrap(), before + 1);
    assert_eq!(message.retry_count, 0);
}

#[tokio::test]
async fn test_typed_event_round_trip() {
    let client = StreamClient::connect(test_config("typed-events")).await.unwrap();
    let event = AssetDiscovered {
        host: "10.0.0.5".to_string(),
        hostname: Some("web-1".to_string()),
        os: Some("linux".to_string()),
    };
    client
        .publish_event("assets", "asset-service", &event, Priority::Normal)
        .await
        .unwrap();

    let message = client.consume(&["assets"], "worker", 10, 10).await.remove(0);
    assert_eq!(message.payload::<AssetDiscovered>().unwrap(), event);
    assert!(matches!(
        PlatformEvent::from_message(&message).unwrap(),
        Some(PlatformEvent::AssetDiscovered(_))
    ));
}

#[tokio::test]
async fn test_initialize_is_repeatable() {
    let client = StreamClient::connect(test_config("reinit")).await.unwrap();
    let physical = client.registry().physical_name("assets");
    let before = client.store().len(&physical).await.unwrap();

    let report = client.initialize().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(client.store().len(&physical).await.unwrap(), before);
}
