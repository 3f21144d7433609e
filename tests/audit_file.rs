//! Integration tests for the JSON-lines audit sink

mod common;

use common::{Harness, base_config};
use std::sync::Arc;
use supportroute::{
    audit::{AuditTrail, JsonlAuditSink},
    backends::BackendSet,
    config::{AuditConfig, AuditSinkKind},
    executor::SupportOperationExecutor,
    flags::UnavailableFlagStore,
    operation::{OperationClass, OperationRequest, Payload, Route},
};
use tempfile::TempDir;

#[tokio::test]
async fn test_operation_lifecycle_appended_as_json_lines() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("audit.jsonl");
    let sink = Arc::new(JsonlAuditSink::open(&path).await.expect("sink opens"));

    // Reuse the harness doubles, swapping in the file sink
    let doubles = Harness::new(&base_config());
    let executor = SupportOperationExecutor::from_config(
        &base_config(),
        BackendSet::new(doubles.direct.clone(), doubles.broker.clone()),
        doubles.probe.clone(),
        &UnavailableFlagStore,
        AuditTrail::new(sink, None),
        None,
    )
    .unwrap();

    let request = OperationRequest::new(
        OperationClass::Critical,
        Payload::new("email me at jane@example.com"),
    );
    let id = request.id().to_string();
    executor.execute(request).await.unwrap();
    executor.audit().flush().await;

    let content = tokio::fs::read_to_string(&path).await.unwrap();
    let lines: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).expect("each line is JSON"))
        .collect();

    assert_eq!(lines.len(), 4);
    for line in &lines {
        assert_eq!(line["correlation_id"], id);
    }
    assert_eq!(lines[0]["event_type"], "routing_decision");
    assert_eq!(lines[0]["routing_decision"]["chosen_route"], "broker");
    assert_eq!(lines[1]["pii_categories"]["email"], 1);
    assert_eq!(lines[3]["outcome"], "succeeded");
    // The raw address never reaches the audit file
    assert!(!content.contains("jane@example.com"));
    assert_eq!(doubles.spy(Route::Broker).calls(), 1);
}

#[tokio::test]
async fn test_file_sink_built_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("audit.jsonl");
    let config = AuditConfig {
        sink: AuditSinkKind::File,
        path: Some(path.to_string_lossy().into_owned()),
        ..AuditConfig::default()
    };

    AuditTrail::from_config(&config, None)
        .await
        .expect("file sink opens");

    assert!(path.exists());
}
