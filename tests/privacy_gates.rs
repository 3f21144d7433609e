//! Integration tests for the privacy gates
//!
//! Backends must only ever see redacted text, and a compliance denial must
//! stop the operation before any backend is called.

mod common;

use common::{BASE_CONFIG, Harness, base_config};
use proptest::prelude::*;
use supportroute::{
    audit::{AuditEventType, payload_digest},
    config::{Config, FeaturesConfig},
    flags::StaticFlagStore,
    operation::{MAX_CONTEXT_CHARS, OperationClass, OperationRequest, Outcome, Payload, Route},
    privacy::{PiiCategory, PiiDetector, restore},
};

fn critical(text: &str) -> OperationRequest {
    OperationRequest::new(OperationClass::Critical, Payload::new(text))
}

#[tokio::test]
async fn test_backend_sees_only_redacted_text() {
    let h = Harness::new(&base_config());

    let response = h
        .executor
        .execute(critical("contact me at jane.doe@example.com please"))
        .await
        .unwrap();

    assert_eq!(response.route, Route::Broker);
    assert_eq!(
        h.broker.prompts(),
        vec!["contact me at [EMAIL_REDACTED] please".to_string()]
    );
    // The caller gets the original value back
    assert_eq!(
        response.text,
        "[broker] contact me at jane.doe@example.com please"
    );
    assert_eq!(response.pii_findings.len(), 1);
    assert_eq!(response.pii_findings[0].category, PiiCategory::Email);
}

#[tokio::test]
async fn test_context_values_are_redacted() {
    let h = Harness::new(&base_config());
    let mut context = serde_json::Map::new();
    context.insert(
        "customer_email".to_string(),
        serde_json::json!("jane.doe@example.com"),
    );

    let request = OperationRequest::new(
        OperationClass::Critical,
        Payload::new("update my subscription").with_context(context),
    );
    let id = request.id();
    h.executor.execute(request).await.unwrap();

    let redaction_event = h
        .audit_events(id)
        .await
        .into_iter()
        .find(|e| e.event_type == AuditEventType::Redaction)
        .expect("redaction event recorded");
    assert_eq!(redaction_event.pii_categories.get(&PiiCategory::Email), Some(&1));
}

#[tokio::test]
async fn test_oversized_context_is_refused_before_scanning() {
    let h = Harness::new(&base_config());
    let mut context = serde_json::Map::new();
    context.insert(
        "transcript".to_string(),
        serde_json::json!(["call me at 555-123-4567 ".repeat(MAX_CONTEXT_CHARS / 10)]),
    );
    let request = OperationRequest::new(
        OperationClass::Emergency,
        Payload::new("terminal down").with_context(context),
    );
    let id = request.id();

    let failure = h.executor.execute(request).await.expect_err("context too large");

    assert_eq!(failure.error.kind(), "validation");
    assert_eq!(h.direct.calls(), 0);
    let events = h.audit_events(id).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, Some(Outcome::Failed));
}

#[tokio::test]
async fn test_required_region_mismatch_denies_without_backend_call() {
    let h = Harness::new(&base_config());
    let request = critical("reset my password").with_required_region("us-east");
    let id = request.id();

    let failure = h.executor.execute(request).await.expect_err("denied");

    assert_eq!(failure.correlation_id, id);
    assert_eq!(failure.error.kind(), "compliance_denied");
    assert_eq!(h.direct.calls(), 0);
    assert_eq!(h.broker.calls(), 0);

    let events = h.audit_events(id).await;
    let verdict = events
        .iter()
        .find_map(|e| e.compliance_verdict.as_ref())
        .expect("verdict audited");
    assert!(!verdict.allowed);
    assert_eq!(events.last().unwrap().outcome, Some(Outcome::Denied));
}

#[tokio::test]
async fn test_financial_data_cannot_leave_residency_region() {
    let toml = BASE_CONFIG.replace(
        "base_url = \"http://192.0.2.2:8090\"\nregion = \"eu-west\"",
        "base_url = \"http://192.0.2.2:8090\"\nregion = \"us-east\"",
    );
    let config: Config = toml.parse().unwrap();
    let h = Harness::new(&config);

    let failure = h
        .executor
        .execute(critical("refund to card 4111 1111 1111 1111"))
        .await
        .expect_err("financial data bound to eu-west");

    assert_eq!(failure.error.kind(), "compliance_denied");
    assert!(failure.error.to_string().contains("financial"));
    assert_eq!(h.broker.calls(), 0);
    assert_eq!(h.direct.calls(), 0);
}

#[tokio::test]
async fn test_identifier_requires_consent_reference() {
    let h = Harness::new(&base_config());

    let denied = h
        .executor
        .execute(critical("my SSN is 123-45-6789"))
        .await
        .expect_err("consent missing");
    assert_eq!(denied.error.kind(), "compliance_denied");
    assert_eq!(h.broker.calls(), 0);

    let allowed = h
        .executor
        .execute(critical("my SSN is 123-45-6789").with_consent_ref("consent-42"))
        .await
        .expect("consent supplied");
    assert!(allowed.compliance.allowed);
    assert!(allowed.compliance.audit_required);
    assert_eq!(h.broker.prompts(), vec!["my SSN is [IDENTIFIER_REDACTED]"]);
}

#[tokio::test]
async fn test_redaction_flag_off_forwards_raw_text() {
    let flags = StaticFlagStore::new(FeaturesConfig {
        pii_redaction: Some(false),
        ..FeaturesConfig::default()
    });
    let h = Harness::with_flags(&base_config(), &flags);

    let response = h
        .executor
        .execute(critical("contact me at jane.doe@example.com"))
        .await
        .unwrap();

    assert_eq!(h.broker.prompts(), vec!["contact me at jane.doe@example.com"]);
    // Detection still runs so findings are reported
    assert_eq!(response.pii_findings.len(), 1);
}

#[tokio::test]
async fn test_audit_trail_records_full_lifecycle() {
    let h = Harness::new(&base_config());
    let text = "call me on +1 (555) 123-4567";
    let request = critical(text);
    let id = request.id();

    h.executor.execute(request).await.unwrap();

    let events = h.audit_events(id).await;
    let types: Vec<AuditEventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            AuditEventType::RoutingDecision,
            AuditEventType::Redaction,
            AuditEventType::ComplianceVerdict,
            AuditEventType::Outcome,
        ]
    );

    let detector = PiiDetector::new(0.5).unwrap();
    let (_, redaction) = detector.scan(text);
    let digest = payload_digest(&redaction.text);
    for event in &events[1..] {
        assert_eq!(event.payload_digest.as_deref(), Some(digest.as_str()));
    }
    assert_eq!(events[3].outcome, Some(Outcome::Succeeded));
}

proptest! {
    #[test]
    fn prop_redaction_round_trips_and_hides_emails(
        prefix in "[a-z ]{0,20}",
        user in "[a-z]{1,8}",
        domain in "[a-z]{2,8}",
        suffix in "[a-z ]{0,20}",
    ) {
        let detector = PiiDetector::new(0.5).unwrap();
        let text = format!("{} {}@{}.com {}", prefix, user, domain, suffix);

        let (_, redaction) = detector.scan(&text);

        prop_assert!(!redaction.text.contains('@'));
        prop_assert_eq!(restore(&redaction.text, &redaction.map), text);
    }
}
