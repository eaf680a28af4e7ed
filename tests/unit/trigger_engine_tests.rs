//! Trigger decisions for created and updated issues.

use serde_json::{json, Value};

use jira_automation::models::event::{EventType, FieldChange, WebhookEvent, WebhookPayload};
use jira_automation::trigger::engine::{
    REASON_LABEL_ADDED, REASON_LABEL_NOT_ADDED, REASON_LABEL_PRESENT, REASON_MISSING_LABEL,
    REASON_UNSUPPORTED,
};
use jira_automation::trigger::{relevant_changes, TriggerEngine};

const LABEL: &str = "ai-automate";

fn event(body: Value) -> WebhookEvent {
    let payload: WebhookPayload = serde_json::from_value(body).expect("valid payload");
    WebhookEvent::from(payload)
}

fn created(labels: &[&str]) -> WebhookEvent {
    event(json!({
        "webhookEvent": "jira:issue_created",
        "issue": {
            "id": "10001",
            "key": "PROJ-1",
            "fields": { "summary": "Add login", "labels": labels }
        }
    }))
}

fn updated(items: Option<Value>) -> WebhookEvent {
    let mut body = json!({
        "webhookEvent": "jira:issue_updated",
        "issue": { "id": "10001", "key": "PROJ-1", "fields": { "labels": [LABEL] } }
    });
    if let Some(items) = items {
        body["changelog"] = json!({ "items": items });
    }
    event(body)
}

// ── Created ──────────────────────────────────────────────────

#[test]
fn created_with_label_triggers() {
    let decision = TriggerEngine::new(LABEL).decide(&created(&["backend", LABEL]));
    assert!(decision.triggered);
    assert_eq!(decision.reason, REASON_LABEL_PRESENT);
    assert_eq!(decision.issue.key, "PROJ-1");
}

#[test]
fn created_without_label_does_not_trigger() {
    let decision = TriggerEngine::new(LABEL).decide(&created(&["backend"]));
    assert!(!decision.triggered);
    assert_eq!(decision.reason, REASON_MISSING_LABEL);
}

#[test]
fn created_with_no_labels_does_not_trigger() {
    let decision = TriggerEngine::new(LABEL).decide(&created(&[]));
    assert!(!decision.triggered);
    assert_eq!(decision.reason, REASON_MISSING_LABEL);
}

#[test]
fn label_match_is_case_sensitive() {
    let decision = TriggerEngine::new(LABEL).decide(&created(&["AI-AUTOMATE"]));
    assert!(!decision.triggered);
}

#[test]
fn label_match_is_not_partial() {
    let decision = TriggerEngine::new(LABEL).decide(&created(&["ai-automate-later"]));
    assert!(!decision.triggered);
}

// ── Updated ──────────────────────────────────────────────────

#[test]
fn updated_with_label_added_triggers() {
    let decision = TriggerEngine::new(LABEL).decide(&updated(Some(json!([
        { "field": "labels", "fromString": "backend", "toString": "backend ai-automate" }
    ]))));
    assert!(decision.triggered);
    assert_eq!(decision.reason, REASON_LABEL_ADDED);
}

#[test]
fn updated_with_label_removed_does_not_trigger() {
    let decision = TriggerEngine::new(LABEL).decide(&updated(Some(json!([
        { "field": "labels", "fromString": "ai-automate backend", "toString": "backend" }
    ]))));
    assert!(!decision.triggered);
    assert_eq!(decision.reason, REASON_LABEL_NOT_ADDED);
}

#[test]
fn updated_with_null_to_does_not_trigger() {
    let decision = TriggerEngine::new(LABEL).decide(&updated(Some(json!([
        { "field": "labels", "fromString": "ai-automate", "toString": null }
    ]))));
    assert!(!decision.triggered);
}

#[test]
fn updated_without_changelog_does_not_trigger() {
    let decision = TriggerEngine::new(LABEL).decide(&updated(None));
    assert!(!decision.triggered);
    assert_eq!(decision.reason, REASON_LABEL_NOT_ADDED);
}

#[test]
fn updated_without_labels_entry_does_not_trigger() {
    // The issue already carries the label; only a labels change counts.
    let decision = TriggerEngine::new(LABEL).decide(&updated(Some(json!([
        { "field": "status", "fromString": "To Do", "toString": "In Progress" }
    ]))));
    assert!(!decision.triggered);
    assert_eq!(decision.reason, REASON_LABEL_NOT_ADDED);
}

#[test]
fn updated_label_token_must_match_exactly() {
    let decision = TriggerEngine::new(LABEL).decide(&updated(Some(json!([
        { "field": "labels", "fromString": "", "toString": "ai-automated" }
    ]))));
    assert!(!decision.triggered);
}

#[test]
fn label_edit_with_label_already_present_triggers_again() {
    // `fromString` is not consulted: any labels edit whose new value carries
    // the trigger label counts as an addition.
    let decision = TriggerEngine::new(LABEL).decide(&updated(Some(json!([
        { "field": "labels", "fromString": "ai-automate", "toString": "ai-automate backend" }
    ]))));
    assert!(decision.triggered);
    assert_eq!(decision.reason, REASON_LABEL_ADDED);
}

// ── Unsupported ──────────────────────────────────────────────

#[test]
fn unsupported_event_never_triggers() {
    let evt = event(json!({
        "webhookEvent": "jira:issue_deleted",
        "issue": { "id": "1", "key": "PROJ-9", "fields": { "labels": [LABEL] } }
    }));
    assert_eq!(evt.event_type, EventType::Unsupported);

    let decision = TriggerEngine::new(LABEL).decide(&evt);
    assert!(!decision.triggered);
    assert_eq!(decision.reason, REASON_UNSUPPORTED);
}

#[test]
fn decision_is_deterministic() {
    let engine = TriggerEngine::new(LABEL);
    let evt = created(&[LABEL]);
    assert_eq!(engine.decide(&evt), engine.decide(&evt));
}

// ── Relevant changes ─────────────────────────────────────────

#[test]
fn relevant_changes_keeps_assignee_labels_status_in_order() {
    let changes = vec![
        FieldChange {
            field: "summary".into(),
            from: Some("a".into()),
            to: Some("b".into()),
        },
        FieldChange {
            field: "status".into(),
            from: Some("To Do".into()),
            to: Some("Done".into()),
        },
        FieldChange {
            field: "assignee".into(),
            from: None,
            to: Some("Ada".into()),
        },
        FieldChange {
            field: "labels".into(),
            from: None,
            to: Some(LABEL.into()),
        },
    ];

    let fields: Vec<String> = relevant_changes(&changes)
        .into_iter()
        .map(|change| change.field)
        .collect();
    assert_eq!(fields, vec!["status", "assignee", "labels"]);
}
