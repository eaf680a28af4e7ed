//! Trigger decision engine.
//!
//! Decides whether a normalized [`WebhookEvent`] should launch automation.
//! Pure and deterministic: the only input besides the event is the
//! configured trigger label.

use serde::Serialize;
use tracing::{debug, debug_span};

use crate::models::event::{EventType, FieldChange, IssueRef, WebhookEvent};

/// Changelog fields worth reporting on.
pub const RELEVANT_FIELDS: &[&str] = &["assignee", "labels", "status"];

/// Changelog field inspected for label additions.
const LABELS_FIELD: &str = "labels";

/// Event type is neither create nor update.
pub const REASON_UNSUPPORTED: &str = "unsupported event type";
/// Issue does not carry the trigger label.
pub const REASON_MISSING_LABEL: &str = "missing trigger label";
/// Update did not add the trigger label.
pub const REASON_LABEL_NOT_ADDED: &str = "trigger label not added";
/// Issue was created with the trigger label.
pub const REASON_LABEL_PRESENT: &str = "trigger label present on creation";
/// Update added the trigger label.
pub const REASON_LABEL_ADDED: &str = "trigger label added";

/// Outcome of evaluating one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDecision {
    /// Whether automation should start.
    pub triggered: bool,
    /// Human-readable explanation.
    pub reason: String,
    /// Issue the decision applies to.
    pub issue: IssueRef,
}

/// Evaluates events against a single configured trigger label.
#[derive(Debug, Clone)]
pub struct TriggerEngine {
    trigger_label: String,
}

impl TriggerEngine {
    /// Create an engine for `trigger_label`.
    #[must_use]
    pub fn new(trigger_label: impl Into<String>) -> Self {
        Self {
            trigger_label: trigger_label.into(),
        }
    }

    /// The configured trigger label.
    #[must_use]
    pub fn trigger_label(&self) -> &str {
        &self.trigger_label
    }

    /// Decide whether `event` should trigger automation.
    ///
    /// Rules, in order:
    /// 1. Unsupported event types never trigger.
    /// 2. Created issues trigger iff they already carry the label.
    /// 3. Updated issues trigger iff a `labels` change lists the label in
    ///    its `to` value. No changelog, or no `labels` entry, means the label
    ///    was not added.
    #[must_use]
    pub fn decide(&self, event: &WebhookEvent) -> TriggerDecision {
        let _span = debug_span!(
            "trigger_decide",
            issue_key = %event.issue.key,
            event_type = ?event.event_type,
        )
        .entered();

        let (triggered, reason) = match event.event_type {
            EventType::Unsupported => (false, REASON_UNSUPPORTED),
            EventType::IssueCreated => {
                if event.issue.has_label(&self.trigger_label) {
                    (true, REASON_LABEL_PRESENT)
                } else {
                    (false, REASON_MISSING_LABEL)
                }
            }
            EventType::IssueUpdated => {
                if self.label_added(event.changelog.as_deref().unwrap_or_default()) {
                    (true, REASON_LABEL_ADDED)
                } else {
                    (false, REASON_LABEL_NOT_ADDED)
                }
            }
        };

        debug!(triggered, reason, "trigger decision");

        TriggerDecision {
            triggered,
            reason: reason.to_owned(),
            issue: event.issue.clone(),
        }
    }

    /// Whether any `labels` change lists the trigger label among its
    /// whitespace-separated `to` tokens. Matching is exact.
    ///
    /// The `from` side is not consulted, so an unrelated labels edit on an
    /// issue that already carries the label also counts.
    fn label_added(&self, changes: &[FieldChange]) -> bool {
        changes
            .iter()
            .filter(|change| change.field == LABELS_FIELD)
            .filter_map(|change| change.to.as_deref())
            .any(|to| to.split_whitespace().any(|token| token == self.trigger_label))
    }
}

/// Changelog entries for the fields listed in [`RELEVANT_FIELDS`].
#[must_use]
pub fn relevant_changes(changes: &[FieldChange]) -> Vec<FieldChange> {
    changes
        .iter()
        .filter(|change| RELEVANT_FIELDS.contains(&change.field.as_str()))
        .cloned()
        .collect()
}
