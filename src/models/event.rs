//! Inbound Jira webhook payloads and their normalized event form.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw `jira:issue_*` webhook body as delivered by Jira.
///
/// Unknown fields are ignored; only the parts the trigger engine reads are
/// modelled.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Event discriminator, e.g. `jira:issue_created`.
    pub webhook_event: String,
    /// Issue the event refers to.
    pub issue: RawIssue,
    /// Field changes, present on update events.
    #[serde(default)]
    pub changelog: Option<RawChangelog>,
    /// Event time in epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Issue object embedded in a webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RawIssue {
    /// Numeric issue id (string-encoded by Jira).
    pub id: String,
    /// Human-readable key, e.g. `PROJ-1`.
    pub key: String,
    /// Field bag.
    #[serde(default)]
    pub fields: RawIssueFields,
}

/// Subset of issue fields carried in webhook payloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawIssueFields {
    /// Issue title.
    #[serde(default)]
    pub summary: Option<String>,
    /// Description tree or string.
    #[serde(default)]
    pub description: Value,
    /// Current assignee.
    #[serde(default)]
    pub assignee: Option<RawUser>,
    /// Labels.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Workflow status.
    #[serde(default)]
    pub status: Option<RawNamed>,
    /// Owning project.
    #[serde(default)]
    pub project: Option<RawProject>,
    /// Issue type.
    #[serde(default)]
    pub issuetype: Option<RawNamed>,
}

/// Jira user reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
    /// Atlassian account id.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Email, when exposed.
    #[serde(default)]
    pub email_address: Option<String>,
}

/// Any Jira object that carries a `name`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawNamed {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Project reference.
#[derive(Debug, Clone, Deserialize)]
pub struct RawProject {
    /// Project key.
    #[serde(default)]
    pub key: Option<String>,
    /// Project name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Changelog wrapper.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChangelog {
    /// Changed fields.
    #[serde(default)]
    pub items: Vec<RawChangeItem>,
}

/// A single changelog entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChangeItem {
    /// Field id, e.g. `labels`.
    #[serde(default)]
    pub field: String,
    /// Value before the change.
    #[serde(default)]
    pub from_string: Option<String>,
    /// Value after the change.
    #[serde(default)]
    pub to_string: Option<String>,
}

/// Kind of webhook event, as far as automation is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// `jira:issue_created`.
    IssueCreated,
    /// `jira:issue_updated`.
    IssueUpdated,
    /// Anything else.
    Unsupported,
}

impl EventType {
    /// Map a Jira `webhookEvent` string onto an event type.
    #[must_use]
    pub fn from_webhook_event(name: &str) -> Self {
        match name {
            "jira:issue_created" => Self::IssueCreated,
            "jira:issue_updated" => Self::IssueUpdated,
            _ => Self::Unsupported,
        }
    }
}

/// Assignee projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignee {
    /// Atlassian account id.
    pub account_id: Option<String>,
    /// Display name.
    pub display_name: Option<String>,
    /// Email, when exposed.
    pub email: Option<String>,
}

/// Project projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    /// Project key.
    pub key: String,
    /// Project name.
    pub name: String,
}

/// Minimal issue projection used by the trigger engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRef {
    /// Numeric issue id.
    pub id: String,
    /// Issue key.
    pub key: String,
    /// Issue title.
    pub summary: String,
    /// Raw rich-text tree, plain string, or null.
    pub description: Value,
    /// Current assignee.
    pub assignee: Option<Assignee>,
    /// Unordered; membership is all that matters.
    pub labels: BTreeSet<String>,
    /// Status name.
    pub status: String,
    /// Owning project.
    pub project: ProjectRef,
    /// Issue type name.
    pub issue_type: String,
}

impl IssueRef {
    /// Whether the issue currently carries `label`.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

/// One field change within an update event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Field id.
    pub field: String,
    /// Value before the change.
    pub from: Option<String>,
    /// Value after the change.
    pub to: Option<String>,
}

/// Normalized, immutable view of an inbound webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    /// What happened.
    pub event_type: EventType,
    /// Issue as carried in the payload.
    pub issue: IssueRef,
    /// `None` when the payload carried no changelog at all.
    pub changelog: Option<Vec<FieldChange>>,
    /// Event time in epoch milliseconds, when Jira supplied one.
    pub timestamp: Option<i64>,
}

impl From<WebhookPayload> for WebhookEvent {
    fn from(payload: WebhookPayload) -> Self {
        let WebhookPayload {
            webhook_event,
            issue,
            changelog,
            timestamp,
        } = payload;
        let fields = issue.fields;

        let issue = IssueRef {
            id: issue.id,
            key: issue.key,
            summary: fields.summary.unwrap_or_default(),
            description: fields.description,
            assignee: fields.assignee.map(|user| Assignee {
                account_id: user.account_id,
                display_name: user.display_name,
                email: user.email_address,
            }),
            labels: fields.labels.into_iter().collect(),
            status: fields
                .status
                .and_then(|status| status.name)
                .unwrap_or_default(),
            project: fields
                .project
                .map(|project| ProjectRef {
                    key: project.key.unwrap_or_default(),
                    name: project.name.unwrap_or_default(),
                })
                .unwrap_or_default(),
            issue_type: fields
                .issuetype
                .and_then(|kind| kind.name)
                .unwrap_or_default(),
        };

        let changelog = changelog.map(|log| {
            log.items
                .into_iter()
                .map(|item| FieldChange {
                    field: item.field,
                    from: item.from_string,
                    to: item.to_string,
                })
                .collect()
        });

        Self {
            event_type: EventType::from_webhook_event(&webhook_event),
            issue,
            changelog,
            timestamp,
        }
    }
}
