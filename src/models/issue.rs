//! Enriched issue detail captured when a trigger fires.
//!
//! An [`IssueSnapshot`] is built once from the tracker's full issue response
//! and travels by value inside a [`Task`](super::task::Task). Every field has
//! a serde default so that older or partial task bodies still decode.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw and rendered forms of a rich-text field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RichTextBody {
    /// Original document tree (or plain string) as returned by the tracker.
    pub raw: Value,
    /// Server-rendered HTML, when requested.
    pub rendered: String,
}

/// Workflow status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusInfo {
    /// Status id.
    pub id: Option<String>,
    /// Display name, e.g. `In Progress`.
    pub name: String,
    /// Status category name, e.g. `To Do`.
    pub category: String,
}

/// Any id + name pair (priority, component).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamedRef {
    /// Object id.
    pub id: Option<String>,
    /// Display name.
    pub name: String,
}

/// Tracker user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Person {
    /// Atlassian account id.
    pub account_id: Option<String>,
    /// Name shown in the UI.
    pub display_name: Option<String>,
    /// Email, when the site exposes it.
    pub email: Option<String>,
    /// 48x48 avatar image.
    pub avatar_url: Option<String>,
}

/// Release the issue is scheduled for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixVersion {
    /// Version id.
    pub id: Option<String>,
    /// Version name.
    pub name: String,
    /// Whether the version has shipped.
    pub released: bool,
}

/// Owning project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectInfo {
    /// Project id.
    pub id: Option<String>,
    /// Key prefix, e.g. `PROJ`.
    pub key: String,
    /// Project name.
    pub name: String,
}

/// Issue type (Story, Bug, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueTypeInfo {
    /// Type id.
    pub id: Option<String>,
    /// Type name.
    pub name: String,
    /// Whether issues of this type are subtasks.
    pub subtask: bool,
}

/// Parent issue or subtask summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedIssue {
    /// Issue id.
    pub id: Option<String>,
    /// Issue key.
    pub key: String,
    /// Issue summary.
    pub summary: String,
    /// Status name.
    pub status: String,
}

/// Direction of an issue link relative to the snapshot's issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkDirection {
    /// The other issue points at this one.
    Inward,
    /// This issue points at the other one.
    Outward,
}

/// The far end of an issue link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedIssue {
    /// Issue key.
    pub key: String,
    /// Issue summary.
    pub summary: String,
    /// Status name.
    pub status: String,
    /// Which side of the link this issue is on.
    pub direction: LinkDirection,
}

/// Typed link to another issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IssueLink {
    /// Link id.
    pub id: Option<String>,
    /// Link type name, e.g. `Blocks`.
    #[serde(rename = "type")]
    pub link_type: String,
    /// Inward phrasing, e.g. `is blocked by`.
    pub inward: String,
    /// Outward phrasing, e.g. `blocks`.
    pub outward: String,
    /// Linked issue, if the response carried one.
    pub linked_issue: Option<LinkedIssue>,
}

/// File attached to the issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Attachment {
    /// Attachment id.
    pub id: Option<String>,
    /// Original file name.
    pub filename: String,
    /// MIME type reported by the tracker.
    pub mime_type: Option<String>,
    /// Size in bytes.
    pub size: Option<u64>,
    /// Download URL.
    pub content: Option<String>,
    /// Upload time.
    pub created: Option<String>,
}

/// Issue comment with its body flattened to text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    /// Comment id.
    pub id: Option<String>,
    /// Author display name.
    pub author: String,
    /// Raw body (document tree or string).
    pub body: Value,
    /// Body flattened to plain text.
    pub text: String,
    /// Creation time.
    pub created: Option<String>,
    /// Last edit time.
    pub updated: Option<String>,
}

/// Estimates and logged work, in the tracker's display format (`3d 4h`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeTracking {
    /// Estimate when work started.
    pub original_estimate: Option<String>,
    /// Work left.
    pub remaining_estimate: Option<String>,
    /// Work logged so far.
    pub time_spent: Option<String>,
}

/// Lifecycle timestamps as returned by the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IssueDates {
    /// Creation time.
    pub created: Option<String>,
    /// Last update time.
    pub updated: Option<String>,
    /// Due date, if set.
    pub due_date: Option<String>,
}

/// Full issue detail plus the fields derived from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IssueSnapshot {
    /// Numeric issue id.
    pub id: String,
    /// Issue key, e.g. `PROJ-1`.
    pub key: String,
    /// REST URL of the issue.
    #[serde(rename = "self")]
    pub self_url: Option<String>,
    /// One-line title.
    pub summary: String,
    /// Raw description body.
    pub description: RichTextBody,
    /// Workflow status.
    pub status: StatusInfo,
    /// Priority.
    pub priority: NamedRef,
    /// Current assignee, if any.
    pub assignee: Option<Person>,
    /// Who filed the issue.
    pub reporter: Option<Person>,
    /// Labels in tracker order.
    pub labels: Vec<String>,
    /// Project components.
    pub components: Vec<NamedRef>,
    /// Target releases.
    pub fix_versions: Vec<FixVersion>,
    /// Owning project.
    pub project: ProjectInfo,
    /// Issue type.
    pub issue_type: IssueTypeInfo,
    /// Parent issue, for subtasks.
    pub parent: Option<RelatedIssue>,
    /// Child subtasks.
    pub subtasks: Vec<RelatedIssue>,
    /// Links to other issues.
    pub issue_links: Vec<IssueLink>,
    /// Attached files.
    pub attachments: Vec<Attachment>,
    /// Comments, oldest first.
    pub comments: Vec<Comment>,
    /// Present only when the tracker returned a non-empty object.
    pub time_tracking: Option<TimeTracking>,
    /// Created, updated and due timestamps.
    pub dates: IssueDates,
    /// Description flattened to plain text.
    pub description_text: String,
    /// Repository links mined from the repository field, first-seen order.
    pub repository_urls: Vec<String>,
}

impl IssueSnapshot {
    /// First repository link, which is the one automation acts on.
    #[must_use]
    pub fn primary_repository(&self) -> Option<&str> {
        self.repository_urls.first().map(String::as_str)
    }
}
