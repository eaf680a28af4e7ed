//! Build an [`IssueSnapshot`] from a raw Jira issue response.

use serde_json::Value;

use crate::models::issue::{
    Attachment, Comment, FixVersion, IssueDates, IssueLink, IssueSnapshot, IssueTypeInfo,
    LinkDirection, LinkedIssue, NamedRef, Person, ProjectInfo, RelatedIssue, RichTextBody,
    StatusInfo, TimeTracking,
};
use crate::richtext::{extract_text, mine_repository_urls};

fn text_at(value: &Value, pointer: &str) -> String {
    opt_text_at(value, pointer).unwrap_or_default()
}

fn opt_text_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn bool_at(value: &Value, pointer: &str) -> bool {
    value.pointer(pointer).and_then(Value::as_bool).unwrap_or(false)
}

fn array_at<'a>(value: &'a Value, pointer: &str) -> &'a [Value] {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

fn person(value: Option<&Value>) -> Option<Person> {
    let user = value.filter(|v| v.is_object())?;
    Some(Person {
        account_id: opt_text_at(user, "/accountId"),
        display_name: opt_text_at(user, "/displayName"),
        email: opt_text_at(user, "/emailAddress"),
        avatar_url: opt_text_at(user, "/avatarUrls/48x48"),
    })
}

fn linked_issue(link: &Value) -> Option<LinkedIssue> {
    let (issue, direction) = if let Some(issue) = link.get("inwardIssue") {
        (issue, LinkDirection::Inward)
    } else {
        (link.get("outwardIssue")?, LinkDirection::Outward)
    };
    Some(LinkedIssue {
        key: text_at(issue, "/key"),
        summary: text_at(issue, "/fields/summary"),
        status: text_at(issue, "/fields/status/name"),
        direction,
    })
}

/// Convert a full `GET /issue/{key}` response into a snapshot.
///
/// `repository_field_id` names the custom field whose value is mined for
/// repository links; without it `repository_urls` stays empty.
#[must_use]
pub fn snapshot_from_issue(raw: &Value, repository_field_id: Option<&str>) -> IssueSnapshot {
    let fields = raw.get("fields").unwrap_or(&Value::Null);
    let description = fields.get("description").cloned().unwrap_or(Value::Null);

    let repository_urls = repository_field_id
        .and_then(|id| fields.get(id))
        .map(mine_repository_urls)
        .unwrap_or_default();

    IssueSnapshot {
        id: text_at(raw, "/id"),
        key: text_at(raw, "/key"),
        self_url: opt_text_at(raw, "/self"),
        summary: text_at(fields, "/summary"),
        description_text: extract_text(&description),
        description: RichTextBody {
            raw: description,
            rendered: text_at(raw, "/renderedFields/description"),
        },
        status: StatusInfo {
            id: opt_text_at(fields, "/status/id"),
            name: text_at(fields, "/status/name"),
            category: text_at(fields, "/status/statusCategory/name"),
        },
        priority: NamedRef {
            id: opt_text_at(fields, "/priority/id"),
            name: text_at(fields, "/priority/name"),
        },
        assignee: person(fields.get("assignee")),
        reporter: person(fields.get("reporter")),
        labels: array_at(fields, "/labels")
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        components: array_at(fields, "/components")
            .iter()
            .map(|c| NamedRef {
                id: opt_text_at(c, "/id"),
                name: text_at(c, "/name"),
            })
            .collect(),
        fix_versions: array_at(fields, "/fixVersions")
            .iter()
            .map(|v| FixVersion {
                id: opt_text_at(v, "/id"),
                name: text_at(v, "/name"),
                released: bool_at(v, "/released"),
            })
            .collect(),
        project: ProjectInfo {
            id: opt_text_at(fields, "/project/id"),
            key: text_at(fields, "/project/key"),
            name: text_at(fields, "/project/name"),
        },
        issue_type: IssueTypeInfo {
            id: opt_text_at(fields, "/issuetype/id"),
            name: text_at(fields, "/issuetype/name"),
            subtask: bool_at(fields, "/issuetype/subtask"),
        },
        parent: fields.get("parent").filter(|p| p.is_object()).map(|p| RelatedIssue {
            id: opt_text_at(p, "/id"),
            key: text_at(p, "/key"),
            summary: text_at(p, "/fields/summary"),
            status: text_at(p, "/fields/status/name"),
        }),
        subtasks: array_at(fields, "/subtasks")
            .iter()
            .map(|s| RelatedIssue {
                id: opt_text_at(s, "/id"),
                key: text_at(s, "/key"),
                summary: text_at(s, "/fields/summary"),
                status: text_at(s, "/fields/status/name"),
            })
            .collect(),
        issue_links: array_at(fields, "/issuelinks")
            .iter()
            .map(|link| IssueLink {
                id: opt_text_at(link, "/id"),
                link_type: text_at(link, "/type/name"),
                inward: text_at(link, "/type/inward"),
                outward: text_at(link, "/type/outward"),
                linked_issue: linked_issue(link),
            })
            .collect(),
        attachments: array_at(fields, "/attachment")
            .iter()
            .map(|a| Attachment {
                id: opt_text_at(a, "/id"),
                filename: text_at(a, "/filename"),
                mime_type: opt_text_at(a, "/mimeType"),
                size: a.get("size").and_then(Value::as_u64),
                content: opt_text_at(a, "/content"),
                created: opt_text_at(a, "/created"),
            })
            .collect(),
        comments: array_at(fields, "/comment/comments")
            .iter()
            .map(|c| {
                let body = c.get("body").cloned().unwrap_or(Value::Null);
                Comment {
                    id: opt_text_at(c, "/id"),
                    author: text_at(c, "/author/displayName"),
                    text: extract_text(&body),
                    body,
                    created: opt_text_at(c, "/created"),
                    updated: opt_text_at(c, "/updated"),
                }
            })
            .collect(),
        time_tracking: fields
            .get("timetracking")
            .filter(|t| t.as_object().is_some_and(|o| !o.is_empty()))
            .map(|t| TimeTracking {
                original_estimate: opt_text_at(t, "/originalEstimate"),
                remaining_estimate: opt_text_at(t, "/remainingEstimate"),
                time_spent: opt_text_at(t, "/timeSpent"),
            }),
        dates: IssueDates {
            created: opt_text_at(fields, "/created"),
            updated: opt_text_at(fields, "/updated"),
            due_date: opt_text_at(fields, "/duedate"),
        },
        repository_urls,
    }
}
