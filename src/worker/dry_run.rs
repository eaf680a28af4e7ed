//! Executor that only reports what it would do.

use tracing::info;

use super::{AutomationExecutor, AutomationOutcome};
use crate::models::issue::IssueSnapshot;
use crate::queue::BoxFuture;
use crate::Result;

const MAX_SLUG_LEN: usize = 50;

/// Logs the planned branch and returns it without touching any repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunExecutor;

/// Lower-case `text`, collapse runs of non-alphanumerics to `-`, and cap
/// the result at a fixed length without a trailing `-`.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    slug.trim_end_matches('-').to_owned()
}

/// `feature/{KEY}-{slug}`, or `feature/{KEY}` when the summary has no usable
/// characters.
#[must_use]
pub fn branch_name(issue_key: &str, summary: &str) -> String {
    let slug = slugify(summary);
    if slug.is_empty() {
        format!("feature/{issue_key}")
    } else {
        format!("feature/{issue_key}-{slug}")
    }
}

impl AutomationExecutor for DryRunExecutor {
    fn execute<'a>(
        &'a self,
        issue: &'a IssueSnapshot,
        repository_url: &'a str,
        txn_id: &'a str,
    ) -> BoxFuture<'a, Result<AutomationOutcome>> {
        Box::pin(async move {
            let branch = branch_name(&issue.key, &issue.summary);
            info!(
                txn_id,
                issue_key = %issue.key,
                repository = repository_url,
                branch = %branch,
                "dry run: would create branch and open pull request"
            );
            Ok(AutomationOutcome {
                branch_name: branch,
                pr_url: None,
            })
        })
    }
}
