//! Worker side: turn a dequeued task into an automation run.

pub mod dry_run;

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::models::issue::IssueSnapshot;
use crate::models::task::Task;
use crate::queue::{BoxFuture, TaskHandler};
use crate::{AppError, Result};

pub use dry_run::DryRunExecutor;

/// Result of a successful automation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationOutcome {
    /// Branch the change was pushed to.
    pub branch_name: String,
    /// Pull request opened for the branch, if the executor opens one.
    pub pr_url: Option<String>,
}

/// Performs the code change for one issue against one repository.
pub trait AutomationExecutor: Send + Sync {
    /// # Errors
    ///
    /// Returns `AppError::Executor` when the run fails.
    fn execute<'a>(
        &'a self,
        issue: &'a IssueSnapshot,
        repository_url: &'a str,
        txn_id: &'a str,
    ) -> BoxFuture<'a, Result<AutomationOutcome>>;
}

/// [`TaskHandler`] that runs the configured executor against the issue's
/// first repository link.
pub struct AutomationHandler {
    executor: Arc<dyn AutomationExecutor>,
}

impl AutomationHandler {
    /// Handler delegating to `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn AutomationExecutor>) -> Self {
        Self { executor }
    }
}

impl TaskHandler for AutomationHandler {
    fn handle<'a>(&'a self, task: Task, txn_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let Some(repository_url) = task.issue.primary_repository() else {
                return Err(AppError::Handler(format!(
                    "no repository URL found on {}",
                    task.issue_key
                )));
            };
            if task.issue.repository_urls.len() > 1 {
                info!(
                    count = task.issue.repository_urls.len(),
                    "multiple repositories linked; using the first"
                );
            }

            let outcome = self
                .executor
                .execute(&task.issue, repository_url, txn_id)
                .await?;
            info!(
                branch = %outcome.branch_name,
                pr_url = outcome.pr_url.as_deref().unwrap_or(""),
                repository = repository_url,
                "automation finished"
            );
            Ok(())
        })
    }
}
