//! Issue tracker access: fetch full issue detail for a triggered event.

pub mod client;
pub mod snapshot;

use std::collections::HashMap;

use crate::models::issue::IssueSnapshot;
use crate::queue::BoxFuture;
use crate::Result;

pub use client::JiraClient;
pub use snapshot::snapshot_from_issue;

/// Source of enriched issue detail.
pub trait IssueTracker: Send + Sync {
    /// Fetch the full snapshot for `issue_key`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tracker` if the request fails or the issue does
    /// not exist.
    fn get_issue<'a>(&'a self, issue_key: &'a str, txn_id: &'a str)
        -> BoxFuture<'a, Result<IssueSnapshot>>;

    /// Map of field display name to field id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tracker` if the field list cannot be fetched.
    fn field_mapping<'a>(&'a self, txn_id: &'a str)
        -> BoxFuture<'a, Result<HashMap<String, String>>>;
}
