//! Jira Cloud REST v3 client.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, Instrument};

use super::{snapshot_from_issue, IssueTracker};
use crate::config::JiraConfig;
use crate::models::issue::IssueSnapshot;
use crate::queue::BoxFuture;
use crate::{AppError, Result};

const ISSUE_EXPAND: &str = "renderedFields,names,changelog";

#[derive(Debug, Deserialize)]
struct FieldDefinition {
    id: String,
    name: String,
}

/// Basic-auth client for one Jira site.
///
/// The field list rarely changes, so the name to id mapping is fetched once
/// and cached for the life of the client.
pub struct JiraClient {
    http: reqwest::Client,
    host: String,
    email: String,
    api_token: String,
    repository_field: Option<String>,
    field_cache: Mutex<Option<HashMap<String, String>>>,
}

impl JiraClient {
    /// Build a client from validated configuration.
    ///
    /// `repository_field` is the display name of the field mined for
    /// repository links.
    #[must_use]
    pub fn new(config: &JiraConfig, repository_field: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            host: config.host.clone(),
            email: config.email.clone(),
            api_token: config.api_token.clone(),
            repository_field,
            field_cache: Mutex::new(None),
        }
    }

    fn issue_url(&self, issue_key: &str) -> String {
        format!(
            "{}/rest/api/3/issue/{issue_key}?expand={ISSUE_EXPAND}&fields=*all",
            self.host
        )
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.email, Some(&self.api_token))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Tracker(format!(
                "GET {url} returned {status}: {body}"
            )));
        }
        Ok(response.json().await?)
    }

    async fn fetch_issue(&self, issue_key: &str) -> Result<IssueSnapshot> {
        if issue_key.trim().is_empty() {
            return Err(AppError::Tracker("issue key must not be empty".into()));
        }

        let repository_field_id = match self.repository_field.as_deref() {
            Some(name) => self.fetch_field_mapping().await?.get(name).cloned(),
            None => None,
        };
        if self.repository_field.is_some() && repository_field_id.is_none() {
            debug!("repository field not present on this site");
        }

        let raw = self.get_json(&self.issue_url(issue_key)).await?;
        let snapshot = snapshot_from_issue(&raw, repository_field_id.as_deref());
        info!(
            repositories = snapshot.repository_urls.len(),
            comments = snapshot.comments.len(),
            "fetched issue detail"
        );
        Ok(snapshot)
    }

    async fn fetch_field_mapping(&self) -> Result<HashMap<String, String>> {
        let mut cache = self.field_cache.lock().await;
        if let Some(mapping) = cache.as_ref() {
            return Ok(mapping.clone());
        }

        let url = format!("{}/rest/api/3/field", self.host);
        let fields: Vec<FieldDefinition> = serde_json::from_value(self.get_json(&url).await?)
            .map_err(|err| AppError::Tracker(format!("unexpected field list: {err}")))?;

        let mapping: HashMap<String, String> =
            fields.into_iter().map(|f| (f.name, f.id)).collect();
        debug!(fields = mapping.len(), "cached field mapping");
        *cache = Some(mapping.clone());
        Ok(mapping)
    }
}

impl IssueTracker for JiraClient {
    fn get_issue<'a>(
        &'a self,
        issue_key: &'a str,
        txn_id: &'a str,
    ) -> BoxFuture<'a, Result<IssueSnapshot>> {
        let span = info_span!("jira_get_issue", txn_id, issue_key);
        Box::pin(self.fetch_issue(issue_key).instrument(span))
    }

    fn field_mapping<'a>(
        &'a self,
        txn_id: &'a str,
    ) -> BoxFuture<'a, Result<HashMap<String, String>>> {
        let span = info_span!("jira_field_mapping", txn_id);
        Box::pin(self.fetch_field_mapping().instrument(span))
    }
}
