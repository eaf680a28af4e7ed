//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service name under which credentials are stored.
const KEYRING_SERVICE: &str = "jira-automation";

/// Broker connectivity and queue naming.
///
/// The connection URL usually embeds credentials, so it is loaded at runtime
/// via OS keychain or the `RABBITMQ_URL` environment variable rather than
/// read from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BrokerConfig {
    /// AMQP connection URL (populated at runtime).
    #[serde(skip)]
    pub url: String,
    /// Durable queue holding automation tasks.
    pub work_queue: String,
    /// Durable queue receiving dead-lettered tasks.
    pub dead_letter_queue: String,
    /// Direct exchange that routes rejected tasks to the dead-letter queue.
    #[serde(default = "default_dead_letter_exchange")]
    pub dead_letter_exchange: String,
}

fn default_dead_letter_exchange() -> String {
    "dlx-exchange".into()
}

impl BrokerConfig {
    fn validate(&self) -> Result<()> {
        if self.work_queue.trim().is_empty() {
            return Err(AppError::Config("broker.work_queue must not be empty".into()));
        }
        if self.dead_letter_queue.trim().is_empty() {
            return Err(AppError::Config(
                "broker.dead_letter_queue must not be empty".into(),
            ));
        }
        if self.work_queue == self.dead_letter_queue {
            return Err(AppError::Config(
                "broker.work_queue and broker.dead_letter_queue must differ".into(),
            ));
        }
        if self.dead_letter_exchange.trim().is_empty() {
            return Err(AppError::Config(
                "broker.dead_letter_exchange must not be empty".into(),
            ));
        }
        Ok(())
    }

    async fn load_url(&mut self) -> Result<()> {
        self.url = load_credential("rabbitmq_url", "RABBITMQ_URL").await?;
        Ok(())
    }
}

/// Issue tracker (Jira Cloud) connectivity.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct JiraConfig {
    /// Base URL of the Jira site, e.g. `https://example.atlassian.net`.
    pub host: String,
    /// Account email used for basic authentication.
    pub email: String,
    /// API token (populated at runtime).
    #[serde(skip)]
    pub api_token: String,
}

fn default_http_port() -> u16 {
    5000
}

fn default_repository_field() -> Option<String> {
    Some("Repository".into())
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Label whose presence on creation, or addition on update, starts automation.
    pub trigger_label: String,
    /// HTTP port for the webhook listener.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Display name of the tracker field that carries repository links.
    #[serde(default = "default_repository_field")]
    pub repository_field: Option<String>,
    /// Broker and queue settings.
    pub broker: BrokerConfig,
    /// Jira connectivity settings.
    pub jira: JiraConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the broker URL from OS keychain with `RABBITMQ_URL` fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither source provides a value.
    pub async fn load_broker_credentials(&mut self) -> Result<()> {
        self.broker.load_url().await
    }

    /// Load the Jira API token from OS keychain with `JIRA_API_TOKEN` fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither source provides a value.
    pub async fn load_jira_credentials(&mut self) -> Result<()> {
        self.jira.api_token = load_credential("jira_api_token", "JIRA_API_TOKEN").await?;
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.trigger_label = self.trigger_label.trim().to_owned();
        if self.trigger_label.is_empty() {
            return Err(AppError::Config("trigger_label must not be empty".into()));
        }
        if self.trigger_label.contains(char::is_whitespace) {
            return Err(AppError::Config(
                "trigger_label must be a single label without whitespace".into(),
            ));
        }

        self.broker.validate()?;

        let host = self.jira.host.trim().trim_end_matches('/');
        if !(host.starts_with("https://") || host.starts_with("http://")) {
            return Err(AppError::Config(
                "jira.host must be an http(s) URL".into(),
            ));
        }
        self.jira.host = host.to_owned();

        if self
            .repository_field
            .as_deref()
            .is_some_and(|field| field.trim().is_empty())
        {
            self.repository_field = None;
        }

        Ok(())
    }
}

/// Configuration for the worker binary: only the `[broker]` section.
///
/// Reads the same `config.toml` as [`GlobalConfig`]; every other section is
/// ignored, so a worker host needs neither the trigger label nor Jira
/// settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Broker and queue settings.
    pub broker: BrokerConfig,
}

impl WorkerConfig {
    /// Load and validate the broker section from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, is not valid
    /// TOML, or has a missing or invalid `[broker]` section.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse the broker section from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.broker.validate()?;
        Ok(config)
    }

    /// Load the broker URL from OS keychain with `RABBITMQ_URL` fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither source provides a value.
    pub async fn load_broker_credentials(&mut self) -> Result<()> {
        self.broker.load_url().await
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
