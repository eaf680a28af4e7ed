//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing, validation, or missing credential.
    Config(String),
    /// The broker refused or could not buffer a published message.
    Publish(String),
    /// A queue message body could not be decoded as a task.
    MalformedTask(String),
    /// Task processing failed inside the worker handler.
    Handler(String),
    /// The broker connection or channel dropped.
    Connection(String),
    /// A broker operation (declare, bind, ack) was refused.
    Broker(String),
    /// Issue tracker API failure.
    Tracker(String),
    /// Automation executor failure.
    Executor(String),
    /// Inbound payload failed validation.
    Validation(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether this error means the cached broker handle can no longer be used.
    #[must_use]
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Publish(msg) => write!(f, "publish: {msg}"),
            Self::MalformedTask(msg) => write!(f, "malformed task: {msg}"),
            Self::Handler(msg) => write!(f, "handler: {msg}"),
            Self::Connection(msg) => write!(f, "connection: {msg}"),
            Self::Broker(msg) => write!(f, "broker: {msg}"),
            Self::Tracker(msg) => write!(f, "tracker: {msg}"),
            Self::Executor(msg) => write!(f, "executor: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<lapin::Error> for AppError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::InvalidChannelState(_)
            | lapin::Error::InvalidConnectionState(_)
            | lapin::Error::IOError(_) => Self::Connection(err.to_string()),
            other => Self::Broker(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Tracker(err.to_string())
    }
}
