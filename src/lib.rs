#![forbid(unsafe_code)]

//! Jira webhook trigger engine and durable task pipeline.
//!
//! The server binary receives Jira webhooks, decides which events start
//! automation, enriches triggered issues from the Jira API and publishes a
//! task to a durable RabbitMQ work queue. The worker binary consumes those
//! tasks one at a time, acknowledging on success and dead-lettering on any
//! failure.

pub mod config;
pub mod errors;
pub mod http;
pub mod jira;
pub mod models;
pub mod queue;
pub mod richtext;
pub mod telemetry;
pub mod trigger;
pub mod txn;
pub mod worker;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
