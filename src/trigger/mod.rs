//! Webhook trigger evaluation.

pub mod engine;

pub use engine::{relevant_changes, TriggerDecision, TriggerEngine};
