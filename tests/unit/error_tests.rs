//! `AppError` display format and classification.

use jira_automation::AppError;

#[test]
fn display_uses_category_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Publish("x".into()), "publish: x"),
        (AppError::MalformedTask("x".into()), "malformed task: x"),
        (AppError::Handler("x".into()), "handler: x"),
        (AppError::Connection("x".into()), "connection: x"),
        (AppError::Broker("x".into()), "broker: x"),
        (AppError::Tracker("x".into()), "tracker: x"),
        (AppError::Executor("x".into()), "executor: x"),
        (AppError::Validation("x".into()), "validation: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn message_has_no_trailing_period() {
    let err = AppError::Publish("broker did not accept task PROJ-1".into());
    assert!(!err.to_string().ends_with('.'));
}

#[test]
fn only_connection_errors_are_faults() {
    assert!(AppError::Connection("closed".into()).is_connection_fault());
    assert!(!AppError::Broker("PRECONDITION_FAILED".into()).is_connection_fault());
    assert!(!AppError::Publish("nack".into()).is_connection_fault());
    assert!(!AppError::Handler("boom".into()).is_connection_fault());
}

#[test]
fn toml_error_converts_to_config() {
    let toml_err = toml::from_str::<toml::Value>("a = ").expect_err("invalid toml");
    let err = AppError::from(toml_err);
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().starts_with("config: invalid config:"));
}

#[test]
fn implements_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(AppError::Tracker("404".into()));
    assert_eq!(err.to_string(), "tracker: 404");
}
