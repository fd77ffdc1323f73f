// tests/logging.rs

use composite_build::logging::{init_logging, resolve_level};
use composite_build::types::LogLevel;
use tracing::Level;

#[test]
fn explicit_level_wins_over_environment() {
    assert_eq!(resolve_level(Some(LogLevel::Warn), Some("trace")), Level::WARN);
    assert_eq!(resolve_level(Some(LogLevel::Trace), None), Level::TRACE);
}

#[test]
fn environment_level_is_used_when_nothing_explicit() {
    assert_eq!(resolve_level(None, Some("debug")), Level::DEBUG);
    assert_eq!(resolve_level(None, Some(" Warning ")), Level::WARN);
    assert_eq!(resolve_level(None, Some("error")), Level::ERROR);
}

#[test]
fn unparseable_or_missing_environment_defaults_to_info() {
    assert_eq!(resolve_level(None, Some("loud")), Level::INFO);
    assert_eq!(resolve_level(None, None), Level::INFO);
}

// The only test in this binary that installs a global subscriber.
#[test]
fn second_initialisation_is_reported() {
    init_logging(Some(LogLevel::Info)).expect("first initialisation should succeed");

    let second = init_logging(Some(LogLevel::Debug));

    let err = second.expect_err("a subscriber is already installed");
    assert!(err.to_string().contains("failed to install tracing subscriber"));
}
