// tests/config_loading.rs

mod common;
use crate::common::builders::{BuildConfigBuilder, CompositeConfigBuilder};
use crate::common::init_tracing;

use std::error::Error;
use std::fs;
use std::time::Duration;

use tempfile::tempdir;

use composite_build::config::{
    CompositeConfig, default_config_path, load_and_validate, load_from_path, parse_and_validate,
    parse_duration,
};
use composite_build::errors::CompositeError;
use composite_build::types::{BuildIdentifier, LogLevel};

type TestResult = Result<(), Box<dyn Error>>;

const COMPOSITE: &str = r#"
[config]
monitoring_poll_interval = "250ms"
log_level = "debug"

[build.app]
root = true
requested = ["assemble"]

[build.app.task.assemble]
after = ["compile", "lib:jar"]

[build.app.task.compile]

[build.lib.task.jar]
after = ["classes"]

[build.lib.task.classes]

[build.docs.task.site]
"#;

fn config_error_message(result: Result<CompositeConfig, CompositeError>) -> String {
    match result {
        Err(CompositeError::ConfigError(msg)) => msg,
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn loads_a_valid_composite_from_disk() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let path = dir.path().join("Composite.toml");
    fs::write(&path, COMPOSITE)?;

    let config = load_and_validate(&path)?;

    assert_eq!(config.root_name(), "app");
    assert_eq!(config.log_level(), Some(LogLevel::Debug));
    assert_eq!(config.monitoring_poll_interval(), Duration::from_millis(250));
    assert_eq!(
        config.registry_options().monitoring_poll_interval,
        Duration::from_millis(250)
    );
    assert_eq!(
        config.identifiers(),
        vec![
            BuildIdentifier::included("docs"),
            BuildIdentifier::included("lib"),
            BuildIdentifier::Root,
        ]
    );
    Ok(())
}

#[test]
fn identifiers_map_back_to_section_names() -> TestResult {
    init_tracing();
    let config = parse_and_validate(COMPOSITE)?;

    assert_eq!(config.identifier_of("app"), BuildIdentifier::Root);
    assert_eq!(config.identifier_of("lib"), BuildIdentifier::included("lib"));
    assert_eq!(config.name_of(&BuildIdentifier::Root), "app");
    assert!(config.build_config(&BuildIdentifier::Root).is_some_and(|b| b.root));
    assert!(config.build_config(&BuildIdentifier::included("app")).is_none());
    assert!(config.build_config(&BuildIdentifier::included("missing")).is_none());
    Ok(())
}

#[test]
fn raw_load_does_not_validate() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let path = dir.path().join("Composite.toml");
    fs::write(&path, "[build.lib.task.jar]\n")?;

    let raw = load_from_path(&path)?;
    assert_eq!(raw.build.len(), 1);
    assert_eq!(raw.config.monitoring_poll_interval, "10s");

    assert!(matches!(
        load_and_validate(&path),
        Err(CompositeError::ConfigError(_))
    ));
    Ok(())
}

#[test]
fn defaults_apply_when_config_section_is_missing() -> TestResult {
    init_tracing();
    let config = parse_and_validate("[build.app]\nroot = true\n")?;

    assert_eq!(config.monitoring_poll_interval(), Duration::from_secs(10));
    assert_eq!(config.log_level(), None);
    assert_eq!(config.identifiers(), vec![BuildIdentifier::Root]);
    Ok(())
}

#[test]
fn empty_composite_is_rejected() {
    init_tracing();
    let msg = config_error_message(parse_and_validate("[config]\n"));
    assert!(msg.contains("at least one"), "{msg}");
}

#[test]
fn missing_root_is_rejected() {
    init_tracing();
    let raw = CompositeConfigBuilder::new()
        .with_build("lib", BuildConfigBuilder::new().build())
        .raw();

    let msg = config_error_message(CompositeConfig::try_from(raw));
    assert!(msg.contains("found none"), "{msg}");
}

#[test]
fn two_roots_are_rejected() {
    init_tracing();
    let raw = CompositeConfigBuilder::new()
        .with_build("a", BuildConfigBuilder::root().build())
        .with_build("b", BuildConfigBuilder::root().build())
        .raw();

    let msg = config_error_message(CompositeConfig::try_from(raw));
    assert!(msg.contains("'a', 'b'"), "{msg}");
}

#[test]
fn build_names_cannot_contain_separator() {
    init_tracing();
    let raw = CompositeConfigBuilder::new()
        .with_build("app", BuildConfigBuilder::root().build())
        .with_build("lib:core", BuildConfigBuilder::new().build())
        .raw();

    let msg = config_error_message(CompositeConfig::try_from(raw));
    assert!(msg.contains("invalid build name 'lib:core'"), "{msg}");
}

#[test]
fn unknown_requested_task_is_rejected() {
    init_tracing();
    let raw = CompositeConfigBuilder::new()
        .with_build("app", BuildConfigBuilder::root().requesting("lib:jar").build())
        .with_build("lib", BuildConfigBuilder::new().build())
        .raw();

    let msg = config_error_message(CompositeConfig::try_from(raw));
    assert!(msg.contains("requests unknown task 'lib:jar'"), "{msg}");
}

#[test]
fn unknown_after_reference_is_rejected() {
    init_tracing();
    let raw = CompositeConfigBuilder::new()
        .with_build(
            "app",
            BuildConfigBuilder::root().with_task("assemble", &["missing"]).build(),
        )
        .raw();

    let msg = config_error_message(CompositeConfig::try_from(raw));
    assert!(msg.contains("unknown dependency 'missing'"), "{msg}");
}

#[test]
fn self_dependency_is_rejected() {
    init_tracing();
    let raw = CompositeConfigBuilder::new()
        .with_build(
            "app",
            BuildConfigBuilder::root().with_task("assemble", &["app:assemble"]).build(),
        )
        .raw();

    let msg = config_error_message(CompositeConfig::try_from(raw));
    assert!(msg.contains("cannot depend on itself"), "{msg}");
}

#[test]
fn cycle_across_builds_is_rejected() {
    init_tracing();
    let raw = CompositeConfigBuilder::new()
        .with_build("app", BuildConfigBuilder::root().with_task("a", &["lib:b"]).build())
        .with_build("lib", BuildConfigBuilder::new().with_task("b", &["app:a"]).build())
        .raw();

    match CompositeConfig::try_from(raw) {
        Err(CompositeError::InvalidWorkGraph(msg)) => {
            assert!(msg.contains("cycle detected"), "{msg}");
        }
        other => panic!("expected InvalidWorkGraph, got {other:?}"),
    }
}

#[test]
fn bad_poll_intervals_are_rejected() {
    init_tracing();
    for interval in ["soon", "10", "5d", "0s"] {
        let raw = CompositeConfigBuilder::new()
            .with_build("app", BuildConfigBuilder::root().build())
            .with_poll_interval(interval)
            .raw();

        let msg = config_error_message(CompositeConfig::try_from(raw));
        assert!(msg.contains("monitoring_poll_interval"), "{interval}: {msg}");
    }
}

#[test]
fn parse_duration_understands_units() {
    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
    assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
    assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("ms").is_err());
}

#[test]
fn oversized_poll_interval_is_a_config_error() {
    init_tracing();
    assert!(parse_duration("18446744073709551615m").is_err());
    assert!(parse_duration("18446744073709551615h").is_err());

    let raw = CompositeConfigBuilder::new()
        .with_build("app", BuildConfigBuilder::root().build())
        .with_poll_interval("18446744073709551615h")
        .raw();
    let msg = config_error_message(CompositeConfig::try_from(raw));
    assert!(msg.contains("too large"), "{msg}");
}

#[test]
fn malformed_toml_is_a_toml_error() {
    init_tracing();
    let result = parse_and_validate("[build.app\nroot = true");
    assert!(matches!(result, Err(CompositeError::TomlError(_))));
}

#[test]
fn missing_file_is_an_io_error() -> TestResult {
    init_tracing();
    let dir = tempdir()?;

    let result = load_and_validate(dir.path().join("nope.toml"));

    assert!(matches!(result, Err(CompositeError::IoError(_))));
    Ok(())
}

#[test]
fn default_path_is_composite_toml() {
    assert_eq!(default_config_path().to_str(), Some("Composite.toml"));
}
