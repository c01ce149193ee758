//! Document loading and settings layering from real files

use std::io::Write;
use tempfile::{NamedTempFile, TempDir};
use testdrive::config::{loader, ConfigurationError, SessionSettings};

#[test]
fn test_load_document_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
version: "1"
services:
  db:
    image: postgres:16
    healthcheck:
      test: pg_isready -U postgres
tasks:
  itest:
    image: itest:latest
    depends_on: [db, itest]
"#
    )
    .unwrap();

    let config = tokio_test::assert_ok!(loader::load_config_file(file.path()));
    assert_eq!(config.version, "1");
    assert_eq!(
        config.services["db"].healthcheck.as_ref().unwrap().test,
        vec!["pg_isready", "-U", "postgres"]
    );
    assert_eq!(config.tasks["itest"].dependencies, vec!["db"]);
}

#[test]
fn test_directory_is_not_a_document() {
    let dir = TempDir::new().unwrap();
    let err = loader::load_config_file(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
}

#[test]
fn test_oversized_document_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    let padding = "#".repeat(2 * 1024 * 1024);
    writeln!(file, "{padding}").unwrap();

    let err = loader::load_config_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("exceeds"));
}

#[test]
fn test_name_declared_as_service_and_task() {
    let err = loader::load_config_str(
        r#"
services:
  db: {image: postgres}
tasks:
  db: {image: migrate}
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigurationError::DuplicateName { name } if name == "db"));
}

#[test]
fn test_unknown_dependency_is_rejected() {
    let err = loader::load_config_str(
        r#"
services:
  app: {image: app, depends_on: [cache]}
"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::UnknownDependency { ref name, ref dependency }
            if name == "app" && dependency == "cache"
    ));
}

#[test]
fn test_missing_image_is_rejected() {
    let err = loader::load_config_str("tasks:\n  itest:\n    image: \"  \"\n").unwrap_err();
    assert!(matches!(err, ConfigurationError::EmptyImage { .. }));
}

/// File and environment layering share process state, so they are checked together
#[test]
fn test_settings_layering() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("testdrive.settings.yaml"),
        "resync_interval_ms: 250\nname_prefix: ci\n",
    )
    .unwrap();

    let from_file = SessionSettings::load(Some(dir.path())).unwrap();
    assert_eq!(from_file.resync_interval_ms, 250);
    assert_eq!(from_file.name_prefix, "ci");
    assert_eq!(from_file.stop_timeout_ms, SessionSettings::default().stop_timeout_ms);

    std::env::set_var("TESTDRIVE_EVENT_TIMEOUT_MS", "4000");
    let layered = SessionSettings::load(Some(dir.path()));
    std::env::remove_var("TESTDRIVE_EVENT_TIMEOUT_MS");

    let layered = layered.unwrap();
    assert_eq!(layered.event_timeout_ms, 4000);
    assert_eq!(layered.resync_interval_ms, 250);

    let defaults = SessionSettings::load(None).unwrap();
    assert_eq!(defaults, SessionSettings::default());
}

#[test]
fn test_zero_timeout_in_settings_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("testdrive.settings.yaml"), "stop_timeout_ms: 0\n").unwrap();

    let err = SessionSettings::load(Some(dir.path())).unwrap_err();
    assert!(matches!(
        err,
        ConfigurationError::InvalidValue { ref field, .. } if field == "stop_timeout_ms"
    ));
}
