//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use freightdesk_common::ConfigError;
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_freightdesk_config.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[backend]
base_url = "https://api.example.test/functions/v1"

[session]
history_page_size = 100
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(
        config.backend.base_url,
        "https://api.example.test/functions/v1"
    );
    assert_eq!(config.session.history_page_size, 100);
    // Defaults preserved
    assert_eq!(config.session.refresh_buffer, 60);
    assert_eq!(config.realtime.heartbeat_interval, 25);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let result = load_from_path(&path);
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn out_of_range_values_still_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[session]
refresh_buffer = 5
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.session.refresh_buffer, 5);
}

#[test]
fn create_default_config_writes_parseable_template() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.session.refresh_buffer, 60);
    assert!(crate::validation::validate(&config).is_ok());
}

#[test]
fn default_config_path_ends_with_freightdesk() {
    if std::env::var_os(CONFIG_PATH_ENV).is_some() {
        return;
    }
    if let Ok(path) = default_config_path() {
        assert!(path.ends_with("freightdesk/config.toml"));
    }
}

#[test]
fn parse_config_reports_toml_errors() {
    let err = parse_config("[session]\nrefresh_buffer = \"soon\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}
