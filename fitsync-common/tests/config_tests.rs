//! Tests for config file loading and resolution
//!
//! Uses serial_test to prevent ENV variable race conditions: tests that
//! touch FITSYNC_CONFIG or the password overrides run sequentially.

use fitsync_common::config::{
    resolve_config_path, Config, CONFIG_ENV_VAR, REMOTE_PASSWORD_ENV_VAR,
    SOURCE_PASSWORD_ENV_VAR,
};
use fitsync_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const FULL_CONFIG: &str = r#"
[source]
connection_string = "Driver={HFSQL};Server=127.0.0.1;Port=4900;Database=GOLDENGYM"
username = "admin"
password = "from-file"
limit_style = "limit"

[source.columns]
photo = "photo"

[remote]
base_url = "https://biostar.local/api"
login_id = "admin"
password = "admin123"
ssl_verify = false
user_group_id = 1
access_groups = [2, 3]
face_encodings = ["raw_face", "face_endpoint"]

[photos]
base_path = "C:/tmp"
max_size_mb = 2

[sync]
batch_size = 25
require_face = true

[logging]
level = "debug"
dir = "logs"
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

fn clear_env() {
    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var(SOURCE_PASSWORD_ENV_VAR);
    env::remove_var(REMOTE_PASSWORD_ENV_VAR);
}

#[test]
#[serial]
fn test_load_full_config() {
    clear_env();
    let file = write_config(FULL_CONFIG);

    let config = Config::load(file.path()).expect("config should load");

    assert_eq!(config.source.columns.photo.as_deref(), Some("photo"));
    assert_eq!(config.source.password.as_deref(), Some("from-file"));
    assert!(!config.remote.ssl_verify);
    assert_eq!(config.remote.user_group_id, Some(1));
    assert_eq!(config.remote.access_groups, vec![2, 3]);
    assert_eq!(config.remote.face_encodings.len(), 2);
    assert_eq!(config.photos.base_path, PathBuf::from("C:/tmp"));
    assert_eq!(config.photos.max_size_bytes(), 2 * 1024 * 1024);
    assert_eq!(config.sync.batch_size, 25);
    assert!(config.sync.require_face);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.dir, Some(PathBuf::from("logs")));
}

#[test]
#[serial]
fn test_env_overrides_passwords() {
    clear_env();
    let file = write_config(FULL_CONFIG);
    env::set_var(SOURCE_PASSWORD_ENV_VAR, "db-secret");
    env::set_var(REMOTE_PASSWORD_ENV_VAR, "api-secret");

    let config = Config::load(file.path()).expect("config should load");

    assert_eq!(config.source.password.as_deref(), Some("db-secret"));
    assert_eq!(config.remote.password, "api-secret");

    clear_env();
}

#[test]
#[serial]
fn test_missing_file_is_config_error() {
    clear_env();
    let result = Config::load(Path::new("/nonexistent/fitsync.toml"));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_missing_remote_section_is_parse_error() {
    clear_env();
    let file = write_config("[source]\nconnection_string = \"DSN=x\"\n");
    let result = Config::load(file.path());
    assert!(matches!(result, Err(Error::Toml(_))));
}

#[test]
#[serial]
fn test_resolve_prefers_cli_argument() {
    clear_env();
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(Some(Path::new("/tmp/from-cli.toml"))).unwrap();
    assert_eq!(resolved, PathBuf::from("/tmp/from-cli.toml"));

    clear_env();
}

#[test]
#[serial]
fn test_resolve_uses_env_var() {
    clear_env();
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(None).unwrap();
    assert_eq!(resolved, PathBuf::from("/tmp/from-env.toml"));

    clear_env();
}
