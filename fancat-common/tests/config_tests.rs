//! Config file and root folder resolution tests
//!
//! Tests that touch FANCAT_* environment variables are marked #[serial] so
//! they never race each other.

use fancat_common::config::{
    database_path, load_toml, resolve_config_path, resolve_root_folder, CONFIG_FILE_ENV,
    ROOT_FOLDER_ENV,
};
use fancat_common::Error;
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
struct SampleConfig {
    name: String,
    limit: u32,
}

#[test]
#[serial]
fn test_cli_argument_beats_environment() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/fancat-from-env");

    let resolved = resolve_root_folder(Some(Path::new("/tmp/fancat-from-cli")));
    assert_eq!(resolved, PathBuf::from("/tmp/fancat-from-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_environment_used_without_cli_argument() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/fancat-from-env");

    let resolved = resolve_root_folder(None);
    assert_eq!(resolved, PathBuf::from("/tmp/fancat-from-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_default_root_folder_is_non_empty() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolved = resolve_root_folder(None);
    assert!(!resolved.as_os_str().is_empty());
    assert!(database_path(&resolved).ends_with("fancat.db"));
}

#[test]
#[serial]
fn test_config_path_from_environment() {
    env::set_var(CONFIG_FILE_ENV, "/tmp/fancat-test.toml");

    assert_eq!(
        resolve_config_path(None),
        Some(PathBuf::from("/tmp/fancat-test.toml"))
    );

    env::remove_var(CONFIG_FILE_ENV);
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");

    let config: SampleConfig = load_toml(Some(&missing)).unwrap();
    assert_eq!(config, SampleConfig::default());

    let config: SampleConfig = load_toml(None).unwrap();
    assert_eq!(config, SampleConfig::default());
}

#[test]
fn test_partial_config_file_fills_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "name = \"fixture\"").unwrap();

    let config: SampleConfig = load_toml(Some(file.path())).unwrap();
    assert_eq!(config.name, "fixture");
    assert_eq!(config.limit, 0);
}

#[test]
fn test_invalid_config_file_is_an_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "name = [unterminated").unwrap();

    let result: Result<SampleConfig, Error> = load_toml(Some(file.path()));
    assert!(matches!(result, Err(Error::Config(_))));
}
