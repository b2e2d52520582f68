//! Config loading and defaults integration tests

use algoquest_progress::Config;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_save_then_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.cache.path = dir.path().join("progress.db");
    config.remote.base_url = Some("https://progress.example.test".into());
    config.remote.api_key = Some("secret".into());
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.cache.path, dir.path().join("progress.db"));
    assert_eq!(loaded.remote.base_url.as_deref(), Some("https://progress.example.test"));
    assert_eq!(loaded.remote.api_key.as_deref(), Some("secret"));
    assert_eq!(loaded.remote.fetch_timeout(), Duration::from_secs(15));
}

#[test]
fn test_empty_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "").unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.cache.progress_key, "algoquest_progress");
    assert_eq!(config.remote.ui_guard_secs, 8);
    assert!(config.catalog_path.is_none());
}

#[test]
fn test_invalid_toml_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[remote\nbase_url = ").unwrap();

    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, algoquest_progress::ProgressError::Config(_)));
}
