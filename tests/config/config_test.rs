//! Config file loading tests.

use solidstreak::config::Config;

#[test]
fn load_reads_explicit_path() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join("solidstreak.toml");
    std::fs::write(
        &path,
        r#"
[telegram]
updates_timeout_secs = 25

[database]
url = "sqlite://streaks.db"
max_connections = 2
"#,
    )
    .expect("write config");

    let config = Config::load(Some(&path)).expect("should load");
    assert_eq!(config.telegram.updates_timeout_secs, 25);
    assert_eq!(config.database.max_connections, 2);
}

#[test]
fn missing_file_yields_defaults() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let config = Config::load(Some(&tmp.path().join("absent.toml"))).expect("should load");
    assert_eq!(config.telegram.api_base, "https://api.telegram.org");
    assert_eq!(config.database.max_connections, 5);
}

#[test]
fn unreadable_file_is_an_error() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    // A directory cannot be read as a file.
    assert!(Config::load(Some(tmp.path())).is_err());
}
