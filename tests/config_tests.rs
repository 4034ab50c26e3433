use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use wlscan::config::ScanConfig;
use wlscan::utils::address_table::TableSource;
use wlscan::utils::config::EnvironmentConfig;
use wlscan::{Credential, ScanError};

const SAMPLE: &str = r#"
ips_path = "/var/lib/wlscan/ips"
chat_warning = true
contact_line = "Reach the operator at abuse@example.org."
workers = 4
seed = 1234
max_retries = 5
retry_backoff = 15000
supported_versions = ["1.20.1", "1.20.4"]

[database]
path = "/var/lib/wlscan/servers.db"

[[accounts]]
username = "Scanner_01"

[[accounts]]
username = "Scanner_02"
password = "hunter2"
"#;

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();

    let config = ScanConfig::from_toml_file(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.workers, 4);
    assert_eq!(config.seed, Some(1234));
    assert_eq!(config.max_retries, Some(5));
    assert!(config.chat_warning);
    assert_eq!(config.database.path, PathBuf::from("/var/lib/wlscan/servers.db"));
    assert_eq!(config.accounts.len(), 2);
    assert_eq!(config.accounts[1].password.as_deref(), Some("hunter2"));
    assert_eq!(config.retry_policy().max_attempts(), Some(5));
    assert_eq!(config.retry_policy().backoff().as_millis(), 15000);

    // unspecified fields keep their defaults
    assert_eq!(config.connect_timeout, 6000);
    assert_eq!(config.status_timeout, 3000);

    match config.table_source() {
        TableSource::File(path) => assert_eq!(path, PathBuf::from("/var/lib/wlscan/ips")),
        other => panic!("expected a file source, got {}", other),
    }

    let join = config.join_settings();
    assert!(join.chat_warning);
    assert!(join.advisory_messages()[1].ends_with("abuse@example.org."));
}

#[test]
fn test_toml_round_trip() {
    let config = ScanConfig::new(vec![
        Credential::new("Scanner_01"),
        Credential::new("Scanner_02").with_password("secret"),
    ])
    .with_workers(3)
    .with_seed(99)
    .with_chat_warning(true)
    .with_ips_path("./ips")
    .with_database_path("./scan.db");

    let text = config.to_toml_string().unwrap();
    let parsed = ScanConfig::from_toml_str(&text).unwrap();
    assert_eq!(parsed, config);
    assert!(matches!(parsed.table_source(), TableSource::File(_)));
    assert_eq!(parsed.database.path, PathBuf::from("./scan.db"));
}

#[test]
fn test_debug_output_hides_passwords() {
    let config = ScanConfig::from_toml_str(SAMPLE).unwrap();
    let rendered = format!("{:?}", config);
    assert!(rendered.contains("Scanner_02"));
    assert!(!rendered.contains("hunter2"));
}

#[test]
fn test_invalid_toml_is_a_config_error() {
    let result = ScanConfig::from_toml_str("workers = \"many\"");
    assert!(matches!(result, Err(ScanError::Config(_))));

    let missing = ScanConfig::from_toml_file("/nonexistent/wlscan.toml");
    assert!(matches!(missing, Err(ScanError::Config(_))));
}

#[test]
fn test_environment_overrides_file() {
    let config = ScanConfig::from_toml_str(SAMPLE).unwrap();
    let config = EnvironmentConfig::apply_from(config, |key| match key {
        "WLSCAN_DB" => Some("/tmp/other.db".to_string()),
        "WLSCAN_WORKERS" => Some("12".to_string()),
        _ => None,
    });

    assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
    assert_eq!(config.workers, 12);
    assert_eq!(config.seed, Some(1234));
}
