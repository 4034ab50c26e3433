//! Configuration for the whitelist scanner

use crate::credentials::Credential;
use crate::error::RetryPolicy;
use crate::scanner::join::JoinSettings;
use crate::utils::address_table::{TableSource, DEFAULT_TABLE_URL};
use crate::ScanError;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Name of the per-user config file in the home directory
pub const DEFAULT_CONFIG_FILE: &str = ".wlscan.toml";

/// Verdict database location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("whitelist.db"),
        }
    }
}

/// Main configuration structure for a sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Local address table; when unset the table is fetched from `ips_url`
    pub ips_path: Option<PathBuf>,

    pub ips_url: String,

    /// Send the advisory chat messages after an unguarded login
    pub chat_warning: bool,

    /// Appended to the second advisory message
    pub contact_line: Option<String>,

    /// Only log warnings and errors
    pub suppress_logs: bool,

    pub log_level: String,

    /// Endpoints processed concurrently
    pub workers: usize,

    /// Seed for the rotation offset; random when unset
    pub seed: Option<u64>,

    /// Cap on rate-limit retries per endpoint; unbounded when unset
    pub max_retries: Option<u32>,

    /// Framed exchange deadline in milliseconds
    pub transport_timeout: u64,

    /// Status ping deadline in milliseconds
    pub status_timeout: u64,

    /// Deadline for the first session event in milliseconds
    pub connect_timeout: u64,

    /// Wait for the advisory echo in milliseconds
    pub warning_grace: u64,

    /// Delay between rate-limited attempts in milliseconds
    pub retry_backoff: u64,

    /// Releases worth a join attempt; empty means every known release
    pub supported_versions: Vec<String>,

    pub database: DatabaseConfig,

    pub accounts: Vec<Credential>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ips_path: None,
            ips_url: DEFAULT_TABLE_URL.to_string(),
            chat_warning: false,
            contact_line: None,
            suppress_logs: false,
            log_level: "info".to_string(),
            workers: 1,
            seed: None,
            max_retries: None,
            transport_timeout: 5000,
            status_timeout: 3000,
            connect_timeout: 6000,
            warning_grace: 3000,
            retry_backoff: 10_000,
            supported_versions: Vec::new(),
            database: DatabaseConfig::default(),
            accounts: Vec::new(),
        }
    }
}

impl ScanConfig {
    pub fn new(accounts: Vec<Credential>) -> Self {
        Self {
            accounts,
            ..Default::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_chat_warning(mut self, enabled: bool) -> Self {
        self.chat_warning = enabled;
        self
    }

    pub fn with_ips_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.ips_path = Some(path.into());
        self
    }

    pub fn with_database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database.path = path.into();
        self
    }

    pub fn transport_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.transport_timeout)
    }

    pub fn status_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.status_timeout)
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    pub fn warning_grace_duration(&self) -> Duration {
        Duration::from_millis(self.warning_grace)
    }

    pub fn retry_backoff_duration(&self) -> Duration {
        Duration::from_millis(self.retry_backoff)
    }

    /// Where the address table comes from
    pub fn table_source(&self) -> TableSource {
        match &self.ips_path {
            Some(path) => TableSource::File(path.clone()),
            None => TableSource::Remote(self.ips_url.clone()),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_backoff_duration(), self.max_retries)
    }

    pub fn join_settings(&self) -> JoinSettings {
        JoinSettings {
            connect_timeout: self.connect_timeout_duration(),
            warning_grace: self.warning_grace_duration(),
            chat_warning: self.chat_warning,
            contact_line: self.contact_line.clone(),
        }
    }

    /// Default log filter; `suppress_logs` wins over `log_level`
    pub fn log_filter(&self) -> LevelFilter {
        if self.suppress_logs {
            return LevelFilter::Warn;
        }
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Info)
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ScanError::Config(format!("Failed to read config file {}: {}", path.as_ref().display(), e))
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| ScanError::Config(format!("Failed to parse TOML: {}", e)))
    }

    pub fn to_toml_string(&self) -> crate::Result<String> {
        toml::to_string_pretty(self).map_err(|e| ScanError::Config(format!("Failed to serialize TOML: {}", e)))
    }

    /// `~/.wlscan.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE))
    }

    /// Load configuration from the default location, falling back to defaults
    pub fn load_default_config() -> Self {
        let Some(path) = Self::default_config_path() else {
            return Self::default();
        };

        if path.exists() {
            match Self::from_toml_file(&path) {
                Ok(config) => {
                    log::debug!("loaded config from {}", path.display());
                    return config;
                }
                Err(e) => log::warn!("ignoring {}: {}", path.display(), e),
            }
        }

        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.accounts.is_empty() {
            return Err(ScanError::Config("At least one account is required".to_string()));
        }

        if let Some(blank) = self.accounts.iter().find(|a| a.username.trim().is_empty()) {
            return Err(ScanError::Config(format!("Account {:?} has an empty username", blank)));
        }

        if self.workers == 0 {
            return Err(ScanError::Config("Worker count must be greater than 0".to_string()));
        }

        if self.ips_path.is_none() && self.ips_url.trim().is_empty() {
            return Err(ScanError::Config("Either ips_path or ips_url must be set".to_string()));
        }

        let timeouts = [
            ("transport_timeout", self.transport_timeout),
            ("status_timeout", self.status_timeout),
            ("connect_timeout", self.connect_timeout),
            ("warning_grace", self.warning_grace),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(ScanError::Config(format!("{} must be greater than 0", name)));
        }

        if LevelFilter::from_str(&self.log_level).is_err() {
            return Err(ScanError::Config(format!("Unknown log level '{}'", self.log_level)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.workers, 1);
        assert_eq!(config.retry_backoff_duration(), Duration::from_secs(10));
        assert_eq!(config.connect_timeout_duration(), Duration::from_secs(6));
        assert_eq!(config.max_retries, None);
        assert!(matches!(config.table_source(), TableSource::Remote(url) if url == DEFAULT_TABLE_URL));
    }

    #[test]
    fn test_validation() {
        assert!(ScanConfig::default().validate().is_err());

        let config = ScanConfig::new(vec![Credential::new("alpha")]);
        assert!(config.validate().is_ok());
        assert!(config.clone().with_workers(0).validate().is_err());

        let mut bad_level = config.clone();
        bad_level.log_level = "loud".to_string();
        assert!(bad_level.validate().is_err());

        let mut no_source = config;
        no_source.ips_url = String::new();
        assert!(no_source.validate().is_err());
    }

    #[test]
    fn test_log_filter() {
        let mut config = ScanConfig::default();
        config.log_level = "debug".to_string();
        assert_eq!(config.log_filter(), LevelFilter::Debug);

        config.suppress_logs = true;
        assert_eq!(config.log_filter(), LevelFilter::Warn);
    }
}
