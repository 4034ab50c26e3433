//! Environment overrides and advisory config checks

use crate::config::ScanConfig;
use crate::credentials::Credential;
use std::str::FromStr;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Settings that are valid but probably not what the operator wants
    pub fn warnings(config: &ScanConfig) -> Vec<String> {
        let mut warnings = Vec::new();

        if config.workers > config.accounts.len().max(1) * 4 {
            warnings.push(format!(
                "{} workers share {} account(s); expect rate limiting",
                config.workers,
                config.accounts.len()
            ));
        }

        if config.retry_backoff < 1000 {
            warnings.push(format!(
                "retry_backoff of {}ms is unlikely to outlast a rate limit",
                config.retry_backoff
            ));
        }

        if config.max_retries.is_none() && config.workers == 1 {
            warnings.push(
                "retries are unbounded; a persistently rate-limited account stalls the sweep".to_string(),
            );
        }

        if config.status_timeout > config.transport_timeout {
            warnings.push("status_timeout is longer than transport_timeout".to_string());
        }

        warnings
    }
}

/// Environment configuration
pub struct EnvironmentConfig;

impl EnvironmentConfig {
    /// Override `config` from `WLSCAN_*` environment variables
    pub fn apply(config: ScanConfig) -> ScanConfig {
        Self::apply_from(config, |key| std::env::var(key).ok())
    }

    /// Override `config` from a variable lookup. Unparseable values are
    /// logged and ignored.
    pub fn apply_from<F>(mut config: ScanConfig, lookup: F) -> ScanConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("WLSCAN_IPS_PATH") {
            config.ips_path = Some(path.into());
        }

        if let Some(url) = lookup("WLSCAN_IPS_URL") {
            config.ips_url = url;
        }

        if let Some(path) = lookup("WLSCAN_DB") {
            config.database.path = path.into();
        }

        if let Some(workers) = parse_var(&lookup, "WLSCAN_WORKERS") {
            config.workers = workers;
        }

        if let Some(seed) = parse_var(&lookup, "WLSCAN_SEED") {
            config.seed = Some(seed);
        }

        if let Some(max) = parse_var(&lookup, "WLSCAN_MAX_RETRIES") {
            config.max_retries = Some(max);
        }

        if let Some(enabled) = parse_var(&lookup, "WLSCAN_CHAT_WARNING") {
            config.chat_warning = enabled;
        }

        if let Some(level) = lookup("WLSCAN_LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(contact) = lookup("WLSCAN_CONTACT_LINE") {
            config.contact_line = Some(contact);
        }

        // comma separated usernames, offline-mode only
        if let Some(accounts) = lookup("WLSCAN_ACCOUNTS") {
            config.accounts = accounts
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(Credential::new)
                .collect();
        }

        config
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}
