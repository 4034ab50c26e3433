use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use colored::*;
use log::LevelFilter;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use wlscan::{
    config::ScanConfig,
    storage::SqliteVerdictStore,
    utils::address_table::AddressTable,
    utils::config::{ConfigValidator, EnvironmentConfig},
    ScanEngine,
};

fn cli() -> Command {
    Command::new("wlscan")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Finds game servers that do not enforce a whitelist")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("TOML config file (default: ~/.wlscan.toml)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("ips")
                .short('i')
                .long("ips")
                .value_name("PATH")
                .help("Local address table instead of the remote one")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("PATH")
                .help("SQLite verdict database")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("N")
                .help("Endpoints processed concurrently")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("N")
                .help("Seed for the starting offset")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("max-retries")
                .long("max-retries")
                .value_name("N")
                .help("Give up on an endpoint after N rate-limited retries")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("chat-warning")
                .long("chat-warning")
                .help("Send the advisory messages after joining an open server")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("init-db")
                .long("init-db")
                .help("Create the servers table and seed it from the address table")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the summary as JSON")
                .action(ArgAction::SetTrue),
        )
}

fn load_config(matches: &clap::ArgMatches) -> anyhow::Result<ScanConfig> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ScanConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ScanConfig::load_default_config(),
    };
    let mut config = EnvironmentConfig::apply(config);

    if let Some(path) = matches.get_one::<PathBuf>("ips") {
        config.ips_path = Some(path.clone());
    }
    if let Some(path) = matches.get_one::<PathBuf>("db") {
        config.database.path = path.clone();
    }
    if let Some(&workers) = matches.get_one::<usize>("workers") {
        config.workers = workers;
    }
    if let Some(&seed) = matches.get_one::<u64>("seed") {
        config.seed = Some(seed);
    }
    if let Some(&max) = matches.get_one::<u32>("max-retries") {
        config.max_retries = Some(max);
    }
    if matches.get_flag("chat-warning") {
        config.chat_warning = true;
    }

    Ok(config)
}

/// Install the logger before any config is read so load warnings are
/// printed. Runs at info until [`configured_level`] says otherwise.
fn init_logging(rust_log: Option<&OsString>) {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Trace)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    if rust_log.is_none() {
        log::set_max_level(LevelFilter::Info);
    }
}

/// Level from the config file, unless `RUST_LOG` was given
fn configured_level(config: &ScanConfig, rust_log: Option<&OsString>) -> Option<LevelFilter> {
    match rust_log {
        Some(_) => None,
        None => Some(config.log_filter()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let rust_log = std::env::var_os("RUST_LOG");
    init_logging(rust_log.as_ref());

    let config = load_config(&matches)?;
    if let Some(level) = configured_level(&config, rust_log.as_ref()) {
        log::set_max_level(level);
    }

    config.validate().context("invalid configuration")?;
    for warning in ConfigValidator::warnings(&config) {
        log::warn!("{}", warning);
    }

    let store = SqliteVerdictStore::open(&config.database.path)
        .with_context(|| format!("opening database {}", config.database.path.display()))?;

    let source = config.table_source();
    log::info!("loading address table from {}", source);
    let table = AddressTable::from_source(&source)
        .await
        .with_context(|| format!("loading address table from {}", source))?;

    store.ensure_schema().context("creating servers table")?;
    if matches.get_flag("init-db") {
        let inserted = store.seed_table(&table).context("seeding servers table")?;
        println!(
            "{} {} new rows in {}",
            "[~] Seeded".bright_blue(),
            inserted.to_string().bright_cyan().bold(),
            config.database.path.display()
        );
    }

    let engine = ScanEngine::new(&config, Arc::new(store)).context("building scan engine")?;

    let token = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "[!] Interrupted, finishing in-flight endpoints".bright_yellow());
            token.cancel();
        }
    });

    let summary = engine.run(&table).await.context("sweep failed")?;

    if matches.get_flag("json") {
        println!("{}", summary.to_json()?);
    } else {
        summary.print_report();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wlscan::Credential;

    #[test]
    fn test_config_level_applies_without_rust_log() {
        let mut config = ScanConfig::new(vec![Credential::new("Scanner_01")]);
        config.log_level = "debug".to_string();
        assert_eq!(configured_level(&config, None), Some(LevelFilter::Debug));

        config.suppress_logs = true;
        assert_eq!(configured_level(&config, None), Some(LevelFilter::Warn));
    }

    #[test]
    fn test_rust_log_keeps_priority() {
        let config = ScanConfig::new(vec![Credential::new("Scanner_01")]);
        let rust_log = OsString::from("wlscan=trace");
        assert_eq!(configured_level(&config, Some(&rust_log)), None);
    }

    #[test]
    fn test_cli_flags_override_config() {
        let matches = cli()
            .try_get_matches_from(["wlscan", "--workers", "8", "--seed", "3", "--chat-warning"])
            .unwrap();
        let config = load_config(&matches).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.seed, Some(3));
        assert!(config.chat_warning);
    }
}
