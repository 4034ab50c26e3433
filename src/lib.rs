//! wlscan - finds game servers that let anyone in
//!
//! Sweeps a table of server endpoints, pings each for its version, tries
//! to log in and records whether the server turned the bot away with a
//! whitelist message.

pub mod config;
pub mod credentials;
pub mod error;
pub mod network;
pub mod output;
pub mod scanner;
pub mod session;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::ScanConfig;
pub use credentials::{Credential, CredentialPool};
pub use error::{ProbeError, RetryPolicy, ScanError};
pub use output::ScanSummary;
pub use scanner::engine::ScanEngine;
pub use scanner::{Outcome, UnknownCause};
pub use utils::address_table::{AddressTable, Endpoint};

pub type Result<T> = std::result::Result<T, ScanError>;
