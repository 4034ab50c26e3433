//! Utility modules for the scanner

pub mod address_table;
pub mod config;

pub use address_table::{AddressTable, Endpoint, TableSource};
