//! Sweep summary and report formatting

use crate::scanner::{Outcome, SlotReport, SlotResult, UnknownCause};
use chrono::{DateTime, Utc};
use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Counters for one sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Records in the address table
    pub table_size: usize,
    /// Byte offset the sweep started from
    pub offset: usize,
    pub visited: usize,
    /// Records never dispatched because the sweep was cancelled
    pub skipped: usize,
    pub unreachable: usize,
    pub unsupported: usize,
    pub whitelisted: usize,
    pub not_whitelisted: usize,
    pub unknown: usize,
    pub unknown_causes: BTreeMap<UnknownCause, usize>,
    pub retries: u64,
    pub persisted: usize,
    /// Verdicts for endpoints missing from the store
    pub unmatched: usize,
    pub store_errors: usize,
    #[serde(skip)]
    clock: Option<Instant>,
}

impl ScanSummary {
    pub fn new(table_size: usize, offset: usize) -> Self {
        Self {
            started_at: Utc::now(),
            elapsed_ms: 0,
            table_size,
            offset,
            visited: 0,
            skipped: 0,
            unreachable: 0,
            unsupported: 0,
            whitelisted: 0,
            not_whitelisted: 0,
            unknown: 0,
            unknown_causes: BTreeMap::new(),
            retries: 0,
            persisted: 0,
            unmatched: 0,
            store_errors: 0,
            clock: Some(Instant::now()),
        }
    }

    /// Fold one slot into the counters
    pub fn absorb(&mut self, report: &SlotReport) {
        self.visited += 1;
        self.retries += u64::from(report.retries);

        match report.result {
            SlotResult::Unreachable => self.unreachable += 1,
            SlotResult::Unsupported => self.unsupported += 1,
            SlotResult::Joined(Outcome::Whitelisted) => self.whitelisted += 1,
            SlotResult::Joined(Outcome::NotWhitelisted) => self.not_whitelisted += 1,
            SlotResult::Joined(Outcome::Unknown(cause)) => {
                self.unknown += 1;
                *self.unknown_causes.entry(cause).or_insert(0) += 1;
            }
            // the driver never reports a bare retry
            SlotResult::Joined(Outcome::Retry) => {}
        }

        if report.persisted {
            self.persisted += 1;
        }
        if report.unmatched {
            self.unmatched += 1;
        }
        if report.store_failed {
            self.store_errors += 1;
        }
    }

    /// Stop the clock
    pub fn finish(&mut self) {
        if let Some(clock) = self.clock.take() {
            self.elapsed_ms = clock.elapsed().as_millis() as u64;
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// Endpoints that reached a join attempt
    pub fn joined(&self) -> usize {
        self.whitelisted + self.not_whitelisted + self.unknown
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn print_report(&self) {
        println!("{}", "------------------------------------------------------".bright_blue());
        println!(
            "{} {} endpoints in {:.1}s (started {})",
            "[~] Swept".bright_blue(),
            self.visited.to_string().bright_cyan().bold(),
            self.elapsed().as_secs_f64(),
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if self.skipped > 0 {
            println!("{} {} endpoints not reached", "[!]".bright_yellow(), self.skipped);
        }
        println!(
            "    unreachable {}  unsupported {}  joined {}",
            self.unreachable,
            self.unsupported,
            self.joined()
        );
        println!(
            "    {} {}  {} {}  {} {}",
            "whitelisted".bright_green(),
            self.whitelisted,
            "open".bright_red(),
            self.not_whitelisted,
            "unknown".bright_yellow(),
            self.unknown
        );
        for (cause, count) in &self.unknown_causes {
            println!("      {:<18} {}", cause.to_string(), count);
        }
        println!("    retries {}  persisted {}", self.retries, self.persisted);
        if self.unmatched > 0 {
            println!(
                "{} {} verdicts had no servers row (seed the database with --init-db)",
                "[!]".bright_yellow(),
                self.unmatched
            );
        }
        if self.store_errors > 0 {
            println!(
                "{} {} verdicts could not be stored",
                "[!]".bright_red(),
                self.store_errors
            );
        }
        println!("{}", "------------------------------------------------------".bright_blue());
    }
}
