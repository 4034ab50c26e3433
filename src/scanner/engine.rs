//! Sweep driver
//!
//! Walks the address table from a random record, probes each endpoint's
//! status, attempts a join on supported versions and stores resolved
//! verdicts. Up to `workers` endpoints are in flight at once; a finished
//! slot is immediately replaced by the next record.

use crate::config::ScanConfig;
use crate::credentials::{Account, CredentialPool, OfflineRefresher, TokenRefresher};
use crate::error::RetryPolicy;
use crate::network::status::{ProbeVerdict, StatusProbe, StatusProber};
use crate::network::transport::FramedTransport;
use crate::network::version::{GameVersion, StaticVersionCatalog};
use crate::output::ScanSummary;
use crate::scanner::join::{JoinOrchestrator, JoinSettings};
use crate::scanner::{Outcome, SlotReport, SlotResult, UnknownCause};
use crate::session::{BotConnector, WireConnector};
use crate::storage::{VerdictRecord, VerdictStore};
use crate::utils::address_table::{AddressTable, Endpoint};
use crate::ScanError;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main sweep engine
pub struct ScanEngine {
    prober: Arc<dyn StatusProbe>,
    connector: Arc<dyn BotConnector>,
    refresher: Arc<dyn TokenRefresher>,
    store: Arc<dyn VerdictStore>,
    accounts: CredentialPool,
    join_settings: JoinSettings,
    retry: RetryPolicy,
    workers: usize,
    seed: Option<u64>,
    cancel: CancellationToken,
}

impl ScanEngine {
    /// Engine with the built-in status prober, wire connector and offline
    /// refresher
    pub fn new(config: &ScanConfig, store: Arc<dyn VerdictStore>) -> crate::Result<Self> {
        config.validate()?;

        let catalog = StaticVersionCatalog::new().with_supported(config.supported_versions.iter().cloned());
        let supported = catalog.supported_versions().collect::<Vec<_>>().join(", ");
        debug!("joining servers on {}", supported);
        let prober = StatusProber::new(
            FramedTransport::new(config.status_timeout_duration()),
            Arc::new(catalog),
        );

        Ok(Self {
            prober: Arc::new(prober),
            connector: Arc::new(WireConnector::with_timeout(config.transport_timeout_duration())),
            refresher: Arc::new(OfflineRefresher),
            store,
            accounts: CredentialPool::new(config.accounts.iter().cloned()),
            join_settings: config.join_settings(),
            retry: config.retry_policy(),
            workers: config.workers,
            seed: config.seed,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_prober(mut self, prober: Arc<dyn StatusProbe>) -> Self {
        self.prober = prober;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn BotConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = refresher;
        self
    }

    /// Token that stops the sweep when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop dispatching new endpoints and abandon pending retries
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Refresh every account once, sequentially. Failures are logged.
    pub async fn refresh_accounts(&self) -> usize {
        let failed = self.accounts.refresh_all(self.refresher.as_ref()).await;
        if failed > 0 {
            warn!("{} of {} accounts failed to refresh", failed, self.accounts.len());
        }
        failed
    }

    /// Sweep the whole table from a random record
    pub async fn run(&self, table: &AddressTable) -> crate::Result<ScanSummary> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let offset = table.rotation_offset(&mut rng);

        self.refresh_accounts().await;
        self.run_from(table, offset).await
    }

    /// Sweep the whole table starting at byte `offset`
    pub async fn run_from(&self, table: &AddressTable, offset: usize) -> crate::Result<ScanSummary> {
        if self.accounts.is_empty() {
            return Err(ScanError::Config("no accounts to join with".to_string()));
        }

        let orchestrator = JoinOrchestrator::new(
            Arc::clone(&self.connector),
            Arc::clone(&self.refresher),
            self.join_settings.clone(),
        );

        let mut summary = ScanSummary::new(table.len(), offset);
        info!(
            "sweeping {} endpoints from offset {} with {} worker(s)",
            table.len(),
            offset,
            self.workers
        );

        let mut slots = table.rotated(offset);
        let mut in_flight = FuturesUnordered::new();

        for _ in 0..self.workers {
            match slots.next() {
                Some((index, endpoint)) => in_flight.push(self.check(&orchestrator, index, endpoint)),
                None => break,
            }
        }

        // Continuous queue: each finished slot pulls the next record
        while let Some(report) = in_flight.next().await {
            summary.absorb(&report);

            if self.cancel.is_cancelled() {
                continue;
            }
            if let Some((index, endpoint)) = slots.next() {
                in_flight.push(self.check(&orchestrator, index, endpoint));
            }
        }

        summary.skipped = slots.len();
        summary.finish();
        Ok(summary)
    }

    /// Probe, join and persist one endpoint
    async fn check(&self, orchestrator: &JoinOrchestrator, index: usize, endpoint: Endpoint) -> SlotReport {
        let version = match self.prober.probe_version(endpoint).await {
            ProbeVerdict::Supported(version) => version,
            ProbeVerdict::Unsupported(reason) => {
                debug!("{} skipped: {}", endpoint, reason);
                return SlotReport::new(endpoint, SlotResult::Unsupported);
            }
            ProbeVerdict::Unreachable(e) => {
                debug!("{} unreachable: {}", endpoint, e);
                return SlotReport::new(endpoint, SlotResult::Unreachable);
            }
        };

        let Some(account) = self.accounts.for_record(index) else {
            return SlotReport::new(endpoint, SlotResult::Joined(Outcome::Unknown(UnknownCause::RefreshFailed)));
        };

        let (outcome, retries) = self.join_with_retry(orchestrator, &account, endpoint, &version).await;
        let mut report = SlotReport::new(endpoint, SlotResult::Joined(outcome));
        report.retries = retries;

        match outcome.verdict() {
            Some(whitelisted) => match self.store.record(&VerdictRecord::new(endpoint, Some(whitelisted))).await {
                Ok(0) => {
                    report.unmatched = true;
                    debug!("{} {} not stored: no servers row", endpoint, whitelisted);
                }
                Ok(_) => {
                    report.persisted = true;
                    info!("{} {}", endpoint, whitelisted);
                }
                Err(e) => {
                    report.store_failed = true;
                    error!("failed to store verdict for {}: {}", endpoint, e);
                }
            },
            None => debug!("{} {} as {}", endpoint, outcome, account.username()),
        }

        report
    }

    /// Join until the outcome is not `Retry`, waiting the backoff between
    /// attempts. Returns the final outcome and the number of retries.
    async fn join_with_retry(
        &self,
        orchestrator: &JoinOrchestrator,
        account: &Account,
        endpoint: Endpoint,
        version: &GameVersion,
    ) -> (Outcome, u32) {
        let mut retries = 0;

        loop {
            // a panicking refresher or session only costs this endpoint
            let attempt = AssertUnwindSafe(orchestrator.attempt_join(account, endpoint, version));
            let outcome = match FutureExt::catch_unwind(attempt).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!("{} join attempt as {} panicked", endpoint, account.username());
                    Outcome::Unknown(UnknownCause::SetupFault)
                }
            };
            if !outcome.is_retry() {
                return (outcome, retries);
            }
            if !self.retry.allows(retries) {
                return (Outcome::Unknown(UnknownCause::RetryExhausted), retries);
            }

            retries += 1;
            debug!(
                "{} rate limited on {}, retry {} in {:?}",
                endpoint,
                account.username(),
                retries,
                self.retry.backoff()
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return (Outcome::Unknown(UnknownCause::Cancelled), retries),
                _ = tokio::time::sleep(self.retry.backoff()) => {}
            }
        }
    }
}
