use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{EndpointKey, VerdictRecord, VerdictStore};
use crate::utils::address_table::Endpoint;
use crate::ScanError;

/// In-memory verdict store for tests and dry runs
///
/// Unlike the SQL store this one upserts: every write lands, whether or not
/// the endpoint was seen before. The full write log is kept so callers can
/// assert on write order and count.
#[derive(Clone, Default)]
pub struct MemoryVerdictStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    verdicts: HashMap<EndpointKey, Option<bool>>,
    writes: Vec<VerdictRecord>,
}

impl MemoryVerdictStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored verdict for an endpoint, `None` if never written
    pub fn get(&self, endpoint: Endpoint) -> Option<Option<bool>> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.verdicts.get(&endpoint.into()).copied())
    }

    /// Every write, in order
    pub fn writes(&self) -> Vec<VerdictRecord> {
        self.inner
            .lock()
            .map(|inner| inner.writes.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VerdictStore for MemoryVerdictStore {
    async fn record(&self, record: &VerdictRecord) -> crate::Result<usize> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| ScanError::Storage("memory store mutex poisoned".to_string()))?;
        inner.verdicts.insert(record.key(), record.whitelisted);
        inner.writes.push(*record);
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_records_and_overwrites() {
        let store = MemoryVerdictStore::new();
        let endpoint = Endpoint::new(Ipv4Addr::new(5, 6, 7, 8), 25565);

        assert_eq!(store.get(endpoint), None);
        store.record(&VerdictRecord::new(endpoint, Some(true))).await.unwrap();
        store.record(&VerdictRecord::new(endpoint, Some(false))).await.unwrap();

        assert_eq!(store.get(endpoint), Some(Some(false)));
        assert_eq!(store.writes().len(), 2);
    }
}
