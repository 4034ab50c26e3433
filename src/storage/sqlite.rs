//! SQLite-backed verdict store
//!
//! The `servers` table is owned by the server-discovery side; this store
//! only updates the `whitelisted` column of rows that already exist.
//! `ensure_schema` and `seed_endpoint` exist for bootstrapping a local
//! database.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{EndpointKey, VerdictRecord, VerdictStore};
use crate::utils::address_table::{AddressTable, Endpoint};
use crate::ScanError;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS servers (
    ip INTEGER NOT NULL,
    port INTEGER NOT NULL,
    whitelisted BOOLEAN,
    PRIMARY KEY (ip, port)
);";

const UPDATE_VERDICT: &str = "UPDATE servers SET whitelisted = ?1 WHERE ip = ?2 AND port = ?3";

/// Verdict store over a single shared SQLite connection
#[derive(Clone)]
pub struct SqliteVerdictStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVerdictStore {
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        log::debug!("opened verdict database {}", path.as_ref().display());
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> crate::Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Create the `servers` table if it is missing
    pub fn ensure_schema(&self) -> crate::Result<()> {
        self.with_conn(|conn| Ok(conn.execute_batch(SCHEMA)?))
    }

    /// Insert an endpoint row with an unknown verdict, if absent
    pub fn seed_endpoint(&self, endpoint: Endpoint) -> crate::Result<()> {
        let key = EndpointKey::from(endpoint);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO servers (ip, port, whitelisted) VALUES (?1, ?2, NULL)",
                params![key.ip, key.port],
            )?;
            Ok(())
        })
    }

    /// Seed a row for every endpoint in `table` in one transaction.
    /// Returns the number of rows inserted.
    pub fn seed_table(&self, table: &AddressTable) -> crate::Result<usize> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO servers (ip, port, whitelisted) VALUES (?1, ?2, NULL)",
                )?;
                for (_, endpoint) in table.rotated(0) {
                    let key = EndpointKey::from(endpoint);
                    inserted += stmt.execute(params![key.ip, key.port])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
    }

    /// Stored verdict: `None` when the row is absent, `Some(None)` when the
    /// row exists without a verdict
    pub fn whitelisted(&self, endpoint: Endpoint) -> crate::Result<Option<Option<bool>>> {
        let key = EndpointKey::from(endpoint);
        self.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT whitelisted FROM servers WHERE ip = ?1 AND port = ?2",
                    params![key.ip, key.port],
                    |row| row.get::<_, Option<bool>>(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    /// Number of rows holding a verdict
    pub fn resolved_count(&self) -> crate::Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM servers WHERE whitelisted IS NOT NULL",
                [],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> crate::Result<T>) -> crate::Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ScanError::Storage("database connection mutex poisoned".to_string()))?;
        f(&conn)
    }
}

#[async_trait]
impl VerdictStore for SqliteVerdictStore {
    async fn record(&self, record: &VerdictRecord) -> crate::Result<usize> {
        let store = self.clone();
        let key = record.key();
        let whitelisted = record.whitelisted;

        let rows = tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| Ok(conn.execute(UPDATE_VERDICT, params![whitelisted, key.ip, key.port])?))
        })
        .await
        .map_err(|e| ScanError::Storage(format!("database task failed: {}", e)))??;

        if rows == 0 {
            log::debug!("{} has no row in servers, verdict not stored", record.endpoint);
        }
        Ok(rows)
    }
}
