//! Binary address table of candidate endpoints
//!
//! The table is a flat byte sequence of 6-byte records
//! `{o1, o2, o3, o4, port_hi, port_lo}`. It is loaded once per sweep and
//! never copied or reshuffled; a sweep walks it from a rotation offset and
//! wraps around.

use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

/// Size of one endpoint record in bytes
pub const RECORD_SIZE: usize = 6;

/// Public table maintained by the server-scanner project
pub const DEFAULT_TABLE_URL: &str = "https://github.com/kgurchiek/Minecraft-Server-Scanner/raw/main/ips";

/// A candidate server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }

    /// Decode one table record
    pub fn from_record(record: [u8; RECORD_SIZE]) -> Self {
        Self {
            address: Ipv4Addr::new(record[0], record[1], record[2], record[3]),
            port: u16::from_be_bytes([record[4], record[5]]),
        }
    }

    pub fn to_record(&self) -> [u8; RECORD_SIZE] {
        let [a, b, c, d] = self.address.octets();
        let [hi, lo] = self.port.to_be_bytes();
        [a, b, c, d, hi, lo]
    }

    pub fn ip(&self) -> IpAddr {
        IpAddr::V4(self.address)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Where the table comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableSource {
    File(PathBuf),
    Remote(String),
}

impl Default for TableSource {
    fn default() -> Self {
        TableSource::Remote(DEFAULT_TABLE_URL.to_string())
    }
}

impl std::fmt::Display for TableSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableSource::File(path) => write!(f, "{}", path.display()),
            TableSource::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Immutable table of endpoint records
#[derive(Debug, Clone)]
pub struct AddressTable {
    data: Bytes,
}

impl AddressTable {
    /// Wrap raw table bytes. Trailing bytes that do not fill a record are
    /// dropped.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let mut data: Bytes = data.into();
        let trailing = data.len() % RECORD_SIZE;
        if trailing != 0 {
            log::warn!(
                "address table has {} trailing bytes that do not form a record, ignoring them",
                trailing
            );
            data.truncate(data.len() - trailing);
        }
        Self { data }
    }

    pub fn from_endpoints<'a, I>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = &'a Endpoint>,
    {
        let data: Vec<u8> = endpoints.into_iter().flat_map(|e| e.to_record()).collect();
        Self { data: data.into() }
    }

    /// Read a table from a local file
    pub async fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let data = tokio::fs::read(path.as_ref()).await?;
        Ok(Self::from_bytes(data))
    }

    /// Download a table with the same binary layout
    pub async fn fetch(url: &str) -> crate::Result<Self> {
        let response = reqwest::get(url).await?.error_for_status()?;
        let data = response.bytes().await?;
        Ok(Self::from_bytes(data))
    }

    pub async fn from_source(source: &TableSource) -> crate::Result<Self> {
        match source {
            TableSource::File(path) => Self::load(path).await,
            TableSource::Remote(url) => Self::fetch(url).await,
        }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.data.len() / RECORD_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Endpoint of the record that starts at `byte_index`
    pub fn endpoint_at(&self, byte_index: usize) -> Option<Endpoint> {
        if byte_index % RECORD_SIZE != 0 {
            return None;
        }
        let record = self.data.get(byte_index..byte_index + RECORD_SIZE)?;
        let mut raw = [0u8; RECORD_SIZE];
        raw.copy_from_slice(record);
        Some(Endpoint::from_record(raw))
    }

    /// Random record-aligned byte offset to start a sweep from
    pub fn rotation_offset<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        if self.is_empty() {
            return 0;
        }
        rng.gen_range(0..self.len()) * RECORD_SIZE
    }

    /// Walk every record once, starting at `offset` bytes and wrapping.
    ///
    /// Yields the record's byte index in the unrotated table together with
    /// its endpoint. An offset that is not record-aligned is rounded down.
    pub fn rotated(&self, offset: usize) -> Rotation<'_> {
        let count = self.len();
        let start = if count == 0 { 0 } else { (offset / RECORD_SIZE) % count };
        Rotation {
            table: self,
            start,
            visited: 0,
            count,
        }
    }
}

/// Iterator over a rotated address table
pub struct Rotation<'a> {
    table: &'a AddressTable,
    start: usize,
    visited: usize,
    count: usize,
}

impl<'a> Iterator for Rotation<'a> {
    type Item = (usize, Endpoint);

    fn next(&mut self) -> Option<Self::Item> {
        if self.visited >= self.count {
            return None;
        }
        let record = (self.start + self.visited) % self.count;
        self.visited += 1;
        let byte_index = record * RECORD_SIZE;
        self.table.endpoint_at(byte_index).map(|e| (byte_index, e))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.count - self.visited;
        (left, Some(left))
    }
}

impl<'a> ExactSizeIterator for Rotation<'a> {}
