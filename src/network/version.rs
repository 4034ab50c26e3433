//! Protocol number to game release mapping
//!
//! The status reply only carries a protocol number. The join flow needs a
//! release name, and only releases the bot side can speak are worth a
//! login attempt.

use std::collections::{BTreeMap, HashSet};

/// A release the join flow can target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GameVersion {
    pub name: String,
    pub protocol: i32,
}

impl GameVersion {
    pub fn new(name: impl Into<String>, protocol: i32) -> Self {
        Self {
            name: name.into(),
            protocol,
        }
    }
}

impl std::fmt::Display for GameVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (protocol {})", self.name, self.protocol)
    }
}

/// Version capability lookup
pub trait VersionCatalog: Send + Sync {
    /// Release name for a protocol number, if known
    fn lookup_game_version(&self, protocol: i64) -> Option<String>;

    /// Whether the bot side supports joining this release
    fn is_supported(&self, version: &str) -> bool;
}

/// Release protocols, newest patch listed last where a protocol is shared
const RELEASES: &[(i32, &str)] = &[
    (47, "1.8.9"),
    (107, "1.9"),
    (108, "1.9.1"),
    (109, "1.9.2"),
    (110, "1.9.4"),
    (210, "1.10.2"),
    (315, "1.11"),
    (316, "1.11.2"),
    (335, "1.12"),
    (338, "1.12.1"),
    (340, "1.12.2"),
    (393, "1.13"),
    (401, "1.13.1"),
    (404, "1.13.2"),
    (477, "1.14"),
    (480, "1.14.1"),
    (485, "1.14.2"),
    (490, "1.14.3"),
    (498, "1.14.4"),
    (573, "1.15"),
    (575, "1.15.1"),
    (578, "1.15.2"),
    (735, "1.16"),
    (736, "1.16.1"),
    (751, "1.16.2"),
    (753, "1.16.3"),
    (754, "1.16.5"),
    (755, "1.17"),
    (756, "1.17.1"),
    (757, "1.18.1"),
    (758, "1.18.2"),
    (759, "1.19"),
    (760, "1.19.2"),
    (761, "1.19.3"),
    (762, "1.19.4"),
    (763, "1.20.1"),
    (764, "1.20.2"),
    (765, "1.20.4"),
    (766, "1.20.6"),
    (767, "1.21.1"),
    (768, "1.21.3"),
    (769, "1.21.4"),
];

/// Built-in catalogue of release protocols
#[derive(Debug, Clone)]
pub struct StaticVersionCatalog {
    versions: BTreeMap<i32, &'static str>,
    supported: HashSet<String>,
}

impl Default for StaticVersionCatalog {
    fn default() -> Self {
        let versions: BTreeMap<i32, &'static str> = RELEASES.iter().copied().collect();
        let supported = versions.values().map(|v| v.to_string()).collect();
        Self {
            versions,
            supported,
        }
    }
}

impl StaticVersionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict joins to the listed releases. An empty list keeps every
    /// release in the catalogue.
    pub fn with_supported<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let supported: HashSet<String> = versions.into_iter().map(Into::into).collect();
        if !supported.is_empty() {
            self.supported = supported;
        }
        self
    }

    pub fn supported_versions(&self) -> impl Iterator<Item = &str> {
        self.supported.iter().map(String::as_str)
    }
}

impl VersionCatalog for StaticVersionCatalog {
    fn lookup_game_version(&self, protocol: i64) -> Option<String> {
        let protocol = i32::try_from(protocol).ok()?;
        self.versions.get(&protocol).map(|v| v.to_string())
    }

    fn is_supported(&self, version: &str) -> bool {
        self.supported.contains(version)
    }
}
