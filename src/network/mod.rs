//! Wire protocol plumbing: varints, packets, framing and the status ping

pub mod codec;
pub mod packet;
pub mod status;
pub mod transport;
pub mod varint;
pub mod version;

pub use status::{ProbeVerdict, ServerStatus, StatusProbe, StatusProber};
pub use transport::FramedTransport;
pub use version::{GameVersion, StaticVersionCatalog, VersionCatalog};
