use serde::{Deserialize, Serialize};
use std::io;

/// Metadata for one stored ROM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomRecord {
    pub id: u64,
    pub name: String,
    /// Id of the core the ROM was stored for.
    pub platform: String,
    /// Unix seconds at the time the ROM was added.
    pub created_at: u64,
}

/// Persistent ROM storage. The emulation layer only ever reads blobs back
/// out; listing, covers and removal are shell bookkeeping.
pub trait RomStore {
    fn list(&self) -> io::Result<Vec<RomRecord>>;

    /// The stored ROM image.
    fn get(&self, id: u64) -> io::Result<Vec<u8>>;

    /// Store a ROM and return its new id.
    fn add(&mut self, name: &str, platform: &str, blob: &[u8]) -> io::Result<u64>;

    fn remove(&mut self, id: u64) -> io::Result<()>;

    /// Cover art as an encoded PNG, if one was stored.
    fn cover(&self, id: u64) -> io::Result<Option<Vec<u8>>>;

    fn set_cover(&mut self, id: u64, png: &[u8]) -> io::Result<()>;
}
