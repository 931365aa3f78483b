use log::info;
use multicade_core::library::{RomRecord, RomStore};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// On-disk layout: `library.toml` index next to `<id>.rom` blobs and
/// optional `<id>.png` covers.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    next_id: u64,
    records: Vec<RomRecord>,
}

/// Filesystem-backed ROM library.
pub struct FsRomStore {
    dir: PathBuf,
    index: Index,
}

pub fn default_library_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg).join("multicade").join("library");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("multicade")
            .join("library");
    }

    crate::config::config_dir().join("library")
}

impl FsRomStore {
    /// Open a library directory, creating it and an empty index on first
    /// use. A corrupt index is an error, not silently overwritten.
    pub fn open(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let index_path = dir.join("library.toml");
        let index = match std::fs::read_to_string(&index_path) {
            Ok(text) => toml::from_str(&text).map_err(io::Error::other)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Index::default(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            index,
        })
    }

    fn write_index(&self) -> io::Result<()> {
        let text = toml::to_string_pretty(&self.index).map_err(io::Error::other)?;
        std::fs::write(self.dir.join("library.toml"), text)
    }

    fn rom_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{id}.rom"))
    }

    fn cover_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{id}.png"))
    }

    fn record(&self, id: u64) -> io::Result<&RomRecord> {
        self.index
            .records
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no ROM with id {id}")))
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl RomStore for FsRomStore {
    fn list(&self) -> io::Result<Vec<RomRecord>> {
        Ok(self.index.records.clone())
    }

    fn get(&self, id: u64) -> io::Result<Vec<u8>> {
        self.record(id)?;
        std::fs::read(self.rom_path(id))
    }

    fn add(&mut self, name: &str, platform: &str, blob: &[u8]) -> io::Result<u64> {
        let id = self.index.next_id;
        std::fs::write(self.rom_path(id), blob)?;
        self.index.records.push(RomRecord {
            id,
            name: name.to_string(),
            platform: platform.to_string(),
            created_at: unix_seconds(),
        });
        self.index.next_id += 1;
        self.write_index()?;
        info!("library: added '{name}' as id {id}");
        Ok(id)
    }

    fn remove(&mut self, id: u64) -> io::Result<()> {
        self.record(id)?;
        self.index.records.retain(|r| r.id != id);
        self.write_index()?;
        std::fs::remove_file(self.rom_path(id))?;
        // A ROM stored without a cover is fine.
        match std::fs::remove_file(self.cover_path(id)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn cover(&self, id: u64) -> io::Result<Option<Vec<u8>>> {
        self.record(id)?;
        match std::fs::read(self.cover_path(id)) {
            Ok(png) => Ok(Some(png)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set_cover(&mut self, id: u64, png: &[u8]) -> io::Result<()> {
        self.record(id)?;
        std::fs::write(self.cover_path(id), png)
    }
}
