use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::{entry_size, PersistentStore, StoreError};

/// Suffix for committed entries.
const ENTRY_SUFFIX: &str = ".entry";

/// Suffix for in-flight writes; renamed to `ENTRY_SUFFIX` once complete.
const TEMP_SUFFIX: &str = ".tmp";

/// Directory-backed store, one file per key.
///
/// Keys are escaped into file names, so any string is a valid key. Files in
/// the directory that don't carry the entry suffix are ignored.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    capacity_bytes: Option<u64>,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
        Ok(Self {
            dir,
            capacity_bytes: None,
        })
    }

    pub fn with_capacity(dir: PathBuf, capacity_bytes: u64) -> Result<Self> {
        let mut store = Self::new(dir)?;
        store.capacity_bytes = Some(capacity_bytes);
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn capacity_bytes(&self) -> Option<u64> {
        self.capacity_bytes
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", encode_key(key), ENTRY_SUFFIX))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", encode_key(key), TEMP_SUFFIX))
    }

    /// Walk committed entries as (key, size on disk).
    fn entries(&self) -> Result<Vec<(String, u64)>, StoreError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry?;
            let file_name = dir_entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(encoded) = name.strip_suffix(ENTRY_SUFFIX) else {
                continue;
            };
            let Some(key) = decode_key(encoded) else {
                debug!(file = name, "Skipping store file with undecodable name");
                continue;
            };
            // The file may vanish between listing and stat
            let len = match dir_entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            entries.push((key, len));
        }
        Ok(entries)
    }

    pub fn used_bytes(&self) -> Result<u64, StoreError> {
        Ok(self
            .entries()?
            .iter()
            .map(|(key, len)| key.len() as u64 + len)
            .sum())
    }
}

impl PersistentStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.entry_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if let Some(capacity) = self.capacity_bytes {
            let used: u64 = self
                .entries()?
                .iter()
                .filter(|(k, _)| k != key)
                .map(|(k, len)| k.len() as u64 + len)
                .sum();
            let needed = used + entry_size(key, value);
            if needed > capacity {
                return Err(StoreError::CapacityExceeded { needed, capacity });
            }
        }

        fs::create_dir_all(&self.dir)?;
        let temp = self.temp_path(key);
        fs::write(&temp, value)?;
        if let Err(e) = fs::rename(&temp, self.entry_path(key)) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| key.starts_with(prefix))
            .collect())
    }
}

fn is_plain(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-')
}

/// Escape a key into a file-name-safe string (`%XX` for anything unusual).
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if is_plain(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn decode_key(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
