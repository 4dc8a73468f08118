//! Key-value backends for the progress store.

use crate::StorageError;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Durable string key-value storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write every pair or none of them.
    fn set_many(&mut self, entries: &[(String, String)]) -> Result<(), StorageError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.set_many(&[(key.to_string(), value.to_string())])
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set_many(&mut self, entries: &[(String, String)]) -> Result<(), StorageError> {
        (**self).set_many(entries)
    }
}

/// In-process store. Failures can be injected to exercise retry paths.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    map: BTreeMap<String, String>,
    failing_writes: u32,
    failing_reads: Cell<u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail with `Unavailable`.
    pub fn fail_next_writes(&mut self, n: u32) {
        self.failing_writes = n;
    }

    /// Make the next `n` reads fail with `Unavailable`.
    pub fn fail_next_reads(&mut self, n: u32) {
        self.failing_reads.set(n);
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.map
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let failing = self.failing_reads.get();
        if failing > 0 {
            self.failing_reads.set(failing - 1);
            return Err(StorageError::Unavailable("injected read failure".into()));
        }
        Ok(self.map.get(key).cloned())
    }

    fn set_many(&mut self, entries: &[(String, String)]) -> Result<(), StorageError> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(StorageError::Unavailable("injected write failure".into()));
        }
        for (k, v) in entries {
            self.map.insert(k.clone(), v.clone());
        }
        Ok(())
    }
}

/// JSON object on disk. Every write replaces the file through a temporary
/// sibling and a rename, so readers never observe a half-written record.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    cache: BTreeMap<String, String>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let cache: BTreeMap<String, String> = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| StorageError::Corrupt {
                key: path.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StorageError::from(e)),
        };
        debug!(path = %path.display(), keys = cache.len(), "file store opened");
        Ok(Self { path, cache })
    }

    fn flush(&self, next: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(next)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let mut file = File::create(&tmp)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.cache.get(key).cloned())
    }

    fn set_many(&mut self, entries: &[(String, String)]) -> Result<(), StorageError> {
        let mut next = self.cache.clone();
        for (k, v) in entries {
            next.insert(k.clone(), v.clone());
        }
        self.flush(&next)?;
        self.cache = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_injected_failures_are_transient() {
        let mut s = MemoryStore::new();
        s.fail_next_writes(1);
        assert!(s.set("a", "1").is_err());
        assert!(s.get("a").unwrap().is_none());
        s.set("a", "1").unwrap();
        assert_eq!(s.get("a").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saves/progress.json");
        {
            let mut s = FileStore::open(&path).unwrap();
            s.set_many(&[("k.a".into(), "1".into()), ("k.b".into(), "x,y".into())])
                .unwrap();
            s.set("k.a", "2").unwrap();
        }
        let s = FileStore::open(&path).unwrap();
        assert_eq!(s.get("k.a").unwrap().as_deref(), Some("2"));
        assert_eq!(s.get("k.b").unwrap().as_deref(), Some("x,y"));
        assert!(!dir.path().join("saves/progress.json.tmp").exists());
    }

    #[test]
    fn file_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            FileStore::open(&path),
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[test]
    fn file_store_replaces_whole_file_on_each_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let mut s = FileStore::open(&path).unwrap();
        s.set("k.runs", "1").unwrap();
        s.set_many(&[("k.runs".into(), "2".into()), ("k.haptics".into(), "false".into())])
            .unwrap();

        let on_disk: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.get("k.runs").map(String::as_str), Some("2"));
        assert_eq!(on_disk.get("k.haptics").map(String::as_str), Some("false"));
        assert!(!dir.path().join("progress.json.tmp").exists());
    }
}
