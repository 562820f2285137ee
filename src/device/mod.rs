//! Device-local key/value persistence.
//!
//! Everything a guest or couple device remembers between visits (its own
//! claims, a verified dashboard PIN) goes through [`LocalStore`], scoped by
//! wedding id. Swap in [`MemoryLocalStore`] under test.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::{Context, Result};
use log::warn;

pub trait LocalStore: Send + Sync {
    fn get(&self, scope: &str, key: &str) -> Option<String>;
    fn set(&self, scope: &str, key: &str, value: &str) -> Result<()>;
    fn remove(&self, scope: &str, key: &str) -> Result<()>;
}

/// `scope -> key -> value`. Nesting keeps any two `(scope, key)` pairs apart
/// whatever characters they contain.
type Entries = BTreeMap<String, BTreeMap<String, String>>;

fn lookup(entries: &Entries, scope: &str, key: &str) -> Option<String> {
    entries.get(scope)?.get(key).cloned()
}

fn insert(entries: &mut Entries, scope: &str, key: &str, value: &str) {
    entries
        .entry(scope.to_string())
        .or_default()
        .insert(key.to_string(), value.to_string());
}

/// Returns whether anything was removed.
fn delete(entries: &mut Entries, scope: &str, key: &str) -> bool {
    let Some(scoped) = entries.get_mut(scope) else {
        return false;
    };
    let removed = scoped.remove(key).is_some();
    if scoped.is_empty() {
        entries.remove(scope);
    }
    removed
}

fn read_guard<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_guard<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Missing, unreadable or malformed state all load as empty.
fn load_entries(path: &Path) -> Entries {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Entries::new(),
        Err(err) => {
            warn!("Ignoring unreadable device state at {}: {err}", path.display());
            return Entries::new();
        }
    };

    serde_json::from_slice(&bytes).unwrap_or_else(|err| {
        warn!("Ignoring malformed device state at {}: {err}", path.display());
        Entries::new()
    })
}

/// JSON file of per-scope string maps. A corrupt file reads as empty and is
/// replaced on the next write.
pub struct FileLocalStore {
    path: PathBuf,
    data: RwLock<Entries>,
}

impl FileLocalStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = load_entries(&path);
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn persist(&self, data: &Entries) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create device state directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write device state to {}", self.path.display()))
    }
}

impl LocalStore for FileLocalStore {
    fn get(&self, scope: &str, key: &str) -> Option<String> {
        lookup(&read_guard(&self.data), scope, key)
    }

    fn set(&self, scope: &str, key: &str, value: &str) -> Result<()> {
        let mut guard = write_guard(&self.data);
        insert(&mut guard, scope, key, value);
        self.persist(&guard)
    }

    fn remove(&self, scope: &str, key: &str) -> Result<()> {
        let mut guard = write_guard(&self.data);
        if delete(&mut guard, scope, key) {
            self.persist(&guard)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLocalStore {
    data: RwLock<Entries>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, scope: &str, key: &str) -> Option<String> {
        lookup(&read_guard(&self.data), scope, key)
    }

    fn set(&self, scope: &str, key: &str, value: &str) -> Result<()> {
        insert(&mut write_guard(&self.data), scope, key, value);
        Ok(())
    }

    fn remove(&self, scope: &str, key: &str) -> Result<()> {
        delete(&mut write_guard(&self.data), scope, key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("device.json");

        let store = FileLocalStore::new(path.clone()).unwrap();
        store.set("w1", "claims", "[\"g1\"]").unwrap();
        store.set("w2", "pin", "1234").unwrap();
        store.remove("w2", "pin").unwrap();
        drop(store);

        let reloaded = FileLocalStore::new(path).unwrap();
        assert_eq!(reloaded.get("w1", "claims").as_deref(), Some("[\"g1\"]"));
        assert_eq!(reloaded.get("w2", "pin"), None);
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        fs::write(&path, "{ not json").unwrap();

        let store = FileLocalStore::new(path.clone()).unwrap();
        assert_eq!(store.get("w1", "claims"), None);

        store.set("w1", "claims", "[]").unwrap();
        let reloaded = FileLocalStore::new(path).unwrap();
        assert_eq!(reloaded.get("w1", "claims").as_deref(), Some("[]"));
    }

    #[test]
    fn non_utf8_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        fs::write(&path, [0xff, 0xfe, 0x00, 0x7b]).unwrap();

        let store = FileLocalStore::new(path.clone()).unwrap();
        assert_eq!(store.get("w1", "claims"), None);
        assert_eq!(store.get("w1", "pin"), None);

        store.set("w1", "pin", "1234").unwrap();
        let reloaded = FileLocalStore::new(path).unwrap();
        assert_eq!(reloaded.get("w1", "pin").as_deref(), Some("1234"));
    }

    #[test]
    fn underscores_in_scope_and_key_stay_apart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        let store = FileLocalStore::new(path.clone()).unwrap();

        // Both pairs would flatten to "a_b_c" under a joined key.
        store.set("c", "a_b", "first").unwrap();
        store.set("b_c", "a", "second").unwrap();
        store.remove("c", "a_b").unwrap();

        let reloaded = FileLocalStore::new(path).unwrap();
        assert_eq!(reloaded.get("c", "a_b"), None);
        assert_eq!(reloaded.get("b_c", "a").as_deref(), Some("second"));
    }

    #[test]
    fn scopes_do_not_collide() {
        let store = MemoryLocalStore::new();
        store.set("w1", "pin", "1111").unwrap();
        store.set("w2", "pin", "2222").unwrap();
        assert_eq!(store.get("w1", "pin").as_deref(), Some("1111"));
        assert_eq!(store.get("w2", "pin").as_deref(), Some("2222"));
    }
}
