// src/ledger.rs
//! Dedup ledger: which (category, occurrence) pairs were already delivered.
//!
//! A pass loads the ledger once, marks keys in memory after each confirmed
//! handoff and persists once at the end. A missing or corrupt file loads as
//! an empty ledger.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::category::Category;
use crate::keys;
use crate::error::LedgerError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    sets: BTreeMap<Category, BTreeSet<String>>,
    dirty: bool,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, category: Category, key: &str) -> bool {
        self.sets
            .get(&category)
            .is_some_and(|set| set.contains(key))
    }

    /// Returns `true` if the key was not present before.
    pub fn mark(&mut self, category: Category, key: impl Into<String>) -> bool {
        let inserted = self.sets.entry(category).or_default().insert(key.into());
        self.dirty |= inserted;
        inserted
    }

    pub fn len(&self, category: Category) -> usize {
        self.sets.get(&category).map_or(0, BTreeSet::len)
    }

    /// Drop calendar keys dated before `cutoff`; returns how many went.
    /// Event keys are kept, since they carry no date.
    pub fn prune_calendar_before(&mut self, cutoff: NaiveDate) -> usize {
        let mut removed = 0;
        for set in self.sets.values_mut() {
            let before = set.len();
            set.retain(|k| keys::calendar_key_date(k).map_or(true, |d| d >= cutoff));
            removed += before - set.len();
        }
        self.dirty |= removed > 0;
        removed
    }

    /// Whether anything was marked since load.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn to_file(&self) -> LedgerFile {
        let take = |c: Category| self.sets.get(&c).cloned().unwrap_or_default();
        LedgerFile {
            reminded: take(Category::Reminder),
            daily_sent: take(Category::Daily),
            results_sent: take(Category::Results),
            weekly_sent: take(Category::Weekly),
        }
    }

    fn from_file(file: LedgerFile) -> Self {
        let mut sets = BTreeMap::new();
        sets.insert(Category::Reminder, file.reminded);
        sets.insert(Category::Daily, file.daily_sent);
        sets.insert(Category::Results, file.results_sent);
        sets.insert(Category::Weekly, file.weekly_sent);
        Self { sets, dirty: false }
    }
}

/// On-disk shape. Field names are part of the file format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    reminded: BTreeSet<String>,
    #[serde(default)]
    daily_sent: BTreeSet<String>,
    #[serde(default)]
    results_sent: BTreeSet<String>,
    #[serde(default)]
    weekly_sent: BTreeSet<String>,
}

/// Result of loading a ledger.
#[derive(Debug, Clone, Default)]
pub struct LedgerLoad {
    pub ledger: Ledger,
    /// The stored ledger existed but could not be read and was replaced by an empty one.
    pub recovered: bool,
}

pub trait LedgerStore: Send + Sync {
    fn load(&self) -> LedgerLoad;
    fn persist(&self, ledger: &Ledger) -> Result<(), LedgerError>;
}

/// JSON ledger file, replaced atomically on persist.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    path: PathBuf,
}

impl FileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "ledger.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_err(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl LedgerStore for FileLedgerStore {
    fn load(&self) -> LedgerLoad {
        let content = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no ledger yet, starting empty");
                return LedgerLoad::default();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ledger unreadable, starting empty");
                return LedgerLoad {
                    ledger: Ledger::new(),
                    recovered: true,
                };
            }
        };

        if content.trim().is_empty() {
            return LedgerLoad::default();
        }

        match serde_json::from_str::<LedgerFile>(&content) {
            Ok(file) => LedgerLoad {
                ledger: Ledger::from_file(file),
                recovered: false,
            },
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ledger corrupt, starting empty");
                LedgerLoad {
                    ledger: Ledger::new(),
                    recovered: true,
                }
            }
        }
    }

    fn persist(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let json = serde_json::to_vec_pretty(&ledger.to_file())?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }

        // Previous content is replaced only after the new file is complete.
        let tmp = self.tmp_path();
        let mut f = fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
        f.write_all(&json).map_err(|e| self.io_err(e))?;
        f.sync_all().map_err(|e| self.io_err(e))?;
        drop(f);
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;

        tracing::debug!(path = %self.path.display(), "ledger persisted");
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<Ledger>,
    persists: AtomicUsize,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(mut ledger: Ledger) -> Self {
        ledger.dirty = false;
        Self {
            inner: Mutex::new(ledger),
            persists: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> Ledger {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn persist_count(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> LedgerLoad {
        LedgerLoad {
            ledger: self.snapshot(),
            recovered: false,
        }
    }

    fn persist(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let mut stored = ledger.clone();
        stored.dirty = false;
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = stored;
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_is_per_category_and_sets_dirty() {
        let mut l = Ledger::new();
        assert!(!l.is_dirty());
        assert!(l.mark(Category::Daily, "2024-03-01"));
        assert!(!l.mark(Category::Daily, "2024-03-01"));
        assert!(l.contains(Category::Daily, "2024-03-01"));
        assert!(!l.contains(Category::Results, "2024-03-01"));
        assert!(l.is_dirty());
        assert_eq!(l.len(Category::Daily), 1);
    }

    #[test]
    fn prune_drops_only_old_calendar_keys() {
        let mut l = Ledger::new();
        l.mark(Category::Daily, "2024-01-10");
        l.mark(Category::Daily, "2024-03-01");
        l.mark(Category::Results, "2024-02-04");
        l.mark(Category::Weekly, "2024-W01");
        l.mark(Category::Weekly, "2024-W09");
        l.mark(Category::Reminder, "0123456789abcdef");
        l.dirty = false;

        let cutoff = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
        assert_eq!(l.prune_calendar_before(cutoff), 3);
        assert!(l.is_dirty());
        assert!(l.contains(Category::Daily, "2024-03-01"));
        assert!(l.contains(Category::Weekly, "2024-W09"));
        assert!(l.contains(Category::Reminder, "0123456789abcdef"));
        assert!(!l.contains(Category::Results, "2024-02-04"));

        l.dirty = false;
        assert_eq!(l.prune_calendar_before(cutoff), 0);
        assert!(!l.is_dirty());
    }

    #[test]
    fn file_roundtrip_uses_named_sets() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path().join("state.json"));

        let mut l = Ledger::new();
        l.mark(Category::Reminder, "abcd");
        l.mark(Category::Weekly, "2024-W09");
        store.persist(&l).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["reminded"], serde_json::json!(["abcd"]));
        assert_eq!(raw["weekly_sent"], serde_json::json!(["2024-W09"]));
        assert_eq!(raw["daily_sent"], serde_json::json!([]));

        let loaded = store.load();
        assert!(!loaded.recovered);
        assert!(loaded.ledger.contains(Category::Reminder, "abcd"));
        assert!(!loaded.ledger.is_dirty());
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn missing_file_is_empty_not_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path().join("nope.json"));
        let loaded = store.load();
        assert!(!loaded.recovered);
        assert_eq!(loaded.ledger, Ledger::new());
    }

    #[test]
    fn corrupt_file_is_empty_and_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        let loaded = FileLedgerStore::new(&path).load();
        assert!(loaded.recovered);
        assert_eq!(loaded.ledger.len(Category::Daily), 0);
    }

    #[test]
    fn partial_file_fills_missing_sets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"daily_sent": ["2024-03-01"], "extra": 1}"#).unwrap();
        let loaded = FileLedgerStore::new(&path).load();
        assert!(!loaded.recovered);
        assert!(loaded.ledger.contains(Category::Daily, "2024-03-01"));
        assert_eq!(loaded.ledger.len(Category::Reminder), 0);
    }

    #[test]
    fn persist_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path().join("state/nested/ledger.json"));
        let mut l = Ledger::new();
        l.mark(Category::Results, "2024-03-01");
        store.persist(&l).unwrap();
        assert!(store.load().ledger.contains(Category::Results, "2024-03-01"));
    }

    #[test]
    fn memory_store_counts_persists() {
        let store = MemoryLedgerStore::new();
        let mut l = store.load().ledger;
        l.mark(Category::Daily, "2024-03-01");
        store.persist(&l).unwrap();
        assert_eq!(store.persist_count(), 1);
        assert!(store.snapshot().contains(Category::Daily, "2024-03-01"));
        assert!(!store.snapshot().is_dirty());
    }
}
