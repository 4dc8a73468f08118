#![deny(warnings)]

//! Persistence layer: durable progress over a namespaced key-value store.
//!
//! Each record is written as one batch (`set_many`), so a save either lands
//! completely or not at all. Sets are stored comma-joined in ascending order;
//! JSON arrays are accepted on load as well.

mod backend;

pub use backend::{FileStore, KeyValueStore, MemoryStore};

use std::collections::BTreeSet;
use std::fmt;
use tap_core::{ProgressRecord, RewardId, RunState};
use thiserror::Error;
use tracing::{debug, warn};

/// Save format version. Bump when the meaning of a key changes.
pub const SAVE_VERSION: u32 = 1;

/// Returns the default save file used by the headless driver.
pub fn default_save_path() -> &'static str {
    "./saves/progress.json"
}

/// Storage failures.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum StorageError {
    /// Backend could not be read or written.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// A stored value could not be decoded.
    #[error("corrupt value for {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Unavailable(e.to_string())
    }
}

/// Non-fatal notice that progress could not be written after retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveWarning {
    pub attempts: u32,
    pub error: StorageError,
}

impl fmt::Display for SaveWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "progress may not be saved ({} attempts): {}",
            self.attempts, self.error
        )
    }
}

const KEY_VERSION: &str = "saveVersion";
const KEY_TOTAL_RUNS: &str = "totalRuns";
const KEY_UNLOCKED: &str = "unlockedRewardIDs";
const KEY_CLAIMED: &str = "claimedMilestoneIDs";
const KEY_STAGE: &str = "currentStage";
const KEY_TAPS: &str = "tapCount";
const KEY_HAPTICS: &str = "hapticsEnabled";

/// Durable home of the [`ProgressRecord`], keyed under a per-app namespace.
#[derive(Debug)]
pub struct ProgressStore<S> {
    backend: S,
    namespace: String,
}

impl<S: KeyValueStore> ProgressStore<S> {
    pub fn new(backend: S, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }

    fn key(&self, name: &str) -> String {
        format!("{}.{}", self.namespace, name)
    }

    fn read(&self, name: &str) -> Result<Option<String>, StorageError> {
        self.backend.get(&self.key(name))
    }

    /// Load the record; missing keys decode to first-launch defaults.
    pub fn load(&self) -> Result<ProgressRecord, StorageError> {
        if let Some(v) = self.read(KEY_VERSION)? {
            let version: u32 = parse_number(&self.key(KEY_VERSION), &v)?;
            if version > SAVE_VERSION {
                return Err(StorageError::Corrupt {
                    key: self.key(KEY_VERSION),
                    reason: format!("written by newer save format {version}"),
                });
            }
        }
        let total_runs = match self.read(KEY_TOTAL_RUNS)? {
            Some(v) => parse_number(&self.key(KEY_TOTAL_RUNS), &v)?,
            None => 0,
        };
        let unlocked = match self.read(KEY_UNLOCKED)? {
            Some(v) => parse_set(&self.key(KEY_UNLOCKED), &v)?
                .into_iter()
                .map(RewardId)
                .collect(),
            None => BTreeSet::new(),
        };
        let claimed = match self.read(KEY_CLAIMED)? {
            Some(v) => parse_set(&self.key(KEY_CLAIMED), &v)?,
            None => BTreeSet::new(),
        };
        let stage = self.read_optional_number(KEY_STAGE)?;
        let taps = self.read_optional_number(KEY_TAPS)?;
        let saved_run = stage.map(|stage| RunState {
            stage,
            taps: taps.unwrap_or(0),
        });
        let haptics = match self.read(KEY_HAPTICS)? {
            Some(v) => parse_bool(&self.key(KEY_HAPTICS), &v)?,
            None => true,
        };
        let record = ProgressRecord::from_parts(total_runs, unlocked, claimed, saved_run, haptics);
        debug!(
            namespace = %self.namespace,
            total_runs,
            unlocked = record.unlocked_rewards().len(),
            claimed = record.claimed_milestones().len(),
            "progress loaded"
        );
        Ok(record)
    }

    fn read_optional_number(&self, name: &str) -> Result<Option<u32>, StorageError> {
        match self.read(name)? {
            Some(v) if !v.trim().is_empty() => parse_number(&self.key(name), &v).map(Some),
            _ => Ok(None),
        }
    }

    /// Write the whole record in one batch.
    pub fn save(&mut self, record: &ProgressRecord) -> Result<(), StorageError> {
        let (stage, taps) = match record.saved_run() {
            Some(run) => (run.stage.to_string(), run.taps.to_string()),
            None => (String::new(), String::new()),
        };
        let entries = vec![
            (self.key(KEY_VERSION), SAVE_VERSION.to_string()),
            (self.key(KEY_TOTAL_RUNS), record.total_runs().to_string()),
            (
                self.key(KEY_UNLOCKED),
                join(record.unlocked_rewards().iter().map(|id| id.0)),
            ),
            (
                self.key(KEY_CLAIMED),
                join(record.claimed_milestones().iter().copied()),
            ),
            (self.key(KEY_STAGE), stage),
            (self.key(KEY_TAPS), taps),
            (self.key(KEY_HAPTICS), record.haptics_enabled().to_string()),
        ];
        self.backend.set_many(&entries)?;
        debug!(namespace = %self.namespace, total_runs = record.total_runs(), "progress saved");
        Ok(())
    }

    /// Save, retrying once. A second failure becomes a [`SaveWarning`] for
    /// the UI; gameplay is never blocked on it.
    pub fn save_with_retry(&mut self, record: &ProgressRecord) -> Result<(), SaveWarning> {
        match self.save(record) {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(error = %first, "progress save failed, retrying once");
                self.save(record).map_err(|error| {
                    warn!(error = %error, "progress may not be saved");
                    SaveWarning { attempts: 2, error }
                })
            }
        }
    }

    /// Load, retrying once on `Unavailable`. Corrupt data is not retried.
    pub fn load_with_retry(&self) -> Result<ProgressRecord, StorageError> {
        match self.load() {
            Err(StorageError::Unavailable(reason)) => {
                warn!(%reason, "progress load failed, retrying once");
                self.load()
            }
            other => other,
        }
    }
}

fn join(values: impl Iterator<Item = u32>) -> String {
    values.map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

fn corrupt(key: &str, reason: impl fmt::Display) -> StorageError {
    StorageError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number(key: &str, value: &str) -> Result<u32, StorageError> {
    value.trim().parse().map_err(|e| corrupt(key, e))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, StorageError> {
    match value.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(corrupt(key, format!("not a boolean: {other:?}"))),
    }
}

/// Comma-joined list or JSON array of integers.
fn parse_set(key: &str, value: &str) -> Result<BTreeSet<u32>, StorageError> {
    let value = value.trim();
    if value.starts_with('[') {
        let items: Vec<u32> = serde_json::from_str(value).map_err(|e| corrupt(key, e))?;
        return Ok(items.into_iter().collect());
    }
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().map_err(|e| corrupt(key, e)))
        .collect()
}
