//! Status store
//!
//! Boolean flags shared between the popup surface and the watcher. The file
//! backed store keeps an in-memory copy and writes through on every change.

use crate::error::{Result, ToxwatchError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::RwLock;

/// Known flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKey {
    /// Whether observation should be running
    ObservationActive,
    /// Hide toxic posts instead of tinting them
    HideToxic,
    UserAnonymization,
}

impl StatusKey {
    pub const ALL: [StatusKey; 3] = [
        StatusKey::ObservationActive,
        StatusKey::HideToxic,
        StatusKey::UserAnonymization,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatusKey::ObservationActive => "observation_active",
            StatusKey::HideToxic => "hide_toxic",
            StatusKey::UserAnonymization => "user_anonymization",
        }
    }
}

impl FromStr for StatusKey {
    type Err = ToxwatchError;

    fn from_str(s: &str) -> Result<Self> {
        StatusKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s.replace('-', "_"))
            .ok_or_else(|| ToxwatchError::Store(format!("Unknown status key: {}", s)))
    }
}

/// Key/value store of boolean flags. Missing keys read as false.
pub trait StatusStore: Send + Sync {
    fn get(&self, key: StatusKey) -> bool;

    fn set(&self, key: StatusKey, value: bool) -> Result<()>;

    fn snapshot(&self) -> BTreeMap<StatusKey, bool> {
        StatusKey::ALL.into_iter().map(|k| (k, self.get(k))).collect()
    }
}

/// Volatile store
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    flags: RwLock<BTreeMap<StatusKey, bool>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusStore for MemoryStatusStore {
    fn get(&self, key: StatusKey) -> bool {
        let flags = self.flags.read().unwrap_or_else(|e| e.into_inner());
        flags.get(&key).copied().unwrap_or(false)
    }

    fn set(&self, key: StatusKey, value: bool) -> Result<()> {
        let mut flags = self.flags.write().unwrap_or_else(|e| e.into_inner());
        flags.insert(key, value);
        Ok(())
    }
}

/// JSON file backed store
#[derive(Debug)]
pub struct FileStatusStore {
    path: PathBuf,
    flags: RwLock<BTreeMap<StatusKey, bool>>,
}

impl FileStatusStore {
    /// Open the store, reading existing flags if the file exists
    pub fn open(path: PathBuf) -> Result<Self> {
        let flags = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ToxwatchError::Io {
                source: e,
                context: format!("Failed to read status file: {}", path.display()),
            })?;
            serde_json::from_str(&content).map_err(|e| ToxwatchError::Json {
                source: e,
                context: "Failed to deserialize status file".to_string(),
            })?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            flags: RwLock::new(flags),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, flags: &BTreeMap<StatusKey, bool>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ToxwatchError::Io {
                source: e,
                context: format!("Failed to create status directory: {:?}", parent),
            })?;
        }
        let content = serde_json::to_string_pretty(flags).map_err(|e| ToxwatchError::Json {
            source: e,
            context: "Failed to serialize status flags".to_string(),
        })?;
        std::fs::write(&self.path, content).map_err(|e| ToxwatchError::Io {
            source: e,
            context: format!("Failed to write status file: {}", self.path.display()),
        })
    }
}

impl StatusStore for FileStatusStore {
    fn get(&self, key: StatusKey) -> bool {
        let flags = self.flags.read().unwrap_or_else(|e| e.into_inner());
        flags.get(&key).copied().unwrap_or(false)
    }

    fn set(&self, key: StatusKey, value: bool) -> Result<()> {
        let mut flags = self.flags.write().unwrap_or_else(|e| e.into_inner());
        let mut updated = flags.clone();
        updated.insert(key, value);
        self.persist(&updated)?;
        *flags = updated;
        Ok(())
    }
}
