//! The shared leadership record and the register it lives in.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::protocol_constants::{PRIMARY_TAB_KEY, PRIMARY_TAB_TIMESTAMP_KEY};
use crate::storage::{SharedStorage, StorageResult};

/// Opaque unique identifier of one tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TabId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TabId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who owns playback, and when they last proved it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadershipRecord {
    pub owner_id: String,
    /// Unix milliseconds of the owner's last heartbeat.
    pub last_heartbeat_ms: u64,
}

impl LeadershipRecord {
    /// A record is stale once `now - last_heartbeat >= timeout`.
    ///
    /// A heartbeat from the future (clock skew between processes) counts as fresh.
    #[must_use]
    pub fn is_stale(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_ms) >= timeout_ms
    }

    #[must_use]
    pub fn is_owned_by(&self, tab_id: &TabId) -> bool {
        self.owner_id == tab_id.as_str()
    }
}

/// Last-write-wins register holding the [`LeadershipRecord`].
///
/// There is no compare-and-swap: two tabs may write in the same instant and the
/// next `read` returns whichever write landed last.
pub trait LeadershipRegister: Send + Sync {
    fn read(&self) -> StorageResult<Option<LeadershipRecord>>;

    fn write(&self, record: &LeadershipRecord) -> StorageResult<()>;

    /// Removes the record if `owner_id` still owns it. Returns whether it did.
    fn release(&self, owner_id: &str) -> StorageResult<bool>;
}

/// Register backed by the two `spotify_primary_tab*` keys in shared storage.
pub struct StorageLeadershipRegister {
    storage: Arc<dyn SharedStorage>,
}

impl StorageLeadershipRegister {
    pub fn new(storage: Arc<dyn SharedStorage>) -> Self {
        Self { storage }
    }
}

impl LeadershipRegister for StorageLeadershipRegister {
    fn read(&self) -> StorageResult<Option<LeadershipRecord>> {
        let Some(owner_id) = self.storage.get(PRIMARY_TAB_KEY)? else {
            return Ok(None);
        };
        // Half-written record (owner without timestamp) reads as long dead.
        let last_heartbeat_ms = self
            .storage
            .get(PRIMARY_TAB_TIMESTAMP_KEY)?
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(0);

        Ok(Some(LeadershipRecord {
            owner_id,
            last_heartbeat_ms,
        }))
    }

    fn write(&self, record: &LeadershipRecord) -> StorageResult<()> {
        self.storage.set(PRIMARY_TAB_KEY, &record.owner_id)?;
        self.storage.set(
            PRIMARY_TAB_TIMESTAMP_KEY,
            &record.last_heartbeat_ms.to_string(),
        )
    }

    fn release(&self, owner_id: &str) -> StorageResult<bool> {
        match self.read()? {
            Some(record) if record.owner_id == owner_id => {
                self.storage.remove(PRIMARY_TAB_KEY)?;
                self.storage.remove(PRIMARY_TAB_TIMESTAMP_KEY)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn staleness_boundary() {
        let record = LeadershipRecord {
            owner_id: "a".into(),
            last_heartbeat_ms: 10_000,
        };
        assert!(!record.is_stale(14_999, 5_000));
        assert!(record.is_stale(15_000, 5_000));
        assert!(!record.is_stale(9_000, 5_000));
    }

    #[test]
    fn register_writes_browser_layout() {
        let storage = MemoryStorage::new();
        let register = StorageLeadershipRegister::new(Arc::new(storage.clone()));

        assert_eq!(register.read().unwrap(), None);
        register
            .write(&LeadershipRecord {
                owner_id: "tab-1".into(),
                last_heartbeat_ms: 42,
            })
            .unwrap();

        assert_eq!(storage.get(PRIMARY_TAB_KEY).unwrap().as_deref(), Some("tab-1"));
        assert_eq!(
            storage.get(PRIMARY_TAB_TIMESTAMP_KEY).unwrap().as_deref(),
            Some("42")
        );
    }

    #[test]
    fn owner_without_timestamp_is_stale() {
        let storage = MemoryStorage::new();
        storage.set(PRIMARY_TAB_KEY, "tab-1").unwrap();
        let register = StorageLeadershipRegister::new(Arc::new(storage));

        let record = register.read().unwrap().unwrap();
        assert!(record.is_stale(5_000, 5_000));
    }

    #[test]
    fn release_only_removes_own_record() {
        let register = StorageLeadershipRegister::new(Arc::new(MemoryStorage::new()));
        register
            .write(&LeadershipRecord {
                owner_id: "tab-1".into(),
                last_heartbeat_ms: 1,
            })
            .unwrap();

        assert!(!register.release("tab-2").unwrap());
        assert!(register.read().unwrap().is_some());
        assert!(register.release("tab-1").unwrap());
        assert_eq!(register.read().unwrap(), None);
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(TabId::generate(), TabId::generate());
    }
}
