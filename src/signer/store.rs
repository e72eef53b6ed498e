use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fd_lock::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::types::Signer;

/// On-disk format version of the persisted signer record
pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Another approval flow already holds {0}")]
    Locked(PathBuf),
}

/// The single persisted record of the current approval flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSigner {
    pub version: u32,
    pub signer: Signer,
    pub saved_at: DateTime<Utc>,
    pub hostname: String,
}

impl PersistedSigner {
    pub fn new(signer: Signer) -> Self {
        Self {
            version: RECORD_VERSION,
            signer,
            saved_at: Utc::now(),
            hostname: hostname::get()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
        }
    }
}

/// Durable storage for the pending signer. Last writer wins.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait SignerStore: Send + Sync {
    /// Load the record. A corrupt record is removed and reported as `None`.
    async fn load(&self) -> Result<Option<PersistedSigner>, StoreError>;

    async fn save(&self, signer: &Signer) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

/// Parse a raw record, rejecting unknown versions.
fn parse_record(raw: &str) -> Option<PersistedSigner> {
    match serde_json::from_str::<PersistedSigner>(raw) {
        Ok(record) if record.version == RECORD_VERSION => Some(record),
        Ok(record) => {
            warn!(
                found = record.version,
                expected = RECORD_VERSION,
                "Persisted signer has unsupported version"
            );
            None
        }
        Err(e) => {
            warn!(error = %e, "Persisted signer record is corrupt");
            None
        }
    }
}

/// JSON file store written with tmp-then-rename. Clones share one write lock.
#[derive(Debug, Clone)]
pub struct FileSignerStore {
    path: PathBuf,
    write_lock: Arc<AsyncMutex<()>>,
}

impl FileSignerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(AsyncMutex::new(())),
        }
    }

    /// Unique sibling of the record file, so concurrent writers never share one
    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "signer.json".to_string());
        self.path
            .with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()))
    }

    async fn remove_record(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(file = ?self.path, "Persisted signer cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_parent(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SignerStore for FileSignerStore {
    async fn load(&self) -> Result<Option<PersistedSigner>, StoreError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = ?self.path, "No persisted signer found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match parse_record(&contents) {
            Some(record) => {
                debug!(
                    signer_id = %record.signer.id,
                    status = %record.signer.status,
                    saved_at = %record.saved_at,
                    "Loaded persisted signer"
                );
                Ok(Some(record))
            }
            None => {
                self.clear().await?;
                Ok(None)
            }
        }
    }

    async fn save(&self, signer: &Signer) -> Result<(), StoreError> {
        let record = PersistedSigner::new(signer.clone());
        let serialized = serde_json::to_string_pretty(&record)?;

        let _guard = self.write_lock.lock().await;
        self.ensure_parent().await?;

        let temp_file = self.temp_path();
        fs::write(&temp_file, serialized).await?;
        if let Err(e) = fs::rename(&temp_file, &self.path).await {
            let _ = fs::remove_file(&temp_file).await;
            return Err(e.into());
        }

        debug!(
            signer_id = %signer.id,
            status = %signer.status,
            file = ?self.path,
            "Signer persisted"
        );
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.remove_record().await
    }
}

/// In-memory store holding the raw serialized record
#[derive(Debug, Default)]
pub struct MemorySignerStore {
    raw: Mutex<Option<String>>,
}

impl MemorySignerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with arbitrary contents, valid or not
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    pub fn with_signer(signer: &Signer) -> Result<Self, StoreError> {
        let raw = serde_json::to_string(&PersistedSigner::new(signer.clone()))?;
        Ok(Self::with_raw(raw))
    }

    pub fn raw(&self) -> Option<String> {
        self.raw.lock().map(|raw| raw.clone()).unwrap_or_default()
    }

    /// Currently stored signer, without the corruption cleanup of `load`
    pub fn peek(&self) -> Option<Signer> {
        self.raw()
            .and_then(|raw| parse_record(&raw))
            .map(|record| record.signer)
    }

    fn set(&self, value: Option<String>) {
        if let Ok(mut raw) = self.raw.lock() {
            *raw = value;
        }
    }
}

#[async_trait]
impl SignerStore for MemorySignerStore {
    async fn load(&self) -> Result<Option<PersistedSigner>, StoreError> {
        let Some(raw) = self.raw() else {
            return Ok(None);
        };
        let record = parse_record(&raw);
        if record.is_none() {
            self.set(None);
        }
        Ok(record)
    }

    async fn save(&self, signer: &Signer) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&PersistedSigner::new(signer.clone()))?;
        self.set(Some(raw));
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.set(None);
        Ok(())
    }
}

/// Exclusive lock preventing two `connect` processes from driving the
/// same persisted flow.
pub struct FlowLock {
    _guard: RwLockWriteGuard<'static, File>,
    path: PathBuf,
}

impl FlowLock {
    /// Try to take the lock next to the state file. Held until the
    /// process exits.
    pub fn try_acquire(state_file: &Path) -> Result<Self, StoreError> {
        let path = state_file.with_extension("lock");
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        let lock = Box::leak(Box::new(RwLock::new(lock_file)));
        let guard = lock
            .try_write()
            .map_err(|_| StoreError::Locked(path.clone()))?;

        debug!(file = ?path, "Acquired approval flow lock");
        Ok(Self {
            _guard: guard,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for FlowLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowLock").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::types::SignerStatus;

    fn pending_signer() -> Signer {
        let mut signer = Signer::generated("uuid-1", "0xpub");
        signer.status = SignerStatus::PendingApproval;
        signer.approval_url = Some("https://client.warpcast.com/deeplinks/signed-key-request?token=abc".into());
        signer
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip_and_clear() {
        let store = MemorySignerStore::new();
        assert!(store.load().await.unwrap().is_none());

        store.save(&pending_signer()).await.unwrap();
        let record = store.load().await.unwrap().expect("record saved");
        assert_eq!(record.signer, pending_signer());
        assert_eq!(record.version, RECORD_VERSION);

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_drops_corrupt_record() {
        let store = MemorySignerStore::with_raw("{not json");
        assert!(store.load().await.unwrap().is_none());
        assert!(store.raw().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_version_is_cleared() {
        let mut record = PersistedSigner::new(pending_signer());
        record.version = RECORD_VERSION + 1;
        let store = MemorySignerStore::with_raw(serde_json::to_string(&record).unwrap());

        assert!(store.load().await.unwrap().is_none());
        assert!(store.raw().is_none());
    }
}
