//! Persistence for the investigator alert feed.
//!
//! The feed is the only state that lives across snapshots. It sits behind a
//! narrow load/save interface so derivations never touch storage.

use crate::types::alert::FeedAlert;
use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Key-value collaborator holding the alert feed
pub trait AlertStore: Send + Sync {
    /// Stored entries, newest first; empty when nothing was saved yet
    fn load(&self) -> Result<Vec<FeedAlert>>;

    /// Replace the stored entries
    fn save(&self, alerts: &[FeedAlert]) -> Result<()>;
}

/// Store kept in process memory
#[derive(Default)]
pub struct MemoryAlertStore {
    alerts: RwLock<Vec<FeedAlert>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertStore for MemoryAlertStore {
    fn load(&self) -> Result<Vec<FeedAlert>> {
        let alerts = self
            .alerts
            .read()
            .map_err(|_| anyhow::anyhow!("alert store lock poisoned"))?;
        Ok(alerts.clone())
    }

    fn save(&self, alerts: &[FeedAlert]) -> Result<()> {
        let mut stored = self
            .alerts
            .write()
            .map_err(|_| anyhow::anyhow!("alert store lock poisoned"))?;
        *stored = alerts.to_vec();
        Ok(())
    }
}

/// Store backed by a JSON file
pub struct JsonFileAlertStore {
    path: PathBuf,
}

impl JsonFileAlertStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AlertStore for JsonFileAlertStore {
    fn load(&self) -> Result<Vec<FeedAlert>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored alerts yet");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read alert store {}", self.path.display()))
            }
        };

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse alert store {}", self.path.display()))
    }

    fn save(&self, alerts: &[FeedAlert]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(alerts).context("Failed to serialize alerts")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write alert store {}", self.path.display()))?;

        debug!(path = %self.path.display(), alerts = alerts.len(), "Saved alert feed");
        Ok(())
    }
}

/// Writes feed snapshots to a store on the blocking pool.
///
/// Only the newest snapshot is kept pending, so a burst of updates while a
/// write runs collapses into one write of the latest entries. Dropping the
/// persister flushes the pending snapshot and ends the task.
pub struct FeedPersister {
    pending: watch::Sender<Option<Vec<FeedAlert>>>,
}

impl FeedPersister {
    pub fn spawn(store: Arc<dyn AlertStore>) -> (Self, JoinHandle<()>) {
        let (pending, mut rx) = watch::channel::<Option<Vec<FeedAlert>>>(None);

        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(entries) = rx.borrow_and_update().clone() else {
                    continue;
                };
                let store = store.clone();
                match tokio::task::spawn_blocking(move || store.save(&entries)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(error = %e, "Failed to persist alert feed"),
                    Err(e) => error!(error = %e, "Alert feed write task failed"),
                }
            }
            debug!("Alert feed persister stopped");
        });

        (Self { pending }, handle)
    }

    /// Queue `entries` as the next state to write.
    pub fn publish(&self, entries: Vec<FeedAlert>) {
        self.pending.send_replace(Some(entries));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::alert::FeedSeverity;
    use uuid::Uuid;

    fn alert(n: u8, read: bool) -> FeedAlert {
        FeedAlert {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, &[n]),
            severity: FeedSeverity::Warning,
            title: format!("alert {}", n),
            message: "message".to_string(),
            read,
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("fraud-analytics-{}-{}", std::process::id(), name))
            .join("alerts.json")
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryAlertStore::new();
        assert!(store.load().unwrap().is_empty());

        store.save(&[alert(1, false), alert(2, true)]).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded[1].read);
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let store = JsonFileAlertStore::new(temp_path("missing"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_persists() {
        let path = temp_path("persist");
        let store = JsonFileAlertStore::new(&path);
        let alerts = vec![alert(1, true), alert(2, false)];

        store.save(&alerts).unwrap();
        assert_eq!(JsonFileAlertStore::new(&path).load().unwrap(), alerts);

        store.save(&[]).unwrap();
        assert!(store.load().unwrap().is_empty());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_persister_writes_latest_snapshot_on_shutdown() {
        let store = Arc::new(MemoryAlertStore::new());
        let (persister, handle) = FeedPersister::spawn(store.clone());

        persister.publish(vec![alert(1, false)]);
        persister.publish(vec![alert(2, false), alert(1, true)]);
        drop(persister);
        handle.await.unwrap();

        assert_eq!(store.load().unwrap(), vec![alert(2, false), alert(1, true)]);
    }

    #[tokio::test]
    async fn test_persister_writes_files_off_the_runtime() {
        let path = temp_path("persister");
        let store: Arc<dyn AlertStore> = Arc::new(JsonFileAlertStore::new(&path));
        let (persister, handle) = FeedPersister::spawn(store);

        persister.publish(vec![alert(3, false)]);
        drop(persister);
        handle.await.unwrap();

        assert_eq!(JsonFileAlertStore::new(&path).load().unwrap(), vec![alert(3, false)]);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let path = temp_path("garbage");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();

        assert!(JsonFileAlertStore::new(&path).load().is_err());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
