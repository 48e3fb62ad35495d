// # File Store
//
// File-based implementation of ProvisioningStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good document
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "tables": {
//     "locations": { "<uuid>": { "code": "1042", ... } },
//     "connectors": { "<fabric id>": { "serial": "...", ... } },
//     "sites": {},
//     "reservations": {}
//   }
// }
// ```

use async_trait::async_trait;
use ipnet::Ipv4Net;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::tables::Tables;
use crate::Error;
use crate::model::{
    Connector, LanDescriptor, Location, LocationFull, Reservation, ReservationDraft, Site,
    SiteDraft,
};
use crate::traits::store::{ProvisioningStore, StoreFactory};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-based store with crash recovery
///
/// Every write is persisted before the call returns.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug)]
struct FileState {
    tables: Tables,
    dirty: bool,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    tables: Tables,
}

impl FileStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Try to load the existing document
    /// 2. If corruption detected, try to load from backup
    /// 3. If neither parses, fail with [`Error::Store`] and leave both files untouched
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let tables = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                tables,
                dirty: false,
            })),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<Tables, Error> {
        match Self::load(path).await {
            Ok(tables) => {
                tracing::debug!(
                    "Loaded store from file: {} locations, {} sites",
                    tables.locations.len(),
                    tables.sites.len()
                );
                Ok(tables)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Store file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::error!("No backup file found for corrupted store {}", path.display());
                    return Err(Error::store(format!(
                        "Store file {} is corrupted and has no backup: {}",
                        path.display(),
                        e
                    )));
                }

                match Self::load(&backup_path).await {
                    Ok(tables) => {
                        tracing::info!(
                            "Recovered store from backup: {} locations",
                            tables.locations.len()
                        );
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(tables)
                    }
                    Err(backup_err) => {
                        tracing::error!("Backup also corrupted: {}", backup_err);
                        Err(Error::store(format!(
                            "Store file {} and its backup are both unreadable: {}; {}",
                            path.display(),
                            e,
                            backup_err
                        )))
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<Tables, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(Tables::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!("Failed to read store file {}: {}", path.display(), e))
        })?;

        let mut deserializer = serde_json::Deserializer::from_str(&content);
        let document = StoreFileFormat::deserialize(&mut deserializer)?;
        deserializer.end()?;

        if document.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                document.version
            );
        }

        Ok(document.tables)
    }

    /// Write the document atomically
    async fn write_state(&self) -> Result<(), Error> {
        let mut state_guard = self.state.write().await;

        let document = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            tables: state_guard.tables.clone(),
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| Error::store(format!("Failed to serialize store: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.flush().await.map_err(|e| {
                Error::store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        state_guard.dirty = false;
        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    /// Apply a change to the tables and persist it
    async fn mutate<T, F>(&self, change: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Tables) -> Result<T, Error> + Send,
        T: Send,
    {
        let value = {
            let mut state_guard = self.state.write().await;
            let value = change(&mut state_guard.tables)?;
            state_guard.dirty = true;
            value
        };
        self.write_state().await?;
        Ok(value)
    }

    async fn read<T, F>(&self, query: F) -> T
    where
        F: FnOnce(&Tables) -> T + Send,
    {
        let state_guard = self.state.read().await;
        query(&state_guard.tables)
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl ProvisioningStore for FileStore {
    async fn get_location(&self, id: Uuid) -> Result<Option<Location>, Error> {
        Ok(self.read(|t| t.get_location(id)).await)
    }

    async fn location_by_code(&self, code: &str) -> Result<Option<Location>, Error> {
        self.read(|t| t.location_by_code(code)).await
    }

    async fn locations_by_type(&self, label: &str) -> Result<Vec<Location>, Error> {
        Ok(self.read(|t| t.locations_by_type(label)).await)
    }

    async fn upsert_location(&self, location: Location) -> Result<Location, Error> {
        self.mutate(|t| Ok(t.upsert_location(location))).await
    }

    async fn set_location_addressing(
        &self,
        id: Uuid,
        ip_schema: Vec<Ipv4Net>,
        aptos_network: Option<Ipv4Net>,
    ) -> Result<(), Error> {
        self.mutate(|t| t.set_location_addressing(id, ip_schema, aptos_network))
            .await
    }

    async fn location_full(&self, id: Uuid) -> Result<Option<LocationFull>, Error> {
        Ok(self.read(|t| t.location_full(id)).await)
    }

    async fn get_connector(&self, id: &str) -> Result<Option<Connector>, Error> {
        Ok(self.read(|t| t.get_connector(id)).await)
    }

    async fn connector_by_serial(&self, serial: &str) -> Result<Option<Connector>, Error> {
        Ok(self.read(|t| t.connector_by_serial(serial)).await)
    }

    async fn update_connector(&self, connector: &Connector) -> Result<(), Error> {
        self.mutate(|t| t.update_connector(connector)).await
    }

    async fn upsert_connector(&self, connector: Connector) -> Result<Connector, Error> {
        self.mutate(|t| Ok(t.upsert_connector(connector))).await
    }

    async fn site_for_location(&self, location_id: Uuid) -> Result<Option<Site>, Error> {
        Ok(self.read(|t| t.site_for_location(location_id)).await)
    }

    async fn insert_site(&self, draft: SiteDraft) -> Result<Site, Error> {
        self.mutate(|t| t.insert_site(draft)).await
    }

    async fn update_site_lans(&self, site_id: Uuid, lans: Vec<LanDescriptor>) -> Result<(), Error> {
        self.mutate(|t| t.update_site_lans(site_id, lans)).await
    }

    async fn delete_site(&self, site_id: Uuid) -> Result<(), Error> {
        self.mutate(|t| {
            t.delete_site(site_id);
            Ok(())
        })
        .await
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, Error> {
        Ok(self.read(|t| t.get_reservation(id)).await)
    }

    async fn reservation_by_mac(&self, mac: &str) -> Result<Option<Reservation>, Error> {
        Ok(self.read(|t| t.reservation_by_mac(mac)).await)
    }

    async fn reservations_for_site(&self, mwan_site_id: &str) -> Result<Vec<Reservation>, Error> {
        Ok(self.read(|t| t.reservations_for_site(mwan_site_id)).await)
    }

    async fn insert_reservation(&self, draft: ReservationDraft) -> Result<Reservation, Error> {
        self.mutate(|t| t.insert_reservation(draft)).await
    }

    async fn delete_reservation(&self, id: Uuid) -> Result<(), Error> {
        self.mutate(|t| {
            t.delete_reservation(id);
            Ok(())
        })
        .await
    }

    async fn delete_reservations_for_site(&self, mwan_site_id: &str) -> Result<usize, Error> {
        self.mutate(|t| Ok(t.delete_reservations_for_site(mwan_site_id)))
            .await
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty {
            self.write_state().await
        } else {
            Ok(())
        }
    }
}

/// Factory for [`FileStore`]
///
/// Expects `{"path": "/var/lib/storenet/store.json"}`.
#[derive(Debug, Default)]
pub struct FileStoreFactory;

#[async_trait]
impl StoreFactory for FileStoreFactory {
    async fn create(
        &self,
        config: &serde_json::Value,
    ) -> Result<Box<dyn ProvisioningStore>, Error> {
        let path = config
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::config("File store requires a 'path' setting"))?;
        Ok(Box::new(FileStore::new(path).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::new(&path).await.unwrap();
        let location = store
            .upsert_location(Location::new("1042", "Store 1042", "Store"))
            .await
            .unwrap();
        assert!(path.exists());

        let reopened = FileStore::new(&path).await.unwrap();
        let found = reopened.get_location(location.id).await.unwrap().unwrap();
        assert_eq!(found.code, "1042");
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::new(&path).await.unwrap();
        store
            .upsert_location(Location::new("1042", "First", "Store"))
            .await
            .unwrap();
        store
            .upsert_location(Location::new("1043", "Second", "Store"))
            .await
            .unwrap();

        let backup_path = FileStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileStore::new(&path).await.unwrap();
        assert!(recovered.location_by_code("1042").await.unwrap().is_some());
        // Backup holds the document before the last write
        assert!(recovered.location_by_code("1043").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_store_without_backup_refuses_to_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, br#"{"version":"1","tables":{"locations":{"#).await.unwrap();

        let result = FileStore::new(&path).await;
        assert!(matches!(result, Err(Error::Store(_))));
        // The damaged document is left for manual repair
        let content = fs::read_to_string(&path).await.unwrap();
        assert!(content.starts_with(r#"{"version""#));
    }

    #[tokio::test]
    async fn test_corrupt_store_and_backup_refuse_to_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::new(&path).await.unwrap();
        store
            .upsert_location(Location::new("1042", "First", "Store"))
            .await
            .unwrap();
        store
            .upsert_location(Location::new("1043", "Second", "Store"))
            .await
            .unwrap();

        fs::write(&path, b"corrupted json data").await.unwrap();
        fs::write(FileStore::backup_path(&path), b"also corrupted").await.unwrap();

        let result = FileStore::new(&path).await;
        assert!(matches!(result, Err(Error::Store(_))));
    }

    #[tokio::test]
    async fn test_failed_mutation_is_not_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::new(&path).await.unwrap();
        let err = store
            .set_location_addressing(Uuid::new_v4(), Vec::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_factory_requires_path() {
        let result = FileStoreFactory.create(&serde_json::json!({})).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
