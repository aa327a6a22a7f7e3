//! Docker driver over a storage service handle.
//!
//! Some storage platforms cannot be driven through CSI. For them the agent
//! answers Docker directly from a [`StorageService`] supplied by the
//! embedding program.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::api::Volume;
use crate::driver::VolumeDriver;
use crate::error::DriverError;

/// A volume as the storage service reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageVolume {
    pub name: String,
    /// Set while the volume is mounted on this host.
    pub mountpoint: Option<PathBuf>,
    pub status: HashMap<String, String>,
}

impl From<StorageVolume> for Volume {
    fn from(volume: StorageVolume) -> Self {
        Self {
            name: volume.name,
            mountpoint: volume
                .mountpoint
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            status: volume.status,
        }
    }
}

/// Handle to the platform's storage API.
#[async_trait]
pub trait StorageService: Send + Sync + 'static {
    async fn volumes(&self) -> Result<Vec<StorageVolume>, DriverError>;

    async fn inspect(&self, name: &str) -> Result<Option<StorageVolume>, DriverError>;

    async fn create(&self, name: &str, opts: &HashMap<String, String>) -> Result<StorageVolume, DriverError>;

    async fn remove(&self, name: &str) -> Result<(), DriverError>;

    /// Attach the volume to this host and mount it; returns the mount path.
    async fn attach_and_mount(&self, name: &str) -> Result<PathBuf, DriverError>;

    async fn unmount_and_detach(&self, name: &str) -> Result<(), DriverError>;
}

pub struct LegacyDriver {
    storage: Arc<dyn StorageService>,
}

impl LegacyDriver {
    pub fn new(storage: Arc<dyn StorageService>) -> Self {
        Self { storage }
    }

    async fn require(&self, name: &str) -> Result<StorageVolume, DriverError> {
        self.storage
            .inspect(name)
            .await?
            .ok_or_else(|| DriverError::NotFound(name.to_owned()))
    }
}

#[async_trait]
impl VolumeDriver for LegacyDriver {
    #[instrument(skip_all, fields(volume = %name))]
    async fn create(&self, name: &str, opts: &HashMap<String, String>) -> Result<(), DriverError> {
        self.storage.create(name, opts).await?;
        info!("volume created");
        Ok(())
    }

    #[instrument(skip_all, fields(volume = %name))]
    async fn remove(&self, name: &str) -> Result<(), DriverError> {
        self.storage.remove(name).await
    }

    async fn path(&self, name: &str) -> Result<String, DriverError> {
        self.require(name)
            .await?
            .mountpoint
            .map(|p| p.to_string_lossy().into_owned())
            .ok_or_else(|| DriverError::NotMounted(name.to_owned()))
    }

    #[instrument(skip_all, fields(volume = %name))]
    async fn mount(&self, name: &str, caller: &str) -> Result<String, DriverError> {
        if self.storage.inspect(name).await?.is_none() {
            self.storage.create(name, &HashMap::new()).await?;
        }
        let path = self.storage.attach_and_mount(name).await?;
        info!(caller, path = %path.display(), "volume mounted");
        Ok(path.to_string_lossy().into_owned())
    }

    #[instrument(skip_all, fields(volume = %name))]
    async fn unmount(&self, name: &str, caller: &str) -> Result<(), DriverError> {
        self.require(name).await?;
        self.storage.unmount_and_detach(name).await?;
        info!(caller, "volume unmounted");
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Volume, DriverError> {
        self.require(name).await.map(Volume::from)
    }

    async fn list(&self) -> Result<Vec<Volume>, DriverError> {
        let mut volumes: Vec<Volume> = self.storage.volumes().await?.into_iter().map(Volume::from).collect();
        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(volumes)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    /// Storage that mounts under a fixed prefix without touching the host.
    #[derive(Default)]
    struct MemoryStorage {
        volumes: Mutex<HashMap<String, StorageVolume>>,
    }

    #[async_trait]
    impl StorageService for MemoryStorage {
        async fn volumes(&self) -> Result<Vec<StorageVolume>, DriverError> {
            Ok(self.volumes.lock().values().cloned().collect())
        }

        async fn inspect(&self, name: &str) -> Result<Option<StorageVolume>, DriverError> {
            Ok(self.volumes.lock().get(name).cloned())
        }

        async fn create(&self, name: &str, opts: &HashMap<String, String>) -> Result<StorageVolume, DriverError> {
            let volume = StorageVolume {
                name: name.to_owned(),
                mountpoint: None,
                status: opts.clone(),
            };
            self.volumes.lock().insert(name.to_owned(), volume.clone());
            Ok(volume)
        }

        async fn remove(&self, name: &str) -> Result<(), DriverError> {
            self.volumes
                .lock()
                .remove(name)
                .map(drop)
                .ok_or_else(|| DriverError::storage(format!("no volume {name}")))
        }

        async fn attach_and_mount(&self, name: &str) -> Result<PathBuf, DriverError> {
            let path = PathBuf::from("/mnt/legacy").join(name);
            let mut volumes = self.volumes.lock();
            let volume = volumes
                .get_mut(name)
                .ok_or_else(|| DriverError::storage(format!("no volume {name}")))?;
            volume.mountpoint = Some(path.clone());
            Ok(path)
        }

        async fn unmount_and_detach(&self, name: &str) -> Result<(), DriverError> {
            if let Some(volume) = self.volumes.lock().get_mut(name) {
                volume.mountpoint = None;
            }
            Ok(())
        }
    }

    fn driver() -> LegacyDriver {
        LegacyDriver::new(Arc::new(MemoryStorage::default()))
    }

    #[tokio::test]
    async fn mount_creates_implicitly() {
        let driver = driver();
        let path = driver.mount("v1", "c1").await.unwrap();
        assert_eq!(path, "/mnt/legacy/v1");
        assert_eq!(driver.path("v1").await.unwrap(), path);
        assert_eq!(driver.get("v1").await.unwrap().mountpoint, path);

        driver.unmount("v1", "c1").await.unwrap();
        assert!(matches!(driver.path("v1").await, Err(DriverError::NotMounted(_))));
    }

    #[tokio::test]
    async fn list_and_remove() {
        let driver = driver();
        driver.create("b", &HashMap::new()).await.unwrap();
        driver.create("a", &HashMap::new()).await.unwrap();
        let names: Vec<_> = driver.list().await.unwrap().into_iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        driver.remove("a").await.unwrap();
        assert!(matches!(driver.get("a").await, Err(DriverError::NotFound(_))));
        assert!(matches!(driver.unmount("a", "c").await, Err(DriverError::NotFound(_))));
    }
}
