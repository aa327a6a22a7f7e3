//! Docker Volume Plugin → CSI bridge.
//!
//! [`Bridge`] implements [`VolumeDriver`] by translating every Docker verb
//! into CSI calls against a hosted [`CsiService`], always through a fresh
//! in-process connection from [`CsiService::dial`].
//!
//! ## State
//!
//! | Field | Guard | Contents |
//! |---|---|---|
//! | `cache` | `RwLock` | name → CSI identity and metadata |
//! | `refs` | `Mutex` | target path → mount holders |
//! | `nfs` | `tokio::Mutex` | the NFS mapping file |
//!
//! Nothing here is transactional across operations; a list refresh may race
//! a create and the cache converges on the next refresh.
//!
//! ## Flavors
//!
//! The CSI driver name picks a [`Flavor`]. NFS volumes never reach CSI for
//! Create/List/Remove: they live in the static mapping. Volumes from a
//! libStorage-backed service are only named by their metadata.

pub mod cache;
pub mod nfs;
pub mod refcount;

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use libcsi::proto::{
    self, CapacityRange, ControllerServiceCapability, PublishVolumeInfo, VolumeInfo,
};
use libcsi::types::{ControllerRpc, SUPPORTED_VERSION, has_capability, method, single_node_mount};
use libcsi::{CsiConn, CsiError, CsiService};
use tracing::{debug, info, instrument, warn};

use crate::api::Volume;
use crate::driver::VolumeDriver;
use crate::error::DriverError;

use cache::{CachedVolume, VolumeCache};
use nfs::{NfsMapping, NfsSource, NfsStore};
use refcount::RefCounts;

/// Create option carrying the volume size in GiB.
pub const SIZE_OPT: &str = "size";
/// NFS Create options.
pub const HOST_OPT: &str = "host";
pub const EXPORT_OPT: &str = "export";

pub const DEFAULT_MOUNT_ROOT: &str = "/var/lib/rkvol/volumes";
pub const DEFAULT_FS_TYPE: &str = "ext4";

const GIB: u64 = 1 << 30;
const NFS_FS_TYPE: &str = "nfs";

/// How the hosted CSI driver names and stores volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Generic,
    /// Statically mapped NFS exports.
    Nfs,
    /// Volumes served through libStorage; names come from metadata only.
    LibStorage,
}

impl Flavor {
    pub fn from_driver(name: &str) -> Self {
        if name.eq_ignore_ascii_case("nfs") {
            Self::Nfs
        } else if name.eq_ignore_ascii_case("libstorage") {
            Self::LibStorage
        } else {
            Self::Generic
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Parent of every target path.
    pub mount_root: PathBuf,
    /// Filesystem requested for non-NFS mounts.
    pub fs_type: String,
    pub nfs: NfsSource,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from(DEFAULT_MOUNT_ROOT),
            fs_type: DEFAULT_FS_TYPE.to_owned(),
            nfs: NfsSource::default(),
        }
    }
}

pub struct Bridge {
    csi: Arc<CsiService>,
    flavor: Flavor,
    mount_root: PathBuf,
    fs_type: String,
    cache: Arc<VolumeCache>,
    refs: RefCounts,
    nfs: NfsStore,
}

impl Bridge {
    /// Build a bridge over `csi`. NFS-flavored bridges load their static
    /// mappings into the cache here.
    pub async fn new(csi: Arc<CsiService>, config: BridgeConfig) -> Result<Self, DriverError> {
        let flavor = Flavor::from_driver(csi.name());
        let cache = Arc::new(VolumeCache::default());
        let source = match flavor {
            Flavor::Nfs => config.nfs,
            _ => NfsSource::default(),
        };
        let (nfs, mappings) = NfsStore::load(&source).await?;
        for mapping in mappings {
            cache.insert(mapping.name.clone(), static_entry(&mapping));
        }
        info!(driver = csi.name(), ?flavor, cached = cache.len(), "docker bridge ready");

        Ok(Self {
            csi,
            flavor,
            mount_root: config.mount_root,
            fs_type: config.fs_type,
            cache,
            refs: RefCounts::default(),
            nfs,
        })
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn cache(&self) -> &VolumeCache {
        &self.cache
    }

    /// Mount holders of `name`'s target path.
    pub fn mount_count(&self, name: &str) -> usize {
        self.target(name).map_or(0, |target| self.refs.get(&target))
    }

    /// Target path of `name`, always a direct child of the mount root.
    pub fn target(&self, name: &str) -> Result<PathBuf, DriverError> {
        check_name(name)?;
        Ok(self.mount_root.join(name))
    }

    async fn dial(&self) -> Result<CsiConn, DriverError> {
        Ok(self.csi.dial().await?)
    }

    async fn controller_capabilities(
        &self,
        conn: &CsiConn,
    ) -> Result<Vec<ControllerServiceCapability>, DriverError> {
        let result = conn
            .controller_get_capabilities(proto::ControllerGetCapabilitiesRequest {
                version: Some(SUPPORTED_VERSION),
            })
            .await?;
        Ok(result.capabilities)
    }

    async fn node_id(&self, conn: &CsiConn) -> Result<Option<proto::NodeId>, DriverError> {
        let result = conn
            .get_node_id(proto::GetNodeIdRequest {
                version: Some(SUPPORTED_VERSION),
            })
            .await?;
        Ok(result.node_id)
    }

    /// Every volume the backend reports, following `next_token`.
    async fn list_all(&self, conn: &CsiConn) -> Result<Vec<VolumeInfo>, DriverError> {
        let mut volumes = Vec::new();
        let mut token = String::new();
        loop {
            let page = conn
                .list_volumes(proto::ListVolumesRequest {
                    version: Some(SUPPORTED_VERSION),
                    max_entries: 0,
                    starting_token: token.clone(),
                })
                .await?;
            volumes.extend(page.entries.into_iter().filter_map(|e| e.volume_info));
            if page.next_token.is_empty() {
                break;
            }
            if page.next_token == token {
                warn!(token = %token, "backend repeated its list token, stopping");
                break;
            }
            token = page.next_token;
        }
        Ok(volumes)
    }

    /// Docker-facing name of a listed volume.
    fn resolve_name(&self, info: &VolumeInfo) -> Option<String> {
        if let Some(name) = info.metadata.as_ref().and_then(|m| m.name()) {
            return Some(name.to_owned());
        }
        if self.flavor == Flavor::LibStorage {
            return None;
        }
        let id = info.id.as_ref()?;
        match id.values.get("id") {
            Some(value) if !value.is_empty() => Some(value.clone()),
            _ if id.values.len() == 1 => id.values.values().next().cloned(),
            _ => None,
        }
    }

    fn cache_info(&self, name: &str, info: VolumeInfo) -> Result<(), DriverError> {
        let id = info.id.ok_or(CsiError::MalformedResponse {
            method: method::CREATE_VOLUME,
        })?;
        let mut metadata = info.metadata.unwrap_or_default();
        if metadata.name().is_none() {
            metadata.values.insert(libcsi::NAME_KEY.to_owned(), name.to_owned());
        }
        self.cache.insert(
            name,
            CachedVolume {
                id,
                metadata,
                static_nfs: false,
            },
        );
        Ok(())
    }

    /// Look up a volume that CreateVolume reported as existing.
    async fn resolve_existing(&self, conn: &CsiConn, name: &str) -> Result<(), DriverError> {
        let capabilities = self.controller_capabilities(conn).await?;
        if !has_capability(&capabilities, ControllerRpc::ListVolumes) {
            debug!(volume = name, "existing volume not re-resolved, backend cannot list");
            return Ok(());
        }
        let existing = self
            .list_all(conn)
            .await?
            .into_iter()
            .find(|info| info.id.is_some() && self.resolve_name(info).as_deref() == Some(name));
        match existing {
            Some(info) => self.cache_info(name, info),
            None => {
                warn!(volume = name, "volume reported as existing but not listed");
                Ok(())
            }
        }
    }

    /// Docker view of a cached volume.
    async fn describe(&self, name: &str, volume: &CachedVolume) -> Result<Volume, DriverError> {
        Ok(Volume {
            name: name.to_owned(),
            mountpoint: self.mountpoint(name).await?.unwrap_or_default(),
            status: volume.metadata.values.clone(),
        })
    }

    /// The target path if it exists.
    async fn mountpoint(&self, name: &str) -> Result<Option<String>, DriverError> {
        let target = self.target(name)?;
        match tokio::fs::metadata(&target).await {
            Ok(_) => Ok(Some(target.to_string_lossy().into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DriverError::io(format!("stat {}", target.display()), e)),
        }
    }

    async fn create_nfs(&self, name: &str, opts: &HashMap<String, String>) -> Result<(), DriverError> {
        let option = |key: &str| {
            opts.get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| DriverError::invalid_option(key, "required for nfs volumes"))
        };
        let mapping = NfsMapping::new(name, &option(HOST_OPT)?, &option(EXPORT_OPT)?)?;
        if self.nfs.add(&mapping).await? {
            info!(mapping = %mapping, "nfs volume mapped");
        }
        self.cache.insert(name, static_entry(&mapping));
        Ok(())
    }

    async fn create_csi(&self, name: &str, opts: &HashMap<String, String>) -> Result<(), DriverError> {
        let mut parameters = opts.clone();
        let capacity_range = parameters
            .remove(SIZE_OPT)
            .map(|size| parse_size(&size))
            .transpose()?
            .map(|required_bytes| CapacityRange {
                required_bytes,
                limit_bytes: 0,
            });

        let conn = self.dial().await?;
        let created = conn
            .create_volume(proto::CreateVolumeRequest {
                version: Some(SUPPORTED_VERSION),
                name: name.to_owned(),
                capacity_range,
                volume_capabilities: vec![single_node_mount(self.fs_type.clone())],
                parameters,
            })
            .await;

        match created {
            Ok(result) => {
                let info = result.volume_info.ok_or(CsiError::MalformedResponse {
                    method: method::CREATE_VOLUME,
                })?;
                self.cache_info(name, info)?;
                info!(volume = name, "volume created");
                Ok(())
            }
            Err(e) if e.is_benign() => {
                debug!(volume = name, "volume already exists");
                self.resolve_existing(&conn, name).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_csi(&self) -> Result<Vec<Volume>, DriverError> {
        let conn = self.dial().await?;
        let capabilities = self.controller_capabilities(&conn).await?;
        if !has_capability(&capabilities, ControllerRpc::ListVolumes) {
            return self.list_cached().await;
        }

        let mut fresh = HashMap::new();
        for info in self.list_all(&conn).await? {
            let Some(id) = info.id.clone() else {
                warn!("skipping listed volume without identity");
                continue;
            };
            let Some(name) = self.resolve_name(&info) else {
                warn!(id = %id, "skipping listed volume without a name");
                continue;
            };
            if let Err(e) = check_name(&name) {
                warn!(id = %id, error = %e, "skipping listed volume");
                continue;
            }
            if fresh.contains_key(&name) {
                warn!(volume = %name, id = %id, "skipping listed volume with duplicate name");
                continue;
            }
            fresh.insert(
                name,
                CachedVolume {
                    id,
                    metadata: info.metadata.unwrap_or_default(),
                    static_nfs: false,
                },
            );
        }

        let mut names: Vec<_> = fresh.keys().cloned().collect();
        names.sort();
        let mut volumes = Vec::with_capacity(names.len());
        for name in &names {
            volumes.push(self.describe(name, &fresh[name]).await?);
        }

        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            cache.replace(fresh);
        });
        Ok(volumes)
    }

    async fn list_cached(&self) -> Result<Vec<Volume>, DriverError> {
        let mut volumes = Vec::new();
        for (name, volume) in self.cache.snapshot() {
            volumes.push(self.describe(&name, &volume).await?);
        }
        Ok(volumes)
    }

    async fn remove_csi(&self, name: &str) -> Result<(), DriverError> {
        let Some(volume) = self.cache.get(name) else {
            debug!(volume = name, "remove of unknown volume");
            return Ok(());
        };
        let conn = self.dial().await?;
        let deleted = conn
            .delete_volume(proto::DeleteVolumeRequest {
                version: Some(SUPPORTED_VERSION),
                volume_id: Some(volume.id),
                volume_metadata: Some(volume.metadata),
            })
            .await;
        match deleted {
            Ok(_) => {}
            Err(e) if e.is_benign() => debug!(volume = name, "volume already deleted"),
            Err(e) => return Err(e.into()),
        }
        self.cache.remove(name);
        info!(volume = name, "volume removed");
        Ok(())
    }

    /// Publish `volume` at `target`.
    async fn publish(&self, volume: &CachedVolume, target: &Path) -> Result<(), DriverError> {
        let conn = self.dial().await?;
        let fs_type = match self.flavor {
            Flavor::Nfs => NFS_FS_TYPE.to_owned(),
            _ => self.fs_type.clone(),
        };
        let capability = single_node_mount(fs_type);

        let capabilities = self.controller_capabilities(&conn).await?;
        let publish_info: Option<PublishVolumeInfo> =
            if has_capability(&capabilities, ControllerRpc::PublishUnpublishVolume) {
                let node_id = self.node_id(&conn).await?;
                let published = conn
                    .controller_publish_volume(proto::ControllerPublishVolumeRequest {
                        version: Some(SUPPORTED_VERSION),
                        volume_id: Some(volume.id.clone()),
                        volume_metadata: Some(volume.metadata.clone()),
                        node_id,
                        volume_capability: Some(capability.clone()),
                        readonly: false,
                    })
                    .await?;
                published.publish_volume_info
            } else {
                None
            };

        conn.node_publish_volume(proto::NodePublishVolumeRequest {
            version: Some(SUPPORTED_VERSION),
            volume_id: Some(volume.id.clone()),
            volume_metadata: Some(volume.metadata.clone()),
            publish_volume_info: publish_info,
            target_path: target.to_string_lossy().into_owned(),
            volume_capability: Some(capability),
            readonly: false,
        })
        .await?;
        Ok(())
    }

    /// Undo [`Self::publish`] and drop the target directory.
    async fn teardown(&self, volume: &CachedVolume, target: &Path) -> Result<(), DriverError> {
        let conn = self.dial().await?;
        let unpublished = conn
            .node_unpublish_volume(proto::NodeUnpublishVolumeRequest {
                version: Some(SUPPORTED_VERSION),
                volume_id: Some(volume.id.clone()),
                volume_metadata: Some(volume.metadata.clone()),
                target_path: target.to_string_lossy().into_owned(),
            })
            .await;
        match unpublished {
            Ok(_) => {}
            Err(e) if e.is_benign() => debug!(target = %target.display(), "volume was not node-published"),
            Err(e) => return Err(e.into()),
        }

        let capabilities = self.controller_capabilities(&conn).await?;
        if has_capability(&capabilities, ControllerRpc::PublishUnpublishVolume) {
            let node_id = self.node_id(&conn).await?;
            let unpublished = conn
                .controller_unpublish_volume(proto::ControllerUnpublishVolumeRequest {
                    version: Some(SUPPORTED_VERSION),
                    volume_id: Some(volume.id.clone()),
                    volume_metadata: Some(volume.metadata.clone()),
                    node_id,
                })
                .await;
            match unpublished {
                Ok(_) => {}
                Err(e) if e.is_benign() => debug!("volume was not controller-published"),
                Err(e) => return Err(e.into()),
            }
        }

        match tokio::fs::remove_dir(target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DriverError::io(format!("remove {}", target.display()), e)),
        }
    }
}

/// Reject names that are not exactly one plain path component, or that could
/// not be stored as one NFS mapping line.
pub fn check_name(name: &str) -> Result<(), DriverError> {
    let invalid = |reason: &'static str| -> Result<(), DriverError> {
        Err(DriverError::InvalidName {
            name: name.to_owned(),
            reason,
        })
    };
    if name.is_empty() {
        return invalid("empty");
    }
    if name.chars().any(|c| c.is_control() || c == '=' || c == '\\') {
        return invalid("contains a control character, '=' or '\\'");
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(()),
        _ => invalid("must be a single path component"),
    }
}

fn static_entry(mapping: &NfsMapping) -> CachedVolume {
    CachedVolume {
        id: mapping.volume_id(),
        metadata: mapping.metadata(),
        static_nfs: true,
    }
}

/// Parse a size option in GiB.
fn parse_size(size: &str) -> Result<u64, DriverError> {
    size.trim()
        .parse::<u64>()
        .ok()
        .and_then(|gib| gib.checked_mul(GIB))
        .ok_or_else(|| DriverError::invalid_option(SIZE_OPT, format!("{size:?} is not a size in GiB")))
}

#[async_trait]
impl VolumeDriver for Bridge {
    #[instrument(skip_all, fields(volume = %name))]
    async fn create(&self, name: &str, opts: &HashMap<String, String>) -> Result<(), DriverError> {
        check_name(name)?;
        match self.flavor {
            Flavor::Nfs => self.create_nfs(name, opts).await,
            _ => self.create_csi(name, opts).await,
        }
    }

    #[instrument(skip_all, fields(volume = %name))]
    async fn remove(&self, name: &str) -> Result<(), DriverError> {
        check_name(name)?;
        match self.flavor {
            Flavor::Nfs => {
                self.nfs.remove(name).await?;
                self.cache.remove_ignore_case(name);
                info!("nfs volume unmapped");
                Ok(())
            }
            _ => self.remove_csi(name).await,
        }
    }

    async fn path(&self, name: &str) -> Result<String, DriverError> {
        if self.cache.get(name).is_none() {
            return Err(DriverError::NotFound(name.to_owned()));
        }
        self.mountpoint(name)
            .await?
            .ok_or_else(|| DriverError::NotMounted(name.to_owned()))
    }

    #[instrument(skip_all, fields(volume = %name))]
    async fn mount(&self, name: &str, caller: &str) -> Result<String, DriverError> {
        let target = self.target(name)?;
        let volume = match self.cache.get(name) {
            Some(volume) => volume,
            None if self.flavor == Flavor::Nfs => {
                return Err(DriverError::ImplicitCreateForbidden(name.to_owned()));
            }
            None => {
                debug!("creating volume implicitly");
                self.create_csi(name, &HashMap::new()).await?;
                self.cache
                    .get(name)
                    .ok_or_else(|| DriverError::NotFound(name.to_owned()))?
            }
        };

        if let Err(e) = tokio::fs::create_dir_all(&target).await {
            warn!(target = %target.display(), error = %e, "could not create mount target");
        }

        self.publish(&volume, &target).await?;
        let holders = self.refs.increment(&target);
        info!(caller, holders, target = %target.display(), "volume mounted");
        Ok(target.to_string_lossy().into_owned())
    }

    #[instrument(skip_all, fields(volume = %name))]
    async fn unmount(&self, name: &str, caller: &str) -> Result<(), DriverError> {
        let target = self.target(name)?;
        let volume = self
            .cache
            .get(name)
            .ok_or_else(|| DriverError::NotFound(name.to_owned()))?;

        // The hold is released before teardown. A failed teardown leaves the
        // count at zero; Docker retries Unmount and the retry tears down again.
        let holders = self.refs.decrement(&target);
        if holders > 0 {
            info!(caller, holders, "volume still in use");
            return Ok(());
        }
        self.teardown(&volume, &target).await?;
        info!(caller, "volume unmounted");
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Volume, DriverError> {
        let volume = self
            .cache
            .get(name)
            .ok_or_else(|| DriverError::NotFound(name.to_owned()))?;
        self.describe(name, &volume).await
    }

    #[instrument(skip_all)]
    async fn list(&self) -> Result<Vec<Volume>, DriverError> {
        match self.flavor {
            Flavor::Nfs => self.list_cached().await,
            _ => self.list_csi().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_follows_driver_name() {
        assert_eq!(Flavor::from_driver("nfs"), Flavor::Nfs);
        assert_eq!(Flavor::from_driver("NFS"), Flavor::Nfs);
        assert_eq!(Flavor::from_driver("libstorage"), Flavor::LibStorage);
        assert_eq!(Flavor::from_driver("vfs"), Flavor::Generic);
    }

    async fn bridge_for(driver: &str) -> Bridge {
        let backend = Arc::new(libcsi::backend::mock::MockBackend::new("n"));
        let csi = Arc::new(CsiService::with_plugin(driver, backend));
        Bridge::new(csi, BridgeConfig::default()).await.unwrap()
    }

    fn info(id: &[(&str, &str)], name: Option<&str>) -> VolumeInfo {
        VolumeInfo {
            capacity_bytes: 0,
            id: Some(proto::VolumeId::from_pairs(id.iter().copied())),
            metadata: name.map(proto::VolumeMetadata::named),
        }
    }

    #[tokio::test]
    async fn names_fall_back_to_identity() {
        let bridge = bridge_for("vfs").await;
        assert_eq!(bridge.resolve_name(&info(&[("id", "x")], Some("data"))).as_deref(), Some("data"));
        assert_eq!(bridge.resolve_name(&info(&[("id", "x"), ("zone", "a")], None)).as_deref(), Some("x"));
        assert_eq!(bridge.resolve_name(&info(&[("serial", "s1")], None)).as_deref(), Some("s1"));
        assert_eq!(bridge.resolve_name(&info(&[("a", "1"), ("b", "2")], None)), None);
    }

    #[tokio::test]
    async fn libstorage_names_come_from_metadata_only() {
        let bridge = bridge_for("libstorage").await;
        assert_eq!(bridge.flavor(), Flavor::LibStorage);
        assert_eq!(bridge.resolve_name(&info(&[("id", "x")], None)), None);
        assert_eq!(bridge.resolve_name(&info(&[("id", "x")], Some("data"))).as_deref(), Some("data"));
    }

    #[test]
    fn size_is_gib() {
        assert_eq!(parse_size("10").unwrap(), 10 * GIB);
        assert_eq!(parse_size(" 1 ").unwrap(), GIB);
        assert!(matches!(parse_size("ten"), Err(DriverError::InvalidOption { .. })));
        assert!(parse_size(&u64::MAX.to_string()).is_err());
    }
}
