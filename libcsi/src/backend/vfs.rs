//! Local-directory CSI backend.
//!
//! [`VfsBackend`] provisions each volume as a directory under
//! `<root>/volumes` and publishes it on a node by bind-mounting that
//! directory onto the requested target path. Controller publication is not
//! needed and therefore not advertised.
//!
//! # On-disk layout
//!
//! ```text
//! <root>/
//!   volumes/<volume-id>/       # volume contents
//!   <volume-id>.meta.json      # persisted record, used for recovery
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument, warn};

use super::is_mountpoint;
use crate::error::CsiError;
use crate::proto::error::create_volume_error::CreateVolumeErrorCode;
use crate::proto::error::delete_volume_error::DeleteVolumeErrorCode;
use crate::proto::error::general_error::GeneralErrorCode;
use crate::proto::error::node_publish_volume_error::NodePublishVolumeErrorCode;
use crate::proto::error::node_unpublish_volume_error::NodeUnpublishVolumeErrorCode;
use crate::proto::error::validate_volume_capabilities_error::ValidateVolumeCapabilitiesErrorCode;
use crate::proto::{self, *};
use crate::types::{
    ControllerRpc, NAME_KEY, SUPPORTED_VERSION, check_version, controller_capability, method,
    reply_err, reply_ok,
};

/// Registry name.
pub const NAME: &str = "vfs";

const ID_KEY: &str = "id";

/// Persisted form of a volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct VolumeRecord {
    id: String,
    name: String,
    capacity_bytes: u64,
    #[serde(default)]
    parameters: HashMap<String, String>,
}

impl VolumeRecord {
    fn info(&self) -> VolumeInfo {
        let mut metadata = self.parameters.clone();
        metadata.insert(NAME_KEY.to_owned(), self.name.clone());
        VolumeInfo {
            capacity_bytes: self.capacity_bytes,
            id: Some(VolumeId::from_pairs([(ID_KEY, self.id.as_str())])),
            metadata: Some(VolumeMetadata { values: metadata }),
        }
    }
}

/// Concrete CSI backend storing volumes as local directories.
///
/// # Thread safety
///
/// All mutable state is behind concurrent maps ([`DashMap`]), allowing
/// multiple Tokio tasks to operate on different volumes concurrently.
pub struct VfsBackend {
    root: PathBuf,
    node_id: String,
    /// Volume records, keyed by volume id.
    volumes: DashMap<String, VolumeRecord>,
    /// Maps the caller-supplied volume name to its id.
    names: DashMap<String, String>,
}

impl VfsBackend {
    /// Create a new backend rooted at `root`.
    ///
    /// Call [`Self::recover`] afterwards to restore state from a previous
    /// process run.
    pub fn new(root: impl Into<PathBuf>, node_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            node_id: node_id.into(),
            volumes: DashMap::new(),
            names: DashMap::new(),
        }
    }

    fn volume_dir(&self, id: &str) -> PathBuf {
        self.root.join("volumes").join(id)
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.meta.json"))
    }

    fn lookup(&self, id: Option<&VolumeId>) -> Option<VolumeRecord> {
        let id = id?.values.get(ID_KEY)?;
        self.volumes.get(id).map(|r| r.clone())
    }

    /// Scan the root for persisted records and rebuild the in-memory maps.
    ///
    /// Records whose volume directory is gone, or that fail to parse, are
    /// skipped with a warning.
    pub async fn recover(&self) -> Result<(), CsiError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(CsiError::BackendError(format!(
                    "read_dir {}: {e}",
                    self.root.display()
                )));
            }
        };

        while let Some(entry) = dir.next_entry().await.map_err(CsiError::backend)? {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !file_name.ends_with(".meta.json") {
                continue;
            }

            let record: VolumeRecord = match tokio::fs::read_to_string(&path)
                .await
                .map_err(CsiError::backend)
                .and_then(|s| serde_json::from_str(&s).map_err(CsiError::backend))
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable volume record, skipping");
                    continue;
                }
            };

            if !self.volume_dir(&record.id).exists() {
                warn!(volume_id = %record.id, "volume directory missing, skipping recovery");
                continue;
            }
            self.names.insert(record.name.clone(), record.id.clone());
            self.volumes.insert(record.id.clone(), record);
        }

        info!(root = %self.root.display(), count = self.volumes.len(), "recovery complete");
        Ok(())
    }

    async fn bind_mount(source: &Path, target: &str, readonly: bool) -> Result<(), String> {
        tokio::fs::create_dir_all(target)
            .await
            .map_err(|e| format!("create {target}: {e}"))?;

        let mut flags = nix::mount::MsFlags::MS_BIND;
        if readonly {
            flags |= nix::mount::MsFlags::MS_RDONLY;
        }
        nix::mount::mount(Some(source), target, None::<&str>, flags, None::<&str>)
            .map_err(|e| format!("bind {} -> {target}: {e}", source.display()))?;

        // MS_RDONLY is ignored on the initial bind; a remount enforces it.
        if readonly {
            nix::mount::mount(
                None::<&str>,
                target,
                None::<&str>,
                nix::mount::MsFlags::MS_BIND
                    | nix::mount::MsFlags::MS_REMOUNT
                    | nix::mount::MsFlags::MS_RDONLY,
                None::<&str>,
            )
            .map_err(|e| format!("remount read-only {target}: {e}"))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[async_trait]
impl proto::controller_server::Controller for VfsBackend {
    #[instrument(skip_all, fields(name = %request.get_ref().name))]
    async fn create_volume(
        &self,
        request: Request<CreateVolumeRequest>,
    ) -> Result<Response<CreateVolumeResponse>, Status> {
        let req = request.into_inner();
        if let Err(e) = check_version(req.version.as_ref()) {
            return Ok(reply_err(e));
        }
        if req.name.is_empty() || req.name.contains('/') {
            return Ok(reply_err(Error::create_volume(
                CreateVolumeErrorCode::InvalidVolumeName,
                format!("invalid volume name {:?}", req.name),
            )));
        }
        if self.names.contains_key(&req.name) {
            return Ok(reply_err(Error::create_volume(
                CreateVolumeErrorCode::VolumeAlreadyExists,
                format!("volume {} already exists", req.name),
            )));
        }

        let record = VolumeRecord {
            id: format!("vfs-{}", uuid::Uuid::new_v4()),
            name: req.name,
            capacity_bytes: req.capacity_range.map(|r| r.required_bytes).unwrap_or(0),
            parameters: req.parameters,
        };
        let dir = self.volume_dir(&record.id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Status::internal(format!("create dir {}: {e}", dir.display())))?;

        // Persist the record before updating in-memory state so a failed
        // write leaves nothing half-registered.
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| Status::internal(e.to_string()))?;
        tokio::fs::write(self.meta_path(&record.id), json)
            .await
            .map_err(|e| Status::internal(format!("write meta {}: {e}", record.id)))?;

        let info = record.info();
        self.names.insert(record.name.clone(), record.id.clone());
        info!(volume_id = %record.id, "volume created");
        self.volumes.insert(record.id.clone(), record);
        Ok(reply_ok(create_volume_response::Result {
            volume_info: Some(info),
        }))
    }

    #[instrument(skip_all)]
    async fn delete_volume(
        &self,
        request: Request<DeleteVolumeRequest>,
    ) -> Result<Response<DeleteVolumeResponse>, Status> {
        let req = request.into_inner();
        if let Err(e) = check_version(req.version.as_ref()) {
            return Ok(reply_err(e));
        }
        let Some(record) = self.lookup(req.volume_id.as_ref()) else {
            return Ok(reply_err(Error::delete_volume(
                DeleteVolumeErrorCode::VolumeDoesNotExist,
                "no such volume",
            )));
        };

        // Remove on-disk data first so a failure leaves the volume intact.
        let dir = self.volume_dir(&record.id);
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| Status::internal(format!("remove dir {}: {e}", dir.display())))?;
        }
        let meta = self.meta_path(&record.id);
        if meta.exists() {
            tokio::fs::remove_file(&meta)
                .await
                .map_err(|e| Status::internal(format!("remove meta {}: {e}", meta.display())))?;
        }

        self.volumes.remove(&record.id);
        self.names.remove(&record.name);
        info!(volume_id = %record.id, "volume deleted");
        Ok(reply_ok(delete_volume_response::Result {}))
    }

    async fn controller_publish_volume(
        &self,
        _request: Request<ControllerPublishVolumeRequest>,
    ) -> Result<Response<ControllerPublishVolumeResponse>, Status> {
        Err(Status::unimplemented(method::CONTROLLER_PUBLISH_VOLUME))
    }

    async fn controller_unpublish_volume(
        &self,
        _request: Request<ControllerUnpublishVolumeRequest>,
    ) -> Result<Response<ControllerUnpublishVolumeResponse>, Status> {
        Err(Status::unimplemented(method::CONTROLLER_UNPUBLISH_VOLUME))
    }

    async fn validate_volume_capabilities(
        &self,
        request: Request<ValidateVolumeCapabilitiesRequest>,
    ) -> Result<Response<ValidateVolumeCapabilitiesResponse>, Status> {
        let req = request.into_inner();
        if let Err(e) = check_version(req.version.as_ref()) {
            return Ok(reply_err(e));
        }
        let id = req.volume_info.as_ref().and_then(|i| i.id.as_ref());
        if self.lookup(id).is_none() {
            return Ok(reply_err(Error::validate(
                ValidateVolumeCapabilitiesErrorCode::VolumeDoesNotExist,
                "no such volume",
            )));
        }
        let block = req.volume_capabilities.iter().any(|c| {
            matches!(
                c.access_type,
                Some(volume_capability::AccessType::Block(_))
            )
        });
        Ok(reply_ok(validate_volume_capabilities_response::Result {
            supported: !block,
            message: if block {
                "block volumes are not supported".to_owned()
            } else {
                String::new()
            },
        }))
    }

    async fn list_volumes(
        &self,
        request: Request<ListVolumesRequest>,
    ) -> Result<Response<ListVolumesResponse>, Status> {
        if let Err(e) = check_version(request.get_ref().version.as_ref()) {
            return Ok(reply_err(e));
        }
        let entries = self
            .volumes
            .iter()
            .map(|entry| list_volumes_response::result::Entry {
                volume_info: Some(entry.value().info()),
            })
            .collect();
        Ok(reply_ok(list_volumes_response::Result {
            entries,
            next_token: String::new(),
        }))
    }

    async fn get_capacity(
        &self,
        request: Request<GetCapacityRequest>,
    ) -> Result<Response<GetCapacityResponse>, Status> {
        if let Err(e) = check_version(request.get_ref().version.as_ref()) {
            return Ok(reply_err(e));
        }
        let stat = nix::sys::statvfs::statvfs(&self.root)
            .map_err(|e| Status::internal(format!("statvfs {}: {e}", self.root.display())))?;
        Ok(reply_ok(get_capacity_response::Result {
            available_capacity: stat.fragment_size() * stat.blocks_available(),
        }))
    }

    async fn controller_get_capabilities(
        &self,
        request: Request<ControllerGetCapabilitiesRequest>,
    ) -> Result<Response<ControllerGetCapabilitiesResponse>, Status> {
        if let Err(e) = check_version(request.get_ref().version.as_ref()) {
            return Ok(reply_err(e));
        }
        Ok(reply_ok(controller_get_capabilities_response::Result {
            capabilities: vec![
                controller_capability(ControllerRpc::CreateDeleteVolume),
                controller_capability(ControllerRpc::ListVolumes),
                controller_capability(ControllerRpc::GetCapacity),
            ],
        }))
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[async_trait]
impl proto::identity_server::Identity for VfsBackend {
    async fn get_supported_versions(
        &self,
        _request: Request<GetSupportedVersionsRequest>,
    ) -> Result<Response<GetSupportedVersionsResponse>, Status> {
        Ok(reply_ok(get_supported_versions_response::Result {
            supported_versions: vec![SUPPORTED_VERSION],
        }))
    }

    async fn get_plugin_info(
        &self,
        request: Request<GetPluginInfoRequest>,
    ) -> Result<Response<GetPluginInfoResponse>, Status> {
        if let Err(e) = check_version(request.get_ref().version.as_ref()) {
            return Ok(reply_err(e));
        }
        Ok(reply_ok(get_plugin_info_response::Result {
            name: "rkvol.vfs".to_owned(),
            vendor_version: env!("CARGO_PKG_VERSION").to_owned(),
            manifest: HashMap::from([(
                "root".to_owned(),
                self.root.to_string_lossy().into_owned(),
            )]),
        }))
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

#[async_trait]
impl proto::node_server::Node for VfsBackend {
    #[instrument(skip_all, fields(target_path = %request.get_ref().target_path))]
    async fn node_publish_volume(
        &self,
        request: Request<NodePublishVolumeRequest>,
    ) -> Result<Response<NodePublishVolumeResponse>, Status> {
        let req = request.into_inner();
        if let Err(e) = check_version(req.version.as_ref()) {
            return Ok(reply_err(e));
        }
        if req.target_path.is_empty() {
            return Ok(reply_err(Error::general(
                GeneralErrorCode::MissingRequiredField,
                "target path is required",
            )));
        }
        let Some(record) = self.lookup(req.volume_id.as_ref()) else {
            return Ok(reply_err(Error::node_publish(
                NodePublishVolumeErrorCode::VolumeDoesNotExist,
                "no such volume",
            )));
        };

        // Without this check a second call would fail with EBUSY.
        if is_mountpoint(&req.target_path).await {
            debug!("target already mounted, assuming idempotent retry");
            return Ok(reply_ok(node_publish_volume_response::Result {}));
        }

        let source = self.volume_dir(&record.id);
        if let Err(reason) = Self::bind_mount(&source, &req.target_path, req.readonly).await {
            return Ok(reply_err(Error::node_publish(
                NodePublishVolumeErrorCode::MountError,
                reason,
            )));
        }
        info!(volume_id = %record.id, readonly = req.readonly, "volume published (bind-mount)");
        Ok(reply_ok(node_publish_volume_response::Result {}))
    }

    #[instrument(skip_all, fields(target_path = %request.get_ref().target_path))]
    async fn node_unpublish_volume(
        &self,
        request: Request<NodeUnpublishVolumeRequest>,
    ) -> Result<Response<NodeUnpublishVolumeResponse>, Status> {
        let req = request.into_inner();
        if let Err(e) = check_version(req.version.as_ref()) {
            return Ok(reply_err(e));
        }
        if !is_mountpoint(&req.target_path).await {
            debug!("target not mounted, nothing to unpublish");
            return Ok(reply_ok(node_unpublish_volume_response::Result {}));
        }
        if let Err(e) = nix::mount::umount(req.target_path.as_str()) {
            return Ok(reply_err(Error::node_unpublish(
                NodeUnpublishVolumeErrorCode::UnmountError,
                format!("umount {}: {e}", req.target_path),
            )));
        }
        info!("volume unpublished");
        Ok(reply_ok(node_unpublish_volume_response::Result {}))
    }

    async fn get_node_id(
        &self,
        _request: Request<GetNodeIdRequest>,
    ) -> Result<Response<GetNodeIdResponse>, Status> {
        Ok(reply_ok(get_node_id_response::Result {
            node_id: Some(NodeId::new(self.node_id.clone())),
        }))
    }

    async fn probe_node(
        &self,
        _request: Request<ProbeNodeRequest>,
    ) -> Result<Response<ProbeNodeResponse>, Status> {
        if let Err(e) = tokio::fs::create_dir_all(self.root.join("volumes")).await {
            return Ok(reply_err(Error {
                value: Some(error::Value::ProbeNodeError(error::ProbeNodeError {
                    error_code: error::probe_node_error::ProbeNodeErrorCode::BadPluginConfig as i32,
                    error_description: format!("root {}: {e}", self.root.display()),
                })),
            }));
        }
        Ok(reply_ok(probe_node_response::Result {}))
    }

    async fn node_get_capabilities(
        &self,
        _request: Request<NodeGetCapabilitiesRequest>,
    ) -> Result<Response<NodeGetCapabilitiesResponse>, Status> {
        Ok(reply_ok(node_get_capabilities_response::Result {
            capabilities: Vec::new(),
        }))
    }
}
