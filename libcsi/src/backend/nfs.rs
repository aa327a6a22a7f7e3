//! Node-only NFS backend.
//!
//! NFS exports are provisioned outside of CSI; volumes reach this backend as
//! static identities `{host, export}` and are only ever node-published, by
//! mounting `host:export` on the target path. The controller advertises no
//! capabilities.

use std::collections::HashMap;

use async_trait::async_trait;
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument, warn};

use super::is_mountpoint;
use crate::proto::error::create_volume_error::CreateVolumeErrorCode;
use crate::proto::error::delete_volume_error::DeleteVolumeErrorCode;
use crate::proto::error::general_error::GeneralErrorCode;
use crate::proto::error::node_publish_volume_error::NodePublishVolumeErrorCode;
use crate::proto::error::node_unpublish_volume_error::NodeUnpublishVolumeErrorCode;
use crate::proto::{self, *};
use crate::types::{SUPPORTED_VERSION, check_version, method, mount_fs_type, reply_err, reply_ok};

/// Registry name.
pub const NAME: &str = "nfs";

/// Identity key holding the NFS server.
pub const HOST_KEY: &str = "host";
/// Identity key holding the exported path.
pub const EXPORT_KEY: &str = "export";

/// Parameter naming extra `mount -o` options.
const MOUNT_OPTIONS_PARAM: &str = "mountOptions";

/// Build the identity of a statically mapped NFS volume.
pub fn nfs_volume_id(host: &str, export: &str) -> VolumeId {
    VolumeId::from_pairs([(HOST_KEY, host), (EXPORT_KEY, export)])
}

/// Node-only CSI backend mounting NFS exports.
pub struct NfsBackend {
    node_id: String,
    mount_options: Option<String>,
}

impl NfsBackend {
    pub fn new(node_id: impl Into<String>, params: &HashMap<String, String>) -> Self {
        Self {
            node_id: node_id.into(),
            mount_options: params
                .get(MOUNT_OPTIONS_PARAM)
                .filter(|o| !o.is_empty())
                .cloned(),
        }
    }

    /// `host:export` for an identity, if both keys are present.
    fn source(id: Option<&VolumeId>) -> Option<String> {
        let values = &id?.values;
        let host = values.get(HOST_KEY).filter(|h| !h.is_empty())?;
        let export = values.get(EXPORT_KEY).filter(|e| !e.is_empty())?;
        Some(format!("{host}:{export}"))
    }

    async fn mount(&self, source: &str, target: &str, readonly: bool) -> Result<(), String> {
        tokio::fs::create_dir_all(target)
            .await
            .map_err(|e| format!("create {target}: {e}"))?;

        let mut options: Vec<&str> = Vec::new();
        if readonly {
            options.push("ro");
        }
        if let Some(extra) = &self.mount_options {
            options.push(extra);
        }

        let mut cmd = tokio::process::Command::new("mount");
        cmd.args(["-t", "nfs"]);
        if !options.is_empty() {
            cmd.arg("-o").arg(options.join(","));
        }
        let output = cmd
            .arg(source)
            .arg(target)
            .output()
            .await
            .map_err(|e| format!("spawn mount: {e}"))?;
        if !output.status.success() {
            return Err(format!(
                "mount {source} {target}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[async_trait]
impl proto::controller_server::Controller for NfsBackend {
    async fn create_volume(
        &self,
        _request: Request<CreateVolumeRequest>,
    ) -> Result<Response<CreateVolumeResponse>, Status> {
        Ok(reply_err(Error::create_volume(
            CreateVolumeErrorCode::CallNotImplemented,
            "nfs volumes are statically mapped",
        )))
    }

    async fn delete_volume(
        &self,
        _request: Request<DeleteVolumeRequest>,
    ) -> Result<Response<DeleteVolumeResponse>, Status> {
        Ok(reply_err(Error::delete_volume(
            DeleteVolumeErrorCode::CallNotImplemented,
            "nfs volumes are statically mapped",
        )))
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
        let supported = req
            .volume_capabilities
            .iter()
            .all(|c| matches!(mount_fs_type(Some(c)), None | Some("nfs")));
        Ok(reply_ok(validate_volume_capabilities_response::Result {
            supported,
            message: String::new(),
        }))
    }

    async fn list_volumes(
        &self,
        _request: Request<ListVolumesRequest>,
    ) -> Result<Response<ListVolumesResponse>, Status> {
        Ok(reply_err(Error::general(
            GeneralErrorCode::Undefined,
            "nfs volumes are statically mapped",
        )))
    }

    async fn get_capacity(
        &self,
        _request: Request<GetCapacityRequest>,
    ) -> Result<Response<GetCapacityResponse>, Status> {
        Ok(reply_ok(get_capacity_response::Result {
            available_capacity: 0,
        }))
    }

    async fn controller_get_capabilities(
        &self,
        _request: Request<ControllerGetCapabilitiesRequest>,
    ) -> Result<Response<ControllerGetCapabilitiesResponse>, Status> {
        Ok(reply_ok(controller_get_capabilities_response::Result {
            capabilities: Vec::new(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[async_trait]
impl proto::identity_server::Identity for NfsBackend {
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
        _request: Request<GetPluginInfoRequest>,
    ) -> Result<Response<GetPluginInfoResponse>, Status> {
        Ok(reply_ok(get_plugin_info_response::Result {
            name: "rkvol.nfs".to_owned(),
            vendor_version: env!("CARGO_PKG_VERSION").to_owned(),
            manifest: HashMap::new(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

#[async_trait]
impl proto::node_server::Node for NfsBackend {
    #[instrument(skip_all, fields(target_path = %request.get_ref().target_path))]
    async fn node_publish_volume(
        &self,
        request: Request<NodePublishVolumeRequest>,
    ) -> Result<Response<NodePublishVolumeResponse>, Status> {
        let req = request.into_inner();
        if let Err(e) = check_version(req.version.as_ref()) {
            return Ok(reply_err(e));
        }
        let Some(source) = Self::source(req.volume_id.as_ref()) else {
            return Ok(reply_err(Error::node_publish(
                NodePublishVolumeErrorCode::InvalidVolumeId,
                "volume id must carry host and export",
            )));
        };
        if let Some(fs_type) = mount_fs_type(req.volume_capability.as_ref()) {
            if fs_type != "nfs" {
                return Ok(reply_err(Error::node_publish(
                    NodePublishVolumeErrorCode::UnsupportedFsType,
                    format!("unsupported fs type {fs_type}"),
                )));
            }
        }
        if is_mountpoint(&req.target_path).await {
            debug!("target already mounted, assuming idempotent retry");
            return Ok(reply_ok(node_publish_volume_response::Result {}));
        }
        if let Err(reason) = self.mount(&source, &req.target_path, req.readonly).await {
            warn!(%source, %reason, "nfs mount failed");
            return Ok(reply_err(Error::node_publish(
                NodePublishVolumeErrorCode::MountError,
                reason,
            )));
        }
        info!(%source, "nfs export mounted");
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
            return Ok(reply_err(Error::node_unpublish(
                NodeUnpublishVolumeErrorCode::VolumeDoesNotExist,
                "target is not mounted",
            )));
        }
        if let Err(e) = nix::mount::umount(req.target_path.as_str()) {
            return Ok(reply_err(Error::node_unpublish(
                NodeUnpublishVolumeErrorCode::UnmountError,
                format!("umount {}: {e}", req.target_path),
            )));
        }
        info!("nfs export unmounted");
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
