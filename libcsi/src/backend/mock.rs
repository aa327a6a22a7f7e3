//! In-memory CSI backend.
//!
//! [`MockBackend`] keeps volumes in memory and never touches a real device:
//! node publication only creates the target directory. It records every RPC
//! it serves so that callers can assert on the exact CSI traffic a
//! higher-level operation produced, and its controller capabilities can be
//! narrowed to exercise node-only or list-less code paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tonic::{Request, Response, Status};
use tracing::{debug, instrument};

use crate::proto::error::controller_publish_volume_error::ControllerPublishVolumeErrorCode;
use crate::proto::error::controller_unpublish_volume_error::ControllerUnpublishVolumeErrorCode;
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
pub const NAME: &str = "mock";

/// Capacity reported by `GetCapacity`.
pub const MOCK_CAPACITY: u64 = 100 * 1024 * 1024 * 1024;

/// Key of the single [`VolumeId`] entry issued by this backend.
const ID_KEY: &str = "id";

#[derive(Debug, Clone)]
struct MockVolume {
    name: String,
    info: VolumeInfo,
}

/// Concrete CSI backend keeping all state in memory.
pub struct MockBackend {
    node_id: String,
    publish_capable: AtomicBool,
    list_capable: AtomicBool,
    /// Node-publish identities the controller never allocated.
    static_volumes: AtomicBool,
    /// Fail the next NodeUnpublishVolume with UNMOUNT_ERROR.
    fail_unpublish: AtomicBool,
    /// Volumes keyed by the `id` value of their identity.
    volumes: DashMap<String, MockVolume>,
    /// Controller publications: volume id -> node.
    controller_published: DashMap<String, NodeId>,
    /// Node publications: target path -> volume id.
    node_published: DashMap<String, String>,
    calls: Mutex<Vec<&'static str>>,
    last_metadata: Mutex<http::HeaderMap>,
}

impl MockBackend {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            publish_capable: AtomicBool::new(true),
            list_capable: AtomicBool::new(true),
            static_volumes: AtomicBool::new(false),
            fail_unpublish: AtomicBool::new(false),
            volumes: DashMap::new(),
            controller_published: DashMap::new(),
            node_published: DashMap::new(),
            calls: Mutex::new(Vec::new()),
            last_metadata: Mutex::new(http::HeaderMap::new()),
        }
    }

    /// Advertise (or stop advertising) PUBLISH_UNPUBLISH_VOLUME.
    pub fn set_publish_capable(&self, capable: bool) {
        self.publish_capable.store(capable, Ordering::SeqCst);
    }

    /// Advertise (or stop advertising) LIST_VOLUMES.
    pub fn set_list_capable(&self, capable: bool) {
        self.list_capable.store(capable, Ordering::SeqCst);
    }

    /// Accept any non-empty identity in NodePublishVolume, the way a
    /// node-only backend serves statically provisioned volumes.
    pub fn set_static_volumes(&self, enabled: bool) {
        self.static_volumes.store(enabled, Ordering::SeqCst);
    }

    /// Make the next NodeUnpublishVolume fail with UNMOUNT_ERROR.
    pub fn fail_next_unpublish(&self) {
        self.fail_unpublish.store(true, Ordering::SeqCst);
    }

    /// Create a volume directly, bypassing the RPC surface.
    pub fn insert_volume(&self, name: &str, capacity_bytes: u64) -> VolumeId {
        self.allocate(name, capacity_bytes, HashMap::new())
            .id
            .unwrap_or_default()
    }

    /// Every RPC served so far, by full method name, in arrival order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    /// How many times `method` has been served.
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|m| **m == method).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Request metadata of the most recent call.
    pub fn last_metadata(&self) -> http::HeaderMap {
        self.last_metadata.lock().clone()
    }

    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_controller_published(&self, id: &VolumeId) -> bool {
        id.values
            .get(ID_KEY)
            .is_some_and(|id| self.controller_published.contains_key(id))
    }

    pub fn is_node_published(&self, target_path: &str) -> bool {
        self.node_published.contains_key(target_path)
    }

    fn record<T>(&self, method: &'static str, request: &Request<T>) {
        debug!(method, "mock csi call");
        self.calls.lock().push(method);
        *self.last_metadata.lock() = request.metadata().clone().into_headers();
    }

    fn allocate(
        &self,
        name: &str,
        capacity_bytes: u64,
        parameters: HashMap<String, String>,
    ) -> VolumeInfo {
        let id = format!("mock-{}", uuid::Uuid::new_v4());
        let volume_id = VolumeId::from_pairs([(ID_KEY, id.as_str())]);
        let mut metadata = parameters;
        metadata.insert(NAME_KEY.to_owned(), name.to_owned());
        let info = VolumeInfo {
            capacity_bytes,
            id: Some(volume_id.clone()),
            metadata: Some(VolumeMetadata { values: metadata }),
        };
        self.volumes.insert(
            id,
            MockVolume {
                name: name.to_owned(),
                info: info.clone(),
            },
        );
        info
    }

    fn lookup(&self, id: Option<&VolumeId>) -> Option<String> {
        let id = id?.values.get(ID_KEY)?;
        self.volumes.contains_key(id).then(|| id.clone())
    }

    /// Identity to record for a node publication.
    fn node_lookup(&self, id: Option<&VolumeId>) -> Option<String> {
        self.lookup(id).or_else(|| {
            let id = id.filter(|id| !id.values.is_empty())?;
            self.static_volumes
                .load(Ordering::SeqCst)
                .then(|| id.to_string())
        })
    }

    fn find_by_name(&self, name: &str) -> Option<String> {
        self.volumes
            .iter()
            .find(|entry| entry.value().name == name)
            .map(|entry| entry.key().clone())
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[async_trait]
impl proto::controller_server::Controller for MockBackend {
    #[instrument(skip_all, fields(name = %request.get_ref().name))]
    async fn create_volume(
        &self,
        request: Request<CreateVolumeRequest>,
    ) -> Result<Response<CreateVolumeResponse>, Status> {
        self.record(method::CREATE_VOLUME, &request);
        let req = request.into_inner();
        if let Err(e) = check_version(req.version.as_ref()) {
            return Ok(reply_err(e));
        }
        if req.name.is_empty() {
            return Ok(reply_err(Error::create_volume(
                CreateVolumeErrorCode::InvalidVolumeName,
                "volume name is required",
            )));
        }
        if self.find_by_name(&req.name).is_some() {
            return Ok(reply_err(Error::create_volume(
                CreateVolumeErrorCode::VolumeAlreadyExists,
                format!("volume {} already exists", req.name),
            )));
        }

        let capacity = req.capacity_range.map(|r| r.required_bytes).unwrap_or(0);
        let info = self.allocate(&req.name, capacity, req.parameters);
        Ok(reply_ok(create_volume_response::Result {
            volume_info: Some(info),
        }))
    }

    async fn delete_volume(
        &self,
        request: Request<DeleteVolumeRequest>,
    ) -> Result<Response<DeleteVolumeResponse>, Status> {
        self.record(method::DELETE_VOLUME, &request);
        let req = request.into_inner();
        if let Err(e) = check_version(req.version.as_ref()) {
            return Ok(reply_err(e));
        }
        let Some(id) = self.lookup(req.volume_id.as_ref()) else {
            return Ok(reply_err(Error::delete_volume(
                DeleteVolumeErrorCode::VolumeDoesNotExist,
                "no such volume",
            )));
        };
        self.volumes.remove(&id);
        self.controller_published.remove(&id);
        Ok(reply_ok(delete_volume_response::Result {}))
    }

    async fn controller_publish_volume(
        &self,
        request: Request<ControllerPublishVolumeRequest>,
    ) -> Result<Response<ControllerPublishVolumeResponse>, Status> {
        self.record(method::CONTROLLER_PUBLISH_VOLUME, &request);
        let req = request.into_inner();
        if let Err(e) = check_version(req.version.as_ref()) {
            return Ok(reply_err(e));
        }
        if !self.publish_capable.load(Ordering::SeqCst) {
            return Ok(reply_err(Error::controller_publish(
                ControllerPublishVolumeErrorCode::CallNotImplemented,
                "controller publish is disabled",
            )));
        }
        let Some(id) = self.lookup(req.volume_id.as_ref()) else {
            return Ok(reply_err(Error::controller_publish(
                ControllerPublishVolumeErrorCode::VolumeDoesNotExist,
                "no such volume",
            )));
        };
        let Some(node_id) = req.node_id else {
            return Ok(reply_err(Error::controller_publish(
                ControllerPublishVolumeErrorCode::InvalidNodeId,
                "node id is required",
            )));
        };
        self.controller_published.insert(id.clone(), node_id);
        Ok(reply_ok(controller_publish_volume_response::Result {
            publish_volume_info: Some(PublishVolumeInfo {
                values: HashMap::from([("device".to_owned(), format!("/dev/mock/{id}"))]),
            }),
        }))
    }

    async fn controller_unpublish_volume(
        &self,
        request: Request<ControllerUnpublishVolumeRequest>,
    ) -> Result<Response<ControllerUnpublishVolumeResponse>, Status> {
        self.record(method::CONTROLLER_UNPUBLISH_VOLUME, &request);
        let req = request.into_inner();
        if let Err(e) = check_version(req.version.as_ref()) {
            return Ok(reply_err(e));
        }
        let id = self.lookup(req.volume_id.as_ref());
        match id.and_then(|id| self.controller_published.remove(&id)) {
            Some(_) => Ok(reply_ok(controller_unpublish_volume_response::Result {})),
            None => Ok(reply_err(Error::controller_unpublish(
                ControllerUnpublishVolumeErrorCode::VolumeDoesNotExist,
                "volume is not published",
            ))),
        }
    }

    async fn validate_volume_capabilities(
        &self,
        request: Request<ValidateVolumeCapabilitiesRequest>,
    ) -> Result<Response<ValidateVolumeCapabilitiesResponse>, Status> {
        self.record(method::VALIDATE_VOLUME_CAPABILITIES, &request);
        let req = request.into_inner();
        if let Err(e) = check_version(req.version.as_ref()) {
            return Ok(reply_err(e));
        }
        let id = req.volume_info.as_ref().and_then(|info| info.id.as_ref());
        if self.lookup(id).is_none() {
            return Ok(reply_err(Error::validate(
                ValidateVolumeCapabilitiesErrorCode::VolumeDoesNotExist,
                "no such volume",
            )));
        }
        Ok(reply_ok(validate_volume_capabilities_response::Result {
            supported: true,
            message: String::new(),
        }))
    }

    async fn list_volumes(
        &self,
        request: Request<ListVolumesRequest>,
    ) -> Result<Response<ListVolumesResponse>, Status> {
        self.record(method::LIST_VOLUMES, &request);
        let req = request.into_inner();
        if let Err(e) = check_version(req.version.as_ref()) {
            return Ok(reply_err(e));
        }
        if !self.list_capable.load(Ordering::SeqCst) {
            return Ok(reply_err(Error::general(
                GeneralErrorCode::Undefined,
                "list volumes is disabled",
            )));
        }

        let mut all: Vec<(String, VolumeInfo)> = self
            .volumes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().info.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));

        let start = if req.starting_token.is_empty() {
            0
        } else {
            match req.starting_token.parse::<usize>() {
                Ok(start) if start <= all.len() => start,
                _ => {
                    return Ok(reply_err(Error::general(
                        GeneralErrorCode::Undefined,
                        format!("invalid starting token {:?}", req.starting_token),
                    )));
                }
            }
        };
        let end = match req.max_entries {
            0 => all.len(),
            max => all.len().min(start + max as usize),
        };
        let next_token = if end < all.len() {
            end.to_string()
        } else {
            String::new()
        };
        let entries = all[start..end]
            .iter()
            .map(|(_, info)| list_volumes_response::result::Entry {
                volume_info: Some(info.clone()),
            })
            .collect();
        Ok(reply_ok(list_volumes_response::Result {
            entries,
            next_token,
        }))
    }

    async fn get_capacity(
        &self,
        request: Request<GetCapacityRequest>,
    ) -> Result<Response<GetCapacityResponse>, Status> {
        self.record(method::GET_CAPACITY, &request);
        if let Err(e) = check_version(request.get_ref().version.as_ref()) {
            return Ok(reply_err(e));
        }
        Ok(reply_ok(get_capacity_response::Result {
            available_capacity: MOCK_CAPACITY,
        }))
    }

    async fn controller_get_capabilities(
        &self,
        request: Request<ControllerGetCapabilitiesRequest>,
    ) -> Result<Response<ControllerGetCapabilitiesResponse>, Status> {
        self.record(method::CONTROLLER_GET_CAPABILITIES, &request);
        if let Err(e) = check_version(request.get_ref().version.as_ref()) {
            return Ok(reply_err(e));
        }
        let mut capabilities = vec![
            controller_capability(ControllerRpc::CreateDeleteVolume),
            controller_capability(ControllerRpc::GetCapacity),
        ];
        if self.publish_capable.load(Ordering::SeqCst) {
            capabilities.push(controller_capability(ControllerRpc::PublishUnpublishVolume));
        }
        if self.list_capable.load(Ordering::SeqCst) {
            capabilities.push(controller_capability(ControllerRpc::ListVolumes));
        }
        Ok(reply_ok(controller_get_capabilities_response::Result { capabilities }))
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[async_trait]
impl proto::identity_server::Identity for MockBackend {
    async fn get_supported_versions(
        &self,
        request: Request<GetSupportedVersionsRequest>,
    ) -> Result<Response<GetSupportedVersionsResponse>, Status> {
        self.record(method::GET_SUPPORTED_VERSIONS, &request);
        Ok(reply_ok(get_supported_versions_response::Result {
            supported_versions: vec![SUPPORTED_VERSION],
        }))
    }

    async fn get_plugin_info(
        &self,
        request: Request<GetPluginInfoRequest>,
    ) -> Result<Response<GetPluginInfoResponse>, Status> {
        self.record(method::GET_PLUGIN_INFO, &request);
        if let Err(e) = check_version(request.get_ref().version.as_ref()) {
            return Ok(reply_err(e));
        }
        Ok(reply_ok(get_plugin_info_response::Result {
            name: "rkvol.mock".to_owned(),
            vendor_version: env!("CARGO_PKG_VERSION").to_owned(),
            manifest: HashMap::new(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

#[async_trait]
impl proto::node_server::Node for MockBackend {
    #[instrument(skip_all, fields(target_path = %request.get_ref().target_path))]
    async fn node_publish_volume(
        &self,
        request: Request<NodePublishVolumeRequest>,
    ) -> Result<Response<NodePublishVolumeResponse>, Status> {
        self.record(method::NODE_PUBLISH_VOLUME, &request);
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
        let Some(id) = self.node_lookup(req.volume_id.as_ref()) else {
            return Ok(reply_err(Error::node_publish(
                NodePublishVolumeErrorCode::VolumeDoesNotExist,
                "no such volume",
            )));
        };
        if let Err(e) = tokio::fs::create_dir_all(&req.target_path).await {
            return Ok(reply_err(Error::node_publish(
                NodePublishVolumeErrorCode::MountError,
                format!("create {}: {e}", req.target_path),
            )));
        }
        self.node_published.insert(req.target_path, id);
        Ok(reply_ok(node_publish_volume_response::Result {}))
    }

    #[instrument(skip_all, fields(target_path = %request.get_ref().target_path))]
    async fn node_unpublish_volume(
        &self,
        request: Request<NodeUnpublishVolumeRequest>,
    ) -> Result<Response<NodeUnpublishVolumeResponse>, Status> {
        self.record(method::NODE_UNPUBLISH_VOLUME, &request);
        let req = request.into_inner();
        if let Err(e) = check_version(req.version.as_ref()) {
            return Ok(reply_err(e));
        }
        if self.fail_unpublish.swap(false, Ordering::SeqCst) {
            return Ok(reply_err(Error::node_unpublish(
                NodeUnpublishVolumeErrorCode::UnmountError,
                "device is busy",
            )));
        }
        match self.node_published.remove(&req.target_path) {
            Some(_) => Ok(reply_ok(node_unpublish_volume_response::Result {})),
            None => Ok(reply_err(Error::node_unpublish(
                NodeUnpublishVolumeErrorCode::VolumeDoesNotExist,
                "volume is not published at the target path",
            ))),
        }
    }

    async fn get_node_id(
        &self,
        request: Request<GetNodeIdRequest>,
    ) -> Result<Response<GetNodeIdResponse>, Status> {
        self.record(method::GET_NODE_ID, &request);
        if let Err(e) = check_version(request.get_ref().version.as_ref()) {
            return Ok(reply_err(e));
        }
        Ok(reply_ok(get_node_id_response::Result {
            node_id: Some(NodeId::new(self.node_id.clone())),
        }))
    }

    async fn probe_node(
        &self,
        request: Request<ProbeNodeRequest>,
    ) -> Result<Response<ProbeNodeResponse>, Status> {
        self.record(method::PROBE_NODE, &request);
        Ok(reply_ok(probe_node_response::Result {}))
    }

    async fn node_get_capabilities(
        &self,
        request: Request<NodeGetCapabilitiesRequest>,
    ) -> Result<Response<NodeGetCapabilitiesResponse>, Status> {
        self.record(method::NODE_GET_CAPABILITIES, &request);
        Ok(reply_ok(node_get_capabilities_response::Result {
            capabilities: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::controller_server::Controller;
    use crate::proto::node_server::Node;
    use crate::types::{CsiReply, Reply};

    fn create(name: &str) -> Request<CreateVolumeRequest> {
        Request::new(CreateVolumeRequest {
            version: Some(SUPPORTED_VERSION),
            name: name.to_owned(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn create_twice_reports_already_exists() {
        let backend = MockBackend::new("node-1");
        let first = backend.create_volume(create("v1")).await.unwrap().into_inner();
        assert!(matches!(first.into_reply(), Some(Reply::Result(_))));

        let second = backend.create_volume(create("v1")).await.unwrap().into_inner();
        match second.into_reply() {
            Some(Reply::Error(e)) => {
                assert_eq!(e.parts().1, CreateVolumeErrorCode::VolumeAlreadyExists as i32)
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert_eq!(backend.volume_count(), 1);
        assert_eq!(backend.call_count(method::CREATE_VOLUME), 2);
    }

    #[tokio::test]
    async fn missing_version_is_rejected() {
        let backend = MockBackend::new("node-1");
        let resp = backend
            .create_volume(Request::new(CreateVolumeRequest {
                name: "v1".into(),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(matches!(resp.into_reply(), Some(Reply::Error(_))));
        assert_eq!(backend.volume_count(), 0);
    }

    #[tokio::test]
    async fn capabilities_follow_toggles() {
        let backend = MockBackend::new("node-1");
        backend.set_publish_capable(false);
        backend.set_list_capable(false);
        let req = Request::new(ControllerGetCapabilitiesRequest {
            version: Some(SUPPORTED_VERSION),
        });
        let resp = backend.controller_get_capabilities(req).await.unwrap().into_inner();
        let Some(Reply::Result(result)) = resp.into_reply() else {
            panic!("expected a result");
        };
        assert!(!crate::types::has_capability(
            &result.capabilities,
            ControllerRpc::PublishUnpublishVolume
        ));
        assert!(!crate::types::has_capability(&result.capabilities, ControllerRpc::ListVolumes));
    }

    #[tokio::test]
    async fn list_pages_through_volumes() {
        let backend = MockBackend::new("node-1");
        for name in ["a", "b", "c"] {
            backend.insert_volume(name, 0);
        }
        let mut token = String::new();
        let mut seen = 0;
        loop {
            let req = Request::new(ListVolumesRequest {
                version: Some(SUPPORTED_VERSION),
                max_entries: 2,
                starting_token: token.clone(),
            });
            let resp = backend.list_volumes(req).await.unwrap().into_inner();
            let Some(Reply::Result(result)) = resp.into_reply() else {
                panic!("expected a result");
            };
            seen += result.entries.len();
            if result.next_token.is_empty() {
                break;
            }
            token = result.next_token;
        }
        assert_eq!(seen, 3);
    }

    #[tokio::test]
    async fn node_unpublish_unknown_target() {
        let backend = MockBackend::new("node-1");
        let req = Request::new(NodeUnpublishVolumeRequest {
            version: Some(SUPPORTED_VERSION),
            target_path: "/nowhere".into(),
            ..Default::default()
        });
        let resp = backend.node_unpublish_volume(req).await.unwrap().into_inner();
        match resp.into_reply() {
            Some(Reply::Error(e)) => assert_eq!(
                e.parts().1,
                NodeUnpublishVolumeErrorCode::VolumeDoesNotExist as i32
            ),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    fn node_publish(id: VolumeId, target: &str) -> Request<NodePublishVolumeRequest> {
        Request::new(NodePublishVolumeRequest {
            version: Some(SUPPORTED_VERSION),
            volume_id: Some(id),
            target_path: target.to_owned(),
            ..Default::default()
        })
    }

    fn node_unpublish(target: &str) -> Request<NodeUnpublishVolumeRequest> {
        Request::new(NodeUnpublishVolumeRequest {
            version: Some(SUPPORTED_VERSION),
            target_path: target.to_owned(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn static_identities_publish_only_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("t").to_string_lossy().into_owned();
        let id = VolumeId::from_pairs([("host", "nas"), ("export", "/m")]);
        let backend = MockBackend::new("node-1");

        let resp = backend
            .node_publish_volume(node_publish(id.clone(), &target))
            .await
            .unwrap()
            .into_inner();
        assert!(matches!(resp.into_reply(), Some(Reply::Error(_))));

        backend.set_static_volumes(true);
        let resp = backend
            .node_publish_volume(node_publish(id, &target))
            .await
            .unwrap()
            .into_inner();
        assert!(matches!(resp.into_reply(), Some(Reply::Result(_))));
        assert!(backend.is_node_published(&target));

        let resp = backend
            .node_unpublish_volume(node_unpublish(&target))
            .await
            .unwrap()
            .into_inner();
        assert!(matches!(resp.into_reply(), Some(Reply::Result(_))));
        assert!(!backend.is_node_published(&target));
    }

    #[tokio::test]
    async fn injected_unpublish_failure_fires_once() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("t").to_string_lossy().into_owned();
        let backend = MockBackend::new("node-1");
        let id = backend.insert_volume("v1", 1);
        backend
            .node_publish_volume(node_publish(id, &target))
            .await
            .unwrap();

        backend.fail_next_unpublish();
        let resp = backend
            .node_unpublish_volume(node_unpublish(&target))
            .await
            .unwrap()
            .into_inner();
        match resp.into_reply() {
            Some(Reply::Error(e)) => assert_eq!(
                e.parts().1,
                NodeUnpublishVolumeErrorCode::UnmountError as i32
            ),
            other => panic!("unexpected reply: {other:?}"),
        }
        assert!(backend.is_node_published(&target));

        let resp = backend
            .node_unpublish_volume(node_unpublish(&target))
            .await
            .unwrap()
            .into_inner();
        assert!(matches!(resp.into_reply(), Some(Reply::Result(_))));
    }
}
