//! CSI service facade.
//!
//! [`CsiService`] hosts one backend, serves it on an in-process [`Pipe`]
//! (or an external listener), and is itself a full CSI implementation whose
//! every RPC forwards over that pipe. That lets the agent expose the hosted
//! backend on its public gRPC listener while the Docker bridge reaches the
//! same backend without a socket.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::server::Connected;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use crate::backend::{CsiPlugin, PluginConfig, Registry};
use crate::error::CsiError;
use crate::proto::{
    self, controller_client::ControllerClient, identity_client::IdentityClient,
    node_client::NodeClient,
};
use crate::transport::client::CsiConn;
use crate::transport::pipe::Pipe;
use crate::transport::server::serve_routes;

/// Request headers owned by the transport; never copied onto the forwarded
/// call.
const TRANSPORT_HEADERS: &[&str] = &[
    "content-type",
    "content-length",
    "te",
    "user-agent",
    "grpc-encoding",
    "grpc-accept-encoding",
];

/// Hosts a CSI backend and forwards CSI calls to it.
pub struct CsiService {
    name: String,
    plugin: Arc<dyn CsiPlugin>,
    pipe: Pipe,
    shutdown: CancellationToken,
    serve_task: Mutex<Option<JoinHandle<Result<(), CsiError>>>>,
}

impl CsiService {
    /// Construct the backend registered as `name`.
    pub async fn new(name: &str, registry: &Registry, config: PluginConfig) -> Result<Self, CsiError> {
        let plugin = registry.build(name, config).await?;
        info!(driver = name, "csi backend constructed");
        Ok(Self::with_plugin(name, plugin))
    }

    /// Wrap an already constructed backend.
    pub fn with_plugin(name: impl Into<String>, plugin: Arc<dyn CsiPlugin>) -> Self {
        Self {
            name: name.into(),
            plugin,
            pipe: Pipe::new(),
            shutdown: CancellationToken::new(),
            serve_task: Mutex::new(None),
        }
    }

    /// Registry name of the hosted backend.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start serving the backend on the in-process pipe.
    pub fn serve(&self) -> Result<(), CsiError> {
        self.serve_with_incoming(self.pipe.clone().incoming())
    }

    /// Start serving the backend on an external listener instead of the pipe.
    ///
    /// [`Self::dial`] only reaches the backend when it is served on the pipe.
    pub fn serve_with_incoming<I, IO>(&self, incoming: I) -> Result<(), CsiError>
    where
        I: Stream<Item = Result<IO, io::Error>> + Send + 'static,
        IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
        IO::ConnectInfo: Clone + Send + Sync + 'static,
    {
        let mut task = self.serve_task.lock();
        if task.is_some() {
            return Err(CsiError::Internal(format!("csi backend {} is already serving", self.name)));
        }
        let routes = Arc::clone(&self.plugin).routes();
        let shutdown = self.shutdown.clone();
        *task = Some(tokio::spawn(serve_routes("backend", routes, incoming, shutdown)));
        debug!(driver = %self.name, "csi backend serving");
        Ok(())
    }

    /// Stop immediately: in-flight calls are dropped.
    pub fn stop(&self) {
        self.shutdown.cancel();
        self.pipe.close();
        if let Some(task) = self.serve_task.lock().take() {
            task.abort();
        }
        info!(driver = %self.name, "csi backend stopped");
    }

    /// Stop accepting calls and wait for in-flight ones to finish.
    pub async fn graceful_stop(&self) {
        self.shutdown.cancel();
        self.pipe.close();
        let task = self.serve_task.lock().take();
        if let Some(task) = task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(driver = %self.name, error = %e, "csi backend exited with error"),
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(driver = %self.name, error = %e, "csi backend task failed"),
            }
        }
        info!(driver = %self.name, "csi backend stopped gracefully");
    }

    /// Open a fresh checked client connection to the backend.
    pub async fn dial(&self) -> Result<CsiConn, CsiError> {
        self.pipe.channel().await.map(CsiConn::new)
    }

    /// The in-process pipe the backend is served on.
    pub fn pipe(&self) -> &Pipe {
        &self.pipe
    }
}

/// Copy the inbound request's metadata onto an outbound request.
fn outbound<T>(request: Request<T>) -> Request<T> {
    let (mut metadata, _, message) = request.into_parts();
    for header in TRANSPORT_HEADERS {
        metadata.remove(*header);
    }
    Request::from_parts(metadata, tonic::Extensions::default(), message)
}

/// Dial, forward one call with the caller's metadata, and hang up.
macro_rules! forward {
    ($self:ident, $client:ident, $fn:ident, $request:ident) => {{
        let channel = $self.pipe.channel().await.map_err(Status::from)?;
        let response = $client::new(channel).$fn(outbound($request)).await?;
        Ok(Response::new(response.into_inner()))
    }};
}

#[async_trait]
impl proto::controller_server::Controller for CsiService {
    async fn create_volume(
        &self,
        request: Request<proto::CreateVolumeRequest>,
    ) -> Result<Response<proto::CreateVolumeResponse>, Status> {
        forward!(self, ControllerClient, create_volume, request)
    }

    async fn delete_volume(
        &self,
        request: Request<proto::DeleteVolumeRequest>,
    ) -> Result<Response<proto::DeleteVolumeResponse>, Status> {
        forward!(self, ControllerClient, delete_volume, request)
    }

    async fn controller_publish_volume(
        &self,
        request: Request<proto::ControllerPublishVolumeRequest>,
    ) -> Result<Response<proto::ControllerPublishVolumeResponse>, Status> {
        forward!(self, ControllerClient, controller_publish_volume, request)
    }

    async fn controller_unpublish_volume(
        &self,
        request: Request<proto::ControllerUnpublishVolumeRequest>,
    ) -> Result<Response<proto::ControllerUnpublishVolumeResponse>, Status> {
        forward!(self, ControllerClient, controller_unpublish_volume, request)
    }

    async fn validate_volume_capabilities(
        &self,
        request: Request<proto::ValidateVolumeCapabilitiesRequest>,
    ) -> Result<Response<proto::ValidateVolumeCapabilitiesResponse>, Status> {
        forward!(self, ControllerClient, validate_volume_capabilities, request)
    }

    async fn list_volumes(
        &self,
        request: Request<proto::ListVolumesRequest>,
    ) -> Result<Response<proto::ListVolumesResponse>, Status> {
        forward!(self, ControllerClient, list_volumes, request)
    }

    async fn get_capacity(
        &self,
        request: Request<proto::GetCapacityRequest>,
    ) -> Result<Response<proto::GetCapacityResponse>, Status> {
        forward!(self, ControllerClient, get_capacity, request)
    }

    async fn controller_get_capabilities(
        &self,
        request: Request<proto::ControllerGetCapabilitiesRequest>,
    ) -> Result<Response<proto::ControllerGetCapabilitiesResponse>, Status> {
        forward!(self, ControllerClient, controller_get_capabilities, request)
    }
}

#[async_trait]
impl proto::identity_server::Identity for CsiService {
    async fn get_supported_versions(
        &self,
        request: Request<proto::GetSupportedVersionsRequest>,
    ) -> Result<Response<proto::GetSupportedVersionsResponse>, Status> {
        forward!(self, IdentityClient, get_supported_versions, request)
    }

    async fn get_plugin_info(
        &self,
        request: Request<proto::GetPluginInfoRequest>,
    ) -> Result<Response<proto::GetPluginInfoResponse>, Status> {
        forward!(self, IdentityClient, get_plugin_info, request)
    }
}

#[async_trait]
impl proto::node_server::Node for CsiService {
    async fn node_publish_volume(
        &self,
        request: Request<proto::NodePublishVolumeRequest>,
    ) -> Result<Response<proto::NodePublishVolumeResponse>, Status> {
        forward!(self, NodeClient, node_publish_volume, request)
    }

    async fn node_unpublish_volume(
        &self,
        request: Request<proto::NodeUnpublishVolumeRequest>,
    ) -> Result<Response<proto::NodeUnpublishVolumeResponse>, Status> {
        forward!(self, NodeClient, node_unpublish_volume, request)
    }

    async fn get_node_id(
        &self,
        request: Request<proto::GetNodeIdRequest>,
    ) -> Result<Response<proto::GetNodeIdResponse>, Status> {
        forward!(self, NodeClient, get_node_id, request)
    }

    async fn probe_node(
        &self,
        request: Request<proto::ProbeNodeRequest>,
    ) -> Result<Response<proto::ProbeNodeResponse>, Status> {
        forward!(self, NodeClient, probe_node, request)
    }

    async fn node_get_capabilities(
        &self,
        request: Request<proto::NodeGetCapabilitiesRequest>,
    ) -> Result<Response<proto::NodeGetCapabilitiesResponse>, Status> {
        forward!(self, NodeClient, node_get_capabilities, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_strips_transport_headers() {
        let mut request = Request::new(());
        request.metadata_mut().insert("x-request-id", "42".parse().unwrap());
        request
            .metadata_mut()
            .insert("content-type", "application/grpc".parse().unwrap());
        request.metadata_mut().insert("te", "trailers".parse().unwrap());

        let request = outbound(request);
        assert_eq!(request.metadata().get("x-request-id").unwrap(), "42");
        assert!(request.metadata().get("content-type").is_none());
        assert!(request.metadata().get("te").is_none());
    }
}
