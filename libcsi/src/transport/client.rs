//! Checked CSI client.
//!
//! [`CsiConn`] wraps one tonic [`Channel`] and exposes every CSI RPC with the
//! response checks applied: an embedded application error becomes
//! [`CsiError::Rpc`], and a response with an empty `reply` becomes
//! [`CsiError::MalformedResponse`]. Callers only ever see the RPC's `Result`
//! message on success.

use tonic::IntoRequest;
use tonic::transport::Channel;
use tracing::debug;

use crate::error::CsiError;
use crate::proto::{
    self, controller_client::ControllerClient, identity_client::IdentityClient,
    node_client::NodeClient,
};
use crate::types::{CsiReply, Reply, method};

/// Apply the response checks to a decoded response.
pub fn check_reply<R: CsiReply>(method: &'static str, response: R) -> Result<R::Result, CsiError> {
    match response.into_reply() {
        Some(Reply::Result(result)) => Ok(result),
        Some(Reply::Error(error)) => {
            debug!(method, %error, "csi call returned an error");
            Err(CsiError::Rpc { method, error })
        }
        None => Err(CsiError::MalformedResponse { method }),
    }
}

/// A client connection with response checks installed.
///
/// The connection closes when the value is dropped.
#[derive(Clone)]
pub struct CsiConn {
    channel: Channel,
}

impl CsiConn {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }
}

macro_rules! checked {
    ($($fn:ident: $client:ident, $method:path, $req:ident => $resp:ident;)*) => {
        impl CsiConn {
            $(
                pub async fn $fn(
                    &self,
                    request: impl IntoRequest<proto::$req>,
                ) -> Result<<proto::$resp as CsiReply>::Result, CsiError> {
                    let mut client = $client::new(self.channel.clone());
                    let response = client
                        .$fn(request)
                        .await
                        .map_err(|status| CsiError::Status { method: $method, status })?;
                    check_reply($method, response.into_inner())
                }
            )*
        }
    };
}

checked! {
    create_volume: ControllerClient, method::CREATE_VOLUME,
        CreateVolumeRequest => CreateVolumeResponse;
    delete_volume: ControllerClient, method::DELETE_VOLUME,
        DeleteVolumeRequest => DeleteVolumeResponse;
    controller_publish_volume: ControllerClient, method::CONTROLLER_PUBLISH_VOLUME,
        ControllerPublishVolumeRequest => ControllerPublishVolumeResponse;
    controller_unpublish_volume: ControllerClient, method::CONTROLLER_UNPUBLISH_VOLUME,
        ControllerUnpublishVolumeRequest => ControllerUnpublishVolumeResponse;
    validate_volume_capabilities: ControllerClient, method::VALIDATE_VOLUME_CAPABILITIES,
        ValidateVolumeCapabilitiesRequest => ValidateVolumeCapabilitiesResponse;
    list_volumes: ControllerClient, method::LIST_VOLUMES,
        ListVolumesRequest => ListVolumesResponse;
    get_capacity: ControllerClient, method::GET_CAPACITY,
        GetCapacityRequest => GetCapacityResponse;
    controller_get_capabilities: ControllerClient, method::CONTROLLER_GET_CAPABILITIES,
        ControllerGetCapabilitiesRequest => ControllerGetCapabilitiesResponse;
    get_supported_versions: IdentityClient, method::GET_SUPPORTED_VERSIONS,
        GetSupportedVersionsRequest => GetSupportedVersionsResponse;
    get_plugin_info: IdentityClient, method::GET_PLUGIN_INFO,
        GetPluginInfoRequest => GetPluginInfoResponse;
    node_publish_volume: NodeClient, method::NODE_PUBLISH_VOLUME,
        NodePublishVolumeRequest => NodePublishVolumeResponse;
    node_unpublish_volume: NodeClient, method::NODE_UNPUBLISH_VOLUME,
        NodeUnpublishVolumeRequest => NodeUnpublishVolumeResponse;
    get_node_id: NodeClient, method::GET_NODE_ID,
        GetNodeIdRequest => GetNodeIdResponse;
    probe_node: NodeClient, method::PROBE_NODE,
        ProbeNodeRequest => ProbeNodeResponse;
    node_get_capabilities: NodeClient, method::NODE_GET_CAPABILITIES,
        NodeGetCapabilitiesRequest => NodeGetCapabilitiesResponse;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::error::create_volume_error::CreateVolumeErrorCode;

    #[test]
    fn result_passes_through() {
        let response = proto::GetNodeIdResponse::from_result(proto::get_node_id_response::Result {
            node_id: Some(proto::NodeId::new("node-1")),
        });
        let result = check_reply(method::GET_NODE_ID, response).unwrap();
        assert_eq!(result.node_id, Some(proto::NodeId::new("node-1")));
    }

    #[test]
    fn embedded_error_becomes_rpc_error() {
        let response = proto::CreateVolumeResponse::from_error(proto::Error::create_volume(
            CreateVolumeErrorCode::VolumeAlreadyExists,
            "v1 exists",
        ));
        let err = check_reply(method::CREATE_VOLUME, response).unwrap_err();
        assert!(matches!(err, CsiError::Rpc { method: method::CREATE_VOLUME, .. }));
        assert!(err.is_benign());
    }

    #[test]
    fn empty_reply_is_malformed() {
        let err = check_reply(method::PROBE_NODE, proto::ProbeNodeResponse::default()).unwrap_err();
        assert!(matches!(err, CsiError::MalformedResponse { .. }));
        assert!(!err.is_benign());
    }
}
