//! Helpers over the CSI wire types: method names, reply plumbing, capability
//! builders, and the reserved metadata keys.
//!
//! The wire messages themselves live in [`crate::proto`]; this module holds the
//! hand-written glue that the facade, the checked client, the backends, and
//! the Docker bridge share.

use std::collections::HashMap;
use std::fmt;

use crate::proto::{
    self, ControllerServiceCapability, Error, NodeId, Version, VolumeCapability, VolumeId,
    VolumeMetadata, controller_service_capability, error, volume_capability,
};

/// The only protocol version spoken by this crate.
pub const SUPPORTED_VERSION: Version = Version {
    major: 0,
    minor: 0,
    patch: 0,
};

/// Reserved [`VolumeMetadata`] key holding the human-readable volume name.
pub const NAME_KEY: &str = "name";

/// Full gRPC method names, used as keys for error classification and logs.
pub mod method {
    pub const CREATE_VOLUME: &str = "/csi.Controller/CreateVolume";
    pub const DELETE_VOLUME: &str = "/csi.Controller/DeleteVolume";
    pub const CONTROLLER_PUBLISH_VOLUME: &str = "/csi.Controller/ControllerPublishVolume";
    pub const CONTROLLER_UNPUBLISH_VOLUME: &str = "/csi.Controller/ControllerUnpublishVolume";
    pub const VALIDATE_VOLUME_CAPABILITIES: &str = "/csi.Controller/ValidateVolumeCapabilities";
    pub const LIST_VOLUMES: &str = "/csi.Controller/ListVolumes";
    pub const GET_CAPACITY: &str = "/csi.Controller/GetCapacity";
    pub const CONTROLLER_GET_CAPABILITIES: &str = "/csi.Controller/ControllerGetCapabilities";
    pub const GET_SUPPORTED_VERSIONS: &str = "/csi.Identity/GetSupportedVersions";
    pub const GET_PLUGIN_INFO: &str = "/csi.Identity/GetPluginInfo";
    pub const NODE_PUBLISH_VOLUME: &str = "/csi.Node/NodePublishVolume";
    pub const NODE_UNPUBLISH_VOLUME: &str = "/csi.Node/NodeUnpublishVolume";
    pub const GET_NODE_ID: &str = "/csi.Node/GetNodeID";
    pub const PROBE_NODE: &str = "/csi.Node/ProbeNode";
    pub const NODE_GET_CAPABILITIES: &str = "/csi.Node/NodeGetCapabilities";
}

// ---------------------------------------------------------------------------
// Reply plumbing
// ---------------------------------------------------------------------------

/// The two outcomes a well-formed response can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    Result(T),
    Error(Error),
}

/// Uniform access to the `reply` oneof shared by every CSI response.
pub trait CsiReply: Sized {
    /// The RPC-specific `Result` message.
    type Result;

    /// Split the response; `None` means neither a result nor an error was set.
    fn into_reply(self) -> Option<Reply<Self::Result>>;

    fn from_result(result: Self::Result) -> Self;

    fn from_error(error: Error) -> Self;
}

macro_rules! csi_reply {
    ($($response:ident => $module:ident),* $(,)?) => {
        $(
            impl CsiReply for proto::$response {
                type Result = proto::$module::Result;

                fn into_reply(self) -> Option<Reply<Self::Result>> {
                    self.reply.map(|reply| match reply {
                        proto::$module::Reply::Result(r) => Reply::Result(r),
                        proto::$module::Reply::Error(e) => Reply::Error(e),
                    })
                }

                fn from_result(result: Self::Result) -> Self {
                    Self { reply: Some(proto::$module::Reply::Result(result)) }
                }

                fn from_error(error: Error) -> Self {
                    Self { reply: Some(proto::$module::Reply::Error(error)) }
                }
            }
        )*
    };
}

csi_reply! {
    GetSupportedVersionsResponse => get_supported_versions_response,
    GetPluginInfoResponse => get_plugin_info_response,
    CreateVolumeResponse => create_volume_response,
    DeleteVolumeResponse => delete_volume_response,
    ControllerPublishVolumeResponse => controller_publish_volume_response,
    ControllerUnpublishVolumeResponse => controller_unpublish_volume_response,
    ValidateVolumeCapabilitiesResponse => validate_volume_capabilities_response,
    ListVolumesResponse => list_volumes_response,
    GetCapacityResponse => get_capacity_response,
    ControllerGetCapabilitiesResponse => controller_get_capabilities_response,
    NodePublishVolumeResponse => node_publish_volume_response,
    NodeUnpublishVolumeResponse => node_unpublish_volume_response,
    GetNodeIdResponse => get_node_id_response,
    ProbeNodeResponse => probe_node_response,
    NodeGetCapabilitiesResponse => node_get_capabilities_response,
}

/// Wrap a result message in a gRPC response.
pub fn reply_ok<R: CsiReply>(result: R::Result) -> tonic::Response<R> {
    tonic::Response::new(R::from_result(result))
}

/// Wrap an embedded application error in a (successful) gRPC response.
pub fn reply_err<R: CsiReply>(error: Error) -> tonic::Response<R> {
    tonic::Response::new(R::from_error(error))
}

// ---------------------------------------------------------------------------
// Embedded error constructors
// ---------------------------------------------------------------------------

impl Error {
    pub fn general(code: error::general_error::GeneralErrorCode, description: impl Into<String>) -> Self {
        Self {
            value: Some(error::Value::GeneralError(error::GeneralError {
                error_code: code as i32,
                caller_must_not_retry: false,
                error_description: description.into(),
            })),
        }
    }

    pub fn create_volume(
        code: error::create_volume_error::CreateVolumeErrorCode,
        description: impl Into<String>,
    ) -> Self {
        Self {
            value: Some(error::Value::CreateVolumeError(error::CreateVolumeError {
                error_code: code as i32,
                error_description: description.into(),
            })),
        }
    }

    pub fn delete_volume(
        code: error::delete_volume_error::DeleteVolumeErrorCode,
        description: impl Into<String>,
    ) -> Self {
        Self {
            value: Some(error::Value::DeleteVolumeError(error::DeleteVolumeError {
                error_code: code as i32,
                error_description: description.into(),
            })),
        }
    }

    pub fn controller_publish(
        code: error::controller_publish_volume_error::ControllerPublishVolumeErrorCode,
        description: impl Into<String>,
    ) -> Self {
        Self {
            value: Some(error::Value::ControllerPublishVolumeError(
                error::ControllerPublishVolumeError {
                    error_code: code as i32,
                    error_description: description.into(),
                    node_ids: Vec::new(),
                },
            )),
        }
    }

    pub fn controller_unpublish(
        code: error::controller_unpublish_volume_error::ControllerUnpublishVolumeErrorCode,
        description: impl Into<String>,
    ) -> Self {
        Self {
            value: Some(error::Value::ControllerUnpublishVolumeError(
                error::ControllerUnpublishVolumeError {
                    error_code: code as i32,
                    error_description: description.into(),
                },
            )),
        }
    }

    pub fn validate(
        code: error::validate_volume_capabilities_error::ValidateVolumeCapabilitiesErrorCode,
        description: impl Into<String>,
    ) -> Self {
        Self {
            value: Some(error::Value::ValidateVolumeCapabilitiesError(
                error::ValidateVolumeCapabilitiesError {
                    error_code: code as i32,
                    error_description: description.into(),
                },
            )),
        }
    }

    pub fn node_publish(
        code: error::node_publish_volume_error::NodePublishVolumeErrorCode,
        description: impl Into<String>,
    ) -> Self {
        Self {
            value: Some(error::Value::NodePublishVolumeError(error::NodePublishVolumeError {
                error_code: code as i32,
                error_description: description.into(),
            })),
        }
    }

    pub fn node_unpublish(
        code: error::node_unpublish_volume_error::NodeUnpublishVolumeErrorCode,
        description: impl Into<String>,
    ) -> Self {
        Self {
            value: Some(error::Value::NodeUnpublishVolumeError(
                error::NodeUnpublishVolumeError {
                    error_code: code as i32,
                    error_description: description.into(),
                },
            )),
        }
    }

    /// The error's family name, numeric code, and description.
    pub fn parts(&self) -> (&'static str, i32, &str) {
        use error::Value;
        match &self.value {
            Some(Value::GeneralError(e)) => ("GeneralError", e.error_code, e.error_description.as_str()),
            Some(Value::CreateVolumeError(e)) => {
                ("CreateVolumeError", e.error_code, e.error_description.as_str())
            }
            Some(Value::DeleteVolumeError(e)) => {
                ("DeleteVolumeError", e.error_code, e.error_description.as_str())
            }
            Some(Value::ControllerPublishVolumeError(e)) => (
                "ControllerPublishVolumeError",
                e.error_code,
                e.error_description.as_str(),
            ),
            Some(Value::ControllerUnpublishVolumeError(e)) => (
                "ControllerUnpublishVolumeError",
                e.error_code,
                e.error_description.as_str(),
            ),
            Some(Value::ValidateVolumeCapabilitiesError(e)) => (
                "ValidateVolumeCapabilitiesError",
                e.error_code,
                e.error_description.as_str(),
            ),
            Some(Value::NodePublishVolumeError(e)) => {
                ("NodePublishVolumeError", e.error_code, e.error_description.as_str())
            }
            Some(Value::NodeUnpublishVolumeError(e)) => {
                ("NodeUnpublishVolumeError", e.error_code, e.error_description.as_str())
            }
            Some(Value::ProbeNodeError(e)) => ("ProbeNodeError", e.error_code, e.error_description.as_str()),
            Some(Value::GetNodeIdError(e)) => ("GetNodeIdError", e.error_code, e.error_description.as_str()),
            None => ("Error", 0, ""),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (family, code, description) = self.parts();
        if description.is_empty() {
            write!(f, "{family} code {code}")
        } else {
            write!(f, "{family} code {code}: {description}")
        }
    }
}

/// Reject requests that omit the version or ask for an unsupported one.
pub fn check_version(version: Option<&Version>) -> Result<(), Error> {
    match version {
        None => Err(Error::general(
            error::general_error::GeneralErrorCode::MissingRequiredField,
            "version is required",
        )),
        Some(v) if *v != SUPPORTED_VERSION => Err(Error::general(
            error::general_error::GeneralErrorCode::UnsupportedRequestVersion,
            format!("unsupported version {}.{}.{}", v.major, v.minor, v.patch),
        )),
        Some(_) => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Identity & metadata maps
// ---------------------------------------------------------------------------

impl VolumeId {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sorted(f, &self.values)
    }
}

impl VolumeMetadata {
    /// Metadata carrying only the reserved name key.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            values: HashMap::from([(NAME_KEY.to_owned(), name.into())]),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.values.get(NAME_KEY).map(String::as_str).filter(|n| !n.is_empty())
    }
}

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            values: HashMap::from([("id".to_owned(), id.into())]),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sorted(f, &self.values)
    }
}

fn write_sorted(f: &mut fmt::Formatter<'_>, values: &HashMap<String, String>) -> fmt::Result {
    let mut pairs: Vec<_> = values.iter().collect();
    pairs.sort();
    for (i, (k, v)) in pairs.into_iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{k}={v}")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

pub use controller_service_capability::rpc::Type as ControllerRpc;

/// A mount-type capability with single-node-writer access.
pub fn single_node_mount(fs_type: impl Into<String>) -> VolumeCapability {
    VolumeCapability {
        access_mode: Some(volume_capability::AccessMode {
            mode: volume_capability::access_mode::Mode::SingleNodeWriter as i32,
        }),
        access_type: Some(volume_capability::AccessType::Mount(
            volume_capability::MountVolume {
                fs_type: fs_type.into(),
                mount_flags: Vec::new(),
            },
        )),
    }
}

pub fn controller_capability(rpc: ControllerRpc) -> ControllerServiceCapability {
    ControllerServiceCapability {
        r#type: Some(controller_service_capability::Type::Rpc(
            controller_service_capability::Rpc { r#type: rpc as i32 },
        )),
    }
}

/// Whether `rpc` appears in a ControllerGetCapabilities result.
pub fn has_capability(capabilities: &[ControllerServiceCapability], rpc: ControllerRpc) -> bool {
    capabilities.iter().any(|cap| {
        matches!(
            cap.r#type,
            Some(controller_service_capability::Type::Rpc(r)) if r.r#type == rpc as i32
        )
    })
}

/// Filesystem type requested by a mount capability, if any.
pub fn mount_fs_type(capability: Option<&VolumeCapability>) -> Option<&str> {
    match capability?.access_type.as_ref()? {
        volume_capability::AccessType::Mount(m) if !m.fs_type.is_empty() => Some(&m.fs_type),
        _ => None,
    }
}
