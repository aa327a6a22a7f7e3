//! CSI 0.0 wire types (package `csi`) and the generated tonic services.
//!
//! Every response carries a `reply` oneof holding either the RPC's `Result`
//! or an embedded [`Error`]. Application failures travel in that oneof with a
//! successful gRPC status, which is why callers go through
//! [`crate::transport::client::CsiConn`] rather than the raw clients.

// ---------------------------------------------------------------------------
// Common messages
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Version {
    #[prost(uint32, tag = "1")]
    pub major: u32,
    #[prost(uint32, tag = "2")]
    pub minor: u32,
    #[prost(uint32, tag = "3")]
    pub patch: u32,
}

/// Opaque identity issued by the plugin for a volume.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VolumeId {
    #[prost(map = "string, string", tag = "1")]
    pub values: ::std::collections::HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VolumeMetadata {
    #[prost(map = "string, string", tag = "1")]
    pub values: ::std::collections::HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeId {
    #[prost(map = "string, string", tag = "1")]
    pub values: ::std::collections::HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublishVolumeInfo {
    #[prost(map = "string, string", tag = "1")]
    pub values: ::std::collections::HashMap<String, String>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct CapacityRange {
    #[prost(uint64, tag = "1")]
    pub required_bytes: u64,
    #[prost(uint64, tag = "2")]
    pub limit_bytes: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VolumeInfo {
    #[prost(uint64, tag = "1")]
    pub capacity_bytes: u64,
    #[prost(message, optional, tag = "2")]
    pub id: ::core::option::Option<VolumeId>,
    #[prost(message, optional, tag = "3")]
    pub metadata: ::core::option::Option<VolumeMetadata>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VolumeCapability {
    #[prost(message, optional, tag = "3")]
    pub access_mode: ::core::option::Option<volume_capability::AccessMode>,
    #[prost(oneof = "volume_capability::AccessType", tags = "1, 2")]
    pub access_type: ::core::option::Option<volume_capability::AccessType>,
}

pub mod volume_capability {
    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct BlockVolume {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MountVolume {
        #[prost(string, tag = "1")]
        pub fs_type: ::prost::alloc::string::String,
        #[prost(string, repeated, tag = "2")]
        pub mount_flags: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct AccessMode {
        #[prost(enumeration = "access_mode::Mode", tag = "1")]
        pub mode: i32,
    }

    pub mod access_mode {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum Mode {
            Unknown = 0,
            SingleNodeWriter = 1,
            SingleNodeReaderOnly = 2,
            MultiNodeReaderOnly = 3,
            MultiNodeSingleWriter = 4,
            MultiNodeMultiWriter = 5,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum AccessType {
        #[prost(message, tag = "1")]
        Block(BlockVolume),
        #[prost(message, tag = "2")]
        Mount(MountVolume),
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Application error embedded in a response's `reply` oneof.
///
/// Codes are scoped per RPC family: the same number means different things
/// in [`error::CreateVolumeError`] and [`error::DeleteVolumeError`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(oneof = "error::Value", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10")]
    pub value: ::core::option::Option<error::Value>,
}

pub mod error {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GeneralError {
        #[prost(enumeration = "general_error::GeneralErrorCode", tag = "1")]
        pub error_code: i32,
        #[prost(bool, tag = "2")]
        pub caller_must_not_retry: bool,
        #[prost(string, tag = "3")]
        pub error_description: ::prost::alloc::string::String,
    }

    pub mod general_error {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum GeneralErrorCode {
            Unknown = 0,
            Undefined = 1,
            UnsupportedRequestVersion = 2,
            MissingRequiredField = 3,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CreateVolumeError {
        #[prost(enumeration = "create_volume_error::CreateVolumeErrorCode", tag = "1")]
        pub error_code: i32,
        #[prost(string, tag = "2")]
        pub error_description: ::prost::alloc::string::String,
    }

    pub mod create_volume_error {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum CreateVolumeErrorCode {
            Unknown = 0,
            CallNotImplemented = 1,
            OperationPending = 2,
            InvalidVolumeName = 3,
            UnsupportedCapacityRange = 4,
            VolumeAlreadyExists = 5,
            UnsupportedAccessMode = 6,
            UnsupportedVolumeType = 7,
            UnsupportedFsType = 8,
            UnsupportedMountFlags = 9,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DeleteVolumeError {
        #[prost(enumeration = "delete_volume_error::DeleteVolumeErrorCode", tag = "1")]
        pub error_code: i32,
        #[prost(string, tag = "2")]
        pub error_description: ::prost::alloc::string::String,
    }

    pub mod delete_volume_error {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum DeleteVolumeErrorCode {
            Unknown = 0,
            CallNotImplemented = 1,
            OperationPending = 2,
            InvalidVolumeId = 3,
            VolumeDoesNotExist = 4,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ControllerPublishVolumeError {
        #[prost(
            enumeration = "controller_publish_volume_error::ControllerPublishVolumeErrorCode",
            tag = "1"
        )]
        pub error_code: i32,
        #[prost(string, tag = "2")]
        pub error_description: ::prost::alloc::string::String,
        #[prost(message, repeated, tag = "3")]
        pub node_ids: ::prost::alloc::vec::Vec<super::NodeId>,
    }

    pub mod controller_publish_volume_error {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum ControllerPublishVolumeErrorCode {
            Unknown = 0,
            CallNotImplemented = 1,
            OperationPending = 2,
            InvalidVolumeId = 3,
            VolumeDoesNotExist = 4,
            VolumeAlreadyPublished = 5,
            NodeDoesNotExist = 6,
            MaxAttachedNodes = 7,
            UnsupportedMountFlags = 9,
            UnsupportedVolumeType = 10,
            UnsupportedFsType = 11,
            InvalidNodeId = 12,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ControllerUnpublishVolumeError {
        #[prost(
            enumeration = "controller_unpublish_volume_error::ControllerUnpublishVolumeErrorCode",
            tag = "1"
        )]
        pub error_code: i32,
        #[prost(string, tag = "2")]
        pub error_description: ::prost::alloc::string::String,
    }

    pub mod controller_unpublish_volume_error {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum ControllerUnpublishVolumeErrorCode {
            Unknown = 0,
            CallNotImplemented = 1,
            OperationPending = 2,
            InvalidVolumeId = 3,
            VolumeDoesNotExist = 4,
            NodeDoesNotExist = 5,
            InvalidNodeId = 6,
            VolumeNotAttachedToSpecifiedNode = 7,
            NodeIdRequired = 8,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ValidateVolumeCapabilitiesError {
        #[prost(
            enumeration = "validate_volume_capabilities_error::ValidateVolumeCapabilitiesErrorCode",
            tag = "1"
        )]
        pub error_code: i32,
        #[prost(string, tag = "2")]
        pub error_description: ::prost::alloc::string::String,
    }

    pub mod validate_volume_capabilities_error {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum ValidateVolumeCapabilitiesErrorCode {
            Unknown = 0,
            VolumeDoesNotExist = 1,
            UnsupportedFsType = 2,
            UnsupportedMountFlags = 3,
            InvalidVolumeInfo = 4,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NodePublishVolumeError {
        #[prost(enumeration = "node_publish_volume_error::NodePublishVolumeErrorCode", tag = "1")]
        pub error_code: i32,
        #[prost(string, tag = "2")]
        pub error_description: ::prost::alloc::string::String,
    }

    pub mod node_publish_volume_error {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum NodePublishVolumeErrorCode {
            Unknown = 0,
            OperationPending = 1,
            VolumeDoesNotExist = 2,
            UnsupportedMountFlags = 3,
            UnsupportedVolumeType = 4,
            UnsupportedFsType = 5,
            MountError = 6,
            InvalidVolumeId = 7,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NodeUnpublishVolumeError {
        #[prost(
            enumeration = "node_unpublish_volume_error::NodeUnpublishVolumeErrorCode",
            tag = "1"
        )]
        pub error_code: i32,
        #[prost(string, tag = "2")]
        pub error_description: ::prost::alloc::string::String,
    }

    pub mod node_unpublish_volume_error {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum NodeUnpublishVolumeErrorCode {
            Unknown = 0,
            OperationPending = 1,
            VolumeDoesNotExist = 2,
            InvalidVolumeId = 3,
            UnmountError = 4,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ProbeNodeError {
        #[prost(enumeration = "probe_node_error::ProbeNodeErrorCode", tag = "1")]
        pub error_code: i32,
        #[prost(string, tag = "2")]
        pub error_description: ::prost::alloc::string::String,
    }

    pub mod probe_node_error {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum ProbeNodeErrorCode {
            Unknown = 0,
            BadPluginConfig = 1,
            MissingRequiredHostDependency = 2,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetNodeIdError {
        #[prost(enumeration = "get_node_id_error::GetNodeIdErrorCode", tag = "1")]
        pub error_code: i32,
        #[prost(string, tag = "2")]
        pub error_description: ::prost::alloc::string::String,
    }

    pub mod get_node_id_error {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum GetNodeIdErrorCode {
            Unknown = 0,
            BadPluginConfig = 1,
            MissingRequiredHostDependency = 2,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(message, tag = "1")]
        GeneralError(GeneralError),
        #[prost(message, tag = "2")]
        CreateVolumeError(CreateVolumeError),
        #[prost(message, tag = "3")]
        DeleteVolumeError(DeleteVolumeError),
        #[prost(message, tag = "4")]
        ControllerPublishVolumeError(ControllerPublishVolumeError),
        #[prost(message, tag = "5")]
        ControllerUnpublishVolumeError(ControllerUnpublishVolumeError),
        #[prost(message, tag = "6")]
        ValidateVolumeCapabilitiesError(ValidateVolumeCapabilitiesError),
        #[prost(message, tag = "7")]
        NodePublishVolumeError(NodePublishVolumeError),
        #[prost(message, tag = "8")]
        NodeUnpublishVolumeError(NodeUnpublishVolumeError),
        #[prost(message, tag = "9")]
        ProbeNodeError(ProbeNodeError),
        #[prost(message, tag = "10")]
        GetNodeIdError(GetNodeIdError),
    }
}

// ---------------------------------------------------------------------------
// Identity service
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct GetSupportedVersionsRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetSupportedVersionsResponse {
    #[prost(oneof = "get_supported_versions_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<get_supported_versions_response::Reply>,
}

pub mod get_supported_versions_response {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Result {
        #[prost(message, repeated, tag = "1")]
        pub supported_versions: ::prost::alloc::vec::Vec<super::Version>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct GetPluginInfoRequest {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginInfoResponse {
    #[prost(oneof = "get_plugin_info_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<get_plugin_info_response::Reply>,
}

pub mod get_plugin_info_response {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Result {
        #[prost(string, tag = "1")]
        pub name: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub vendor_version: ::prost::alloc::string::String,
        #[prost(map = "string, string", tag = "3")]
        pub manifest: ::std::collections::HashMap<String, String>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

// ---------------------------------------------------------------------------
// Controller service
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateVolumeRequest {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "3")]
    pub capacity_range: ::core::option::Option<CapacityRange>,
    #[prost(message, repeated, tag = "4")]
    pub volume_capabilities: ::prost::alloc::vec::Vec<VolumeCapability>,
    #[prost(map = "string, string", tag = "5")]
    pub parameters: ::std::collections::HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateVolumeResponse {
    #[prost(oneof = "create_volume_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<create_volume_response::Reply>,
}

pub mod create_volume_response {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Result {
        #[prost(message, optional, tag = "1")]
        pub volume_info: ::core::option::Option<super::VolumeInfo>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteVolumeRequest {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
    #[prost(message, optional, tag = "2")]
    pub volume_id: ::core::option::Option<VolumeId>,
    #[prost(message, optional, tag = "3")]
    pub volume_metadata: ::core::option::Option<VolumeMetadata>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteVolumeResponse {
    #[prost(oneof = "delete_volume_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<delete_volume_response::Reply>,
}

pub mod delete_volume_response {
    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Result {}

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerPublishVolumeRequest {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
    #[prost(message, optional, tag = "2")]
    pub volume_id: ::core::option::Option<VolumeId>,
    #[prost(message, optional, tag = "3")]
    pub volume_metadata: ::core::option::Option<VolumeMetadata>,
    #[prost(message, optional, tag = "4")]
    pub node_id: ::core::option::Option<NodeId>,
    #[prost(message, optional, tag = "5")]
    pub volume_capability: ::core::option::Option<VolumeCapability>,
    #[prost(bool, tag = "6")]
    pub readonly: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerPublishVolumeResponse {
    #[prost(oneof = "controller_publish_volume_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<controller_publish_volume_response::Reply>,
}

pub mod controller_publish_volume_response {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Result {
        #[prost(message, optional, tag = "1")]
        pub publish_volume_info: ::core::option::Option<super::PublishVolumeInfo>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerUnpublishVolumeRequest {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
    #[prost(message, optional, tag = "2")]
    pub volume_id: ::core::option::Option<VolumeId>,
    #[prost(message, optional, tag = "3")]
    pub volume_metadata: ::core::option::Option<VolumeMetadata>,
    #[prost(message, optional, tag = "4")]
    pub node_id: ::core::option::Option<NodeId>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerUnpublishVolumeResponse {
    #[prost(oneof = "controller_unpublish_volume_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<controller_unpublish_volume_response::Reply>,
}

pub mod controller_unpublish_volume_response {
    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Result {}

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateVolumeCapabilitiesRequest {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
    #[prost(message, optional, tag = "2")]
    pub volume_info: ::core::option::Option<VolumeInfo>,
    #[prost(message, repeated, tag = "3")]
    pub volume_capabilities: ::prost::alloc::vec::Vec<VolumeCapability>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateVolumeCapabilitiesResponse {
    #[prost(oneof = "validate_volume_capabilities_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<validate_volume_capabilities_response::Reply>,
}

pub mod validate_volume_capabilities_response {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Result {
        #[prost(bool, tag = "1")]
        pub supported: bool,
        #[prost(string, tag = "2")]
        pub message: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListVolumesRequest {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
    #[prost(uint32, tag = "2")]
    pub max_entries: u32,
    #[prost(string, tag = "3")]
    pub starting_token: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListVolumesResponse {
    #[prost(oneof = "list_volumes_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<list_volumes_response::Reply>,
}

pub mod list_volumes_response {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Result {
        #[prost(message, repeated, tag = "1")]
        pub entries: ::prost::alloc::vec::Vec<result::Entry>,
        #[prost(string, tag = "2")]
        pub next_token: ::prost::alloc::string::String,
    }

    pub mod result {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct Entry {
            #[prost(message, optional, tag = "1")]
            pub volume_info: ::core::option::Option<super::super::VolumeInfo>,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetCapacityRequest {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
    #[prost(message, repeated, tag = "2")]
    pub volume_capabilities: ::prost::alloc::vec::Vec<VolumeCapability>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetCapacityResponse {
    #[prost(oneof = "get_capacity_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<get_capacity_response::Reply>,
}

pub mod get_capacity_response {
    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Result {
        #[prost(uint64, tag = "1")]
        pub available_capacity: u64,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ControllerGetCapabilitiesRequest {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerGetCapabilitiesResponse {
    #[prost(oneof = "controller_get_capabilities_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<controller_get_capabilities_response::Reply>,
}

pub mod controller_get_capabilities_response {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Result {
        #[prost(message, repeated, tag = "1")]
        pub capabilities: ::prost::alloc::vec::Vec<super::ControllerServiceCapability>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ControllerServiceCapability {
    #[prost(oneof = "controller_service_capability::Type", tags = "1")]
    pub r#type: ::core::option::Option<controller_service_capability::Type>,
}

pub mod controller_service_capability {
    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Rpc {
        #[prost(enumeration = "rpc::Type", tag = "1")]
        pub r#type: i32,
    }

    pub mod rpc {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum Type {
            Unknown = 0,
            CreateDeleteVolume = 1,
            PublishUnpublishVolume = 2,
            ListVolumes = 3,
            GetCapacity = 4,
        }
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        Rpc(Rpc),
    }
}

// ---------------------------------------------------------------------------
// Node service
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodePublishVolumeRequest {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
    #[prost(message, optional, tag = "2")]
    pub volume_id: ::core::option::Option<VolumeId>,
    #[prost(message, optional, tag = "3")]
    pub volume_metadata: ::core::option::Option<VolumeMetadata>,
    #[prost(message, optional, tag = "4")]
    pub publish_volume_info: ::core::option::Option<PublishVolumeInfo>,
    #[prost(string, tag = "5")]
    pub target_path: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "6")]
    pub volume_capability: ::core::option::Option<VolumeCapability>,
    #[prost(bool, tag = "7")]
    pub readonly: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodePublishVolumeResponse {
    #[prost(oneof = "node_publish_volume_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<node_publish_volume_response::Reply>,
}

pub mod node_publish_volume_response {
    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Result {}

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeUnpublishVolumeRequest {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
    #[prost(message, optional, tag = "2")]
    pub volume_id: ::core::option::Option<VolumeId>,
    #[prost(message, optional, tag = "3")]
    pub volume_metadata: ::core::option::Option<VolumeMetadata>,
    #[prost(string, tag = "4")]
    pub target_path: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeUnpublishVolumeResponse {
    #[prost(oneof = "node_unpublish_volume_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<node_unpublish_volume_response::Reply>,
}

pub mod node_unpublish_volume_response {
    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Result {}

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct GetNodeIdRequest {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetNodeIdResponse {
    #[prost(oneof = "get_node_id_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<get_node_id_response::Reply>,
}

pub mod get_node_id_response {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Result {
        #[prost(message, optional, tag = "1")]
        pub node_id: ::core::option::Option<super::NodeId>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ProbeNodeRequest {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProbeNodeResponse {
    #[prost(oneof = "probe_node_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<probe_node_response::Reply>,
}

pub mod probe_node_response {
    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Result {}

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct NodeGetCapabilitiesRequest {
    #[prost(message, optional, tag = "1")]
    pub version: ::core::option::Option<Version>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeGetCapabilitiesResponse {
    #[prost(oneof = "node_get_capabilities_response::Reply", tags = "1, 2")]
    pub reply: ::core::option::Option<node_get_capabilities_response::Reply>,
}

pub mod node_get_capabilities_response {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Result {
        #[prost(message, repeated, tag = "1")]
        pub capabilities: ::prost::alloc::vec::Vec<super::NodeServiceCapability>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "1")]
        Result(Result),
        #[prost(message, tag = "2")]
        Error(super::Error),
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct NodeServiceCapability {
    #[prost(oneof = "node_service_capability::Type", tags = "1")]
    pub r#type: ::core::option::Option<node_service_capability::Type>,
}

pub mod node_service_capability {
    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Rpc {
        #[prost(enumeration = "rpc::Type", tag = "1")]
        pub r#type: i32,
    }

    pub mod rpc {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum Type {
            Unknown = 0,
        }
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        Rpc(Rpc),
    }
}

// ---------------------------------------------------------------------------
// Generated services
// ---------------------------------------------------------------------------

include!(concat!(env!("OUT_DIR"), "/csi.Controller.rs"));
include!(concat!(env!("OUT_DIR"), "/csi.Identity.rs"));
include!(concat!(env!("OUT_DIR"), "/csi.Node.rs"));
