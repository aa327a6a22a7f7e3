//! CSI error types and idempotency classification.
//!
//! All errors in the `libcsi` crate are represented by the [`CsiError`] enum.
//! CSI 0.0 reports application failures inside the response body, so the
//! checked client turns an embedded [`proto::Error`] into [`CsiError::Rpc`]
//! tagged with the full method name that produced it. [`CsiError::is_benign`]
//! then decides whether that error merely confirms the caller's desired end
//! state (creating a volume that exists, deleting one that is gone).

use thiserror::Error;

use crate::proto::{self, error};
use crate::types::method;

/// Unified error type for CSI operations.
#[derive(Debug, Error)]
pub enum CsiError {
    /// The plugin answered with an embedded CSI application error.
    #[error("{method}: {error}")]
    Rpc {
        /// Full gRPC method name, e.g. `/csi.Controller/CreateVolume`.
        method: &'static str,
        error: proto::Error,
    },

    /// The response carried neither a result nor an error.
    #[error("{method}: response has neither a result nor an error")]
    MalformedResponse { method: &'static str },

    /// The call failed at the gRPC layer.
    #[error("{method}: {status}")]
    Status {
        method: &'static str,
        status: tonic::Status,
    },

    /// Connection establishment failed.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The in-process transport has been closed.
    #[error("csi server closed")]
    Closed,

    /// No backend is registered under the requested name.
    #[error("unknown csi backend {0:?}")]
    UnknownBackend(String),

    /// The caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The storage backend returned an error.
    #[error("backend error: {0}")]
    BackendError(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CsiError {
    /// Create a [`CsiError::BackendError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn backend<E: std::fmt::Display>(e: E) -> Self {
        Self::BackendError(e.to_string())
    }

    /// Create a [`CsiError::TransportError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn transport<E: std::fmt::Display>(e: E) -> Self {
        Self::TransportError(e.to_string())
    }

    /// Create a [`CsiError::Internal`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }

    /// `true` if this is the one embedded error that its originating RPC
    /// treats as success.
    ///
    /// Codes are scoped per RPC, so the method decides which code is benign
    /// and which error family it must arrive in. Anything else, including a
    /// benign code in the wrong family, is a real failure.
    pub fn is_benign(&self) -> bool {
        match self {
            Self::Rpc { method, error } => benign_code(method)
                .is_some_and(|code| scoped_code(method, error) == Some(code)),
            _ => false,
        }
    }
}

impl From<CsiError> for tonic::Status {
    fn from(err: CsiError) -> Self {
        match err {
            CsiError::Status { status, .. } => status,
            CsiError::Closed => tonic::Status::unavailable(err.to_string()),
            CsiError::TransportError(_) => tonic::Status::unavailable(err.to_string()),
            CsiError::UnknownBackend(_) | CsiError::InvalidArgument(_) => {
                tonic::Status::invalid_argument(err.to_string())
            }
            _ => tonic::Status::internal(err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Idempotency table
// ---------------------------------------------------------------------------

/// Per-method error code meaning "already in the requested state".
const IDEMPOTENT: &[(&str, i32)] = &[
    (
        method::CREATE_VOLUME,
        error::create_volume_error::CreateVolumeErrorCode::VolumeAlreadyExists as i32,
    ),
    (
        method::DELETE_VOLUME,
        error::delete_volume_error::DeleteVolumeErrorCode::VolumeDoesNotExist as i32,
    ),
    (
        method::CONTROLLER_UNPUBLISH_VOLUME,
        error::controller_unpublish_volume_error::ControllerUnpublishVolumeErrorCode::VolumeDoesNotExist
            as i32,
    ),
    (
        method::NODE_UNPUBLISH_VOLUME,
        error::node_unpublish_volume_error::NodeUnpublishVolumeErrorCode::VolumeDoesNotExist as i32,
    ),
];

fn benign_code(method: &str) -> Option<i32> {
    IDEMPOTENT
        .iter()
        .find(|(m, _)| *m == method)
        .map(|(_, code)| *code)
}

/// The error's code, if it belongs to the family `method` reports in.
fn scoped_code(method: &str, err: &proto::Error) -> Option<i32> {
    use error::Value;
    match (method, err.value.as_ref()?) {
        (method::CREATE_VOLUME, Value::CreateVolumeError(e)) => Some(e.error_code),
        (method::DELETE_VOLUME, Value::DeleteVolumeError(e)) => Some(e.error_code),
        (method::CONTROLLER_PUBLISH_VOLUME, Value::ControllerPublishVolumeError(e)) => {
            Some(e.error_code)
        }
        (method::CONTROLLER_UNPUBLISH_VOLUME, Value::ControllerUnpublishVolumeError(e)) => {
            Some(e.error_code)
        }
        (method::VALIDATE_VOLUME_CAPABILITIES, Value::ValidateVolumeCapabilitiesError(e)) => {
            Some(e.error_code)
        }
        (method::NODE_PUBLISH_VOLUME, Value::NodePublishVolumeError(e)) => Some(e.error_code),
        (method::NODE_UNPUBLISH_VOLUME, Value::NodeUnpublishVolumeError(e)) => Some(e.error_code),
        (method::PROBE_NODE, Value::ProbeNodeError(e)) => Some(e.error_code),
        (method::GET_NODE_ID, Value::GetNodeIdError(e)) => Some(e.error_code),
        _ => None,
    }
}
