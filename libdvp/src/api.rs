//! Docker Volume Plugin protocol messages.
//!
//! Field names follow the Docker plugin wire format (PascalCase, `ID`), so
//! every type here renames its fields for serde.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Content type of every request and response body.
pub const CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.2+json";

/// The only plugin interface this crate implements.
pub const VOLUME_DRIVER: &str = "VolumeDriver";

/// Endpoint paths.
pub mod path {
    pub const ACTIVATE: &str = "/Plugin.Activate";
    pub const CREATE: &str = "/VolumeDriver.Create";
    pub const REMOVE: &str = "/VolumeDriver.Remove";
    pub const PATH: &str = "/VolumeDriver.Path";
    pub const MOUNT: &str = "/VolumeDriver.Mount";
    pub const UNMOUNT: &str = "/VolumeDriver.Unmount";
    pub const GET: &str = "/VolumeDriver.Get";
    pub const LIST: &str = "/VolumeDriver.List";
    pub const CAPABILITIES: &str = "/VolumeDriver.Capabilities";
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRequest {
    pub name: String,
    #[serde(default)]
    pub opts: Option<HashMap<String, String>>,
}

/// Body of Remove, Path and Get.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NameRequest {
    pub name: String,
}

/// Body of Mount and Unmount. `ID` identifies the caller (a container).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountRequest {
    pub name: String,
    #[serde(rename = "ID", default)]
    pub id: String,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// A volume as Docker sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Volume {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mountpoint: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub status: HashMap<String, String>,
}

/// Response of Create, Remove and Unmount; also the body of every error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrResponse {
    pub err: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountpointResponse {
    pub mountpoint: String,
    pub err: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetResponse {
    pub volume: Option<Volume>,
    pub err: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListResponse {
    pub volumes: Vec<Volume>,
    pub err: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Capabilities {
    pub scope: String,
}

impl Capabilities {
    /// Volumes are visible cluster-wide.
    pub fn global() -> Self {
        Self {
            scope: "global".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CapabilitiesResponse {
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivateResponse {
    pub implements: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_request_uses_docker_field_names() {
        let req: MountRequest = serde_json::from_str(r#"{"Name":"v1","ID":"abc"}"#).unwrap();
        assert_eq!(req.name, "v1");
        assert_eq!(req.id, "abc");
    }

    #[test]
    fn create_request_accepts_null_opts() {
        let req: CreateRequest = serde_json::from_str(r#"{"Name":"v1","Opts":null}"#).unwrap();
        assert!(req.opts.is_none());
        let req: CreateRequest =
            serde_json::from_str(r#"{"Name":"v1","Opts":{"size":"10"}}"#).unwrap();
        assert_eq!(req.opts.unwrap()["size"], "10");
    }

    #[test]
    fn volume_omits_empty_fields() {
        let volume = Volume {
            name: "v1".into(),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&volume).unwrap(), r#"{"Name":"v1"}"#);
    }

    #[test]
    fn capabilities_are_global() {
        let body = CapabilitiesResponse {
            capabilities: Capabilities::global(),
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"Capabilities":{"Scope":"global"}}"#
        );
    }
}
