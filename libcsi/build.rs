//! Generates the tonic client and server stubs for the three CSI services.
//!
//! The message types live in `src/proto.rs`, so the services are described
//! with `tonic_build::manual` instead of compiling `.proto` files and no
//! `protoc` is needed at build time.

use tonic_build::manual::{Builder, Method, Service};

const PACKAGE: &str = "csi";

const CONTROLLER: &[(&str, &str)] = &[
    ("create_volume", "CreateVolume"),
    ("delete_volume", "DeleteVolume"),
    ("controller_publish_volume", "ControllerPublishVolume"),
    ("controller_unpublish_volume", "ControllerUnpublishVolume"),
    ("validate_volume_capabilities", "ValidateVolumeCapabilities"),
    ("list_volumes", "ListVolumes"),
    ("get_capacity", "GetCapacity"),
    ("controller_get_capabilities", "ControllerGetCapabilities"),
];

const IDENTITY: &[(&str, &str)] = &[
    ("get_supported_versions", "GetSupportedVersions"),
    ("get_plugin_info", "GetPluginInfo"),
];

const NODE: &[(&str, &str)] = &[
    ("node_publish_volume", "NodePublishVolume"),
    ("node_unpublish_volume", "NodeUnpublishVolume"),
    ("get_node_id", "GetNodeID"),
    ("probe_node", "ProbeNode"),
    ("node_get_capabilities", "NodeGetCapabilities"),
];

fn service(name: &str, rpcs: &[(&str, &str)]) -> Service {
    let mut builder = Service::builder().name(name).package(PACKAGE);
    for (method, route) in rpcs {
        // GetNodeID maps to the `GetNodeIdRequest` message, as prost would name it.
        let message = route.replace("ID", "Id");
        builder = builder.method(
            Method::builder()
                .name(*method)
                .route_name(*route)
                .input_type(format!("crate::proto::{message}Request"))
                .output_type(format!("crate::proto::{message}Response"))
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        );
    }
    builder.build()
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    Builder::new().compile(&[
        service("Controller", CONTROLLER),
        service("Identity", IDENTITY),
        service("Node", NODE),
    ]);
}
