use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use libcsi::backend::mock::MockBackend;
use libcsi::proto;
use libcsi::{CsiConn, CsiPlugin, Registry, SUPPORTED_VERSION, method};
use rkvol::config::{Config, DockerMode};
use rkvol::Module;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::UnixStream;
use tonic::transport::{Endpoint, Uri};
use tower::service_fn;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A registry whose `mock` backend is the given, shared instance.
fn registry(mock: Arc<MockBackend>) -> Registry {
    let mut registry = Registry::new();
    registry.register("mock", move |_| {
        let mock = Arc::clone(&mock);
        async move { Ok(mock as Arc<dyn CsiPlugin>) }
    });
    registry
}

fn config(dir: &Path, mux: bool) -> Config {
    let mut config = Config::parse("").unwrap();
    config.host = socket(dir).to_string_lossy().into_owned();
    config.csi.driver = "mock".into();
    config.csi.node_id = "node-1".into();
    config.csi.disable_docker_mux = !mux;
    config.docker.mount_root = dir.join("volumes");
    config
}

fn socket(dir: &Path) -> PathBuf {
    dir.join("run").join("rkvol.sock")
}

async fn grpc(path: PathBuf) -> CsiConn {
    let channel = Endpoint::try_from("http://[::]:50051")
        .unwrap()
        .connect_with_connector(service_fn(move |_: Uri| {
            let path = path.clone();
            async move { UnixStream::connect(path).await.map(TokioIo::new) }
        }))
        .await
        .unwrap();
    CsiConn::new(channel)
}

async fn docker(path: &Path, uri: &str, body: &str) -> Result<(StatusCode, Value), BoxError> {
    let stream = UnixStream::connect(path).await?;
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(conn);

    let request = Request::post(uri)
        .header(hyper::header::HOST, "rkvol")
        .header(hyper::header::CONTENT_TYPE, "application/vnd.docker.plugins.v1.2+json")
        .body(Full::new(Bytes::from(body.to_owned())))?;
    let response = sender.send_request(request).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    Ok((status, serde_json::from_slice(&body)?))
}

async fn plugin_name(conn: &CsiConn) -> String {
    conn.get_plugin_info(proto::GetPluginInfoRequest {
        version: Some(SUPPORTED_VERSION),
    })
    .await
    .unwrap()
    .name
}

fn sorted_names(list: &Value) -> Vec<String> {
    let mut names: Vec<String> = list["Volumes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["Name"].as_str().unwrap().to_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test(flavor = "multi_thread")]
async fn docker_and_grpc_share_one_socket() {
    let dir = TempDir::new().unwrap();
    let mock = Arc::new(MockBackend::new("node-1"));
    let running = Module::new(config(dir.path(), true), registry(mock.clone()))
        .start()
        .await
        .unwrap();
    let path = socket(dir.path());

    let docker_side = async {
        let (status, body) = docker(&path, "/Plugin.Activate", "").await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["Implements"][0], "VolumeDriver");
        for i in 0..4 {
            let create = format!(r#"{{"Name":"vol-{i}","Opts":{{"size":"1"}}}}"#);
            let (status, body) = docker(&path, "/VolumeDriver.Create", &create).await.unwrap();
            assert_eq!(status, StatusCode::OK, "{body}");
        }
    };
    let grpc_side = async {
        let conn = grpc(path.clone()).await;
        for _ in 0..4 {
            assert_eq!(plugin_name(&conn).await, "rkvol.mock");
        }
    };
    tokio::join!(docker_side, grpc_side);

    let conn = grpc(path.clone()).await;
    let listed = conn
        .list_volumes(proto::ListVolumesRequest {
            version: Some(SUPPORTED_VERSION),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.entries.len(), 4);

    let (_, list) = docker(&path, "/VolumeDriver.List", "{}").await.unwrap();
    assert_eq!(sorted_names(&list), vec!["vol-0", "vol-1", "vol-2", "vol-3"]);

    let (status, body) = docker(&path, "/VolumeDriver.Get", r#"{"Name":"missing"}"#)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["Err"].as_str().unwrap().contains("missing"));

    drop(conn);
    running.stop().await;
    assert!(!path.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn grpc_only_without_mux() {
    let dir = TempDir::new().unwrap();
    let mock = Arc::new(MockBackend::new("node-1"));
    let running = Module::new(config(dir.path(), false), registry(mock.clone()))
        .start()
        .await
        .unwrap();
    let path = socket(dir.path());

    let conn = grpc(path.clone()).await;
    assert_eq!(plugin_name(&conn).await, "rkvol.mock");
    assert!(docker(&path, "/Plugin.Activate", "").await.is_err());
    assert_eq!(mock.call_count(method::LIST_VOLUMES), 0);

    drop(conn);
    running.stop().await;
    assert!(!path.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn cache_is_warmed_at_start() {
    let dir = TempDir::new().unwrap();
    let mock = Arc::new(MockBackend::new("node-1"));
    mock.insert_volume("pre", 1);
    let running = Module::new(config(dir.path(), true), registry(mock.clone()))
        .start()
        .await
        .unwrap();
    let path = socket(dir.path());

    let mut found = false;
    for _ in 0..50 {
        let (status, _) = docker(&path, "/VolumeDriver.Get", r#"{"Name":"pre"}"#).await.unwrap();
        if status == StatusCode::OK {
            found = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(found, "warming never populated the cache");
    assert!(mock.call_count(method::LIST_VOLUMES) >= 1);

    running.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn legacy_mode_requires_storage_service() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), true);
    config.docker.mode = DockerMode::Legacy;

    let mock = Arc::new(MockBackend::new("node-1"));
    let err = Module::new(config, registry(mock)).start().await.unwrap_err();
    assert!(err.to_string().contains("storage service"), "{err:#}");
    assert!(!socket(dir.path()).exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn forced_legacy_platform_requires_storage_service() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), true);
    config.docker.storage_platform = "ebs".into();

    let mock = Arc::new(MockBackend::new("node-1"));
    let err = Module::new(config, registry(mock)).start().await.unwrap_err();
    assert!(err.to_string().contains("storage service"), "{err:#}");
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_driver_fails_to_start() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), true);
    config.csi.driver = "ceph".into();

    let mock = Arc::new(MockBackend::new("node-1"));
    assert!(Module::new(config, registry(mock)).start().await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn running_module_reports_endpoint_and_driver() {
    let dir = TempDir::new().unwrap();
    let mock = Arc::new(MockBackend::new("node-1"));
    let running = Module::new(config(dir.path(), false), registry(mock))
        .start()
        .await
        .unwrap();

    let shown = format!("{running:?}");
    assert!(shown.starts_with("RunningModule"), "{shown}");
    assert!(shown.contains("rkvol.sock"), "{shown}");
    assert!(shown.contains("\"mock\""), "{shown}");

    running.stop().await;
}
