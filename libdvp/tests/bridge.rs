use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use libcsi::backend::mock::MockBackend;
use libcsi::proto;
use libcsi::{CsiService, SUPPORTED_VERSION, method};
use libdvp::bridge::nfs::NfsSource;
use libdvp::{Bridge, BridgeConfig, DriverError, Flavor, VolumeDriver};
use tempfile::TempDir;

struct Fixture {
    mock: Arc<MockBackend>,
    csi: Arc<CsiService>,
    bridge: Bridge,
    root: TempDir,
}

impl Fixture {
    async fn new(driver: &str, nfs: NfsSource) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::new("node-1"));
        let csi = Arc::new(CsiService::with_plugin(driver, mock.clone()));
        csi.serve().unwrap();
        let config = BridgeConfig {
            mount_root: root.path().join("volumes"),
            fs_type: "ext4".into(),
            nfs,
        };
        let bridge = Bridge::new(Arc::clone(&csi), config).await.unwrap();
        Self {
            mock,
            csi,
            bridge,
            root,
        }
    }

    async fn generic() -> Self {
        Self::new("mock", NfsSource::default()).await
    }

    fn target(&self, name: &str) -> String {
        self.bridge.target(name).unwrap().to_string_lossy().into_owned()
    }
}

fn opts(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn create_is_idempotent() {
    let f = Fixture::generic().await;
    f.bridge.create("v1", &HashMap::new()).await.unwrap();
    f.bridge.create("v1", &HashMap::new()).await.unwrap();

    assert_eq!(f.mock.call_count(method::CREATE_VOLUME), 2);
    assert_eq!(f.mock.volume_count(), 1);
    assert!(f.bridge.cache().get("v1").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn existing_volume_is_re_resolved() {
    let f = Fixture::generic().await;
    let id = f.mock.insert_volume("pre", 1);

    f.bridge.create("pre", &HashMap::new()).await.unwrap();

    assert_eq!(f.bridge.cache().get("pre").unwrap().id, id);
    assert_eq!(f.mock.call_count(method::LIST_VOLUMES), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn existing_volume_without_list_capability_is_not_cached() {
    let f = Fixture::generic().await;
    f.mock.insert_volume("pre", 1);
    f.mock.set_list_capable(false);

    f.bridge.create("pre", &HashMap::new()).await.unwrap();

    assert!(f.bridge.cache().get("pre").is_none());
    assert_eq!(f.mock.call_count(method::LIST_VOLUMES), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn remove_is_idempotent() {
    let f = Fixture::generic().await;
    f.bridge.create("v1", &HashMap::new()).await.unwrap();
    f.bridge.remove("v1").await.unwrap();
    assert_eq!(f.mock.volume_count(), 0);

    f.mock.clear_calls();
    f.bridge.remove("v1").await.unwrap();
    assert!(f.mock.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_of_vanished_volume_succeeds() {
    let f = Fixture::generic().await;
    f.bridge.create("v1", &HashMap::new()).await.unwrap();

    let conn = f.csi.dial().await.unwrap();
    let id = f.bridge.cache().get("v1").unwrap().id;
    conn.delete_volume(proto::DeleteVolumeRequest {
        version: Some(SUPPORTED_VERSION),
        volume_id: Some(id),
        ..Default::default()
    })
    .await
    .unwrap();

    f.bridge.remove("v1").await.unwrap();
    assert!(f.bridge.cache().get("v1").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn round_trip() {
    let f = Fixture::generic().await;
    f.bridge.create("v1", &opts(&[("size", "10")])).await.unwrap();

    let conn = f.csi.dial().await.unwrap();
    let listed = conn
        .list_volumes(proto::ListVolumesRequest {
            version: Some(SUPPORTED_VERSION),
            ..Default::default()
        })
        .await
        .unwrap();
    let info = listed.entries[0].volume_info.clone().unwrap();
    assert_eq!(info.capacity_bytes, 10 << 30);

    let volume = f.bridge.get("v1").await.unwrap();
    assert_eq!(volume.name, "v1");
    assert_eq!(volume.status.get("name").map(String::as_str), Some("v1"));
    assert_eq!(f.bridge.cache().get("v1").unwrap().id, info.id.unwrap());
    assert!(volume.mountpoint.is_empty());

    f.bridge.remove("v1").await.unwrap();
    assert!(matches!(f.bridge.get("v1").await, Err(DriverError::NotFound(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_size_is_rejected_before_any_call() {
    let f = Fixture::generic().await;
    let err = f.bridge.create("v1", &opts(&[("size", "big")])).await.unwrap_err();
    assert!(matches!(err, DriverError::InvalidOption { .. }));
    assert!(f.mock.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn mounts_are_reference_counted() {
    let f = Fixture::generic().await;
    f.bridge.create("v1", &HashMap::new()).await.unwrap();
    let target = f.target("v1");

    let first = f.bridge.mount("v1", "c1").await.unwrap();
    let second = f.bridge.mount("v1", "c2").await.unwrap();
    assert_eq!(first, target);
    assert_eq!(second, target);
    assert_eq!(f.bridge.mount_count("v1"), 2);

    f.bridge.unmount("v1", "c1").await.unwrap();
    assert!(Path::new(&target).exists());
    assert!(f.mock.is_node_published(&target));
    assert_eq!(f.bridge.path("v1").await.unwrap(), target);

    f.bridge.unmount("v1", "c2").await.unwrap();
    assert!(!Path::new(&target).exists());
    assert!(!f.mock.is_node_published(&target));
    assert!(matches!(f.bridge.path("v1").await, Err(DriverError::NotMounted(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_teardown_is_retried_by_the_next_unmount() {
    let f = Fixture::generic().await;
    f.bridge.create("v1", &HashMap::new()).await.unwrap();
    let target = f.bridge.mount("v1", "c1").await.unwrap();

    f.mock.fail_next_unpublish();
    assert!(matches!(
        f.bridge.unmount("v1", "c1").await,
        Err(DriverError::Csi(_))
    ));
    assert_eq!(f.bridge.mount_count("v1"), 0);
    assert!(f.mock.is_node_published(&target));

    f.bridge.unmount("v1", "c1").await.unwrap();
    assert!(!f.mock.is_node_published(&target));
    assert!(!Path::new(&target).exists());
    assert_eq!(f.mock.call_count(method::NODE_UNPUBLISH_VOLUME), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn names_outside_the_mount_root_are_rejected() {
    let f = Fixture::generic().await;
    let outside = f.root.path().join("escape");
    let names = [
        "../escape".to_owned(),
        "../../escape".to_owned(),
        outside.to_string_lossy().into_owned(),
        "a/b".to_owned(),
        "..".to_owned(),
        ".".to_owned(),
        "".to_owned(),
    ];

    for name in &names {
        assert!(
            matches!(f.bridge.mount(name, "c1").await, Err(DriverError::InvalidName { .. })),
            "{name:?}"
        );
        assert!(
            matches!(f.bridge.create(name, &HashMap::new()).await, Err(DriverError::InvalidName { .. })),
            "{name:?}"
        );
        assert!(
            matches!(f.bridge.unmount(name, "c1").await, Err(DriverError::InvalidName { .. })),
            "{name:?}"
        );
        assert_eq!(f.bridge.mount_count(name), 0);
    }

    assert!(!outside.exists());
    assert!(f.mock.calls().is_empty());
    assert_eq!(f.mock.volume_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn controller_publish_follows_capability() {
    let f = Fixture::generic().await;
    f.bridge.create("v1", &HashMap::new()).await.unwrap();
    let id = f.bridge.cache().get("v1").unwrap().id;

    f.bridge.mount("v1", "c1").await.unwrap();
    assert_eq!(f.mock.call_count(method::GET_NODE_ID), 1);
    assert_eq!(f.mock.call_count(method::CONTROLLER_PUBLISH_VOLUME), 1);
    assert!(f.mock.is_controller_published(&id));

    f.bridge.unmount("v1", "c1").await.unwrap();
    assert_eq!(f.mock.call_count(method::CONTROLLER_UNPUBLISH_VOLUME), 1);
    assert!(!f.mock.is_controller_published(&id));
}

#[tokio::test(flavor = "multi_thread")]
async fn mount_without_publish_capability() {
    let f = Fixture::generic().await;
    f.mock.set_publish_capable(false);
    f.bridge.create("v1", &HashMap::new()).await.unwrap();

    let target = f.bridge.mount("v1", "c1").await.unwrap();
    assert!(f.mock.is_node_published(&target));
    f.bridge.unmount("v1", "c1").await.unwrap();

    assert_eq!(f.mock.call_count(method::CONTROLLER_PUBLISH_VOLUME), 0);
    assert_eq!(f.mock.call_count(method::CONTROLLER_UNPUBLISH_VOLUME), 0);
    assert_eq!(f.mock.call_count(method::NODE_PUBLISH_VOLUME), 1);
    assert_eq!(f.mock.call_count(method::NODE_UNPUBLISH_VOLUME), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn mount_creates_unknown_volume() {
    let f = Fixture::generic().await;
    let target = f.bridge.mount("fresh", "c1").await.unwrap();
    assert_eq!(f.mock.volume_count(), 1);
    assert!(f.mock.is_node_published(&target));
}

#[tokio::test(flavor = "multi_thread")]
async fn unmount_of_unknown_volume_fails() {
    let f = Fixture::generic().await;
    assert!(matches!(
        f.bridge.unmount("ghost", "c1").await,
        Err(DriverError::NotFound(_))
    ));
    assert!(matches!(f.bridge.path("ghost").await, Err(DriverError::NotFound(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn list_refreshes_cache() {
    let f = Fixture::generic().await;
    f.mock.insert_volume("a", 1);
    f.mock.insert_volume("b", 1);

    let names: Vec<_> = f.bridge.list().await.unwrap().into_iter().map(|v| v.name).collect();
    assert_eq!(names, vec!["a", "b"]);

    for _ in 0..50 {
        if f.bridge.cache().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(f.bridge.cache().get("a").is_some());
    assert!(f.bridge.cache().get("b").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn list_without_capability_serves_cache() {
    let f = Fixture::generic().await;
    f.bridge.create("v1", &HashMap::new()).await.unwrap();
    f.mock.set_list_capable(false);
    f.mock.insert_volume("hidden", 1);
    f.mock.clear_calls();

    let names: Vec<_> = f.bridge.list().await.unwrap().into_iter().map(|v| v.name).collect();
    assert_eq!(names, vec!["v1"]);
    assert_eq!(f.mock.call_count(method::LIST_VOLUMES), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn nfs_volumes_never_reach_list_volumes() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("nfs-volumes");
    std::fs::write(&file, "media=nas:/exports/media\nhome=nas:/exports/home\n").unwrap();

    let f = Fixture::new("nfs", NfsSource::File(file.clone())).await;
    assert_eq!(f.bridge.flavor(), Flavor::Nfs);

    let names: Vec<_> = f.bridge.list().await.unwrap().into_iter().map(|v| v.name).collect();
    assert_eq!(names, vec!["home", "media"]);

    f.bridge
        .create("backup", &opts(&[("host", "nas"), ("export", "/exports/backup")]))
        .await
        .unwrap();
    f.bridge.remove("MEDIA").await.unwrap();

    let names: Vec<_> = f.bridge.list().await.unwrap().into_iter().map(|v| v.name).collect();
    assert_eq!(names, vec!["backup", "home"]);
    let contents = std::fs::read_to_string(&file).unwrap();
    assert_eq!(contents, "home=nas:/exports/home\nbackup=nas:/exports/backup\n");

    assert!(f.mock.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn nfs_create_requires_host_and_export() {
    let f = Fixture::new("nfs", NfsSource::default()).await;
    let err = f.bridge.create("x", &opts(&[("host", "nas")])).await.unwrap_err();
    assert!(matches!(err, DriverError::InvalidOption { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn nfs_create_rejects_records_that_break_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("nfs-volumes");
    std::fs::write(&file, "media=nas:/exports/media\n").unwrap();
    let f = Fixture::new("nfs", NfsSource::File(file.clone())).await;

    let err = f
        .bridge
        .create("evil\nroot=attacker:/", &opts(&[("host", "nas"), ("export", "/e")]))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::InvalidName { .. }));

    let err = f
        .bridge
        .create("ok", &opts(&[("host", "nas:/x\nroot=attacker"), ("export", "/e")]))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::InvalidOption { .. }));

    let err = f
        .bridge
        .create("ok", &opts(&[("host", "nas"), ("export", "/e\nroot=attacker:/")]))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::InvalidOption { .. }));

    assert_eq!(std::fs::read_to_string(&file).unwrap(), "media=nas:/exports/media\n");
    assert!(f.bridge.cache().get("root").is_none());
    assert_eq!(f.bridge.cache().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn nfs_create_of_a_mapped_name() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("nfs-volumes");
    let f = Fixture::new("nfs", NfsSource::File(file.clone())).await;
    let one = opts(&[("host", "nas"), ("export", "/one")]);

    f.bridge.create("a", &one).await.unwrap();
    f.bridge.create("a", &one).await.unwrap();
    let err = f
        .bridge
        .create("a", &opts(&[("host", "nas"), ("export", "/two")]))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::Conflict { .. }));

    assert_eq!(std::fs::read_to_string(&file).unwrap(), "a=nas:/one\n");
    let volume = f.bridge.cache().get("a").unwrap();
    assert_eq!(volume.id.values["export"], "/one");
}

#[tokio::test(flavor = "multi_thread")]
async fn nfs_mount_requires_mapping() {
    let f = Fixture::new("nfs", NfsSource::Inline(vec!["share=nas:/s".into()])).await;
    f.mock.set_static_volumes(true);
    assert!(matches!(
        f.bridge.mount("unknown", "c1").await,
        Err(DriverError::ImplicitCreateForbidden(_))
    ));

    f.mock.set_publish_capable(false);
    let target = f.bridge.mount("share", "c1").await.unwrap();
    assert!(f.mock.is_node_published(&target));
    assert_eq!(f.mock.call_count(method::CREATE_VOLUME), 0);
    assert!(f.root.path().join("volumes").join("share").exists());

    f.bridge.unmount("share", "c1").await.unwrap();
    assert!(!f.mock.is_node_published(&target));
    assert!(!Path::new(&target).exists());
}
