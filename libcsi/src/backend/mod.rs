//! Pluggable storage backend implementations and the registry that names
//! them.
//!
//! A backend is any type implementing the generated CSI `Controller`,
//! `Identity`, and `Node` server traits; the blanket [`CsiPlugin`] impl turns
//! it into a set of tonic routes. Backends are compiled in and registered by
//! name in a [`Registry`], which the agent consults when it starts.

pub mod mock;
pub mod nfs;
pub mod vfs;

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use tonic::service::Routes;

use crate::error::CsiError;
use crate::proto::{
    controller_server::{Controller, ControllerServer},
    identity_server::{Identity, IdentityServer},
    node_server::{Node, NodeServer},
};

/// A CSI implementation that can be served.
pub trait CsiPlugin: Send + Sync + 'static {
    /// Routes for the Controller, Identity, and Node services.
    fn routes(self: Arc<Self>) -> Routes;
}

impl<T> CsiPlugin for T
where
    T: Controller + Identity + Node,
{
    fn routes(self: Arc<Self>) -> Routes {
        Routes::new(ControllerServer::from_arc(Arc::clone(&self)))
            .add_service(IdentityServer::from_arc(Arc::clone(&self)))
            .add_service(NodeServer::from_arc(self))
    }
}

/// Settings handed to a backend constructor.
#[derive(Debug, Clone, Default)]
pub struct PluginConfig {
    /// Identifier reported by `GetNodeID`.
    pub node_id: String,
    /// Directory the backend may use for its own state.
    pub data_dir: PathBuf,
    /// Backend-specific parameters.
    pub params: HashMap<String, String>,
}

type Factory =
    Arc<dyn Fn(PluginConfig) -> BoxFuture<'static, Result<Arc<dyn CsiPlugin>, CsiError>> + Send + Sync>;

/// Named backend constructors. Names are case-insensitive.
#[derive(Clone, Default)]
pub struct Registry {
    factories: HashMap<String, Factory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every backend shipped with this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(mock::NAME, |cfg| async move {
            Ok(Arc::new(mock::MockBackend::new(cfg.node_id)) as Arc<dyn CsiPlugin>)
        });
        registry.register(vfs::NAME, |cfg| async move {
            let backend = vfs::VfsBackend::new(cfg.data_dir, cfg.node_id);
            backend.recover().await?;
            Ok(Arc::new(backend) as Arc<dyn CsiPlugin>)
        });
        registry.register(nfs::NAME, |cfg| async move {
            Ok(Arc::new(nfs::NfsBackend::new(cfg.node_id, &cfg.params)) as Arc<dyn CsiPlugin>)
        });
        registry
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register<F, Fut>(&mut self, name: &str, factory: F)
    where
        F: Fn(PluginConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn CsiPlugin>, CsiError>> + Send + 'static,
    {
        let factory: Factory = Arc::new(move |cfg| Box::pin(factory(cfg)));
        self.factories.insert(name.to_ascii_lowercase(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct the backend registered under `name`.
    pub async fn build(&self, name: &str, config: PluginConfig) -> Result<Arc<dyn CsiPlugin>, CsiError> {
        let factory = self
            .factories
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| CsiError::UnknownBackend(name.to_owned()))?;
        factory(config).await
    }
}

// ---------------------------------------------------------------------------
// Mount point detection
// ---------------------------------------------------------------------------

/// Return `true` if `path` is currently listed as a mount point in
/// `/proc/self/mounts`.
///
/// Note: `/proc/self/mounts` uses octal escapes (`\040` for space, etc.).
/// Target paths must not contain whitespace, so direct string comparison is
/// safe here.
pub(crate) async fn is_mountpoint(path: &str) -> bool {
    let contents = match tokio::fs::read_to_string("/proc/self/mounts").await {
        Ok(c) => c,
        Err(_) => return false,
    };
    // Format: <device> <mountpoint> <fstype> <options> <dump> <pass>
    contents
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtin_names() {
        let registry = Registry::builtin();
        assert_eq!(registry.names(), vec!["mock", "nfs", "vfs"]);
        assert!(registry.contains("MOCK"));
        assert!(!registry.contains("ebs"));
    }

    #[tokio::test]
    async fn unknown_backend() {
        let registry = Registry::builtin();
        let err = registry
            .build("nope", PluginConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CsiError::UnknownBackend(name) if name == "nope"));
    }

    #[tokio::test]
    async fn custom_registration() {
        let mut registry = Registry::new();
        registry.register("custom", |cfg| async move {
            Ok(Arc::new(mock::MockBackend::new(cfg.node_id)) as Arc<dyn CsiPlugin>)
        });
        assert!(registry.build("Custom", PluginConfig::default()).await.is_ok());
    }

    #[tokio::test]
    async fn vfs_constructor_creates_nothing_until_used() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Registry::builtin();
        let cfg = PluginConfig {
            node_id: "n1".into(),
            data_dir: tmp.path().join("vfs"),
            params: HashMap::new(),
        };
        assert!(registry.build("vfs", cfg).await.is_ok());
    }

    #[tokio::test]
    async fn mountpoint_detection() {
        assert!(is_mountpoint("/").await);
        assert!(!is_mountpoint("/definitely/not/a/mount").await);
    }
}
