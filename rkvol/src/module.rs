//! Agent module lifecycle.
//!
//! [`Module::start`] brings the agent up in a fixed order: the hosted CSI
//! backend on its in-process pipe, the public listener, the CSI gRPC server,
//! then (when multiplexing) the Docker plugin servers, the cache-warming task
//! and finally the multiplexer accept loop. [`RunningModule::stop`] tears it
//! down in reverse behind one cancellation token.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use futures::StreamExt;
use libcsi::transport::server::serve_routes;
use libcsi::{CsiError, CsiPlugin, CsiService, Registry};
use libdvp::handler;
use libdvp::{Bridge, LegacyDriver, StorageService, VolumeDriver};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, DockerMode};
use crate::endpoint::Endpoint;
use crate::mux::{Lanes, Mux};

/// Time the gRPC server gets to drain in-flight calls on stop.
pub const GRPC_GRACE: Duration = Duration::from_secs(10);

/// Delay between cache-warming attempts.
pub const WARM_INTERVAL: Duration = Duration::from_secs(1);

pub struct Module {
    config: Config,
    registry: Registry,
    storage: Option<Arc<dyn StorageService>>,
}

impl Module {
    pub fn new(config: Config, registry: Registry) -> Self {
        Self {
            config,
            registry,
            storage: None,
        }
    }

    /// Storage handle served by the legacy Docker driver.
    pub fn with_storage_service(mut self, storage: Arc<dyn StorageService>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub async fn start(self) -> anyhow::Result<RunningModule> {
        let endpoint = Endpoint::parse(&self.config.host)?;
        let mux_enabled = !self.config.csi.disable_docker_mux;
        let mode = self.config.effective_mode();
        if mux_enabled && mode == DockerMode::Legacy && self.storage.is_none() {
            bail!("docker legacy mode needs a storage service handle");
        }

        let csi = CsiService::new(&self.config.csi.driver, &self.registry, self.config.plugin_config())
            .await
            .with_context(|| format!("failed to construct csi driver {}", self.config.csi.driver))?;
        let csi = Arc::new(csi);
        csi.serve().context("failed to serve csi backend")?;

        match self.launch(endpoint, Arc::clone(&csi), mux_enabled, mode).await {
            Ok(running) => Ok(running),
            Err(e) => {
                csi.graceful_stop().await;
                Err(e)
            }
        }
    }

    async fn launch(
        self,
        endpoint: Endpoint,
        csi: Arc<CsiService>,
        mux_enabled: bool,
        mode: DockerMode,
    ) -> anyhow::Result<RunningModule> {
        let shutdown = CancellationToken::new();
        let mut tasks = Vec::new();

        let driver: Option<Arc<dyn VolumeDriver>> = if !mux_enabled {
            None
        } else {
            match (mode, self.storage) {
                (DockerMode::Legacy, Some(storage)) => Some(Arc::new(LegacyDriver::new(storage))),
                (DockerMode::Legacy, None) => bail!("docker legacy mode needs a storage service handle"),
                (DockerMode::Bridge, _) => {
                    let bridge = Bridge::new(Arc::clone(&csi), self.config.bridge_config())
                        .await
                        .context("failed to initialize docker bridge")?;
                    Some(Arc::new(bridge))
                }
            }
        };

        let listener = endpoint.bind().await?;
        let routes = Arc::clone(&csi).routes();

        let grpc = if let Some(driver) = driver {
            let (mux, lanes) = Mux::new(listener);
            let Lanes { http1, grpc, http2 } = lanes;

            let incoming = ReceiverStream::new(grpc).map(Ok::<_, io::Error>);
            let grpc = tokio::spawn(serve_routes("csi", routes, incoming, shutdown.clone()));

            let router = handler::router(Arc::clone(&driver));
            tasks.push(tokio::spawn(handler::serve(
                "http1",
                router.clone(),
                ReceiverStream::new(http1),
                shutdown.clone(),
            )));
            tasks.push(tokio::spawn(handler::serve(
                "http2",
                router,
                ReceiverStream::new(http2),
                shutdown.clone(),
            )));

            if mode == DockerMode::Bridge {
                tasks.push(tokio::spawn(warm_cache(driver, shutdown.clone())));
            }
            tasks.push(tokio::spawn(mux.run(shutdown.clone())));
            grpc
        } else {
            tokio::spawn(serve_routes("csi", routes, listener.incoming(), shutdown.clone()))
        };

        info!(
            endpoint = %endpoint,
            driver = csi.name(),
            docker = mux_enabled,
            mode = %mode,
            "rkvol module started"
        );
        Ok(RunningModule {
            endpoint,
            csi,
            shutdown,
            tasks,
            grpc,
        })
    }
}

/// Call `List` until it succeeds once so the bridge cache is populated.
async fn warm_cache(driver: Arc<dyn VolumeDriver>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(WARM_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }
        match driver.list().await {
            Ok(volumes) => {
                info!(volumes = volumes.len(), "volume cache warmed");
                return;
            }
            Err(e) => debug!(error = %e, "cache warming attempt failed"),
        }
    }
}

pub struct RunningModule {
    endpoint: Endpoint,
    csi: Arc<CsiService>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    grpc: JoinHandle<Result<(), CsiError>>,
}

impl fmt::Debug for RunningModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningModule")
            .field("endpoint", &self.endpoint)
            .field("driver", &self.csi.name())
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl RunningModule {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn csi(&self) -> &Arc<CsiService> {
        &self.csi
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "module task failed");
            }
        }

        let mut grpc = self.grpc;
        match tokio::time::timeout(GRPC_GRACE, &mut grpc).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(error = %e, "csi grpc server exited with error"),
            Ok(Err(e)) => warn!(error = %e, "csi grpc server task failed"),
            Err(_) => {
                warn!("csi grpc server did not drain in time, aborting");
                grpc.abort();
            }
        }
        self.csi.graceful_stop().await;

        if let Some(path) = self.endpoint.socket_path() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove socket"),
            }
        }
        info!(endpoint = %self.endpoint, "rkvol module stopped");
    }
}
