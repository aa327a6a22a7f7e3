//! rkvol agent configuration.
//!
//! Loaded from a YAML file, then overridden from the environment:
//!
//! - `RKVOL_HOST`: listening endpoint.
//! - `RKVOL_CSI_DRIVER`: registry name of the hosted CSI backend.
//! - `RKVOL_DISABLE_DOCKER_MUX`: `1`/`true`/`yes`/`on` serves gRPC only.
//! - `RKVOL_DOCKER_MOUNT_ROOT`: parent directory of Docker mount targets.
//! - `RKVOL_DOCKER_FS_TYPE`: filesystem requested for non-NFS mounts.
//! - `RKVOL_DOCKER_MODE`: `bridge` or `legacy`.
//! - `RKVOL_NFS_VOLUMES_FILE`: NFS mapping file.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, bail};
use libcsi::{PluginConfig, Registry};
use libdvp::BridgeConfig;
use libdvp::bridge::nfs::NfsSource;
use libdvp::bridge::{DEFAULT_FS_TYPE, DEFAULT_MOUNT_ROOT};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "unix:///run/docker/plugins/rkvol.sock";
pub const DEFAULT_DRIVER: &str = "vfs";
pub const DEFAULT_DATA_DIR: &str = "/var/lib/rkvol/data";

/// Storage platforms whose volumes cannot be served through the CSI bridge.
pub const FORCED_LEGACY_PLATFORMS: &[&str] = &["ebs", "efs", "s3fs"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub host: String,
    pub csi: CsiConfig,
    pub docker: DockerConfig,
    pub nfs: NfsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CsiConfig {
    pub driver: String,
    pub disable_docker_mux: bool,
    /// Backends that must be compiled in for the agent to start.
    pub plugins: Vec<String>,
    /// Reported by `GetNodeID`; the hostname when empty.
    pub node_id: String,
    pub data_dir: PathBuf,
    pub params: HashMap<String, String>,
}

impl Default for CsiConfig {
    fn default() -> Self {
        Self {
            driver: DEFAULT_DRIVER.to_owned(),
            disable_docker_mux: false,
            plugins: Vec::new(),
            node_id: String::new(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            params: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DockerMode {
    #[default]
    Bridge,
    Legacy,
}

impl FromStr for DockerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bridge" => Ok(Self::Bridge),
            "legacy" => Ok(Self::Legacy),
            other => bail!("docker mode must be bridge or legacy, got {other:?}"),
        }
    }
}

impl fmt::Display for DockerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bridge => "bridge",
            Self::Legacy => "legacy",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DockerConfig {
    pub mount_root: PathBuf,
    pub fs_type: String,
    pub mode: DockerMode,
    pub storage_platform: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from(DEFAULT_MOUNT_ROOT),
            fs_type: DEFAULT_FS_TYPE.to_owned(),
            mode: DockerMode::Bridge,
            storage_platform: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NfsConfig {
    /// Takes precedence over `volumes` when set.
    pub volumes_file: Option<PathBuf>,
    /// Inline `name=host:export` records.
    pub volumes: Vec<String>,
}

impl Config {
    /// Read `path` and apply defaults for missing keys.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default().with_defaults());
        }
        let config: Self = serde_yaml::from_str(raw)?;
        Ok(config.with_defaults())
    }

    fn with_defaults(mut self) -> Self {
        if self.host.is_empty() {
            self.host = DEFAULT_HOST.to_owned();
        }
        self
    }

    /// Apply `RKVOL_*` overrides from `vars`.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let value: String = value.into();
            match key.as_ref() {
                "RKVOL_HOST" => self.host = value,
                "RKVOL_CSI_DRIVER" => self.csi.driver = value,
                "RKVOL_DISABLE_DOCKER_MUX" => {
                    self.csi.disable_docker_mux =
                        parse_bool(&value).context("invalid RKVOL_DISABLE_DOCKER_MUX")?;
                }
                "RKVOL_DOCKER_MOUNT_ROOT" => self.docker.mount_root = PathBuf::from(value),
                "RKVOL_DOCKER_FS_TYPE" => self.docker.fs_type = value,
                "RKVOL_DOCKER_MODE" => {
                    self.docker.mode = value.parse::<DockerMode>().context("invalid RKVOL_DOCKER_MODE")?;
                }
                "RKVOL_NFS_VOLUMES_FILE" => {
                    self.nfs.volumes_file = (!value.is_empty()).then(|| PathBuf::from(value));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Check every named backend against `registry`.
    pub fn validate(&self, registry: &Registry) -> anyhow::Result<()> {
        if self.host.trim().is_empty() {
            bail!("host must not be empty");
        }
        if !registry.contains(&self.csi.driver) {
            bail!(
                "csi driver {:?} is not registered (available: {})",
                self.csi.driver,
                registry.names().join(", ")
            );
        }
        for plugin in &self.csi.plugins {
            if !registry.contains(plugin) {
                bail!("csi plugin {plugin:?} is not compiled into this build");
            }
        }
        Ok(())
    }

    /// The Docker mode after forcing legacy for incompatible platforms.
    pub fn effective_mode(&self) -> DockerMode {
        let platform = self.docker.storage_platform.trim();
        if FORCED_LEGACY_PLATFORMS
            .iter()
            .any(|p| p.eq_ignore_ascii_case(platform))
        {
            DockerMode::Legacy
        } else {
            self.docker.mode
        }
    }

    pub fn node_id(&self) -> String {
        if !self.csi.node_id.is_empty() {
            return self.csi.node_id.clone();
        }
        nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_owned())
    }

    pub fn plugin_config(&self) -> PluginConfig {
        PluginConfig {
            node_id: self.node_id(),
            data_dir: self.csi.data_dir.clone(),
            params: self.csi.params.clone(),
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        let nfs = match &self.nfs.volumes_file {
            Some(file) if !file.as_os_str().is_empty() => NfsSource::File(file.clone()),
            _ => NfsSource::Inline(self.nfs.volumes.clone()),
        };
        BridgeConfig {
            mount_root: self.docker.mount_root.clone(),
            fs_type: self.docker.fs_type.clone(),
            nfs,
        }
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}
