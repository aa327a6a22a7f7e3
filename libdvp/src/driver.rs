//! The Docker Volume Plugin contract.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::api::{Capabilities, Volume};
use crate::error::DriverError;

/// Operations behind the `/VolumeDriver.*` endpoints.
///
/// `caller` on mount and unmount is the Docker-supplied `ID`; drivers may use
/// it for logging only, reference counting is per target path.
#[async_trait]
pub trait VolumeDriver: Send + Sync + 'static {
    async fn create(&self, name: &str, opts: &HashMap<String, String>) -> Result<(), DriverError>;

    async fn remove(&self, name: &str) -> Result<(), DriverError>;

    /// Host path of a mounted volume.
    async fn path(&self, name: &str) -> Result<String, DriverError>;

    /// Mount the volume and return its host path.
    async fn mount(&self, name: &str, caller: &str) -> Result<String, DriverError>;

    async fn unmount(&self, name: &str, caller: &str) -> Result<(), DriverError>;

    async fn get(&self, name: &str) -> Result<Volume, DriverError>;

    async fn list(&self) -> Result<Vec<Volume>, DriverError>;

    fn capabilities(&self) -> Capabilities {
        Capabilities::global()
    }
}
