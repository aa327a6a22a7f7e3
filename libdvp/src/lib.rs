//! # libdvp: Docker Volume Plugin front end for CSI
//!
//! `libdvp` answers the Docker Volume Plugin HTTP protocol. The main driver,
//! [`Bridge`], turns each Docker verb into CSI calls against a
//! [`libcsi::CsiService`]; [`LegacyDriver`] serves platforms that are reached
//! through a storage service handle instead.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`api`] | Wire messages and endpoint paths. |
//! | [`driver`] | The [`VolumeDriver`] trait. |
//! | [`handler`] | axum routes and the per-connection HTTP/1 + HTTP/2 server. |
//! | [`bridge`] | The CSI bridge: volume cache, mount reference counts, NFS mappings. |
//! | [`legacy`] | [`LegacyDriver`] over a [`StorageService`]. |
//! | [`error`] | [`DriverError`]. |

pub mod api;
pub mod bridge;
pub mod driver;
pub mod error;
pub mod handler;
pub mod legacy;

pub use bridge::{Bridge, BridgeConfig, Flavor};
pub use driver::VolumeDriver;
pub use error::DriverError;
pub use legacy::{LegacyDriver, StorageService, StorageVolume};
