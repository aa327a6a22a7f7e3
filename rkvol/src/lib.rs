//! # rkvol: storage agent
//!
//! Hosts one CSI backend and exposes it on a single endpoint, together with
//! the Docker Volume Plugin API when multiplexing is enabled.
//!
//! | Module | Purpose |
//! |---|---|
//! | [`config`] | YAML configuration with `RKVOL_*` overrides. |
//! | [`endpoint`] | Endpoint parsing, binding, accepted connections. |
//! | [`mux`] | Per-connection protocol sniffing and lane dispatch. |
//! | [`module`] | Start and stop of the whole agent. |

pub mod config;
pub mod endpoint;
pub mod module;
pub mod mux;

pub use config::Config;
pub use module::{Module, RunningModule};
