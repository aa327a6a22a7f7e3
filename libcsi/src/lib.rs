//! # libcsi: CSI 0.0 plumbing for the rkvol storage agent
//!
//! `libcsi` hosts a [Container Storage Interface][csi] backend inside the
//! agent process and lets callers reach it over gRPC without a socket. The
//! generated tonic services carry CSI's 0.0 wire contract, where every
//! response holds either a result or an embedded, per-RPC error.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`proto`] | Prost messages and generated Controller/Identity/Node services. |
//! | [`types`] | Method names, reply helpers, identity and capability helpers. |
//! | [`error`] | [`CsiError`] and the benign-error classification. |
//! | [`transport`] | In-process [`Pipe`], the checked [`CsiConn`] client, route serving. |
//! | [`backend`] | Compiled-in backends (mock, vfs, nfs) and their [`Registry`]. |
//! | [`service`] | [`CsiService`], the facade that hosts and forwards to a backend. |
//!
//! [csi]: https://github.com/container-storage-interface/spec

pub mod backend;
pub mod error;
pub mod proto;
pub mod service;
pub mod transport;
pub mod types;

pub use backend::{CsiPlugin, PluginConfig, Registry};
pub use error::CsiError;
pub use service::CsiService;
pub use transport::client::CsiConn;
pub use transport::pipe::Pipe;
pub use types::*;
