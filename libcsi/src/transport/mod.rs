//! Transports for CSI traffic.
//!
//! [`pipe`] provides the in-process listener used between the Docker bridge
//! and the hosted backend, [`client`] the checked client, and [`server`] the
//! gRPC serve loop.

pub mod client;
pub mod pipe;
pub mod server;
