//! Connection multiplexer.
//!
//! One listener serves both the Docker plugin API and CSI gRPC. Each accepted
//! connection is sniffed (see [`sniff`]) and handed to exactly one lane:
//! HTTP/1, gRPC-over-HTTP/2 or generic HTTP/2. A lane is an `mpsc` receiver
//! that the owning server drains; dropping a receiver closes its lane.

pub mod sniff;
pub mod stream;

use std::sync::Arc;

use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::endpoint::{Conn, Listener};
pub use sniff::Lane;
pub use stream::SniffedStream;

const LANE_BACKLOG: usize = 64;

/// Receivers for each classified lane.
pub struct Lanes {
    pub http1: mpsc::Receiver<SniffedStream>,
    pub grpc: mpsc::Receiver<SniffedStream>,
    pub http2: mpsc::Receiver<SniffedStream>,
}

#[derive(Clone)]
struct Senders {
    http1: mpsc::Sender<SniffedStream>,
    grpc: mpsc::Sender<SniffedStream>,
    http2: mpsc::Sender<SniffedStream>,
}

impl Senders {
    fn for_lane(&self, lane: Lane) -> &mpsc::Sender<SniffedStream> {
        match lane {
            Lane::Http1 => &self.http1,
            Lane::Grpc => &self.grpc,
            Lane::Http2 => &self.http2,
        }
    }
}

pub struct Mux {
    listener: Listener,
    senders: Senders,
}

impl Mux {
    pub fn new(listener: Listener) -> (Self, Lanes) {
        let (http1_tx, http1) = mpsc::channel(LANE_BACKLOG);
        let (grpc_tx, grpc) = mpsc::channel(LANE_BACKLOG);
        let (http2_tx, http2) = mpsc::channel(LANE_BACKLOG);
        let mux = Self {
            listener,
            senders: Senders {
                http1: http1_tx,
                grpc: grpc_tx,
                http2: http2_tx,
            },
        };
        (mux, Lanes { http1, grpc, http2 })
    }

    /// Accept and classify connections until `shutdown` fires.
    ///
    /// Returning drops the senders, which ends every lane stream.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("connection multiplexer started");
        let senders = Arc::new(self.senders);
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok(conn) => {
                    let senders = Arc::clone(&senders);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = shutdown.cancelled() => {}
                            _ = route(conn, &senders) => {}
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
        info!("connection multiplexer stopped");
    }
}

async fn route(mut conn: Conn, senders: &Senders) {
    let mut buf = BytesMut::new();
    let lane = match tokio::time::timeout(sniff::SNIFF_TIMEOUT, sniff::classify(&mut conn, &mut buf)).await {
        Ok(Ok(lane)) => lane,
        Ok(Err(e)) => {
            debug!(error = %e, "dropping unclassifiable connection");
            return;
        }
        Err(_) => {
            debug!("dropping connection that stalled before its first request");
            return;
        }
    };
    debug!(?lane, buffered = buf.len(), "connection classified");
    let stream = SniffedStream::new(lane, buf.freeze(), conn);
    if senders.for_lane(lane).send(stream).await.is_err() {
        debug!(?lane, "lane closed, dropping connection");
    }
}
