//! In-process listener/dialer pair.
//!
//! [`Pipe`] stands in for a socket between a client and a server living in
//! the same process. `dial` creates a duplex in-memory stream, queues the
//! server end for `accept`, and returns the client end. The pending queue
//! holds a single connection: one dial never waits, a second one waits until
//! the first is accepted.
//!
//! Three dialer adapters are provided:
//!
//! * [`Pipe::channel`]: a tonic [`Channel`] over a fresh pipe connection;
//! * [`Pipe::connector`]: a connector for hyper 1 clients (`hyper-util`);
//! * [`Pipe::legacy_connector`]: a connector for hyper 0.14 clients.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::Uri;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::error::CsiError;

/// Buffer size of each direction of a pipe connection.
const PIPE_BUFFER: usize = 64 * 1024;

/// Placeholder authority for clients that insist on a URI.
pub const PIPE_URI: &str = "http://csi.pipe";

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// One end of an in-memory connection.
#[derive(Debug)]
pub struct PipeStream {
    inner: DuplexStream,
}

impl AsyncRead for PipeStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for PipeStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl tonic::transport::server::Connected for PipeStream {
    type ConnectInfo = ();

    fn connect_info(&self) -> Self::ConnectInfo {}
}

/// A [`PipeStream`] speaking hyper 1's I/O traits.
pub struct PipeIo(TokioIo<PipeStream>);

impl hyper::rt::Read for PipeIo {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl hyper::rt::Write for PipeIo {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

impl hyper_util::client::legacy::connect::Connection for PipeIo {
    fn connected(&self) -> hyper_util::client::legacy::connect::Connected {
        hyper_util::client::legacy::connect::Connected::new()
    }
}

impl hyper014::client::connect::Connection for PipeStream {
    fn connected(&self) -> hyper014::client::connect::Connected {
        hyper014::client::connect::Connected::new()
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

struct Inner {
    pending_tx: mpsc::Sender<PipeStream>,
    pending_rx: Mutex<mpsc::Receiver<PipeStream>>,
    closed: CancellationToken,
}

/// In-memory listener; clones share the same queue.
#[derive(Clone)]
pub struct Pipe {
    inner: Arc<Inner>,
}

impl Default for Pipe {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipe {
    pub fn new() -> Self {
        let (pending_tx, pending_rx) = mpsc::channel(1);
        Self {
            inner: Arc::new(Inner {
                pending_tx,
                pending_rx: Mutex::new(pending_rx),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Wait for the next dialed connection.
    ///
    /// Fails with [`CsiError::Closed`] once [`Self::close`] has been called,
    /// even if a dialed connection is still queued.
    pub async fn accept(&self) -> Result<PipeStream, CsiError> {
        if self.inner.closed.is_cancelled() {
            return Err(CsiError::Closed);
        }
        let mut pending = tokio::select! {
            biased;
            _ = self.inner.closed.cancelled() => return Err(CsiError::Closed),
            guard = self.inner.pending_rx.lock() => guard,
        };
        tokio::select! {
            biased;
            _ = self.inner.closed.cancelled() => Err(CsiError::Closed),
            conn = pending.recv() => conn.ok_or(CsiError::Closed),
        }
    }

    /// Open a new connection and return its client end.
    pub async fn dial(&self) -> Result<PipeStream, CsiError> {
        if self.inner.closed.is_cancelled() {
            return Err(CsiError::Closed);
        }
        let (client, server) = tokio::io::duplex(PIPE_BUFFER);
        let server = PipeStream { inner: server };

        match self.inner.pending_tx.try_send(server) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(server)) => {
                debug!("pipe queue full, waiting for accept");
                tokio::select! {
                    biased;
                    _ = self.inner.closed.cancelled() => return Err(CsiError::Closed),
                    sent = self.inner.pending_tx.send(server) => {
                        sent.map_err(|_| CsiError::Closed)?;
                    }
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return Err(CsiError::Closed),
        }
        Ok(PipeStream { inner: client })
    }

    /// Stop the listener. Idempotent.
    pub fn close(&self) {
        if !self.inner.closed.is_cancelled() {
            debug!("pipe closed");
            self.inner.closed.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Accepted connections as a stream, ending when the pipe closes.
    pub fn incoming(self) -> impl futures::Stream<Item = Result<PipeStream, io::Error>> + Send {
        futures::stream::unfold(self, |pipe| async move {
            match pipe.accept().await {
                Ok(conn) => Some((Ok(conn), pipe)),
                Err(_) => None,
            }
        })
    }

    // -----------------------------------------------------------------------
    // Dialer adapters
    // -----------------------------------------------------------------------

    /// Connect a tonic channel over a fresh pipe connection.
    pub async fn channel(&self) -> Result<Channel, CsiError> {
        Endpoint::from_static(PIPE_URI)
            .connect_with_connector(self.connector())
            .await
            .map_err(CsiError::transport)
    }

    /// Connector for hyper 1 clients, also used by [`Self::channel`].
    pub fn connector(&self) -> PipeConnector {
        PipeConnector { pipe: self.clone() }
    }

    /// Connector for hyper 0.14 clients.
    pub fn legacy_connector(&self) -> LegacyPipeConnector {
        LegacyPipeConnector { pipe: self.clone() }
    }
}

fn dial_error(err: CsiError) -> io::Error {
    match err {
        CsiError::Closed => io::Error::new(io::ErrorKind::ConnectionRefused, err),
        other => io::Error::other(other),
    }
}

/// `tower::Service<Uri>` yielding hyper 1 I/O over the pipe.
#[derive(Clone)]
pub struct PipeConnector {
    pipe: Pipe,
}

impl tower::Service<Uri> for PipeConnector {
    type Response = PipeIo;
    type Error = io::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _uri: Uri) -> Self::Future {
        let pipe = self.pipe.clone();
        Box::pin(async move { pipe.dial().await.map(|s| PipeIo(TokioIo::new(s))).map_err(dial_error) })
    }
}

/// `tower::Service<Uri>` yielding tokio I/O for hyper 0.14 clients.
#[derive(Clone)]
pub struct LegacyPipeConnector {
    pipe: Pipe,
}

impl tower::Service<hyper014::Uri> for LegacyPipeConnector {
    type Response = PipeStream;
    type Error = io::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _uri: hyper014::Uri) -> Self::Future {
        let pipe = self.pipe.clone();
        Box::pin(async move { pipe.dial().await.map_err(dial_error) })
    }
}
