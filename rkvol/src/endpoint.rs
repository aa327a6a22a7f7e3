//! Listening endpoint resolution and binding.
//!
//! `unix:///path` and bare paths are Unix domain sockets, `tcp://host:port`
//! and bare `host:port` are TCP. Binding a Unix endpoint creates its parent
//! directory and removes a stale socket file first.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::Context as _;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl Endpoint {
    pub fn parse(host: &str) -> anyhow::Result<Self> {
        let host = host.trim();
        if let Some(path) = host.strip_prefix("unix://") {
            anyhow::ensure!(!path.is_empty(), "unix endpoint {host:?} has no path");
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = host.strip_prefix("tcp://") {
            anyhow::ensure!(!addr.is_empty(), "tcp endpoint {host:?} has no address");
            return Ok(Self::Tcp(addr.to_owned()));
        }
        anyhow::ensure!(!host.is_empty(), "endpoint must not be empty");
        if host.contains("://") {
            anyhow::bail!("unsupported endpoint scheme in {host:?}");
        }
        if host.starts_with('/') || host.starts_with('.') || !host.contains(':') {
            return Ok(Self::Unix(PathBuf::from(host)));
        }
        Ok(Self::Tcp(host.to_owned()))
    }

    /// Socket file to remove on shutdown.
    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            Self::Unix(path) => Some(path),
            Self::Tcp(_) => None,
        }
    }

    pub async fn bind(&self) -> anyhow::Result<Listener> {
        match self {
            Self::Unix(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
                match tokio::fs::remove_file(path).await {
                    Ok(()) => debug!(path = %path.display(), "removed stale socket"),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(e).with_context(|| format!("failed to remove stale socket {}", path.display()));
                    }
                }
                let listener = UnixListener::bind(path)
                    .with_context(|| format!("failed to bind {}", path.display()))?;
                info!(endpoint = %self, "listening");
                Ok(Listener::Unix(listener))
            }
            Self::Tcp(addr) => {
                let listener = TcpListener::bind(addr.as_str())
                    .await
                    .with_context(|| format!("failed to bind {addr}"))?;
                info!(endpoint = %self, "listening");
                Ok(Listener::Tcp(listener))
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

pub enum Listener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl Listener {
    pub async fn accept(&self) -> io::Result<Conn> {
        match self {
            Self::Unix(l) => l.accept().await.map(|(s, _)| Conn::Unix(s)),
            Self::Tcp(l) => l.accept().await.map(|(s, _)| Conn::Tcp(s)),
        }
    }

    /// Accepted connections as a stream. Accept errors are yielded, not
    /// fatal.
    pub fn incoming(self) -> impl Stream<Item = io::Result<Conn>> + Send {
        futures::stream::unfold(self, |listener| async move {
            let conn = listener.accept().await;
            Some((conn, listener))
        })
    }
}

/// An accepted connection.
#[derive(Debug)]
pub enum Conn {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl AsyncRead for Conn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Conn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Unix(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(s) => Pin::new(s).poll_flush(cx),
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

impl tonic::transport::server::Connected for Conn {
    type ConnectInfo = ();

    fn connect_info(&self) -> Self::ConnectInfo {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_endpoints() {
        assert_eq!(
            Endpoint::parse("unix:///run/rkvol.sock").unwrap(),
            Endpoint::Unix("/run/rkvol.sock".into())
        );
        assert_eq!(
            Endpoint::parse("/run/rkvol.sock").unwrap(),
            Endpoint::Unix("/run/rkvol.sock".into())
        );
        assert_eq!(Endpoint::parse("rkvol.sock").unwrap(), Endpoint::Unix("rkvol.sock".into()));
        assert_eq!(
            Endpoint::parse("tcp://0.0.0.0:7979").unwrap(),
            Endpoint::Tcp("0.0.0.0:7979".into())
        );
        assert_eq!(
            Endpoint::parse("127.0.0.1:7979").unwrap(),
            Endpoint::Tcp("127.0.0.1:7979".into())
        );
        assert!(Endpoint::parse("").is_err());
        assert!(Endpoint::parse("http://x").is_err());
    }

    #[tokio::test]
    async fn bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rkvol.sock");
        let endpoint = Endpoint::Unix(path.clone());

        let first = endpoint.bind().await.unwrap();
        drop(first);
        assert!(path.exists());

        let second = endpoint.bind().await.unwrap();
        let client = tokio::spawn({
            let path = path.clone();
            async move { UnixStream::connect(path).await }
        });
        second.accept().await.unwrap();
        client.await.unwrap().unwrap();
    }
}
