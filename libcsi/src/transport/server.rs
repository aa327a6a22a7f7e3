//! gRPC serve loop shared by the facade and the agent's CSI listener.

use std::io;

use futures::Stream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tonic::service::Routes;
use tonic::transport::Server;
use tonic::transport::server::Connected;
use tracing::{debug, info};

use crate::error::CsiError;

/// Serve `routes` on every connection yielded by `incoming` until `shutdown`
/// fires or the stream ends.
///
/// Shutdown is graceful: in-flight calls complete before this returns.
pub async fn serve_routes<I, IO>(
    name: &'static str,
    routes: Routes,
    incoming: I,
    shutdown: CancellationToken,
) -> Result<(), CsiError>
where
    I: Stream<Item = Result<IO, io::Error>> + Send + 'static,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IO::ConnectInfo: Clone + Send + Sync + 'static,
{
    info!(server = name, "csi grpc server starting");
    Server::builder()
        .add_routes(routes)
        .serve_with_incoming_shutdown(incoming, shutdown.cancelled_owned())
        .await
        .map_err(CsiError::transport)?;
    debug!(server = name, "csi grpc server stopped");
    Ok(())
}
