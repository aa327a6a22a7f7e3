//! HTTP front end of a [`VolumeDriver`].
//!
//! Every endpoint is a `POST` whose body is decoded by hand: Docker sends
//! `application/vnd.docker.plugins.v1.2+json`, sometimes with an empty body.
//! Driver failures become `500 {"Err": "..."}`; an undecodable body becomes
//! `400`.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{
    self, ActivateResponse, CapabilitiesResponse, CreateRequest, ErrResponse, GetResponse,
    ListResponse, MountRequest, MountpointResponse, NameRequest, path,
};
use crate::driver::VolumeDriver;
use crate::error::DriverError;

type Driver = State<Arc<dyn VolumeDriver>>;

/// Routes for every Docker Volume Plugin endpoint.
pub fn router(driver: Arc<dyn VolumeDriver>) -> Router {
    Router::new()
        .route(path::ACTIVATE, post(activate))
        .route(path::CREATE, post(create))
        .route(path::REMOVE, post(remove))
        .route(path::PATH, post(mount_path))
        .route(path::MOUNT, post(mount))
        .route(path::UNMOUNT, post(unmount))
        .route(path::GET, post(get))
        .route(path::LIST, post(list))
        .route(path::CAPABILITIES, post(capabilities))
        .with_state(driver)
}

/// Serve one connection, HTTP/1 or HTTP/2, until the peer goes away.
pub async fn serve_connection<IO>(router: Router, io: IO)
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = TowerToHyperService::new(router);
    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(io), service)
        .await
    {
        debug!(error = %e, "docker plugin connection ended with error");
    }
}

/// Accept connections from `incoming` until it ends or `shutdown` fires.
pub async fn serve<S, IO>(name: &'static str, router: Router, mut incoming: S, shutdown: CancellationToken)
where
    S: Stream<Item = IO> + Unpin + Send,
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    info!(lane = name, "docker plugin server started");
    loop {
        let conn = tokio::select! {
            _ = shutdown.cancelled() => break,
            conn = incoming.next() => conn,
        };
        let Some(conn) = conn else { break };
        tokio::spawn(serve_connection(router.clone(), conn));
    }
    info!(lane = name, "docker plugin server stopped");
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// A JSON body sent with the plugin content type.
struct Reply<T>(T);

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(body) => ([(header::CONTENT_TYPE, api::CONTENT_TYPE)], body).into_response(),
            Err(e) => HandlerError::internal(e.to_string()).into_response(),
        }
    }
}

#[derive(Debug)]
struct HandlerError {
    status: StatusCode,
    message: String,
}

impl HandlerError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<DriverError> for HandlerError {
    fn from(err: DriverError) -> Self {
        warn!(error = %err, "volume driver call failed");
        Self::internal(err.to_string())
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let body = serde_json::to_vec(&ErrResponse { err: self.message }).unwrap_or_default();
        (self.status, [(header::CONTENT_TYPE, api::CONTENT_TYPE)], body).into_response()
    }
}

fn decode<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, HandlerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| HandlerError::bad_request(format!("malformed request body: {e}")))
}

type Handled<T> = Result<Reply<T>, HandlerError>;

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

async fn activate() -> Reply<ActivateResponse> {
    Reply(ActivateResponse {
        implements: vec![api::VOLUME_DRIVER.to_owned()],
    })
}

async fn create(State(driver): Driver, body: Bytes) -> Handled<ErrResponse> {
    let req: CreateRequest = decode(&body)?;
    driver.create(&req.name, &req.opts.unwrap_or_default()).await?;
    Ok(Reply(ErrResponse::default()))
}

async fn remove(State(driver): Driver, body: Bytes) -> Handled<ErrResponse> {
    let req: NameRequest = decode(&body)?;
    driver.remove(&req.name).await?;
    Ok(Reply(ErrResponse::default()))
}

async fn mount_path(State(driver): Driver, body: Bytes) -> Handled<MountpointResponse> {
    let req: NameRequest = decode(&body)?;
    let mountpoint = driver.path(&req.name).await?;
    Ok(Reply(MountpointResponse {
        mountpoint,
        err: String::new(),
    }))
}

async fn mount(State(driver): Driver, body: Bytes) -> Handled<MountpointResponse> {
    let req: MountRequest = decode(&body)?;
    let mountpoint = driver.mount(&req.name, &req.id).await?;
    Ok(Reply(MountpointResponse {
        mountpoint,
        err: String::new(),
    }))
}

async fn unmount(State(driver): Driver, body: Bytes) -> Handled<ErrResponse> {
    let req: MountRequest = decode(&body)?;
    driver.unmount(&req.name, &req.id).await?;
    Ok(Reply(ErrResponse::default()))
}

async fn get(State(driver): Driver, body: Bytes) -> Handled<GetResponse> {
    let req: NameRequest = decode(&body)?;
    let volume = driver.get(&req.name).await?;
    Ok(Reply(GetResponse {
        volume: Some(volume),
        err: String::new(),
    }))
}

async fn list(State(driver): Driver) -> Handled<ListResponse> {
    let volumes = driver.list().await?;
    Ok(Reply(ListResponse {
        volumes,
        err: String::new(),
    }))
}

async fn capabilities(State(driver): Driver) -> Reply<CapabilitiesResponse> {
    Reply(CapabilitiesResponse {
        capabilities: driver.capabilities(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use parking_lot::Mutex;
    use tower::ServiceExt;

    use super::*;
    use crate::api::Volume;

    #[derive(Default)]
    struct Recorder {
        created: Mutex<Vec<(String, HashMap<String, String>)>>,
    }

    #[async_trait]
    impl VolumeDriver for Recorder {
        async fn create(&self, name: &str, opts: &HashMap<String, String>) -> Result<(), DriverError> {
            self.created.lock().push((name.to_owned(), opts.clone()));
            Ok(())
        }

        async fn remove(&self, name: &str) -> Result<(), DriverError> {
            Err(DriverError::NotFound(name.to_owned()))
        }

        async fn path(&self, name: &str) -> Result<String, DriverError> {
            Err(DriverError::NotMounted(name.to_owned()))
        }

        async fn mount(&self, name: &str, _caller: &str) -> Result<String, DriverError> {
            Ok(format!("/mnt/{name}"))
        }

        async fn unmount(&self, _name: &str, _caller: &str) -> Result<(), DriverError> {
            Ok(())
        }

        async fn get(&self, name: &str) -> Result<Volume, DriverError> {
            Ok(Volume {
                name: name.to_owned(),
                ..Default::default()
            })
        }

        async fn list(&self) -> Result<Vec<Volume>, DriverError> {
            Ok(vec![])
        }
    }

    async fn call(router: Router, uri: &str, body: &'static str) -> (StatusCode, serde_json::Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, api::CONTENT_TYPE)
            .body(Body::from(body))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn activate_advertises_volume_driver() {
        let router = router(Arc::new(Recorder::default()));
        let (status, body) = call(router, path::ACTIVATE, "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"Implements": ["VolumeDriver"]}));
    }

    #[tokio::test]
    async fn create_passes_options() {
        let driver = Arc::new(Recorder::default());
        let router = router(driver.clone());
        let (status, body) = call(router, path::CREATE, r#"{"Name":"v1","Opts":{"size":"10"}}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["Err"], "");
        let created = driver.created.lock();
        assert_eq!(created[0].0, "v1");
        assert_eq!(created[0].1["size"], "10");
    }

    #[tokio::test]
    async fn driver_errors_are_500_with_err() {
        let router = router(Arc::new(Recorder::default()));
        let (status, body) = call(router, path::PATH, r#"{"Name":"v1"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["Err"], "volume v1 is not mounted");
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let router = router(Arc::new(Recorder::default()));
        let (status, body) = call(router, path::MOUNT, "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["Err"].as_str().unwrap().starts_with("malformed request body"));
    }

    #[tokio::test]
    async fn mount_and_capabilities() {
        let router = router(Arc::new(Recorder::default()));
        let (_, body) = call(router.clone(), path::MOUNT, r#"{"Name":"v1","ID":"c1"}"#).await;
        assert_eq!(body["Mountpoint"], "/mnt/v1");

        let (_, body) = call(router, path::CAPABILITIES, "{}").await;
        assert_eq!(body, serde_json::json!({"Capabilities": {"Scope": "global"}}));
    }
}
