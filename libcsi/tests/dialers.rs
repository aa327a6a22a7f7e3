//! Plain HTTP clients of both hyper generations reaching a server that
//! listens on a [`Pipe`].

use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use libcsi::Pipe;

fn serve_http(pipe: Pipe) {
    tokio::spawn(async move {
        while let Ok(stream) = pipe.accept().await {
            tokio::spawn(async move {
                let service = service_fn(|req: hyper::Request<Incoming>| async move {
                    let body = format!("hello from {}", req.uri().path());
                    Ok::<_, Infallible>(hyper::Response::new(Full::new(Bytes::from(body))))
                });
                let _ = auto::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });
}

#[tokio::test]
async fn hyper1_client_over_pipe() {
    let pipe = Pipe::new();
    serve_http(pipe.clone());

    let client = Client::builder(TokioExecutor::new()).build::<_, Empty<Bytes>>(pipe.connector());
    let response = client
        .get(http::Uri::from_static("http://csi.pipe/status"))
        .await
        .unwrap();
    assert_eq!(response.status(), http::StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"hello from /status");

    pipe.close();
}

#[tokio::test]
async fn hyper014_client_over_pipe() {
    let pipe = Pipe::new();
    serve_http(pipe.clone());

    let client = hyper014::Client::builder().build::<_, hyper014::Body>(pipe.legacy_connector());
    let response = client
        .get(hyper014::Uri::from_static("http://csi.pipe/legacy"))
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body = hyper014::body::to_bytes(response.into_body()).await.unwrap();
    assert_eq!(&body[..], b"hello from /legacy");

    pipe.close();
}

#[tokio::test]
async fn closed_pipe_refuses_clients() {
    let pipe = Pipe::new();
    pipe.close();

    let client = Client::builder(TokioExecutor::new()).build::<_, Empty<Bytes>>(pipe.connector());
    assert!(
        client
            .get(http::Uri::from_static("http://csi.pipe/"))
            .await
            .is_err()
    );
    assert!(pipe.channel().await.is_err());
}
