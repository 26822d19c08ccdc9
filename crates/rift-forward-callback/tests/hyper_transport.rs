//! Integration tests for `HyperTransport` against a local hyper server.

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use rift_forward_callback::{
    DiagnosticKind, ExtensionRegistry, ExtensionResolver, ExtensionType, ForwardConfig,
    ForwardPipeline, HttpRequest, HyperTransport, RequestTransform, Scheme, SocketAddress,
    Transport, TransportError,
};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Echoes what it received back in headers and body.
async fn echo(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();

    let mut builder = Response::builder()
        .status(200)
        .header("x-echo-method", parts.method.as_str())
        .header("x-echo-uri", parts.uri.to_string());
    if let Some(auth) = parts.headers.get("authorization") {
        builder = builder.header("x-echo-auth", auth.clone());
    }
    if let Some(host) = parts.headers.get("host") {
        builder = builder.header("x-echo-host", host.clone());
    }
    Ok(builder.body(Full::new(body)).unwrap())
}

async fn spawn_upstream<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(Request<Incoming>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<Response<Full<Bytes>>, Infallible>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service_fn(handler))
                    .await;
            });
        }
    });
    addr
}

/// A port nothing is listening on.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn test_config() -> ForwardConfig {
    ForwardConfig {
        tls_skip_verify: true,
        ..ForwardConfig::default()
    }
}

fn local(port: u16) -> SocketAddress {
    SocketAddress::new("127.0.0.1", port, Scheme::Http)
}

#[derive(Default)]
struct AddAuthHeader;

impl RequestTransform for AddAuthHeader {
    fn transform_request(&self, request: &HttpRequest) -> anyhow::Result<HttpRequest> {
        Ok(request.clone().with_header("Authorization", "Bearer forwarded"))
    }
}

// ============================================
// Transport round trips
// ============================================

#[tokio::test]
async fn test_round_trip_get() {
    let addr = spawn_upstream(echo).await;
    let transport = HyperTransport::new(&test_config()).unwrap();

    let request = HttpRequest::get("/orders")
        .with_query("id=7")
        .with_socket_address(local(addr.port()));
    let response = transport.send(request, None).unwrap().await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.header("x-echo-method"), Some("GET"));
    assert_eq!(response.header("x-echo-uri"), Some("/orders?id=7"));
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_round_trip_post_body() {
    let addr = spawn_upstream(echo).await;
    let transport = HyperTransport::new(&test_config()).unwrap();

    let request = HttpRequest::post("/submit")
        .with_header("Content-Length", "999")
        .with_body("payload")
        .with_socket_address(local(addr.port()));
    let response = transport.send(request, None).unwrap().await.unwrap();

    assert_eq!(response.header("x-echo-method"), Some("POST"));
    assert_eq!(response.body_str(), "payload");
}

#[tokio::test]
async fn test_host_header_selects_upstream() {
    let addr = spawn_upstream(echo).await;
    let transport = HyperTransport::new(&test_config()).unwrap();

    let request = HttpRequest::get("/").with_header("Host", format!("127.0.0.1:{}", addr.port()));
    let response = transport.send(request, None).unwrap().await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(
        response.header("x-echo-host"),
        Some(format!("127.0.0.1:{}", addr.port()).as_str())
    );
}

#[tokio::test]
async fn test_repeated_response_headers_survive() {
    let addr = spawn_upstream(|_req| async {
        Ok::<_, Infallible>(
            Response::builder()
                .status(200)
                .header("set-cookie", "a=1")
                .header("set-cookie", "b=2")
                .body(Full::new(Bytes::from("ok")))
                .unwrap(),
        )
    })
    .await;
    let transport = HyperTransport::new(&test_config()).unwrap();

    let request = HttpRequest::get("/login").with_socket_address(local(addr.port()));
    let response = transport.send(request, None).unwrap().await.unwrap();

    assert_eq!(
        response.header_values("Set-Cookie").collect::<Vec<_>>(),
        vec!["a=1", "b=2"]
    );
    assert_eq!(response.body_str(), "ok");
}

// ============================================
// Transport failures
// ============================================

#[tokio::test]
async fn test_missing_destination_fails_to_start() {
    let transport = HyperTransport::new(&test_config()).unwrap();
    let result = transport.send(HttpRequest::get("/"), None);
    assert!(matches!(result, Err(TransportError::InvalidRequest(_))));
}

#[tokio::test]
async fn test_connection_refused_is_connect_error() {
    let port = closed_port().await;
    let transport = HyperTransport::new(&test_config()).unwrap();

    let request = HttpRequest::get("/").with_socket_address(local(port));
    let err = transport.send(request, None).unwrap().await.unwrap_err();

    assert!(matches!(err, TransportError::Connect(_)), "got {err:?}");
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let addr = spawn_upstream(|req| async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        echo(req).await
    })
    .await;
    let transport = HyperTransport::new(&test_config()).unwrap();

    let request = HttpRequest::get("/slow").with_socket_address(local(addr.port()));
    let err = transport
        .send(request, Some(Duration::from_millis(50)))
        .unwrap()
        .await
        .unwrap_err();

    assert_eq!(err, TransportError::Timeout(Duration::from_millis(50)));
}

// ============================================
// Pipeline over the hyper transport
// ============================================

#[tokio::test]
async fn test_pipeline_forwards_rewritten_request() {
    let addr = spawn_upstream(echo).await;
    let registry = Arc::new(ExtensionRegistry::new());
    registry.register(
        ExtensionType::builder::<AddAuthHeader>("org.example.AddAuthHeader")
            .request_transform()
            .default_constructor()
            .build(),
    );
    let (pipeline, events) =
        ForwardPipeline::from_config(&test_config(), ExtensionResolver::new(registry)).unwrap();

    let request = HttpRequest::get("/secure").with_socket_address(local(addr.port()));
    let outcome = pipeline
        .forward(&"org.example.AddAuthHeader".into(), Some(request))
        .await;

    let response = outcome.into_response().unwrap();
    assert_eq!(response.header("x-echo-auth"), Some("Bearer forwarded"));
    assert_eq!(response.header("x-echo-uri"), Some("/secure"));
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_pipeline_unreachable_upstream_is_not_found() {
    let port = closed_port().await;
    let (pipeline, events) = ForwardPipeline::from_config(
        &test_config(),
        ExtensionResolver::new(Arc::new(ExtensionRegistry::new())),
    )
    .unwrap();

    let request = HttpRequest::get("/").with_socket_address(local(port));
    let outcome = pipeline
        .forward(&"org.example.Missing".into(), Some(request))
        .await;

    assert!(outcome.is_not_found());
    assert_eq!(
        events.events_of_kind(DiagnosticKind::ForwardAttemptFailed).len(),
        1
    );
}
