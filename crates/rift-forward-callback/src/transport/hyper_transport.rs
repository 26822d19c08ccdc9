//! `Transport` implementation on the shared hyper client.

use super::client::{create_http_client, HttpClient};
use super::{error_chain, ResponseFuture, Transport, TransportError};
use crate::config::ForwardConfig;
use crate::metrics;
use crate::model::{Headers, HttpRequest, HttpResponse, Scheme};
use futures::FutureExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Method, Request, Uri};
use std::convert::Infallible;
use std::error::Error as StdError;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Request headers not copied upstream; hyper derives them from the URI and body.
const SKIPPED_REQUEST_HEADERS: [&str; 2] = ["host", "content-length"];

/// Hop-by-hop response headers dropped before the response is handed back.
const HOP_BY_HOP_RESPONSE_HEADERS: [&str; 3] = ["transfer-encoding", "connection", "keep-alive"];

/// Forwards requests with a pooled hyper client.
#[derive(Clone)]
pub struct HyperTransport {
    client: HttpClient,
    default_timeout: Option<Duration>,
}

impl HyperTransport {
    pub fn new(config: &ForwardConfig) -> anyhow::Result<Self> {
        let client = create_http_client(&config.connection_pool, config.tls_skip_verify)?;
        Ok(Self::with_client(client, config.request_timeout()))
    }

    pub fn with_client(client: HttpClient, default_timeout: Option<Duration>) -> Self {
        Self {
            client,
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }
}

/// Base URI (`scheme://authority`) of the upstream for `request`.
///
/// An explicit socket address wins; otherwise the `Host` header is used with
/// the scheme the request arrived on.
fn upstream_base(request: &HttpRequest) -> Result<String, TransportError> {
    if let Some(address) = &request.socket_address {
        return Ok(address.base_uri());
    }

    let host = request
        .header("host")
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| {
            TransportError::InvalidRequest(
                "request has neither a socket address nor a Host header".to_string(),
            )
        })?;
    let scheme = if request.secure {
        Scheme::Https
    } else {
        Scheme::Http
    };
    Ok(format!("{}://{}", scheme.as_str(), host))
}

/// Translate an [`HttpRequest`] into a hyper request ready for the client.
pub fn build_upstream_request(
    request: &HttpRequest,
) -> Result<Request<BoxBody<Bytes, hyper::Error>>, TransportError> {
    let method = Method::from_bytes(request.method.to_uppercase().as_bytes()).map_err(|_| {
        TransportError::InvalidRequest(format!("invalid method '{}'", request.method))
    })?;

    let path_and_query = request.path_and_query();
    let path_and_query = if path_and_query.starts_with('/') {
        path_and_query
    } else {
        format!("/{path_and_query}")
    };
    let full_uri = format!("{}{}", upstream_base(request)?, path_and_query);
    let uri: Uri = full_uri
        .parse()
        .map_err(|e| TransportError::InvalidRequest(format!("invalid uri '{full_uri}': {e}")))?;

    let mut builder = Request::builder().method(method).uri(uri);
    for (key, value) in &request.headers {
        if SKIPPED_REQUEST_HEADERS
            .iter()
            .any(|skipped| key.eq_ignore_ascii_case(skipped))
        {
            continue;
        }
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            TransportError::InvalidRequest(format!("invalid header name '{key}'"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            TransportError::InvalidRequest(format!("invalid value for header '{key}'"))
        })?;
        builder = builder.header(name, value);
    }

    builder
        .body(BoxBody::new(
            Full::new(Bytes::from(request.body.clone())).map_err(|never: Infallible| match never {}),
        ))
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))
}

/// Whether hyper gave up on the call before it completed, somewhere in the
/// error's source chain.
fn is_cancellation(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(hyper_err) = err.downcast_ref::<hyper::Error>() {
            if hyper_err.is_canceled() {
                return true;
            }
        }
        current = err.source();
    }
    false
}

/// Copy upstream response headers, every value of a repeated name included.
fn response_headers(upstream: &hyper::HeaderMap) -> Headers {
    let mut headers = Headers::with_capacity(upstream.len());
    for name in upstream.keys() {
        if HOP_BY_HOP_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        for value in upstream.get_all(name) {
            let value = match value.to_str() {
                Ok(value) => value.to_string(),
                Err(_) => {
                    warn!("Upstream header '{}' is not valid UTF-8, passing it on lossily", name);
                    String::from_utf8_lossy(value.as_bytes()).into_owned()
                }
            };
            headers.push((name.as_str().to_string(), value));
        }
    }
    headers
}

async fn execute(
    client: HttpClient,
    upstream_request: Request<BoxBody<Bytes, hyper::Error>>,
) -> Result<HttpResponse, TransportError> {
    let upstream_response = client.request(upstream_request).await.map_err(|e| {
        if e.is_connect() {
            TransportError::Connect(error_chain(&e))
        } else if is_cancellation(&e) {
            TransportError::Cancelled
        } else {
            TransportError::Upstream(error_chain(&e))
        }
    })?;

    let (parts, body) = upstream_response.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| TransportError::Body(error_chain(&e)))?
        .to_bytes();

    Ok(HttpResponse {
        status: parts.status.as_u16(),
        headers: response_headers(&parts.headers),
        body: body.to_vec(),
    })
}

impl Transport for HyperTransport {
    fn send(
        &self,
        request: HttpRequest,
        timeout: Option<Duration>,
    ) -> Result<ResponseFuture, TransportError> {
        let upstream_request = build_upstream_request(&request)?;
        let timeout = timeout.or(self.default_timeout);
        let client = self.client.clone();
        let method = request.method.to_uppercase();

        debug!("Forwarding to: {}", upstream_request.uri());

        Ok(async move {
            let start = Instant::now();
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, execute(client, upstream_request)).await {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout(limit)),
                },
                None => execute(client, upstream_request).await,
            };
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

            match &result {
                Ok(response) => {
                    metrics::record_upstream_duration(&method, &response.status.to_string(), elapsed_ms);
                }
                Err(e) => {
                    metrics::record_upstream_duration(&method, "error", elapsed_ms);
                    warn!("Failed to forward request to upstream: {}", e);
                }
            }
            result
        }
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SocketAddress;

    // ============================================
    // Tests for upstream destination selection
    // ============================================

    #[test]
    fn test_socket_address_takes_precedence_over_host() {
        let request = HttpRequest::get("/a")
            .with_header("Host", "ignored.example")
            .with_socket_address(SocketAddress::new("backend", 9090, Scheme::Http));
        let upstream = build_upstream_request(&request).unwrap();
        assert_eq!(upstream.uri().to_string(), "http://backend:9090/a");
    }

    #[test]
    fn test_host_header_used_when_no_socket_address() {
        let request = HttpRequest::get("/orders")
            .with_query("id=7")
            .with_header("Host", "api.example:8080");
        let upstream = build_upstream_request(&request).unwrap();
        assert_eq!(upstream.uri().to_string(), "http://api.example:8080/orders?id=7");
    }

    #[test]
    fn test_secure_request_uses_https() {
        let request = HttpRequest::get("/")
            .with_header("host", "secure.example")
            .with_secure(true);
        let upstream = build_upstream_request(&request).unwrap();
        assert_eq!(upstream.uri().scheme_str(), Some("https"));
    }

    #[test]
    fn test_missing_destination_is_invalid_request() {
        let err = build_upstream_request(&HttpRequest::get("/")).unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[test]
    fn test_ipv6_socket_address_builds_valid_uri() {
        let request = HttpRequest::get("/health")
            .with_socket_address(SocketAddress::new("::1", 8080, Scheme::Http));
        let upstream = build_upstream_request(&request).unwrap();
        assert_eq!(upstream.uri().host(), Some("[::1]"));
        assert_eq!(upstream.uri().port_u16(), Some(8080));
    }

    #[test]
    fn test_path_without_leading_slash_is_fixed() {
        let request = HttpRequest::get("status")
            .with_socket_address(SocketAddress::new("localhost", 80, Scheme::Http));
        let upstream = build_upstream_request(&request).unwrap();
        assert_eq!(upstream.uri().path(), "/status");
    }

    // ============================================
    // Tests for request translation
    // ============================================

    #[test]
    fn test_method_is_normalised() {
        let request = HttpRequest::new("patch", "/")
            .with_socket_address(SocketAddress::new("localhost", 80, Scheme::Http));
        let upstream = build_upstream_request(&request).unwrap();
        assert_eq!(upstream.method(), Method::PATCH);
    }

    #[test]
    fn test_invalid_method_is_invalid_request() {
        let request = HttpRequest::new("NOT A METHOD", "/")
            .with_socket_address(SocketAddress::new("localhost", 80, Scheme::Http));
        let err = build_upstream_request(&request).unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[test]
    fn test_host_and_content_length_not_copied() {
        let request = HttpRequest::post("/")
            .with_header("Host", "original.example")
            .with_header("Content-Length", "999")
            .with_header("X-Trace", "abc")
            .with_body("hello");
        let upstream = build_upstream_request(&request).unwrap();
        assert!(upstream.headers().get("host").is_none());
        assert!(upstream.headers().get("content-length").is_none());
        assert_eq!(upstream.headers().get("x-trace").unwrap(), "abc");
    }

    #[test]
    fn test_invalid_header_value_is_invalid_request() {
        let request = HttpRequest::get("/")
            .with_header("X-Bad", "line\nbreak")
            .with_socket_address(SocketAddress::new("localhost", 80, Scheme::Http));
        let err = build_upstream_request(&request).unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[test]
    fn test_repeated_request_headers_all_sent() {
        let request = HttpRequest::get("/")
            .append_header("Cookie", "a=1")
            .append_header("Cookie", "b=2")
            .with_socket_address(SocketAddress::new("localhost", 80, Scheme::Http));
        let upstream = build_upstream_request(&request).unwrap();
        let values: Vec<_> = upstream.headers().get_all("cookie").iter().collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
    }

    // ============================================
    // Tests for response translation
    // ============================================

    #[test]
    fn test_response_headers_keep_repeats_and_drop_hop_by_hop() {
        let mut upstream = hyper::HeaderMap::new();
        upstream.append("set-cookie", HeaderValue::from_static("a=1"));
        upstream.append("set-cookie", HeaderValue::from_static("b=2"));
        upstream.append("connection", HeaderValue::from_static("keep-alive"));
        upstream.append("x-bin", HeaderValue::from_bytes(b"caf\xe9").unwrap());

        let headers = response_headers(&upstream);

        let cookies: Vec<_> = headers
            .iter()
            .filter(|(k, _)| k == "set-cookie")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert!(!headers.iter().any(|(k, _)| k == "connection"));
        assert_eq!(
            headers.iter().find(|(k, _)| k == "x-bin").map(|(_, v)| v.as_str()),
            Some("caf\u{fffd}")
        );
    }

    #[test]
    fn test_plain_errors_are_not_cancellation() {
        let err = std::io::Error::other("connection reset");
        assert!(!is_cancellation(&err));
    }

    #[tokio::test]
    async fn test_body_is_forwarded() {
        let request = HttpRequest::post("/")
            .with_body("payload")
            .with_socket_address(SocketAddress::new("localhost", 80, Scheme::Http));
        let upstream = build_upstream_request(&request).unwrap();
        let body = upstream.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from("payload"));
    }
}
