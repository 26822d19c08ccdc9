//! Upstream transport used by the forward pipeline.
//!
//! The pipeline only needs [`Transport`]: start a call, get back a future of
//! the raw response. [`HyperTransport`] is the pooled hyper client used in
//! production; tests substitute their own implementations.
//!
//! # Module Structure
//!
//! - `client` - Shared hyper client construction and TLS settings
//! - `hyper_transport` - `Transport` implementation on top of that client

mod client;
mod hyper_transport;

pub use client::{create_http_client, HttpClient};
pub use hyper_transport::{build_upstream_request, HyperTransport};

use crate::model::{HttpRequest, HttpResponse};
use futures::future::BoxFuture;
use std::time::Duration;

/// Completion of an upstream call.
pub type ResponseFuture = BoxFuture<'static, Result<HttpResponse, TransportError>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
    #[error("failed to connect to upstream: {0}")]
    Connect(String),
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
    #[error("upstream request failed: {0}")]
    Upstream(String),
    #[error("failed to read upstream response body: {0}")]
    Body(String),
    #[error("upstream call was cancelled")]
    Cancelled,
}

/// Sends requests upstream.
pub trait Transport: Send + Sync {
    /// Start sending `request`.
    ///
    /// An `Err` means the call could not even be started (bad destination,
    /// malformed request). Otherwise the returned future resolves once the
    /// upstream has answered, timed out, or failed. `timeout` of `None`
    /// leaves the transport's own default in place.
    fn send(
        &self,
        request: HttpRequest,
        timeout: Option<Duration>,
    ) -> Result<ResponseFuture, TransportError>;
}

/// Flatten an error and its sources into one line.
pub(crate) fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer")]
    struct Outer(#[source] Inner);

    #[derive(Debug, thiserror::Error)]
    #[error("inner")]
    struct Inner;

    #[test]
    fn test_error_chain_joins_sources() {
        assert_eq!(error_chain(&Outer(Inner)), "outer: inner");
    }

    #[test]
    fn test_transport_error_messages() {
        assert_eq!(
            TransportError::InvalidRequest("no destination".into()).to_string(),
            "invalid upstream request: no destination"
        );
        assert!(TransportError::Timeout(Duration::from_millis(250))
            .to_string()
            .contains("250ms"));
        assert_eq!(
            TransportError::Cancelled.to_string(),
            "upstream call was cancelled"
        );
    }
}
