//! Forward-with-callback execution.

use super::outcome::ForwardOutcome;
use crate::config::ForwardConfig;
use crate::diagnostics::{DiagnosticEmitter, DiagnosticEvent, DiagnosticKind, MemorySink};
use crate::extension::{
    Capability, ExtensionIdentity, ExtensionResolver, RequestAndResponseTransform,
    RequestTransform, ResolvedExtension,
};
use crate::isolation::{panic_message, run_isolated};
use crate::metrics;
use crate::model::{HttpRequest, HttpResponse};
use crate::transport::{HyperTransport, ResponseFuture, Transport};
use anyhow::anyhow;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Pending outcome of [`ForwardPipeline::forward`]. Never fails.
pub type ForwardFuture = BoxFuture<'static, ForwardOutcome>;

const PATH_PLAIN: &str = "plain";
const PATH_TRANSFORM: &str = "transform";
const PATH_NOT_FOUND: &str = "not_found";

/// Runs forward actions whose request and/or response is rewritten by a
/// named extension.
///
/// Cheap to clone; one pipeline is shared by every request handler.
#[derive(Clone)]
pub struct ForwardPipeline {
    resolver: ExtensionResolver,
    transport: Arc<dyn Transport>,
    emitter: DiagnosticEmitter,
    timeout: Option<Duration>,
}

impl ForwardPipeline {
    pub fn new(
        resolver: ExtensionResolver,
        transport: Arc<dyn Transport>,
        emitter: DiagnosticEmitter,
    ) -> Self {
        Self {
            resolver,
            transport,
            emitter,
            timeout: None,
        }
    }

    /// Build a pipeline on a [`HyperTransport`] from configuration.
    ///
    /// Also returns the in-memory event log diagnostics are retained in.
    pub fn from_config(
        config: &ForwardConfig,
        resolver: ExtensionResolver,
    ) -> anyhow::Result<(Self, Arc<MemorySink>)> {
        config.validate()?;
        let transport = HyperTransport::new(config)?;
        let (emitter, events) = DiagnosticEmitter::from_config(&config.diagnostics);
        let pipeline = Self::new(resolver, Arc::new(transport), emitter)
            .with_timeout(config.request_timeout());
        Ok((pipeline, events))
    }

    /// Timeout passed to the transport with every call. `None` leaves the
    /// transport's own default in place.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn resolver(&self) -> &ExtensionResolver {
        &self.resolver
    }

    /// Forward `request` upstream through the extension named by `identity`.
    ///
    /// Resolution and the request transform run before this returns; the
    /// returned future only waits on the upstream call and then applies the
    /// response transform. Failures are emitted as diagnostics and never
    /// surface to the caller.
    pub fn forward(
        &self,
        identity: &ExtensionIdentity,
        request: Option<HttpRequest>,
    ) -> ForwardFuture {
        let Some(request) = request else {
            debug!("No request received for {}, returning not found", identity);
            metrics::record_forward(PATH_NOT_FOUND);
            return not_found();
        };

        let request_transform = self
            .resolve(identity, Capability::RequestTransform)
            .and_then(ResolvedExtension::into_request_transform);
        let response_transform = self
            .resolve(identity, Capability::RequestAndResponseTransform)
            .and_then(ResolvedExtension::into_response_transform);

        if request_transform.is_none() && response_transform.is_none() {
            self.forward_plain(identity, request)
        } else {
            self.forward_with_transforms(identity, request, request_transform, response_transform)
        }
    }

    fn resolve(
        &self,
        identity: &ExtensionIdentity,
        capability: Capability,
    ) -> Option<ResolvedExtension> {
        match self.resolver.resolve(identity, capability) {
            Ok(extension) => {
                debug!("Resolved {} as {}", identity, capability);
                Some(extension)
            }
            Err(failure) if !failure.is_defect() => {
                debug!("{}", failure);
                None
            }
            Err(failure) => {
                let mut event = DiagnosticEvent::new(failure.kind(), failure.to_string())
                    .with_extension(identity);
                if let Some(cause) = failure.cause() {
                    event = event.with_cause(cause);
                }
                self.emitter.emit(event);
                None
            }
        }
    }

    fn forward_plain(&self, identity: &ExtensionIdentity, request: HttpRequest) -> ForwardFuture {
        debug!("No callbacks resolved for {}, forwarding unmodified", identity);
        let pending = match self.start(request.clone()) {
            Ok(pending) => pending,
            Err(cause) => {
                self.forward_attempt_failed(identity, &request, &cause);
                return not_found();
            }
        };

        let emitter = self.emitter.clone();
        let identity = identity.clone();
        async move {
            match await_response(pending).await {
                Ok(response) => {
                    metrics::record_forward(PATH_PLAIN);
                    ForwardOutcome::Forwarded { request, response }
                }
                Err(cause) => {
                    emit_forward_attempt_failed(&emitter, &identity, &request, &cause);
                    ForwardOutcome::NotFound
                }
            }
        }
        .boxed()
    }

    fn forward_with_transforms(
        &self,
        identity: &ExtensionIdentity,
        original: HttpRequest,
        request_transform: Option<Box<dyn RequestTransform>>,
        response_transform: Option<Box<dyn RequestAndResponseTransform>>,
    ) -> ForwardFuture {
        let outbound = match request_transform {
            Some(transform) => match run_isolated(|| transform.transform_request(&original)) {
                Ok(outbound) => outbound,
                Err(cause) => {
                    emit_callback_failed(&self.emitter, identity, &original, &cause);
                    metrics::record_forward(PATH_NOT_FOUND);
                    return not_found();
                }
            },
            None => original.clone(),
        };

        let pending = match self.start(outbound.clone()) {
            Ok(pending) => pending,
            Err(cause) => {
                self.forward_attempt_failed(identity, &original, &cause);
                return not_found();
            }
        };

        let emitter = self.emitter.clone();
        let identity = identity.clone();
        async move {
            let response = match await_response(pending).await {
                Ok(response) => response,
                Err(cause) => {
                    emit_forward_attempt_failed(&emitter, &identity, &original, &cause);
                    return ForwardOutcome::NotFound;
                }
            };

            let response = match response_transform {
                Some(transform) => {
                    match run_isolated(|| transform.transform_response(&outbound, &response)) {
                        Ok(transformed) => transformed,
                        Err(cause) => {
                            emit_callback_failed(&emitter, &identity, &original, &cause);
                            response
                        }
                    }
                }
                None => response,
            };

            metrics::record_forward(PATH_TRANSFORM);
            ForwardOutcome::Forwarded {
                request: outbound,
                response,
            }
        }
        .boxed()
    }

    /// Start the upstream call. A setup error or a panic inside the
    /// transport comes back as `Err`.
    fn start(&self, request: HttpRequest) -> anyhow::Result<ResponseFuture> {
        let transport = &self.transport;
        let timeout = self.timeout;
        run_isolated(|| Ok(transport.send(request, timeout)?))
    }

    fn forward_attempt_failed(
        &self,
        identity: &ExtensionIdentity,
        request: &HttpRequest,
        cause: &anyhow::Error,
    ) {
        emit_forward_attempt_failed(&self.emitter, identity, request, cause);
    }
}

fn not_found() -> ForwardFuture {
    future::ready(ForwardOutcome::NotFound).boxed()
}

async fn await_response(pending: ResponseFuture) -> anyhow::Result<HttpResponse> {
    match AssertUnwindSafe(pending).catch_unwind().await {
        Ok(result) => Ok(result?),
        Err(payload) => Err(anyhow!(
            "transport panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

fn emit_callback_failed(
    emitter: &DiagnosticEmitter,
    identity: &ExtensionIdentity,
    original: &HttpRequest,
    cause: &anyhow::Error,
) {
    emitter.emit(
        DiagnosticEvent::new(
            DiagnosticKind::CallbackInvocationFailed,
            format!(
                "{} threw exception while executing transform callback - {:#}",
                identity, cause
            ),
        )
        .with_cause(format!("{cause:#}"))
        .with_request(Some(original))
        .with_extension(identity),
    );
}

fn emit_forward_attempt_failed(
    emitter: &DiagnosticEmitter,
    identity: &ExtensionIdentity,
    original: &HttpRequest,
    cause: &anyhow::Error,
) {
    metrics::record_forward(PATH_NOT_FOUND);
    emitter.emit(
        DiagnosticEvent::new(
            DiagnosticKind::ForwardAttemptFailed,
            format!("failed to forward request for {} - {:#}", identity, cause),
        )
        .with_cause(format!("{cause:#}"))
        .with_request(Some(original))
        .with_extension(identity),
    );
}
