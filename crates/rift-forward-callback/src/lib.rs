// Library exports for embedding the forward-callback pipeline in a mock server

// ===== Forward pipeline =====
pub mod extension;
pub mod pipeline;
pub mod transport;

// ===== Supporting modules =====
pub mod config;
pub mod diagnostics;
pub mod logging;
pub mod metrics;
pub mod model;

mod isolation;

pub use config::ForwardConfig;
pub use diagnostics::{DiagnosticEmitter, DiagnosticEvent, DiagnosticKind, DiagnosticSink};
pub use extension::{
    Capability, ExtensionIdentity, ExtensionRegistry, ExtensionResolver, ExtensionType,
    RequestAndResponseTransform, RequestTransform, ResolutionFailure,
};
pub use model::{HttpRequest, HttpResponse, Scheme, SocketAddress};
pub use pipeline::{ForwardFuture, ForwardOutcome, ForwardPipeline};
pub use transport::{HyperTransport, Transport, TransportError};
