//! Classified failure events and the sinks that receive them.
//!
//! The pipeline never raises a failure to its caller; instead it builds a
//! [`DiagnosticEvent`] at the stage boundary where the failure was caught and
//! hands it to a [`DiagnosticEmitter`]. Emission is fire-and-forget: a sink
//! that panics is contained here and never reaches request handling.

mod event;
mod sink;

pub use event::{DiagnosticEvent, DiagnosticKind, Severity};
pub use sink::{DiagnosticSink, FanoutSink, MemorySink, TracingSink, DEFAULT_MAX_EVENTS};

use crate::config::DiagnosticsConfig;
use crate::isolation::panic_message;
use crate::metrics;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Single emission point used by the forward pipeline.
#[derive(Clone)]
pub struct DiagnosticEmitter {
    sink: Arc<dyn DiagnosticSink>,
}

impl DiagnosticEmitter {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { sink }
    }

    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    /// Emitter retaining events in a [`MemorySink`], optionally also
    /// logging them through `tracing`.
    pub fn from_config(config: &DiagnosticsConfig) -> (Self, Arc<MemorySink>) {
        let events = Arc::new(MemorySink::new(config.max_events));
        let sink: Arc<dyn DiagnosticSink> = if config.log_events {
            Arc::new(
                FanoutSink::default()
                    .with(Arc::new(TracingSink))
                    .with(events.clone()),
            )
        } else {
            events.clone()
        };
        (Self::new(sink), events)
    }

    pub fn emit(&self, event: DiagnosticEvent) {
        metrics::record_diagnostic(event.kind.as_str());
        let kind = event.kind;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.sink.emit(event))) {
            warn!(
                "Diagnostic sink panicked while emitting {} event: {}",
                kind,
                panic_message(payload.as_ref())
            );
        }
    }
}

impl Default for DiagnosticEmitter {
    fn default() -> Self {
        Self::tracing()
    }
}
