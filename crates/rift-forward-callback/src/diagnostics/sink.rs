use super::event::{DiagnosticEvent, DiagnosticKind};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::error;

/// Receives diagnostic events. Fire-and-forget: implementations must not
/// block for long and have no way to report failure back.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, event: DiagnosticEvent);
}

/// Writes each event as a structured `tracing` error record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, event: DiagnosticEvent) {
        let extension = event.extension.as_ref().map(|e| e.as_str()).unwrap_or("-");
        let (method, path) = event
            .request
            .as_ref()
            .map(|r| (r.method.as_str(), r.path.as_str()))
            .unwrap_or(("-", "-"));
        error!(
            kind = event.kind.as_str(),
            extension,
            method,
            path,
            cause = event.cause.as_deref().unwrap_or("-"),
            "{}",
            event.message
        );
    }
}

pub const DEFAULT_MAX_EVENTS: usize = 1000;

/// Bounded in-memory event log; the oldest event is evicted once full.
#[derive(Debug)]
pub struct MemorySink {
    events: Mutex<VecDeque<DiagnosticEvent>>,
    capacity: usize,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_MAX_EVENTS))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot, oldest first.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn events_of_kind(&self, kind: DiagnosticKind) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS)
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, event: DiagnosticEvent) {
        let mut events = self.events.lock();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Sends every event to each inner sink, in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn DiagnosticSink>>,
}

impl FanoutSink {
    pub fn with(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl DiagnosticSink for FanoutSink {
    fn emit(&self, event: DiagnosticEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}
