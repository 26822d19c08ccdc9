//! Diagnostic event log configuration.

use crate::diagnostics::DEFAULT_MAX_EVENTS;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiagnosticsConfig {
    /// Events retained by the in-memory event log
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// Also write every event through `tracing`
    #[serde(default = "default_log_events")]
    pub log_events: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
            log_events: default_log_events(),
        }
    }
}

fn default_max_events() -> usize {
    DEFAULT_MAX_EVENTS
}

fn default_log_events() -> bool {
    true
}
