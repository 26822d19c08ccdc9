use crate::extension::ExtensionIdentity;
use crate::model::HttpRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification tag carried by every diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    TypeNotFound,
    CapabilityMismatch,
    NotConstructible,
    ConstructionFailed,
    CallbackInvocationFailed,
    ForwardAttemptFailed,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::TypeNotFound => "TypeNotFound",
            DiagnosticKind::CapabilityMismatch => "CapabilityMismatch",
            DiagnosticKind::NotConstructible => "NotConstructible",
            DiagnosticKind::ConstructionFailed => "ConstructionFailed",
            DiagnosticKind::CallbackInvocationFailed => "CallbackInvocationFailed",
            DiagnosticKind::ForwardAttemptFailed => "ForwardAttemptFailed",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
}

/// A classified failure record. Built by the pipeline, consumed by a sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticEvent {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// The request as received, before any request transform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<HttpRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<ExtensionIdentity>,
    pub timestamp: DateTime<Utc>,
}

impl DiagnosticEvent {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message: message.into(),
            cause: None,
            request: None,
            extension: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_request(mut self, request: Option<&HttpRequest>) -> Self {
        self.request = request.cloned();
        self
    }

    pub fn with_extension(mut self, extension: &ExtensionIdentity) -> Self {
        self.extension = Some(extension.clone());
        self
    }
}
