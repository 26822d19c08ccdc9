//! Name-based extension resolution.

use super::capability::{Capability, ResolvedExtension};
use super::identity::ExtensionIdentity;
use super::registry::ExtensionRegistry;
use crate::diagnostics::DiagnosticKind;
use std::sync::Arc;

/// Why an identity could not be resolved against a capability.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionFailure {
    #[error("extension type \"{name}\" is not registered")]
    TypeNotFound { name: String },
    #[error("{name} does not implement {capability}, which is required for forwarded requests generated from an extension")]
    CapabilityMismatch { name: String, capability: Capability },
    #[error("extension type \"{name}\" has no zero-argument constructor")]
    NotConstructible { name: String },
    #[error("constructing extension type \"{name}\" failed: {cause:#}")]
    ConstructionFailed { name: String, cause: anyhow::Error },
}

impl ResolutionFailure {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            ResolutionFailure::TypeNotFound { .. } => DiagnosticKind::TypeNotFound,
            ResolutionFailure::CapabilityMismatch { .. } => DiagnosticKind::CapabilityMismatch,
            ResolutionFailure::NotConstructible { .. } => DiagnosticKind::NotConstructible,
            ResolutionFailure::ConstructionFailed { .. } => DiagnosticKind::ConstructionFailed,
        }
    }

    /// False only for a capability the type simply does not provide.
    pub fn is_defect(&self) -> bool {
        !matches!(self, ResolutionFailure::CapabilityMismatch { .. })
    }

    /// Underlying error text, when there is one.
    pub fn cause(&self) -> Option<String> {
        match self {
            ResolutionFailure::ConstructionFailed { cause, .. } => Some(format!("{cause:#}")),
            _ => None,
        }
    }
}

/// Resolves extension identities against a registry.
#[derive(Debug, Clone)]
pub struct ExtensionResolver {
    registry: Arc<ExtensionRegistry>,
}

impl ExtensionResolver {
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    /// Construct a fresh instance of `identity` for `capability`.
    ///
    /// Never panics; every failure comes back classified. The registry lock
    /// is released before the constructor runs.
    pub fn resolve(
        &self,
        identity: &ExtensionIdentity,
        capability: Capability,
    ) -> Result<ResolvedExtension, ResolutionFailure> {
        let extension_type =
            self.registry
                .get(identity.as_str())
                .ok_or_else(|| ResolutionFailure::TypeNotFound {
                    name: identity.to_string(),
                })?;
        extension_type.instantiate(capability)
    }
}
