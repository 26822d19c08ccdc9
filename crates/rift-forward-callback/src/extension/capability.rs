//! Transform capabilities an extension may provide.
//!
//! The two traits are independent: an extension type can implement one,
//! both, or neither. Which of them a registered type provides is recorded
//! as a [`CapabilitySet`] when the type is registered.

use crate::model::{HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rewrites a request before it is forwarded upstream.
pub trait RequestTransform: Send + Sync {
    /// Return the request that should be sent instead of `request`.
    fn transform_request(&self, request: &HttpRequest) -> anyhow::Result<HttpRequest>;
}

/// Rewrites the upstream response, given the request that was actually sent.
pub trait RequestAndResponseTransform: Send + Sync {
    /// Return the response the client should receive instead of `response`.
    ///
    /// `request` is the outbound request, i.e. after any [`RequestTransform`].
    fn transform_response(
        &self,
        request: &HttpRequest,
        response: &HttpResponse,
    ) -> anyhow::Result<HttpResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    RequestTransform,
    RequestAndResponseTransform,
}

impl Capability {
    pub const ALL: [Capability; 2] = [
        Capability::RequestTransform,
        Capability::RequestAndResponseTransform,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::RequestTransform => "RequestTransform",
            Capability::RequestAndResponseTransform => "RequestAndResponseTransform",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Capability::RequestTransform => 0b01,
            Capability::RequestAndResponseTransform => 0b10,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability tags declared for a registered extension type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> {
        let set = *self;
        Capability::ALL
            .into_iter()
            .filter(move |capability| set.contains(*capability))
    }
}

/// A freshly constructed extension instance, typed by the capability it was
/// resolved for.
///
/// Instances are owned by the forward invocation that resolved them and are
/// dropped when it completes.
pub enum ResolvedExtension {
    RequestTransform(Box<dyn RequestTransform>),
    RequestAndResponseTransform(Box<dyn RequestAndResponseTransform>),
}

impl ResolvedExtension {
    pub fn capability(&self) -> Capability {
        match self {
            ResolvedExtension::RequestTransform(_) => Capability::RequestTransform,
            ResolvedExtension::RequestAndResponseTransform(_) => {
                Capability::RequestAndResponseTransform
            }
        }
    }

    pub fn into_request_transform(self) -> Option<Box<dyn RequestTransform>> {
        match self {
            ResolvedExtension::RequestTransform(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_response_transform(self) -> Option<Box<dyn RequestAndResponseTransform>> {
        match self {
            ResolvedExtension::RequestAndResponseTransform(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Debug for ResolvedExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResolvedExtension")
            .field(&self.capability())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Identity;

    impl RequestTransform for Identity {
        fn transform_request(&self, request: &HttpRequest) -> anyhow::Result<HttpRequest> {
            Ok(request.clone())
        }
    }

    #[test]
    fn test_capability_set_empty() {
        let set = CapabilitySet::empty();
        assert_eq!(set, CapabilitySet::empty());
        assert!(!set.contains(Capability::RequestTransform));
        assert!(!set.contains(Capability::RequestAndResponseTransform));
        assert_eq!(set.iter().count(), 0);
    }

    #[test]
    fn test_capability_set_is_independent_per_capability() {
        let set = CapabilitySet::empty().with(Capability::RequestAndResponseTransform);
        assert!(set.contains(Capability::RequestAndResponseTransform));
        assert!(!set.contains(Capability::RequestTransform));

        let both = set.with(Capability::RequestTransform);
        assert_eq!(
            both.iter().collect::<Vec<_>>(),
            vec![
                Capability::RequestTransform,
                Capability::RequestAndResponseTransform
            ]
        );
    }

    #[test]
    fn test_capability_set_with_is_idempotent() {
        let once = CapabilitySet::empty().with(Capability::RequestTransform);
        let twice = once.with(Capability::RequestTransform);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_resolved_extension_accessors() {
        let resolved = ResolvedExtension::RequestTransform(Box::new(Identity));
        assert_eq!(resolved.capability(), Capability::RequestTransform);
        assert!(format!("{resolved:?}").contains("RequestTransform"));

        let transform = resolved.into_request_transform().unwrap();
        let request = HttpRequest::get("/same");
        assert_eq!(transform.transform_request(&request).unwrap(), request);
    }

    #[test]
    fn test_resolved_extension_wrong_accessor_is_none() {
        let resolved = ResolvedExtension::RequestTransform(Box::new(Identity));
        assert!(resolved.into_response_transform().is_none());
    }
}
