//! User-supplied extensions: identities, capabilities, registry, resolution.
//!
//! # Module Structure
//!
//! - `identity` - Extension names as carried by forward rules
//! - `capability` - Request / response transform traits and capability tags
//! - `registry` - Process-wide name-to-type table
//! - `resolver` - Identity + capability to live instance, or classified failure

mod capability;
mod identity;
mod registry;
mod resolver;

pub use capability::{
    Capability, CapabilitySet, RequestAndResponseTransform, RequestTransform, ResolvedExtension,
};
pub use identity::ExtensionIdentity;
pub use registry::{ExtensionRegistry, ExtensionType, ExtensionTypeBuilder};
pub use resolver::{ExtensionResolver, ResolutionFailure};
