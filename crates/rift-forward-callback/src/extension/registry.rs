//! Process-wide registry of extension types, addressed by name.
//!
//! Extensions are compiled into the server and registered at startup. Each
//! entry records which capabilities the type provides (checked by the
//! compiler through the builder's trait bounds) and how to construct a
//! fresh instance, so resolving a name never needs runtime type inspection.

use super::capability::{
    Capability, CapabilitySet, RequestAndResponseTransform, RequestTransform, ResolvedExtension,
};
use super::resolver::ResolutionFailure;
use crate::isolation::run_isolated;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type Constructor<T> = Arc<dyn Fn() -> anyhow::Result<T> + Send + Sync>;
type RequestFactory = Arc<dyn Fn() -> anyhow::Result<Box<dyn RequestTransform>> + Send + Sync>;
type ResponseFactory =
    Arc<dyn Fn() -> anyhow::Result<Box<dyn RequestAndResponseTransform>> + Send + Sync>;

static GLOBAL_REGISTRY: Lazy<Arc<ExtensionRegistry>> =
    Lazy::new(|| Arc::new(ExtensionRegistry::new()));

/// A registered extension type.
pub struct ExtensionType {
    name: String,
    capabilities: CapabilitySet,
    constructible: bool,
    request_factory: Option<RequestFactory>,
    response_factory: Option<ResponseFactory>,
}

impl ExtensionType {
    /// Start declaring the extension type `T` under `name`.
    pub fn builder<T>(name: impl Into<String>) -> ExtensionTypeBuilder<T>
    where
        T: Send + Sync + 'static,
    {
        ExtensionTypeBuilder {
            name: name.into(),
            capabilities: CapabilitySet::empty(),
            constructor: None,
            as_request: None,
            as_response: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn implements(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn is_constructible(&self) -> bool {
        self.constructible
    }

    /// Construct a new instance viewed as `capability`.
    ///
    /// Checks the capability tag first, then the construction path, then
    /// runs the constructor with panics caught.
    pub fn instantiate(&self, capability: Capability) -> Result<ResolvedExtension, ResolutionFailure> {
        if !self.implements(capability) {
            return Err(ResolutionFailure::CapabilityMismatch {
                name: self.name.clone(),
                capability,
            });
        }

        let constructed = match capability {
            Capability::RequestTransform => self
                .request_factory
                .as_ref()
                .map(|factory| run_isolated(|| factory()).map(ResolvedExtension::RequestTransform)),
            Capability::RequestAndResponseTransform => self.response_factory.as_ref().map(|factory| {
                run_isolated(|| factory()).map(ResolvedExtension::RequestAndResponseTransform)
            }),
        };

        match constructed {
            None => Err(ResolutionFailure::NotConstructible {
                name: self.name.clone(),
            }),
            Some(Err(cause)) => Err(ResolutionFailure::ConstructionFailed {
                name: self.name.clone(),
                cause,
            }),
            Some(Ok(resolved)) => Ok(resolved),
        }
    }
}

impl fmt::Debug for ExtensionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionType")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("constructible", &self.constructible)
            .finish()
    }
}

fn boxed_request_transform<T>(instance: T) -> Box<dyn RequestTransform>
where
    T: RequestTransform + 'static,
{
    Box::new(instance)
}

fn boxed_response_transform<T>(instance: T) -> Box<dyn RequestAndResponseTransform>
where
    T: RequestAndResponseTransform + 'static,
{
    Box::new(instance)
}

/// Builder for [`ExtensionType`].
///
/// ```ignore
/// let ty = ExtensionType::builder::<AddAuthHeader>("org.example.AddAuthHeader")
///     .request_transform()
///     .default_constructor()
///     .build();
/// ExtensionRegistry::global().register(ty);
/// ```
pub struct ExtensionTypeBuilder<T> {
    name: String,
    capabilities: CapabilitySet,
    constructor: Option<Constructor<T>>,
    as_request: Option<fn(T) -> Box<dyn RequestTransform>>,
    as_response: Option<fn(T) -> Box<dyn RequestAndResponseTransform>>,
}

impl<T> ExtensionTypeBuilder<T>
where
    T: Send + Sync + 'static,
{
    /// Declare that `T` rewrites outbound requests.
    pub fn request_transform(mut self) -> Self
    where
        T: RequestTransform,
    {
        self.capabilities = self.capabilities.with(Capability::RequestTransform);
        self.as_request = Some(boxed_request_transform::<T>);
        self
    }

    /// Declare that `T` rewrites upstream responses.
    pub fn response_transform(mut self) -> Self
    where
        T: RequestAndResponseTransform,
    {
        self.capabilities = self
            .capabilities
            .with(Capability::RequestAndResponseTransform);
        self.as_response = Some(boxed_response_transform::<T>);
        self
    }

    /// Zero-argument construction path. May fail.
    pub fn constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(constructor));
        self
    }

    pub fn default_constructor(self) -> Self
    where
        T: Default,
    {
        self.constructor(|| Ok(T::default()))
    }

    pub fn build(self) -> ExtensionType {
        let request_factory = match (&self.constructor, self.as_request) {
            (Some(constructor), Some(upcast)) => {
                let constructor = Arc::clone(constructor);
                Some(Arc::new(move || constructor().map(upcast)) as RequestFactory)
            }
            _ => None,
        };
        let response_factory = match (&self.constructor, self.as_response) {
            (Some(constructor), Some(upcast)) => {
                let constructor = Arc::clone(constructor);
                Some(Arc::new(move || constructor().map(upcast)) as ResponseFactory)
            }
            _ => None,
        };

        ExtensionType {
            name: self.name,
            capabilities: self.capabilities,
            constructible: self.constructor.is_some(),
            request_factory,
            response_factory,
        }
    }
}

/// Name-to-type table consulted by the resolver.
#[derive(Default)]
pub struct ExtensionRegistry {
    types: RwLock<HashMap<String, Arc<ExtensionType>>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process.
    pub fn global() -> Arc<ExtensionRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Register a type, replacing (and returning) any entry with the same name.
    pub fn register(&self, extension_type: ExtensionType) -> Option<Arc<ExtensionType>> {
        let name = extension_type.name.clone();
        debug!(
            "Registering extension type {} (capabilities: {:?}, constructible: {})",
            name,
            extension_type.capabilities.iter().collect::<Vec<_>>(),
            extension_type.constructible
        );
        let previous = self.types.write().insert(name.clone(), Arc::new(extension_type));
        if previous.is_some() {
            debug!("Extension type {} replaced an earlier registration", name);
        }
        previous
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<ExtensionType>> {
        self.types.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ExtensionType>> {
        self.types.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("types", &self.names())
            .finish()
    }
}
