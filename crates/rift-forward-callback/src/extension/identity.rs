use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a user-provided extension type, e.g. `org.example.AddAuthHeader`.
///
/// Nothing is validated here; whether the name refers to anything is only
/// known once the resolver looks it up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionIdentity(String);

impl ExtensionIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExtensionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExtensionIdentity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ExtensionIdentity {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for ExtensionIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
