//! Configuration types for the forward-callback pipeline.
//!
//! The embedding server owns its config file; these types are meant to be
//! nested in it or loaded standalone with [`ForwardConfig::from_file`].

mod diagnostics;
mod pool;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use diagnostics::DiagnosticsConfig;
pub use pool::ConnectionPoolConfig;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ForwardConfig {
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,

    /// Default upstream timeout in milliseconds. `null` disables the timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: Option<u64>,

    /// Skip TLS certificate verification (for self-signed certs in dev/test)
    #[serde(default)]
    pub tls_skip_verify: bool,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

fn default_request_timeout_ms() -> Option<u64> {
    Some(30_000)
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            connection_pool: ConnectionPoolConfig::default(),
            request_timeout_ms: default_request_timeout_ms(),
            tls_skip_verify: false,
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl ForwardConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid config file '{}'", path.display()))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, anyhow::Error> {
        let config: ForwardConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.connection_pool.connect_timeout_secs == 0 {
            anyhow::bail!("connection_pool.connect_timeout_secs must be greater than 0");
        }

        if self.request_timeout_ms == Some(0) {
            anyhow::bail!(
                "request_timeout_ms must be greater than 0 (use null to disable the timeout)"
            );
        }

        if self.diagnostics.max_events == 0 {
            anyhow::bail!("diagnostics.max_events must be greater than 0");
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}
