//! Configuration management for the forwarding sink.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`FORWARDER__` prefix)
//! - Section-wise validation
mod batch;
mod buffer;
mod failure;
mod monitoring;
mod retry;
mod routing;
mod transport;
pub use batch::*;
pub use buffer::*;
pub use failure::*;
pub use monitoring::*;
pub use retry::*;
pub use routing::*;
pub use transport::*;


use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_ENV_PREFIX;
use crate::Result;

/// Main configuration container for the forwarding sink
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ForwarderConfig {
    /// Remote endpoint, destination and authentication
    #[serde(default)]
    pub transport: TransportConfig,
    /// Capacity and overflow policy of the in-memory buffer
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Batch packing limits
    #[serde(default)]
    pub batch: BatchConfig,
    /// Where the per-cycle routing key comes from
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Retry policies for network sends
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Escalation policy for oversized items and failed sends
    #[serde(default)]
    pub failure: FailurePolicies,
    /// Metrics endpoint and log output
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl ForwarderConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `FORWARDER__` prefix (highest priority)
    ///
    /// Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("FORWARDER__BUFFER__CAPACITY", "4096");
    /// let cfg = ForwarderConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(environment_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.transport.validate()?;
        self.buffer.validate()?;
        self.batch.validate()?;
        self.routing.validate()?;
        self.retry.validate()?;
        self.monitoring.validate()?;
        Ok(self)
    }
}

fn environment_source() -> Environment {
    Environment::with_prefix(CONFIG_ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
