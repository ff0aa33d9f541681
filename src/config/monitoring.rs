use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::Error;
use crate::Result;

/// Where the forwarder reports on itself: the `/metrics` endpoint and the
/// log output of the binary.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// Listen address of the Prometheus `/metrics` endpoint. The endpoint
    /// is not started when unset.
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,

    /// Directory for `forwarder.log`; logs go to stderr when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// `tracing` filter directives used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_addr: None,
            log_dir: None,
            log_filter: default_log_filter(),
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(addr) = self.metrics_addr {
            // an ephemeral port cannot be scraped
            if addr.port() == 0 {
                return Err(Error::InvalidConfig(format!(
                    "monitoring.metrics_addr {addr} needs an explicit port"
                )));
            }
        }

        if let Some(dir) = &self.log_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(Error::InvalidConfig(format!(
                    "monitoring.log_dir {} is not a directory",
                    dir.display()
                )));
            }
        }

        self.env_filter()?;
        Ok(())
    }

    /// Filter from `RUST_LOG` when set, otherwise from `log_filter`.
    pub fn env_filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.log_filter).map_err(|e| {
            Error::InvalidConfig(format!(
                "monitoring.log_filter {:?} is not a valid filter: {}",
                self.log_filter, e
            ))
        })
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
