use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Endpoint identity and destination of the remote streaming transport
#[derive(Serialize, Deserialize, Clone)]
pub struct TransportConfig {
    /// Ingest endpoint URI, e.g. `http://127.0.0.1:50051`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Logical destination (queue / topic / hub) on the endpoint
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Bearer token sent with every request; acquired externally
    #[serde(default)]
    pub auth_token: Option<String>,

    /// PEM-encoded CA certificate used to verify an `https` endpoint
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,

    /// Overrides the domain name checked against the server certificate
    #[serde(default)]
    pub tls_domain: Option<String>,

    /// Gzip request and response bodies
    #[serde(default)]
    pub compression: bool,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Debug for TransportConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("endpoint", &self.endpoint)
            .field("queue_name", &self.queue_name)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("ca_cert_path", &self.ca_cert_path)
            .field("tls_domain", &self.tls_domain)
            .field("compression", &self.compression)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            queue_name: default_queue_name(),
            auth_token: None,
            ca_cert_path: None,
            tls_domain: None,
            compression: false,
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "transport.endpoint {:?} must start with http:// or https://",
                self.endpoint
            )));
        }

        if self.queue_name.trim().is_empty() {
            return Err(Error::InvalidConfig("transport.queue_name cannot be empty".into()));
        }

        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "transport timeouts must be greater than 0".into(),
            ));
        }

        if self.ca_cert_path.is_some() && !self.is_tls() {
            return Err(Error::InvalidConfig(
                "transport.ca_cert_path requires an https:// endpoint".into(),
            ));
        }

        if let Some(path) = &self.ca_cert_path {
            if !path.exists() {
                return Err(Error::InvalidConfig(format!(
                    "transport.ca_cert_path {} does not exist",
                    path.display()
                )));
            }
        }

        Ok(())
    }

    pub fn is_tls(&self) -> bool {
        self.endpoint.starts_with("https://")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:50051".to_string()
}
fn default_queue_name() -> String {
    "events".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    3_000
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
