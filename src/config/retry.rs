use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of attempts, the first one included
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_ms: default_op_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig(format!(
                "retry.{name}.max_retries must be at least 1"
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig(format!(
                "retry.{name}.timeout_ms must be greater than 0"
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "retry.{name}.base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Divide strategies by operation
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RetryPolicies {
    /// Sending one batch to the transport
    #[serde(default)]
    pub dispatch: BackoffPolicy,
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.dispatch.validate("dispatch")
    }
}

fn default_max_retries() -> usize {
    5
}
fn default_op_timeout_ms() -> u64 {
    10_000
}
fn default_base_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    5_000
}
