use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_MAX_BATCH_BYTES;
use crate::constants::MAX_BATCH_BYTES_LIMIT;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchConfig {
    /// Encoded-size ceiling of one batch, imposed by the transport
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_bytes: default_max_batch_bytes(),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_bytes == 0 {
            return Err(Error::InvalidConfig("batch.max_batch_bytes must be greater than 0".into()));
        }
        if self.max_batch_bytes > MAX_BATCH_BYTES_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "batch.max_batch_bytes {} exceeds the transport limit of {} bytes",
                self.max_batch_bytes, MAX_BATCH_BYTES_LIMIT
            )));
        }
        Ok(())
    }
}

fn default_max_batch_bytes() -> usize {
    DEFAULT_MAX_BATCH_BYTES
}
