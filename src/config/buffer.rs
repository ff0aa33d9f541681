use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_BUFFER_CAPACITY;
use crate::Error;
use crate::OverflowPolicy;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BufferConfig {
    /// `true` discards the oldest queued item when full,
    /// `false` makes producers wait for free space.
    #[serde(default = "default_overflow")]
    pub overflow: bool,

    /// Maximum number of queued change items
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            overflow: default_overflow(),
            capacity: default_capacity(),
        }
    }
}

impl BufferConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidConfig("buffer.capacity must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn policy(&self) -> OverflowPolicy {
        OverflowPolicy::from_overflow_flag(self.overflow)
    }
}

fn default_overflow() -> bool {
    true
}
fn default_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}
