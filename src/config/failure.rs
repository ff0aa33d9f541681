use serde::Deserialize;
use serde::Serialize;

/// What the sink does when an item or a batch cannot be delivered
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the sink and surface the error from `EventSink::run`
    FailFast,
    /// Log, count and drop the offending item or batch, then keep draining
    SkipAndContinue,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FailurePolicies {
    /// A single item larger than `batch.max_batch_bytes`
    #[serde(default = "default_on_oversized_item")]
    pub on_oversized_item: FailurePolicy,

    /// A batch whose send failed after retries, or failed non-retriably
    #[serde(default = "default_on_send_failure")]
    pub on_send_failure: FailurePolicy,
}

impl Default for FailurePolicies {
    fn default() -> Self {
        Self {
            on_oversized_item: default_on_oversized_item(),
            on_send_failure: default_on_send_failure(),
        }
    }
}

fn default_on_oversized_item() -> FailurePolicy {
    FailurePolicy::SkipAndContinue
}
fn default_on_send_failure() -> FailurePolicy {
    FailurePolicy::FailFast
}
