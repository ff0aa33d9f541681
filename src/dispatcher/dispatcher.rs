//! Performs the network send of one completed [`Batch`].
//!
//! The dispatcher is the sole owner of the [`Transport`]. Transient failures
//! are retried with bounded exponential backoff; whatever is left is
//! reported as a typed [`DispatchOutcome`] and the caller decides whether it
//! is fatal.

use autometrics::autometrics;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::async_task::task_with_timeout_and_exponential_backoff;
use crate::metrics::BATCH_MESSAGES;
use crate::metrics::BATCH_SIZE_BYTES;
use crate::metrics::DISPATCHED_BATCHES;
use crate::metrics::OUTCOME_DELIVERED;
use crate::metrics::OUTCOME_FAILED;
use crate::BackoffPolicy;
use crate::Batch;
use crate::Transport;
use crate::TransportError;
use crate::API_SLO;

/// Result of handing one batch (or one item) to the transport
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The transport accepted the batch
    Delivered { messages: usize, bytes: usize },

    /// A single item exceeded the batch ceiling and was never sent
    SkippedTooLarge { size: usize, max_bytes: usize },

    /// The batch was not delivered; `retriable` tells whether a later
    /// attempt could succeed.
    Failed {
        messages: usize,
        retriable: bool,
        error: TransportError,
    },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

pub struct Dispatcher {
    transport: Box<dyn Transport>,
    policy: BackoffPolicy,
    closed: bool,
}

impl Dispatcher {
    pub fn new(
        transport: Box<dyn Transport>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            transport,
            policy,
            closed: false,
        }
    }

    /// Sends `batch`, retrying transient failures. Empty batches are never
    /// put on the wire.
    #[autometrics(objective = API_SLO)]
    pub async fn send(
        &mut self,
        batch: Batch,
    ) -> DispatchOutcome {
        let messages = batch.len();
        let bytes = batch.size_bytes();
        if batch.is_empty() {
            return DispatchOutcome::Delivered { messages, bytes };
        }
        if self.closed {
            return DispatchOutcome::Failed {
                messages,
                retriable: false,
                error: TransportError::Closed,
            };
        }

        let transport = &self.transport;
        let batch = &batch;
        let result =
            task_with_timeout_and_exponential_backoff(|| transport.publish(batch), self.policy).await;

        match result {
            Ok(()) => {
                debug!(
                    messages,
                    bytes,
                    routing_key = %batch.routing_key(),
                    "batch delivered"
                );
                DISPATCHED_BATCHES.with_label_values(&[OUTCOME_DELIVERED]).inc();
                BATCH_SIZE_BYTES.observe(bytes as f64);
                BATCH_MESSAGES.observe(messages as f64);
                DispatchOutcome::Delivered { messages, bytes }
            }
            Err(error) => {
                let retriable = error.is_retriable();
                error!(
                    messages,
                    bytes,
                    retriable,
                    routing_key = %batch.routing_key(),
                    "batch delivery failed: {}",
                    error
                );
                DISPATCHED_BATCHES.with_label_values(&[OUTCOME_FAILED]).inc();
                DispatchOutcome::Failed {
                    messages,
                    retriable,
                    error,
                }
            }
        }
    }

    /// Releases the transport. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.transport.close().await;
        info!("dispatcher closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
