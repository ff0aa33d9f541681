use serde::Serialize;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::metrics::DROPPED_ITEMS;
use crate::metrics::DROP_REASON_SEND_FAILED;
use crate::metrics::DROP_REASON_SERIALIZATION;
use crate::metrics::DROP_REASON_TOO_LARGE;
use crate::Batch;
use crate::ChangeItem;
use crate::DispatchOutcome;
use crate::Dispatcher;
use crate::FailurePolicies;
use crate::FailurePolicy;
use crate::Message;
use crate::Result;
use crate::RoutingKey;
use crate::SinkError;

/// What happened to one drain cycle's worklist
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Items handed to the builder
    pub items: usize,
    pub batches_delivered: usize,
    pub messages_delivered: usize,
    pub skipped_serialization: usize,
    pub skipped_too_large: usize,
    /// Messages lost to send failures under `SkipAndContinue`
    pub messages_failed: usize,
    /// Outcomes in dispatch order
    pub outcomes: Vec<DispatchOutcome>,
}

/// Packs serialized change items into batches no larger than
/// `max_batch_bytes` and hands each full batch to the [`Dispatcher`].
pub struct BatchBuilder {
    dispatcher: Dispatcher,
    max_batch_bytes: usize,
    queue_name: String,
    routing_property: String,
    failure: FailurePolicies,
}

impl BatchBuilder {
    pub fn new(
        dispatcher: Dispatcher,
        max_batch_bytes: usize,
        queue_name: impl Into<String>,
        routing_property: impl Into<String>,
        failure: FailurePolicies,
    ) -> Self {
        Self {
            dispatcher,
            max_batch_bytes,
            queue_name: queue_name.into(),
            routing_property: routing_property.into(),
            failure,
        }
    }

    /// Forwards `worklist` in order under a single routing key.
    ///
    /// An item that does not fit the open batch flushes it and becomes the
    /// first item of the next one. An item too large for any batch is
    /// rejected without flushing, so the items around it share a batch.
    /// Returns `Err` only when a failure policy is `FailFast`; items already
    /// dispatched in this cycle stay sent.
    pub async fn forward<R: Serialize>(
        &mut self,
        worklist: Vec<ChangeItem<R>>,
        routing_key: &RoutingKey,
    ) -> Result<CycleReport> {
        let mut report = CycleReport {
            items: worklist.len(),
            ..Default::default()
        };
        let mut batch = self.open_batch(routing_key);

        for item in worklist {
            let body = match item.to_json_bytes() {
                Ok(body) => body,
                Err(e) => {
                    warn!(verb = ?item.verb(), error = %e, "skipping change item that failed to serialize");
                    DROPPED_ITEMS.with_label_values(&[DROP_REASON_SERIALIZATION]).inc();
                    report.skipped_serialization += 1;
                    continue;
                }
            };
            trace!(body = %String::from_utf8_lossy(&body), "serialized change item");

            let message = Message::json(body, &self.routing_property, routing_key);
            if !batch.fits_alone(&message) {
                if self.failure.on_oversized_item == FailurePolicy::FailFast && !batch.is_empty() {
                    // deliver what preceded the item before stopping
                    let pending = std::mem::replace(&mut batch, self.open_batch(routing_key));
                    self.dispatch(pending, &mut report).await?;
                }
                self.reject_oversized(message.encoded_len(), &mut report)?;
                continue;
            }

            if let Err(message) = batch.try_push(message) {
                let full = std::mem::replace(&mut batch, self.open_batch(routing_key));
                self.dispatch(full, &mut report).await?;

                if let Err(message) = batch.try_push(message) {
                    self.reject_oversized(message.encoded_len(), &mut report)?;
                }
            }
        }

        if !batch.is_empty() {
            self.dispatch(batch, &mut report).await?;
        }

        debug!(
            items = report.items,
            batches = report.batches_delivered,
            messages = report.messages_delivered,
            "cycle forwarded"
        );
        Ok(report)
    }

    /// Closes the underlying transport.
    pub async fn close(&mut self) {
        self.dispatcher.close().await;
    }

    pub fn max_batch_bytes(&self) -> usize {
        self.max_batch_bytes
    }

    fn open_batch(
        &self,
        routing_key: &RoutingKey,
    ) -> Batch {
        Batch::for_queue(&self.queue_name, routing_key.clone(), self.max_batch_bytes)
    }

    async fn dispatch(
        &mut self,
        batch: Batch,
        report: &mut CycleReport,
    ) -> Result<()> {
        match self.dispatcher.send(batch).await {
            DispatchOutcome::Delivered { messages, bytes } => {
                report.batches_delivered += 1;
                report.messages_delivered += messages;
                report.outcomes.push(DispatchOutcome::Delivered { messages, bytes });
            }
            DispatchOutcome::Failed {
                messages,
                retriable,
                error,
            } => match self.failure.on_send_failure {
                FailurePolicy::FailFast => {
                    error!(messages, retriable, "stopping: batch could not be delivered: {}", error);
                    return Err(SinkError::DispatchFailed {
                        messages,
                        source: error,
                    }
                    .into());
                }
                FailurePolicy::SkipAndContinue => {
                    warn!(messages, retriable, "dropping undeliverable batch: {}", error);
                    DROPPED_ITEMS
                        .with_label_values(&[DROP_REASON_SEND_FAILED])
                        .inc_by(messages as u64);
                    report.messages_failed += messages;
                    report.outcomes.push(DispatchOutcome::Failed {
                        messages,
                        retriable,
                        error,
                    });
                }
            },
            other => report.outcomes.push(other),
        }
        Ok(())
    }

    fn reject_oversized(
        &self,
        size: usize,
        report: &mut CycleReport,
    ) -> Result<()> {
        let max_bytes = self.max_batch_bytes;
        match self.failure.on_oversized_item {
            FailurePolicy::FailFast => {
                error!(size, max_bytes, "stopping: change item exceeds the batch ceiling");
                Err(SinkError::ItemTooLarge { size, max_bytes }.into())
            }
            FailurePolicy::SkipAndContinue => {
                warn!(size, max_bytes, "skipping change item larger than the batch ceiling");
                DROPPED_ITEMS.with_label_values(&[DROP_REASON_TOO_LARGE]).inc();
                report.skipped_too_large += 1;
                report
                    .outcomes
                    .push(DispatchOutcome::SkippedTooLarge { size, max_bytes });
                Ok(())
            }
        }
    }
}
