use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::metrics::BUFFER_DEPTH;
use crate::metrics::DROPPED_ITEMS;
use crate::metrics::DROP_REASON_CLOSED;
use crate::metrics::ENQUEUED_ITEMS;
use crate::BatchBuilder;
use crate::BoundedBuffer;
use crate::ChangeItem;
use crate::Result;
use crate::RoutingKeyProvider;

/// Lifecycle of the drain loop, published on a watch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Waiting for items
    Running,
    /// Forwarding one drain cycle's worklist
    Draining,
    /// The loop has exited and the transport is closed
    Stopped,
}

/// Producer side of the sink. Cheap to clone; every clone feeds the same
/// buffer.
pub struct SinkHandle<R> {
    buffer: Arc<BoundedBuffer<ChangeItem<R>>>,
}

impl<R> Clone for SinkHandle<R> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
        }
    }
}

impl<R> SinkHandle<R> {
    /// Records that a watched resource changed.
    ///
    /// Returns once the item is accepted, which is not the same as
    /// delivered. Only suspends when the buffer is full and configured to
    /// block.
    pub async fn update_events(
        &self,
        current: Option<R>,
        previous: Option<R>,
    ) {
        self.submit(ChangeItem::new(previous, current)).await;
    }

    pub async fn submit(
        &self,
        item: ChangeItem<R>,
    ) {
        ENQUEUED_ITEMS.inc();
        self.buffer.enqueue(item).await;
        BUFFER_DEPTH.set(self.buffer.len() as i64);
    }

    /// Items queued but not yet taken by the drain loop
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Items discarded by the buffer (overflow, or submitted after close)
    pub fn dropped(&self) -> u64 {
        self.buffer.dropped()
    }

    /// Stops accepting items. The drain loop forwards what is already
    /// queued, then exits.
    pub fn close(&self) {
        self.buffer.close();
    }
}

/// Consumer side of the sink: the single task that drains the buffer and
/// owns the transport.
pub struct EventSink<R> {
    buffer: Arc<BoundedBuffer<ChangeItem<R>>>,
    builder: BatchBuilder,
    routing: Arc<dyn RoutingKeyProvider>,
    shutdown_signal: watch::Receiver<()>,
    state_tx: watch::Sender<SinkState>,
}

impl<R> EventSink<R>
where
    R: Serialize + Send + 'static,
{
    pub(crate) fn new(
        buffer: Arc<BoundedBuffer<ChangeItem<R>>>,
        builder: BatchBuilder,
        routing: Arc<dyn RoutingKeyProvider>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SinkState::Running);
        Self {
            buffer,
            builder,
            routing,
            shutdown_signal,
            state_tx,
        }
    }

    pub fn handle(&self) -> SinkHandle<R> {
        SinkHandle {
            buffer: self.buffer.clone(),
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SinkState> {
        self.state_tx.subscribe()
    }

    /// Runs the drain loop until the shutdown signal fires, every handle
    /// closes the buffer, or a fail-fast policy trips.
    ///
    /// The buffer and the transport are closed on every exit path, and the
    /// state ends as [`SinkState::Stopped`].
    pub async fn run(mut self) -> Result<()> {
        info!(
            capacity = self.buffer.capacity(),
            policy = ?self.buffer.policy(),
            max_batch_bytes = self.builder.max_batch_bytes(),
            "event sink started"
        );

        let result = self.drain_loop().await;

        self.buffer.close();
        let abandoned = self.buffer.drain().len();
        if abandoned > 0 {
            warn!(abandoned, "items left in the buffer were not forwarded");
            DROPPED_ITEMS
                .with_label_values(&[DROP_REASON_CLOSED])
                .inc_by(abandoned as u64);
        }
        BUFFER_DEPTH.set(0);

        self.builder.close().await;
        self.state_tx.send_replace(SinkState::Stopped);

        match &result {
            Ok(()) => info!("event sink stopped"),
            Err(e) => error!("event sink stopped: {}", e),
        }
        result
    }

    async fn drain_loop(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown_signal.changed() => {
                    info!("shutdown signal received");
                    return Ok(());
                }
                item = self.buffer.recv() => {
                    match item {
                        Some(first) => self.run_cycle(first).await?,
                        None => {
                            info!("buffer closed and drained");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn run_cycle(
        &mut self,
        first: ChangeItem<R>,
    ) -> Result<()> {
        let mut worklist = vec![first];
        worklist.extend(self.buffer.drain());
        BUFFER_DEPTH.set(self.buffer.len() as i64);

        let routing_key = self.routing.routing_key();
        if routing_key.is_empty() {
            debug!("routing key is empty, the transport picks the partition");
        }

        self.state_tx.send_replace(SinkState::Draining);
        debug!(items = worklist.len(), routing_key = %routing_key, "drain cycle");

        self.builder.forward(worklist, &routing_key).await?;

        self.state_tx.send_replace(SinkState::Running);
        Ok(())
    }
}
