//! Assembles an [`EventSink`] from a [`ForwarderConfig`].
//!
//! Components left unset fall back to production defaults: a
//! [`GrpcTransport`] connected to `transport.endpoint`, and the routing key
//! provider described by the `routing` section.
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let sink = SinkBuilder::new(config, shutdown_rx)
//!     .start_metrics_server(shutdown_tx.subscribe())
//!     .build::<serde_json::Value>()
//!     .await?;
//! let handle = sink.handle();
//! tokio::spawn(sink.run());
//! handle.update_events(Some(pod), None).await;
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;

use crate::metrics;
use crate::provider_from_config;
use crate::BatchBuilder;
use crate::BoundedBuffer;
use crate::Dispatcher;
use crate::EventSink;
use crate::ForwarderConfig;
use crate::GrpcTransport;
use crate::Result;
use crate::RoutingKeyProvider;
use crate::Transport;

pub struct SinkBuilder {
    config: ForwarderConfig,
    shutdown_signal: watch::Receiver<()>,
    transport: Option<Box<dyn Transport>>,
    routing: Option<Arc<dyn RoutingKeyProvider>>,
}

impl SinkBuilder {
    pub fn new(
        config: ForwarderConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            config,
            shutdown_signal,
            transport: None,
            routing: None,
        }
    }

    /// Sets a custom transport instead of connecting over gRPC
    pub fn transport(
        mut self,
        transport: impl Transport,
    ) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Sets a custom routing key provider, e.g. a [`SharedRoutingKey`](crate::SharedRoutingKey)
    pub fn routing_key_provider(
        mut self,
        provider: Arc<dyn RoutingKeyProvider>,
    ) -> Self {
        self.routing = Some(provider);
        self
    }

    /// Launches the Prometheus endpoint when `monitoring.metrics_addr` is set.
    pub fn start_metrics_server(
        self,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        let Some(addr) = self.config.monitoring.metrics_addr else {
            debug!("metrics endpoint disabled");
            return self;
        };
        tokio::spawn(async move {
            metrics::start_server(addr, shutdown_signal).await;
        });
        self
    }

    /// Validates the configuration and assembles the sink.
    ///
    /// # Errors
    /// - [`Error::InvalidConfig`](crate::Error::InvalidConfig) when a section fails validation
    /// - [`TransportError`](crate::TransportError) when the default transport cannot connect
    pub async fn build<R>(self) -> Result<EventSink<R>>
    where
        R: Serialize + Send + 'static,
    {
        let config = self.config.validate()?;

        let transport: Box<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Box::new(GrpcTransport::connect(&config.transport).await?),
        };
        let routing = self
            .routing
            .unwrap_or_else(|| provider_from_config(&config.routing));

        let buffer = Arc::new(BoundedBuffer::new(config.buffer.capacity, config.buffer.policy()));
        let builder = BatchBuilder::new(
            Dispatcher::new(transport, config.retry.dispatch),
            config.batch.max_batch_bytes,
            config.transport.queue_name.clone(),
            config.routing.property_name.clone(),
            config.failure.clone(),
        );

        info!(
            endpoint = %config.transport.endpoint,
            queue = %config.transport.queue_name,
            capacity = config.buffer.capacity,
            overflow = config.buffer.overflow,
            "event sink assembled"
        );
        Ok(EventSink::new(buffer, builder, routing, self.shutdown_signal))
    }
}
