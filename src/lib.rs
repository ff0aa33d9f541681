//! Buffered, batching sink that forwards resource change notifications to a
//! remote streaming transport.
//!
//! Producers hand `(previous, current)` pairs to a [`SinkHandle`] and return
//! immediately. A single drain task packs them into size-bounded batches and
//! sends each batch through a [`Transport`], by default [`GrpcTransport`].
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let config = ForwarderConfig::new()?.validate()?;
//! let sink = SinkBuilder::new(config, shutdown_rx).build::<serde_json::Value>().await?;
//! let handle = sink.handle();
//! tokio::spawn(sink.run());
//!
//! handle.update_events(Some(current), previous).await;
//! ```

mod batch;
mod buffer;
mod config;
mod constants;
mod dispatcher;
mod errors;
mod event;
pub mod metrics;
pub mod proto;
mod routing;
mod sink;
mod transport;
mod utils;

pub use batch::*;
pub use buffer::*;
pub use config::*;
pub use dispatcher::*;
pub use errors::*;
pub use event::*;
pub use routing::*;
pub use sink::*;
pub use transport::*;
pub(crate) use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("forwarder")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms250, ObjectivePercentile::P99);
