//! Remote streaming transport abstraction.
//!
//! The [`Transport`] is owned exclusively by the
//! [`Dispatcher`](crate::Dispatcher) for the lifetime of the sink; no other
//! component talks to it.
mod grpc;

pub use grpc::*;


#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use crate::Batch;
use crate::TransportError;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends every message of `batch` in one network call.
    ///
    /// # Errors
    /// - [`TransportError::ServiceUnavailable`] / [`TransportError::Timeout`]: transient, the
    ///   caller may retry
    /// - [`TransportError::PayloadTooLarge`]: the transport refused the batch size
    /// - [`TransportError::Unauthorized`]: credentials rejected
    /// - [`TransportError::Closed`]: `close` was already called
    async fn publish(
        &self,
        batch: &Batch,
    ) -> std::result::Result<(), TransportError>;

    /// Releases the underlying connection. Later `publish` calls fail with
    /// [`TransportError::Closed`].
    async fn close(&self);
}
