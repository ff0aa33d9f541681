//! Error hierarchy for the forwarding sink
//!
//! Errors are grouped by the layer that raises them: configuration, the
//! sink's own buffering and batching logic, and the remote transport.

use std::time::Duration;

use config::ConfigError;
use tonic::Code;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration could not be loaded or merged
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration loaded but failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Buffering or batching failures
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Remote transport failures
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    SignalSenderClosed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// A single serialized item is larger than the batch ceiling and can
    /// never be sent at any batch size.
    #[error("Item of {size} bytes exceeds the batch ceiling of {max_bytes} bytes")]
    ItemTooLarge { size: usize, max_bytes: usize },

    #[error("Failed to serialize change item: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A batch could not be delivered and the configured policy is fail-fast
    #[error("Batch of {messages} messages could not be delivered: {source}")]
    DispatchFailed {
        messages: usize,
        #[source]
        source: TransportError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Endpoint temporarily unable to accept requests
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The transport refused the batch because of its size
    #[error("Payload of {0} bytes rejected as too large")]
    PayloadTooLarge(usize),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Malformed endpoint address
    #[error("Invalid URI format: {0}")]
    InvalidURI(String),

    #[error("Failed to connect to {endpoint}")]
    ConnectFailed {
        endpoint: String,
        #[source]
        source: Box<tonic::transport::Error>,
    },

    #[error("Failed to load TLS material: {0}")]
    Tls(String),

    /// gRPC status code errors not covered by a dedicated variant
    #[error(transparent)]
    Status(#[from] Box<tonic::Status>),

    #[error("Transport is closed")]
    Closed,
}

impl TransportError {
    /// Whether sending the same batch again may succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            TransportError::ServiceUnavailable(_) | TransportError::Timeout(_) => true,
            TransportError::Status(status) => matches!(
                status.code(),
                Code::Unavailable
                    | Code::DeadlineExceeded
                    | Code::ResourceExhausted
                    | Code::Aborted
                    | Code::Internal
                    | Code::Unknown
            ),
            _ => false,
        }
    }
}
