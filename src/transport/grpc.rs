//! gRPC implementation of [`Transport`] against the `ingest.EventIngest`
//! service.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tonic::async_trait;
use tonic::codec::CompressionEncoding;
use tonic::metadata::Ascii;
use tonic::metadata::MetadataValue;
use tonic::transport::Certificate;
use tonic::transport::Channel;
use tonic::transport::ClientTlsConfig;
use tonic::transport::Endpoint;
use tonic::Code;
use tonic::Status;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Transport;
use crate::constants::AUTHORIZATION_HEADER;
use crate::proto::ingest::event_ingest_client::EventIngestClient;
use crate::proto::ingest::EventMessage;
use crate::proto::ingest::PublishRequest;
use crate::Batch;
use crate::TransportConfig;
use crate::TransportError;

pub struct GrpcTransport {
    /// `None` once closed
    client: Mutex<Option<EventIngestClient<Channel>>>,
    endpoint: String,
    queue_name: String,
    authorization: Option<MetadataValue<Ascii>>,
    request_timeout: Duration,
}

impl fmt::Debug for GrpcTransport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("GrpcTransport")
            .field("endpoint", &self.endpoint)
            .field("queue_name", &self.queue_name)
            .field("authenticated", &self.authorization.is_some())
            .finish_non_exhaustive()
    }
}

impl GrpcTransport {
    /// Connects eagerly, so an unreachable endpoint fails construction.
    pub async fn connect(config: &TransportConfig) -> std::result::Result<Self, TransportError> {
        let endpoint = build_endpoint(config).await?;
        let channel = endpoint.connect().await.map_err(|e| TransportError::ConnectFailed {
            endpoint: config.endpoint.clone(),
            source: Box::new(e),
        })?;

        info!(
            endpoint = %config.endpoint,
            queue = %config.queue_name,
            "connected to ingest endpoint"
        );
        Self::from_channel(channel, config)
    }

    /// Wraps an existing channel, e.g. one created with `connect_lazy`.
    pub fn from_channel(
        channel: Channel,
        config: &TransportConfig,
    ) -> std::result::Result<Self, TransportError> {
        let mut client = EventIngestClient::new(channel);
        if config.compression {
            client = client
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }

        let authorization = match &config.auth_token {
            Some(token) => Some(MetadataValue::try_from(format!("Bearer {token}")).map_err(|_| {
                TransportError::Unauthorized("auth token is not a valid header value".to_string())
            })?),
            None => None,
        };

        Ok(Self {
            client: Mutex::new(Some(client)),
            endpoint: config.endpoint.clone(),
            queue_name: config.queue_name.clone(),
            authorization,
            request_timeout: config.request_timeout(),
        })
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn publish(
        &self,
        batch: &Batch,
    ) -> std::result::Result<(), TransportError> {
        let mut client = self.client.lock().clone().ok_or(TransportError::Closed)?;

        let mut request = tonic::Request::new(publish_request(&self.queue_name, batch));
        if let Some(authorization) = &self.authorization {
            request
                .metadata_mut()
                .insert(AUTHORIZATION_HEADER, authorization.clone());
        }

        let response = client
            .publish(request)
            .await
            .map_err(|status| classify_status(status, batch.size_bytes(), self.request_timeout))?;

        let accepted = response.into_inner().accepted as usize;
        if accepted != batch.len() {
            warn!(
                accepted,
                sent = batch.len(),
                "ingest endpoint acknowledged a different message count"
            );
        }
        debug!(messages = batch.len(), bytes = batch.size_bytes(), "batch published");
        Ok(())
    }

    async fn close(&self) {
        if self.client.lock().take().is_some() {
            info!(endpoint = %self.endpoint, "ingest connection closed");
        }
    }
}

async fn build_endpoint(config: &TransportConfig) -> std::result::Result<Endpoint, TransportError> {
    let mut endpoint = Endpoint::from_shared(config.endpoint.clone())
        .map_err(|e| TransportError::InvalidURI(format!("{}: {}", config.endpoint, e)))?
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .tcp_nodelay(true);

    if config.is_tls() {
        let mut tls = ClientTlsConfig::new();
        if let Some(path) = &config.ca_cert_path {
            let pem = tokio::fs::read(path)
                .await
                .map_err(|e| TransportError::Tls(format!("{}: {}", path.display(), e)))?;
            tls = tls.ca_certificate(Certificate::from_pem(pem));
        }
        if let Some(domain) = &config.tls_domain {
            tls = tls.domain_name(domain.clone());
        }
        endpoint = endpoint
            .tls_config(tls)
            .map_err(|e| TransportError::Tls(e.to_string()))?;
    }

    Ok(endpoint)
}

/// Wire request for `batch`. Its encoded length equals
/// `batch.size_bytes()` when the batch was opened for `queue_name`.
pub(crate) fn publish_request(
    queue_name: &str,
    batch: &Batch,
) -> PublishRequest {
    PublishRequest {
        queue_name: queue_name.to_string(),
        partition_key: batch.routing_key().to_string(),
        messages: batch.messages().iter().map(EventMessage::from).collect(),
    }
}

/// Maps a gRPC status onto the transport error taxonomy.
pub(crate) fn classify_status(
    status: Status,
    batch_bytes: usize,
    request_timeout: Duration,
) -> TransportError {
    match status.code() {
        Code::Unavailable => TransportError::ServiceUnavailable(status.message().to_string()),
        // tonic reports its own request timeout as `Cancelled`
        Code::DeadlineExceeded | Code::Cancelled => TransportError::Timeout(request_timeout),
        Code::Unauthenticated | Code::PermissionDenied => {
            TransportError::Unauthorized(status.message().to_string())
        }
        Code::OutOfRange => TransportError::PayloadTooLarge(batch_bytes),
        _ => TransportError::Status(Box::new(status)),
    }
}
