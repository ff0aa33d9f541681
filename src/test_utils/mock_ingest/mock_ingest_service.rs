use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::codec::CompressionEncoding;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tracing::debug;

use crate::constants::AUTHORIZATION_HEADER;
use crate::proto::ingest::event_ingest_server::EventIngest;
use crate::proto::ingest::event_ingest_server::EventIngestServer;
use crate::proto::ingest::PublishRequest;
use crate::proto::ingest::PublishResponse;

/// One accepted `Publish` call
#[derive(Debug, Clone)]
pub struct ReceivedPublish {
    pub authorization: Option<String>,
    pub request: PublishRequest,
}

/// Ingest service that fails with the scripted statuses first, then
/// accepts and records every request.
#[derive(Debug, Default)]
pub struct MockIngestService {
    scripted_failures: Mutex<VecDeque<Status>>,
    received: Mutex<Vec<ReceivedPublish>>,
}

impl MockIngestService {
    pub fn failing_with(statuses: Vec<Status>) -> Self {
        Self {
            scripted_failures: Mutex::new(statuses.into()),
            ..Default::default()
        }
    }

    pub fn received(&self) -> Vec<ReceivedPublish> {
        self.received.lock().clone()
    }
}

#[tonic::async_trait]
impl EventIngest for MockIngestService {
    async fn publish(
        &self,
        request: Request<PublishRequest>,
    ) -> std::result::Result<Response<PublishResponse>, Status> {
        if let Some(status) = self.scripted_failures.lock().pop_front() {
            return Err(status);
        }

        let authorization = request
            .metadata()
            .get(AUTHORIZATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let request = request.into_inner();
        let accepted = request.messages.len() as u32;
        self.received.lock().push(ReceivedPublish {
            authorization,
            request,
        });

        Ok(Response::new(PublishResponse { accepted }))
    }
}

/// Serves `service` on an ephemeral local port until `rx` fires.
pub(crate) async fn start_ingest_server(
    service: Arc<MockIngestService>,
    rx: oneshot::Receiver<()>,
) -> (u16, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let port = addr.port();
    debug!("starting mock ingest service:port={port}");

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(
                EventIngestServer::from_arc(service)
                    .accept_compressed(CompressionEncoding::Gzip)
                    .send_compressed(CompressionEncoding::Gzip),
            )
            .serve_with_incoming_shutdown(tokio_stream::wrappers::TcpListenerStream::new(listener), async {
                rx.await.ok();
            })
            .await
            .unwrap();
    });

    (port, addr)
}
