use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use event_forwarder::proto::ingest::event_ingest_server::EventIngest;
use event_forwarder::proto::ingest::event_ingest_server::EventIngestServer;
use event_forwarder::proto::ingest::EventMessage;
use event_forwarder::proto::ingest::PublishRequest;
use event_forwarder::proto::ingest::PublishResponse;
use event_forwarder::BackoffPolicy;
use event_forwarder::ForwarderConfig;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::codec::CompressionEncoding;
use tonic::Request;
use tonic::Response;
use tonic::Status;

pub const WAIT: Duration = Duration::from_secs(10);

pub const QUEUE_NAME: &str = "cluster-events";

/// `Publish` call accepted by [`RecordingIngest`]
#[derive(Debug, Clone)]
pub struct Received {
    pub authorization: Option<String>,
    pub request: PublishRequest,
}

/// In-process ingest endpoint. Answers with the scripted statuses first,
/// then accepts and records every request.
#[derive(Debug, Default)]
pub struct RecordingIngest {
    failures: Mutex<VecDeque<Status>>,
    received: Mutex<Vec<Received>>,
}

#[allow(dead_code)]
impl RecordingIngest {
    pub fn failing_with(statuses: Vec<Status>) -> Self {
        Self {
            failures: Mutex::new(statuses.into()),
            ..Default::default()
        }
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().clone()
    }

    pub fn messages(&self) -> Vec<EventMessage> {
        self.received
            .lock()
            .iter()
            .flat_map(|r| r.request.messages.clone())
            .collect()
    }
}

#[tonic::async_trait]
impl EventIngest for RecordingIngest {
    async fn publish(
        &self,
        request: Request<PublishRequest>,
    ) -> std::result::Result<Response<PublishResponse>, Status> {
        if let Some(status) = self.failures.lock().pop_front() {
            return Err(status);
        }
        let authorization = request
            .metadata()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let request = request.into_inner();
        let accepted = request.messages.len() as u32;
        self.received.lock().push(Received {
            authorization,
            request,
        });
        Ok(Response::new(PublishResponse { accepted }))
    }
}

/// Serves `service` on an ephemeral port; dropping or firing the returned
/// sender stops the server.
pub async fn start_ingest(service: Arc<RecordingIngest>) -> (u16, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = oneshot::channel::<()>();

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

    (port, tx)
}

/// Configuration pointing at a local ingest endpoint with fast retries
pub fn forwarder_config(port: u16) -> ForwarderConfig {
    let mut config = ForwarderConfig::default();
    config.transport.endpoint = format!("http://127.0.0.1:{port}");
    config.transport.queue_name = QUEUE_NAME.to_string();
    config.transport.connect_timeout_ms = 1000;
    config.transport.request_timeout_ms = 2000;
    config.retry.dispatch = BackoffPolicy {
        max_retries: 4,
        timeout_ms: 2000,
        base_delay_ms: 5,
        max_delay_ms: 20,
    };
    config
}

pub fn body_json(message: &EventMessage) -> serde_json::Value {
    serde_json::from_slice(&message.body).unwrap()
}
