//! Prometheus collectors and the optional `/metrics` HTTP endpoint.
//!
//! Collectors are process wide. They are registered into [`REGISTRY`] the
//! first time the endpoint starts; updating them before that is harmless.


use std::net::SocketAddr;
use std::sync::Once;

use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

pub const DROP_REASON_OVERFLOW: &str = "overflow";
pub const DROP_REASON_CLOSED: &str = "closed";
pub const DROP_REASON_TOO_LARGE: &str = "too_large";
pub const DROP_REASON_SERIALIZATION: &str = "serialization";
pub const DROP_REASON_SEND_FAILED: &str = "send_failed";

pub const OUTCOME_DELIVERED: &str = "delivered";
pub const OUTCOME_FAILED: &str = "failed";

lazy_static! {
    pub static ref ENQUEUED_ITEMS: IntCounter =
        IntCounter::new("forwarder_enqueued_items", "Change items accepted into the buffer")
            .expect("metric can not be created");

    pub static ref DROPPED_ITEMS: IntCounterVec = IntCounterVec::new(
        Opts::new("forwarder_dropped_items", "Change items that never reached the transport"),
        &["reason"]
    )
    .expect("metric can not be created");

    pub static ref DISPATCHED_BATCHES: IntCounterVec = IntCounterVec::new(
        Opts::new("forwarder_dispatched_batches", "Batches handed to the transport"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref BATCH_SIZE_BYTES: Histogram = Histogram::with_opts(
        HistogramOpts::new("forwarder_batch_size_bytes", "Encoded size of delivered batches")
            .buckets(exponential_buckets(256.0, 2.0, 14).expect("valid buckets"))
    )
    .expect("metric can not be created");

    pub static ref BATCH_MESSAGES: Histogram = Histogram::with_opts(
        HistogramOpts::new("forwarder_batch_messages", "Messages per delivered batch")
            .buckets(exponential_buckets(1.0, 2.0, 12).expect("valid buckets"))
    )
    .expect("metric can not be created");

    pub static ref BUFFER_DEPTH: IntGauge =
        IntGauge::new("forwarder_buffer_depth", "Items waiting in the buffer")
            .expect("metric can not be created");

    pub static ref SEND_RETRIES: IntCounter =
        IntCounter::new("forwarder_send_retries", "Transport send attempts that were retried")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(ENQUEUED_ITEMS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DROPPED_ITEMS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DISPATCHED_BATCHES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(BATCH_SIZE_BYTES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(BATCH_MESSAGES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(BUFFER_DEPTH.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(SEND_RETRIES.clone()))
        .expect("collector can be registered");
}

fn init_registry() {
    REGISTER.call_once(|| {
        register_custom_metrics(&REGISTRY);
        if let Err(e) = prometheus_exporter::try_init() {
            warn!("autometrics exporter already initialised: {}", e);
        }
    });
}

/// `GET /metrics` rendering `registry` followed by the autometrics series
pub(crate) fn metrics_route(registry: Registry) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("metrics")
        .and(warp::get())
        .map(move || registry.clone())
        .and_then(metrics_handler)
}

/// Serves `/metrics` on `addr` until `shutdown_signal` changes or its
/// sender is dropped. A failed bind is logged and the endpoint stays off.
pub async fn start_server(
    addr: SocketAddr,
    mut shutdown_signal: watch::Receiver<()>,
) {
    init_registry();

    let bound = warp::serve(metrics_route(REGISTRY.clone())).try_bind_with_graceful_shutdown(addr, async move {
        let _ = shutdown_signal.changed().await;
    });
    let (local_addr, server) = match bound {
        Ok(bound) => bound,
        Err(e) => {
            error!("failed to bind metrics endpoint on {}: {}", addr, e);
            return;
        }
    };
    info!("metrics endpoint listening on {}", local_addr);
    server.await;
    info!("metrics endpoint stopped");
}

async fn metrics_handler(registry: Registry) -> Result<impl Reply, Rejection> {
    let mut body = encode(&registry.gather());
    body.push_str(&get_metrics_body());
    Ok(body)
}

fn encode(families: &[prometheus::proto::MetricFamily]) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(families, &mut buffer) {
        warn!("could not encode custom metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        warn!("custom metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}

/// Autometrics series in the Prometheus text format
pub fn get_metrics_body() -> String {
    prometheus_exporter::encode_http_response().into_body()
}
