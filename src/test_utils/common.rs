use std::sync::Arc;

use parking_lot::Mutex;

use crate::BackoffPolicy;
use crate::Batch;
use crate::ChangeItem;
use crate::Message;
use crate::MockTransport;
use crate::RoutingKey;
use crate::TransportConfig;

pub(crate) const TEST_ROUTING_PROPERTY: &str = "routing_key";

pub(crate) const TEST_QUEUE_NAME: &str = "k8s-events";

/// Builds an ADDED item whose message weighs exactly `len` bytes against
/// the batch ceiling. `current` is `tag` repeated, so batches can be
/// inspected by the first character of each body.
pub(crate) fn item_with_encoded_len(
    tag: char,
    len: usize,
    routing_key: &RoutingKey,
) -> ChangeItem<String> {
    let item = |padding: usize| ChangeItem::new(None, Some(tag.to_string().repeat(padding)));
    let wire_len = |padding: usize| {
        Message::json(
            item(padding).to_json_bytes().expect("serialize item"),
            TEST_ROUTING_PROPERTY,
            routing_key,
        )
        .encoded_len()
    };

    // every padding byte adds at least one wire byte, so search downwards
    let mut padding = len.saturating_sub(wire_len(0));
    while padding > 1 && wire_len(padding) > len {
        padding -= 1;
    }
    assert_eq!(wire_len(padding), len, "no item encodes to exactly {len} bytes");

    item(padding)
}

/// Header bytes of a batch the builder opens for `routing_key`
pub(crate) fn header_bytes(routing_key: &RoutingKey) -> usize {
    Batch::for_queue(TEST_QUEUE_NAME, routing_key.clone(), usize::MAX).header_bytes()
}

/// Tags of the items carried by `batch`, in order
pub(crate) fn batch_tags(batch: &Batch) -> String {
    batch
        .messages()
        .iter()
        .filter_map(|message| {
            let body: serde_json::Value = serde_json::from_slice(message.body()).ok()?;
            body["current"].as_str()?.chars().next()
        })
        .collect()
}

/// Transport mock that accepts everything and keeps a copy of each batch
pub(crate) fn recording_transport() -> (MockTransport, Arc<Mutex<Vec<Batch>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let sent_clone = sent.clone();

    let mut transport = MockTransport::new();
    transport.expect_publish().returning(move |batch| {
        sent_clone.lock().push(batch.clone());
        Ok(())
    });
    transport.expect_close().returning(|| ());
    (transport, sent)
}

pub(crate) fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        timeout_ms: 500,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

pub(crate) fn transport_config_for_port(port: u16) -> TransportConfig {
    TransportConfig {
        endpoint: format!("http://127.0.0.1:{port}"),
        queue_name: TEST_QUEUE_NAME.to_string(),
        connect_timeout_ms: 1000,
        request_timeout_ms: 1000,
        ..Default::default()
    }
}
