use std::collections::BTreeMap;

use bytes::Bytes;
use prost::Message as _;

use crate::constants::CONTENT_TYPE_JSON;
use crate::proto::ingest::EventMessage;
use crate::proto::ingest::PublishRequest;
use crate::RoutingKey;

/// One transport message: a JSON body plus its properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    body: Bytes,
    properties: BTreeMap<String, String>,
    content_type: String,
    encoded_len: usize,
}

impl Message {
    /// JSON message tagged with the routing key under `routing_property`
    pub fn json(
        body: impl Into<Bytes>,
        routing_property: &str,
        routing_key: &RoutingKey,
    ) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(routing_property.to_string(), routing_key.to_string());
        let mut message = Self {
            body: body.into(),
            properties,
            content_type: CONTENT_TYPE_JSON.to_string(),
            encoded_len: 0,
        };
        message.encoded_len = PublishRequest {
            messages: vec![EventMessage::from(&message)],
            ..Default::default()
        }
        .encoded_len();
        message
    }

    /// Bytes this message adds to an encoded `PublishRequest`, field tag
    /// and length prefix included.
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

impl From<&Message> for EventMessage {
    fn from(message: &Message) -> Self {
        EventMessage {
            body: message.body.clone(),
            properties: message
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            content_type: message.content_type.clone(),
        }
    }
}

/// Ordered messages bound for one send.
///
/// `size_bytes()` is the encoded size of the whole `PublishRequest`: the
/// queue name and partition key header plus every message.
/// Invariant: `size_bytes() <= max_bytes()`. The batch refuses any message
/// that would break it.
#[derive(Debug, Clone)]
pub struct Batch {
    routing_key: RoutingKey,
    max_bytes: usize,
    messages: Vec<Message>,
    header_bytes: usize,
    size_bytes: usize,
}

impl Batch {
    /// Batch for a request without a queue name
    pub fn new(
        routing_key: RoutingKey,
        max_bytes: usize,
    ) -> Self {
        Self::for_queue("", routing_key, max_bytes)
    }

    /// Batch whose size accounts for a request addressed to `queue_name`
    pub fn for_queue(
        queue_name: &str,
        routing_key: RoutingKey,
        max_bytes: usize,
    ) -> Self {
        let header_bytes = PublishRequest {
            queue_name: queue_name.to_string(),
            partition_key: routing_key.to_string(),
            messages: Vec::new(),
        }
        .encoded_len();
        Self {
            routing_key,
            max_bytes,
            messages: Vec::new(),
            header_bytes,
            size_bytes: header_bytes,
        }
    }

    /// Appends `message`, or hands it back if it would exceed the ceiling.
    pub fn try_push(
        &mut self,
        message: Message,
    ) -> std::result::Result<(), Message> {
        let len = message.encoded_len();
        if self.size_bytes + len > self.max_bytes {
            return Err(message);
        }
        self.size_bytes += len;
        self.messages.push(message);
        Ok(())
    }

    /// Whether `message` fits once the batch is empty
    pub fn fits_alone(
        &self,
        message: &Message,
    ) -> bool {
        self.header_bytes + message.encoded_len() <= self.max_bytes
    }

    pub fn routing_key(&self) -> &RoutingKey {
        &self.routing_key
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Size of the request carrying no messages
    pub fn header_bytes(&self) -> usize {
        self.header_bytes
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}
