// -
// Wire format

/// Content type attached to every forwarded message
pub(crate) const CONTENT_TYPE_JSON: &str = "application/json";

/// gRPC metadata key carrying the bearer token
pub(crate) const AUTHORIZATION_HEADER: &str = "authorization";

// -
// Defaults

/// Property name under which the routing key is attached to each message
pub(crate) const DEFAULT_ROUTING_KEY_PROPERTY: &str = "routing_key";

/// Environment variable consulted for the routing key at every drain cycle
pub(crate) const DEFAULT_ROUTING_KEY_ENV: &str = "FORWARDER_ROUTING_KEY";

/// 1 MiB, the usual per-batch ceiling of managed event streams
pub(crate) const DEFAULT_MAX_BATCH_BYTES: usize = 1024 * 1024;

/// tonic's default 4 MiB decoding limit. Batch sizes count the encoded
/// `PublishRequest`, so a batch at this ceiling is still accepted.
pub(crate) const MAX_BATCH_BYTES_LIMIT: usize = 4 * 1024 * 1024;

pub(crate) const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Prefix of environment variables overriding configuration
pub(crate) const CONFIG_ENV_PREFIX: &str = "FORWARDER";
