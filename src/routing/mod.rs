//! Routing (partition) key resolution.
//!
//! The drain loop asks its [`RoutingKeyProvider`] for a key once at the
//! start of every cycle, so the key can be reconfigured while the sink runs.


use std::env;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
#[cfg(test)]
use mockall::automock;

use crate::RoutingConfig;

/// Shard target used by the transport to keep related messages ordered.
///
/// An empty key lets the transport choose the partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RoutingKey(String);

impl RoutingKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RoutingKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RoutingKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg_attr(test, automock)]
pub trait RoutingKeyProvider: Send + Sync + 'static {
    /// Resolves the key for the cycle about to start.
    fn routing_key(&self) -> RoutingKey;
}

/// Same key for the whole lifetime of the sink
#[derive(Debug, Clone)]
pub struct StaticRoutingKey {
    key: RoutingKey,
}

impl StaticRoutingKey {
    pub fn new(key: impl Into<RoutingKey>) -> Self {
        Self { key: key.into() }
    }
}

impl RoutingKeyProvider for StaticRoutingKey {
    fn routing_key(&self) -> RoutingKey {
        self.key.clone()
    }
}

/// Reads an environment variable at every cycle; unset reads as empty
#[derive(Debug, Clone)]
pub struct EnvRoutingKey {
    var: String,
}

impl EnvRoutingKey {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl RoutingKeyProvider for EnvRoutingKey {
    fn routing_key(&self) -> RoutingKey {
        RoutingKey(env::var(&self.var).unwrap_or_default())
    }
}

/// Key held in process memory and swapped atomically by another component.
///
/// Clones share the same slot.
#[derive(Debug, Clone)]
pub struct SharedRoutingKey {
    current: Arc<ArcSwap<RoutingKey>>,
}

impl SharedRoutingKey {
    pub fn new(initial: impl Into<RoutingKey>) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(initial.into())),
        }
    }

    /// Takes effect at the start of the next drain cycle.
    pub fn set(
        &self,
        key: impl Into<RoutingKey>,
    ) {
        self.current.store(Arc::new(key.into()));
    }
}

impl RoutingKeyProvider for SharedRoutingKey {
    fn routing_key(&self) -> RoutingKey {
        self.current.load().as_ref().clone()
    }
}

/// Provider described by the `routing` configuration section
pub fn provider_from_config(config: &RoutingConfig) -> Arc<dyn RoutingKeyProvider> {
    match &config.key {
        Some(key) => Arc::new(StaticRoutingKey::new(key.as_str())),
        None => Arc::new(EnvRoutingKey::new(config.env_var.clone())),
    }
}
