use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_ROUTING_KEY_ENV;
use crate::constants::DEFAULT_ROUTING_KEY_PROPERTY;
use crate::Error;
use crate::Result;

/// Source of the routing (partition) key resolved at every drain cycle
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RoutingConfig {
    /// Fixed routing key. When unset, `env_var` is read at every cycle.
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default = "default_env_var")]
    pub env_var: String,

    /// Message property carrying the routing key
    #[serde(default = "default_property_name")]
    pub property_name: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            key: None,
            env_var: default_env_var(),
            property_name: default_property_name(),
        }
    }
}

impl RoutingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.key.is_none() && self.env_var.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "routing.env_var cannot be empty when routing.key is unset".into(),
            ));
        }
        if self.property_name.trim().is_empty() {
            return Err(Error::InvalidConfig("routing.property_name cannot be empty".into()));
        }
        Ok(())
    }
}

fn default_env_var() -> String {
    DEFAULT_ROUTING_KEY_ENV.to_string()
}
fn default_property_name() -> String {
    DEFAULT_ROUTING_KEY_PROPERTY.to_string()
}
