/// Configuration module for gqlcypher
///
/// This module defines the settings that shape translation: subscriptions,
/// the unwind-create optimisation, where caller roles live in the JWT claims,
/// and the limits of the parsed-operation cache.
use serde::Deserialize;

use crate::error::Result;

/// Translation settings, passed explicitly through [`Context`](crate::Context)
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Emit subscription event metadata alongside mutations
    pub subscriptions_enabled: bool,

    /// Try the unwind-create engine before classic create translation
    pub unwind_create: bool,

    /// Dotted path of the roles array inside the JWT claims
    pub roles_path: String,

    /// Maximum allowed depth for nested GraphQL selections
    pub max_query_depth: usize,

    /// Maximum number of parsed operations to store in cache
    pub query_cache_max_size: u64,

    /// Time-to-live for cached operations in seconds
    pub query_cache_ttl_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            subscriptions_enabled: false,
            unwind_create: true,
            roles_path: "roles".to_string(),
            max_query_depth: 32,
            query_cache_max_size: 1000,
            query_cache_ttl_seconds: 3600,
        }
    }
}

impl Config {
    /// Loads a configuration from JSON; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config = Config::from_json(r#"{ "subscriptionsEnabled": true }"#).unwrap();
        assert!(config.subscriptions_enabled);
        assert!(config.unwind_create);
        assert_eq!(config.roles_path, "roles");
        assert_eq!(config.max_query_depth, 32);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(Config::from_json("{").is_err());
    }
}
