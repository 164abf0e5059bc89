/// Per-request execution context
///
/// Carries the decoded JWT claims, free-form request properties and the
/// callback registry. Tokens are decoded by the host; this crate only reads
/// the resulting claims.
use serde_json::{json, Value};

use crate::callbacks::{Callback, CallbackRegistry};
use crate::config::Config;

#[derive(Debug, Clone, Default)]
pub struct Context {
    pub config: Config,
    pub jwt: Option<Value>,
    pub request: Value,
    pub callbacks: CallbackRegistry,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Context {
            config,
            jwt: None,
            request: Value::Null,
            callbacks: CallbackRegistry::new(),
        }
    }

    pub fn with_jwt(mut self, claims: Value) -> Self {
        self.jwt = Some(claims);
        self
    }

    pub fn with_request(mut self, request: Value) -> Self {
        self.request = request;
        self
    }

    pub fn with_callback(mut self, name: impl Into<String>, callback: impl Callback + 'static) -> Self {
        self.callbacks.register(name, callback);
        self
    }

    /// Resolves `$jwt.a.b` or `$context.a.b`; `None` when any segment is undefined
    pub fn resolve_path(&self, path: &str) -> Option<&Value> {
        let (root, rest) = if let Some(rest) = path.strip_prefix("$jwt.") {
            (self.jwt.as_ref()?, rest)
        } else if let Some(rest) = path.strip_prefix("$context.") {
            (&self.request, rest)
        } else {
            return None;
        };
        walk(root, rest)
    }

    pub fn is_authenticated(&self) -> bool {
        self.jwt.is_some()
    }

    /// Caller roles read from `config.roles_path` in the claims
    pub fn roles(&self) -> Vec<String> {
        self.jwt
            .as_ref()
            .and_then(|claims| walk(claims, &self.config.roles_path))
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Value of the `$auth` parameter used by role and authentication checks
    pub fn auth_param_value(&self) -> Value {
        json!({
            "isAuthenticated": self.is_authenticated(),
            "roles": self.roles(),
        })
    }
}

fn walk<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(root, |current, segment| current.as_object()?.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_nested_claims() {
        let context = Context::new(Config::default())
            .with_jwt(json!({ "sub": "abc", "org": { "id": 7 } }))
            .with_request(json!({ "tenant": "t1" }));
        assert_eq!(context.resolve_path("$jwt.sub"), Some(&json!("abc")));
        assert_eq!(context.resolve_path("$jwt.org.id"), Some(&json!(7)));
        assert_eq!(context.resolve_path("$context.tenant"), Some(&json!("t1")));
        assert_eq!(context.resolve_path("$jwt.missing"), None);
        assert_eq!(context.resolve_path("plain"), None);
    }

    #[test]
    fn undefined_without_claims() {
        let context = Context::new(Config::default());
        assert!(!context.is_authenticated());
        assert_eq!(context.resolve_path("$jwt.sub"), None);
        assert!(context.roles().is_empty());
    }

    #[test]
    fn reads_roles_from_configured_path() {
        let config = Config {
            roles_path: "app.roles".into(),
            ..Config::default()
        };
        let context =
            Context::new(config).with_jwt(json!({ "app": { "roles": ["admin", 3, "editor"] } }));
        assert_eq!(context.roles(), vec!["admin", "editor"]);
    }
}
