//! Deferred callback values
//!
//! Fields backed by a callback get their value from a user function instead
//! of client input. Translation only registers them in a [`CallbackBucket`]
//! and references `$resolvedCallbacks.<param>` in the Cypher; the bucket runs
//! all functions concurrently once the statement is built.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::constants::RESOLVED_CALLBACKS_PARAM;
use crate::cypher::{CypherResult, Expr, Param};
use crate::error::{Error, Result};

/// A user-supplied value producer
#[async_trait]
pub trait Callback: Send + Sync {
    /// Produces the field value; `parent` is the input object of the node being written
    async fn call(&self, parent: Value) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> Callback for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, parent: Value) -> anyhow::Result<Value> {
        (self)(parent).await
    }
}

/// Named callbacks available to a request
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    functions: HashMap<String, Arc<dyn Callback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, callback: impl Callback + 'static) {
        self.functions.insert(name.into(), Arc::new(callback));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Callback>> {
        self.functions.get(name)
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("CallbackRegistry")
            .field("functions", &names)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct Registration {
    function: String,
    param: String,
    parent: Value,
}

/// Callbacks registered during one translation
#[derive(Debug, Default)]
pub struct CallbackBucket {
    registrations: Vec<Registration>,
    params: HashSet<String>,
}

impl CallbackBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `function` for the value named after `path`, returning the
    /// key its result will have inside `resolvedCallbacks`
    pub fn add(&mut self, function: &str, path: &str, parent: Value) -> String {
        let base = format!("{}_{}", path, function);
        let mut param = base.clone();
        let mut n = 1;
        while self.params.contains(&param) {
            param = format!("{}{}", base, n);
            n += 1;
        }
        self.params.insert(param.clone());
        self.registrations.push(Registration {
            function: function.to_string(),
            param: param.clone(),
            parent,
        });
        param
    }

    /// Registers a callback and returns the expression reading its value
    pub fn reference(&mut self, function: &str, path: &str, parent: Value) -> Expr {
        let param = self.add(function, path, parent);
        Param::deferred(RESOLVED_CALLBACKS_PARAM).expr().property(param)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Drops registrations made after the bucket held `len` entries
    pub(crate) fn truncate(&mut self, len: usize) {
        for registration in self.registrations.drain(len..) {
            self.params.remove(&registration.param);
        }
    }

    /// Runs every registered callback concurrently and merges the results
    /// into `result.params` under `resolvedCallbacks`.
    ///
    /// A statement referencing `resolvedCallbacks` always gets the key, empty
    /// when nothing was registered. Fails before running anything when a
    /// function is not registered, and fails as a whole when any callback
    /// fails.
    pub async fn resolve(
        self,
        registry: &CallbackRegistry,
        mut result: CypherResult,
    ) -> Result<CypherResult> {
        if self.registrations.is_empty() {
            if result.references(RESOLVED_CALLBACKS_PARAM) {
                result
                    .params
                    .entry(RESOLVED_CALLBACKS_PARAM)
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            return Ok(result);
        }

        let calls = self
            .registrations
            .iter()
            .map(|registration| {
                registry
                    .get(&registration.function)
                    .cloned()
                    .map(|callback| (registration, callback))
                    .ok_or_else(|| Error::MissingCallback(registration.function.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(count = calls.len(), "resolving callbacks");

        let values = try_join_all(calls.into_iter().map(|(registration, callback)| async move {
            callback
                .call(registration.parent.clone())
                .await
                .map_err(|err| Error::Callback {
                    name: registration.function.clone(),
                    message: format!("{:#}", err),
                })
        }))
        .await?;

        let resolved: Map<String, Value> = self
            .registrations
            .into_iter()
            .zip(values)
            .map(|(registration, value)| (registration.param, value))
            .collect();
        result
            .params
            .insert(RESOLVED_CALLBACKS_PARAM.to_string(), Value::Object(resolved));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn slug_registry() -> CallbackRegistry {
        let mut registry = CallbackRegistry::new();
        registry.register("getSlug", |parent: Value| async move {
            let title = parent["title"].as_str().unwrap_or_default().to_lowercase();
            Ok::<_, anyhow::Error>(json!(title.replace(' ', "-")))
        });
        registry
    }

    #[tokio::test]
    async fn resolves_every_registration() {
        let mut bucket = CallbackBucket::new();
        let a = bucket.add("getSlug", "this0_slug", json!({ "title": "The Matrix" }));
        let b = bucket.add("getSlug", "this1_slug", json!({ "title": "Heat" }));
        let result = bucket
            .resolve(&slug_registry(), CypherResult::new("", Map::new()))
            .await
            .unwrap();
        let resolved = result.params[RESOLVED_CALLBACKS_PARAM].as_object().unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[&a], json!("the-matrix"));
        assert_eq!(resolved[&b], json!("heat"));
    }

    #[tokio::test]
    async fn missing_function_is_a_configuration_error() {
        let mut bucket = CallbackBucket::new();
        bucket.add("nope", "this0_slug", Value::Null);
        let err = bucket
            .resolve(&slug_registry(), CypherResult::new("", Map::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCallback(name) if name == "nope"));
    }

    #[tokio::test]
    async fn one_failure_fails_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = slug_registry();
        registry.register("boom", move |_parent: Value| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Err::<Value, _>(anyhow::anyhow!("exploded")) }
        });
        let mut bucket = CallbackBucket::new();
        bucket.add("getSlug", "this0_slug", json!({ "title": "A" }));
        bucket.add("boom", "this0_other", Value::Null);
        let err = bucket
            .resolve(&registry, CypherResult::new("", Map::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Callback { ref name, .. } if name == "boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn param_names_are_unique() {
        let mut bucket = CallbackBucket::new();
        let a = bucket.add("getSlug", "this0_slug", Value::Null);
        let b = bucket.add("getSlug", "this0_slug", Value::Null);
        assert_ne!(a, b);
        bucket.truncate(1);
        assert_eq!(bucket.len(), 1);
    }

    #[tokio::test]
    async fn empty_bucket_leaves_params_untouched() {
        let result = CallbackBucket::new()
            .resolve(&CallbackRegistry::new(), CypherResult::new("RETURN 1", Map::new()))
            .await
            .unwrap();
        assert!(result.params.is_empty());
    }

    #[tokio::test]
    async fn referenced_callbacks_get_a_value_when_none_registered() {
        let mut statement = CypherResult::new("RETURN $resolvedCallbacks", Map::new());
        statement.deferred.insert(RESOLVED_CALLBACKS_PARAM.to_string());
        let result = CallbackBucket::new()
            .resolve(&CallbackRegistry::new(), statement)
            .await
            .unwrap();
        assert_eq!(result.params[RESOLVED_CALLBACKS_PARAM], json!({}));
    }
}
