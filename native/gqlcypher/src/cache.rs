/// Cache of parsed GraphQL operations
///
/// Parsing is independent of variables, schema and request, so a parsed
/// operation is keyed only by the xxHash of the query text and shared between
/// requests. Entries are bounded in number and expire after a time-to-live.
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;
use xxhash_rust::xxh3::xxh3_64;

use crate::config::Config;
use crate::parser::{self, error::Result, ParsedOperation};

/// Converts query string to a cache key using xxHash
#[inline]
pub fn generate_query_id(query: &str) -> u64 {
    xxh3_64(query.as_bytes())
}

#[derive(Clone)]
pub struct OperationCache {
    entries: Cache<u64, Arc<ParsedOperation>>,
}

impl OperationCache {
    pub fn new(max_size: u64, ttl: Duration) -> Self {
        OperationCache {
            entries: Cache::builder()
                .max_capacity(max_size)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// A cache sized by `query_cache_max_size` and `query_cache_ttl_seconds`
    pub fn from_config(config: &Config) -> Self {
        OperationCache::new(
            config.query_cache_max_size,
            Duration::from_secs(config.query_cache_ttl_seconds),
        )
    }

    /// Returns the parsed operation for `query`, parsing it on a miss.
    ///
    /// Parse errors are not cached.
    pub fn get_or_parse(&self, query: &str, max_depth: usize) -> Result<Arc<ParsedOperation>> {
        let id = generate_query_id(query);
        if let Some(operation) = self.entries.get(&id) {
            trace!(query_id = %format!("{:x}", id), "operation cache hit");
            return Ok(operation);
        }
        trace!(query_id = %format!("{:x}", id), "operation cache miss");
        let operation = Arc::new(parser::parse_operation(query, max_depth)?);
        self.entries.insert(id, Arc::clone(&operation));
        Ok(operation)
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Stores `operation` for `query` without parsing it
    #[cfg(any(test, feature = "test-utils"))]
    pub fn insert_for_test(&self, query: &str, operation: ParsedOperation) {
        self.entries
            .insert(generate_query_id(query), Arc::new(operation));
    }
}

impl std::fmt::Debug for OperationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}
