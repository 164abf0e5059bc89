#![cfg(feature = "test-utils")]

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use gqlcypher::parser::{parse_operation, OperationKind};
use gqlcypher::{generate_query_id, OperationCache};

/// Test that a stored operation is served without parsing
#[test]
fn test_inserted_operation_is_served() {
    let cache = OperationCache::new(10, Duration::from_secs(60));
    let operation = parse_operation("mutation { deleteMovies { nodesDeleted } }", 32).unwrap();
    // Stored under unparseable text; a hit never reaches the parser
    cache.insert_for_test("{ not graphql", operation);

    let cached = cache.get_or_parse("{ not graphql", 32).unwrap();
    assert_eq!(cached.kind, OperationKind::Mutation);
    assert_eq!(cached.selections[0].name, "deleteMovies");
}

#[test]
fn test_query_text_is_the_key() {
    assert_ne!(
        generate_query_id("{ movies { title } }"),
        generate_query_id("{ movies { title }}")
    );
    let cache = OperationCache::new(10, Duration::from_secs(60));
    cache.get_or_parse("{ movies { title } }", 32).unwrap();
    cache.get_or_parse("{ movies { title }}", 32).unwrap();
    assert_eq!(cache.entry_count(), 2);
}

#[test]
fn test_clear_drops_entries() {
    let cache = OperationCache::new(10, Duration::from_secs(60));
    cache.get_or_parse("{ movies { title } }", 32).unwrap();
    cache.clear();
    assert_eq!(cache.entry_count(), 0);
}

/// Test concurrent cache access
#[test]
fn test_concurrent_cache_access() {
    let cache = OperationCache::new(100, Duration::from_secs(60));
    let query = "{ movies { title actors { name } } }";

    let thread_count = 8;
    let barrier = Arc::new(Barrier::new(thread_count));
    let handles: Vec<_> = (0..thread_count)
        .map(|_| {
            let cache = cache.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..50 {
                    let operation = cache.get_or_parse(query, 32).unwrap();
                    assert_eq!(operation.selections[0].fields.len(), 2);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(cache.entry_count(), 1);
}
