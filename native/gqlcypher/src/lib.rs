//! gqlcypher - GraphQL to Cypher translation library
//!
//! gqlcypher translates GraphQL operations over a declarative schema model
//! into parameterized Cypher statements. Nested mutations, authorization
//! rules, relationship cardinality checks and subscription event metadata
//! are all compiled into the single statement generated per root field.
//!
//! Running statements and publishing events is left to the host through the
//! [`execution`] traits.

// Module declarations
pub mod cache;
pub mod callbacks;
pub mod config;
pub mod constants;
pub mod context;
pub mod cypher;
pub mod error;
pub mod execution;
pub mod parser;
pub mod resolve_tree;
pub mod schema;
pub mod translate;

// Re-exports for public API
pub use cache::{generate_query_id, OperationCache};
pub use callbacks::{Callback, CallbackBucket, CallbackRegistry};
pub use config::Config;
pub use context::Context;
pub use cypher::CypherResult;
pub use error::{DatabaseErrorKind, Error, Result};
pub use execution::{execute_and_publish, EventPublisher, Executor};
pub use resolve_tree::ResolveTree;
pub use schema::Schema;
pub use translate::subscriptions::EventMeta;
pub use translate::{translate, translate_document, RootStatement};
