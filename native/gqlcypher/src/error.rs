//! Error types for gqlcypher
//!
//! Translation-time errors are returned before any Cypher is handed out; a
//! failed translation never yields a partial statement. Errors that depend on
//! data only known inside the database are encoded into the generated Cypher
//! as validation calls and come back from the database by message, see
//! [`DatabaseErrorKind`].

use thiserror::Error;

use crate::constants::{AUTH_FORBIDDEN_ERROR, RELATIONSHIP_REQUIREMENT_PREFIX};

/// Result type alias using the gqlcypher [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while translating a GraphQL operation into Cypher
#[derive(Error, Debug)]
pub enum Error {
    /// An auth rule referenced a claim or context value that is not present
    #[error("Unauthenticated")]
    Unauthenticated,

    /// An auth validation call in the generated Cypher rejected the operation
    #[error("Forbidden")]
    Forbidden,

    /// The same property is both part of a merge key and an on-create assignment
    #[error("Conflicting modification of {fields} on type {type_name}")]
    ConflictingModification {
        /// Entity whose properties clash
        type_name: String,
        /// The clashing properties, rendered as `[[a], [b]]`
        fields: String,
    },

    /// The unwind-create engine cannot express this input
    #[error("Unwind create optimisation does not yet support {0}")]
    UnsupportedUnwindOptimization(String),

    /// A field refers to a callback that is not registered in the context
    #[error("Callback function \"{0}\" is not registered in the context")]
    MissingCallback(String),

    /// A registered callback failed while being resolved
    #[error("Callback function \"{name}\" failed: {message}")]
    Callback {
        /// Registered function name
        name: String,
        /// Rendered error chain returned by the callback
        message: String,
    },

    /// The schema has no node or relationship entity with this name
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// The entity has no field with this name
    #[error("Unknown field {field} on {entity}")]
    UnknownField {
        /// Entity name
        entity: String,
        /// Field name as given in the input
        field: String,
    },

    /// Structurally invalid input or schema model
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Programmer error while compiling a clause tree
    #[error("Cypher compile error: {0}")]
    Compile(String),

    /// GraphQL document parsing or variable binding failed
    #[error(transparent)]
    Parse(#[from] crate::parser::error::Error),

    /// The executor failed to run a generated statement
    #[error("Cypher execution failed: {message}")]
    Execution {
        /// Classification of the database message
        kind: DatabaseErrorKind,
        /// Rendered error chain returned by the executor
        message: String,
    },

    /// The event publisher rejected the events of a mutation
    #[error("Publishing events failed: {0}")]
    Publish(String),

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Error for a message reported by the database while running a statement
    pub(crate) fn from_database(message: String) -> Self {
        match DatabaseErrorKind::classify(&message) {
            DatabaseErrorKind::Forbidden => Error::Forbidden,
            kind => Error::Execution { kind, message },
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub(crate) fn compile(msg: impl Into<String>) -> Self {
        Error::Compile(msg.into())
    }
}

/// Classification of errors reported by the database for generated validation calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    /// An auth validation call rejected the operation
    Forbidden,
    /// A relationship cardinality validation call failed
    RelationshipRequired,
    /// Anything not produced by this crate
    Other,
}

impl DatabaseErrorKind {
    /// Classifies a database error message by the well-known prefixes used in
    /// generated validation calls
    pub fn classify(message: &str) -> Self {
        // The database wraps the validation message, so search rather than prefix-match
        if message.contains(RELATIONSHIP_REQUIREMENT_PREFIX) {
            DatabaseErrorKind::RelationshipRequired
        } else if message.contains(AUTH_FORBIDDEN_ERROR) {
            DatabaseErrorKind::Forbidden
        } else {
            DatabaseErrorKind::Other
        }
    }
}
