//! Error handling for GraphQL parsing
//!
//! Syntax errors, unsupported document features and variable binding
//! failures. Wrapped by [`crate::Error::Parse`].

use thiserror::Error;

/// Custom result type for the parser module
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The document is not valid GraphQL
    #[error("GraphQL parse error: {0}")]
    Syntax(String),

    /// The document uses a feature the translator does not handle
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A fragment spread names a fragment that is not in the document
    #[error("Fragment \"{0}\" is not defined")]
    UnknownFragment(String),

    /// Selections nest deeper than the configured maximum
    #[error("Query exceeds the maximum depth of {0}")]
    MaxDepthExceeded(usize),

    /// A non-null variable without default was not provided
    #[error("Variable \"${0}\" of non-null type was not provided")]
    MissingVariable(String),

    /// An argument uses a variable the operation does not declare
    #[error("Variable \"${0}\" is not defined by the operation")]
    UndefinedVariable(String),

    /// A literal cannot be represented as JSON
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl From<graphql_query::error::Error> for Error {
    fn from(err: graphql_query::error::Error) -> Self {
        Error::Syntax(err.to_string())
    }
}
