//! GraphQL operation parser
//!
//! This module parses GraphQL documents using the graphql-query library and
//! converts the selected operation into an owned [`ParsedOperation`] that can
//! be cached and shared across threads. Binding a parsed operation to the
//! request's variables yields one [`ResolveTree`] per root field.
//!
//! Features supported:
//! - Query, mutation and subscription operations
//! - Field selection with aliases and arguments
//! - Named fragments (inlined) and inline fragments (kept per type condition)
//! - Variables with defaults and non-null checks
//!
//! Directives are rejected.

mod ast_converter;
pub mod error;
mod variable_processor;


use graphql_query::ast::{ASTContext, Document, ParseNode};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use self::ast_converter::ASTConverter;
use self::error::Result;
use self::variable_processor::{bind_value, resolve_variables};
use crate::resolve_tree::ResolveTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

/// A declared operation variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    /// Declared with a non-null type
    pub required: bool,
    pub default: Option<Value>,
}

/// An argument value that may still reference variables
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Const(Value),
    Variable(String),
    List(Vec<InputValue>),
    Object(Vec<(String, InputValue)>),
}

/// A selected field before variables are bound
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub name: String,
    pub alias: Option<String>,
    pub arguments: Vec<(String, InputValue)>,
    pub fields: Vec<Selection>,
    /// Selections under a type condition, by type name
    pub fields_by_type: BTreeMap<String, Vec<Selection>>,
}

/// An operation of a GraphQL document, independent of variable values
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOperation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub selections: Vec<Selection>,
}

/// Parses the single operation of `query`.
///
/// Selections nested deeper than `max_depth` are rejected.
///
/// # Examples
///
/// ```
/// use gqlcypher::parser::{parse_operation, OperationKind};
///
/// let operation = parse_operation("{ movies { title } }", 32).unwrap();
/// assert_eq!(operation.kind, OperationKind::Query);
/// assert_eq!(operation.selections[0].name, "movies");
/// ```
pub fn parse_operation(query: &str, max_depth: usize) -> Result<ParsedOperation> {
    let ctx = ASTContext::new();
    let document = Document::parse(&ctx, query)?;
    ASTConverter::new(document, max_depth).convert_document(document)
}

impl ParsedOperation {
    /// Binds `variables` and returns the resolve tree of every root field
    pub fn bind(&self, variables: &Map<String, Value>) -> Result<Vec<ResolveTree>> {
        let values = resolve_variables(&self.variables, variables)?;
        self.selections
            .iter()
            .map(|selection| self.bind_selection(selection, &values))
            .collect()
    }

    fn bind_selection(&self, selection: &Selection, values: &Map<String, Value>) -> Result<ResolveTree> {
        let mut args = Map::new();
        for (name, value) in &selection.arguments {
            if let Some(value) = bind_value(value, &self.variables, values)? {
                args.insert(name.clone(), value);
            }
        }

        let mut tree = ResolveTree::new(&selection.name);
        if let Some(alias) = &selection.alias {
            tree = tree.with_alias(alias);
        }
        tree.args = args;
        tree.fields = selection
            .fields
            .iter()
            .map(|field| self.bind_selection(field, values))
            .collect::<Result<_>>()?;
        for (type_name, fields) in &selection.fields_by_type {
            let fields = fields
                .iter()
                .map(|field| self.bind_selection(field, values))
                .collect::<Result<_>>()?;
            tree.fields_by_type.insert(type_name.clone(), fields);
        }
        Ok(tree)
    }
}
