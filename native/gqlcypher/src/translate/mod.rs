//! GraphQL resolve tree -> Cypher translation
//!
//! Each root field is translated into one Cypher statement. Translation is a
//! synchronous walk over the input; the only suspension point is resolving
//! the callbacks registered along the way.

pub mod auth;
pub mod connect;
pub mod connect_or_create;
pub mod create;
pub mod delete;
pub mod disconnect;
pub mod projection;
pub mod read;
pub mod relationship_validation;
pub mod scope;
pub mod set_properties;
pub mod subscriptions;
pub mod unwind_create;
pub mod update;
pub mod where_clause;

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::cache::OperationCache;
use crate::callbacks::CallbackBucket;
use crate::context::Context;
use crate::cypher::{CypherResult, NodePattern, PatternDirection, RelationshipPattern, Variable};
use crate::error::{Error, Result};
use crate::parser::{self, OperationKind};
use crate::resolve_tree::ResolveTree;
use crate::schema::{
    Entity, NestedOperation, Node, RelationField, RelationTarget, RelationshipDirection, RootOperation,
    Schema,
};

pub use scope::Scope;

/// State of one translation: read-only schema and context plus the
/// callbacks registered so far
pub struct Translation<'a> {
    pub schema: &'a Schema,
    pub context: &'a Context,
    pub callbacks: CallbackBucket,
}

impl<'a> Translation<'a> {
    pub fn new(schema: &'a Schema, context: &'a Context) -> Self {
        Translation {
            schema,
            context,
            callbacks: CallbackBucket::new(),
        }
    }

    pub fn subscriptions_enabled(&self) -> bool {
        self.context.config.subscriptions_enabled
    }

    /// `(variable:Label...)` for `node`
    pub fn node_pattern(&self, variable: Option<&Variable>, node: &Node) -> Result<NodePattern> {
        let pattern = match variable {
            Some(variable) => NodePattern::new(variable),
            None => NodePattern::anonymous(),
        };
        Ok(pattern.labels(node.labels(self.context)?))
    }

    /// Resolves the concrete target of a relationship field to a node
    pub fn target_node(&self, field: &RelationField) -> Result<&'a Node> {
        match &field.target {
            RelationTarget::Node(name) => self.schema.require_node(name),
            _ => Err(Error::invalid(format!(
                "field {} points to an abstract type; select a concrete member",
                field.name
            ))),
        }
    }
}

/// The node a nested operation hangs off
#[derive(Clone, Copy)]
pub struct Parent<'p> {
    pub node: &'p Node,
    pub variable: &'p Variable,
    /// Physical name of `variable`, used to derive child names
    pub name: &'p str,
}

/// Relationship pattern for `field`, oriented from the owning node
pub fn relationship_pattern(field: &RelationField, variable: Option<&Variable>) -> RelationshipPattern {
    let direction = match field.direction {
        RelationshipDirection::Out => PatternDirection::Outgoing,
        RelationshipDirection::In => PatternDirection::Incoming,
    };
    let pattern = RelationshipPattern::new(field.rel_type.clone(), direction);
    match variable {
        Some(variable) => pattern.variable(variable),
        None => pattern,
    }
}

/// Input items of a nested operation: lists as-is, single objects wrapped
pub(crate) fn input_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Input object of a nested operation, or an error naming the offending key
pub(crate) fn input_object<'v>(value: &'v Value, what: &str) -> Result<&'v Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| Error::invalid(format!("{} must be an input object", what)))
}

/// Rejects nested operations the relationship field does not allow
pub(crate) fn ensure_allowed(field: &RelationField, operation: NestedOperation) -> Result<()> {
    if field.allows(operation) {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "nested {} is not allowed on field {}",
            operation.input_key(),
            field.name
        )))
    }
}

/// Per-member input of an abstract relationship target.
///
/// Union inputs are keyed by member type. Interface inputs apply to every
/// implementation.
pub(crate) fn members_of<'v>(
    field: &'v RelationField,
    input: &'v Value,
) -> Vec<(&'v str, &'v Value)> {
    match &field.target {
        RelationTarget::Node(name) => vec![(name.as_str(), input)],
        RelationTarget::Union(members) => members
            .iter()
            .filter_map(|member| input.get(member).map(|value| (member.as_str(), value)))
            .collect(),
        RelationTarget::Interface {
            implementations, ..
        } => implementations
            .iter()
            .map(|member| (member.as_str(), input))
            .collect(),
    }
}

/// Nested operation inputs of a relationship field, keyed by operation.
///
/// Union fields nest operations under the member (`{ Member: { connect } }`);
/// they are regrouped as `{ connect: { Member: .. } }` so every operation
/// sees member-keyed input for unions, as [`members_of`] expects.
pub(crate) fn operations_of(field: &RelationField, input: &Value) -> Result<Map<String, Value>> {
    let input = input_object(input, &field.name)?;
    match &field.target {
        RelationTarget::Union(members) => {
            let mut operations = Map::new();
            for (member, member_input) in input {
                if !members.contains(member) {
                    return Err(Error::UnknownField {
                        entity: field.name.clone(),
                        field: member.clone(),
                    });
                }
                for (operation, value) in input_object(member_input, member)? {
                    if let Value::Object(by_member) = operations
                        .entry(operation.clone())
                        .or_insert_with(|| Value::Object(Map::new()))
                    {
                        by_member.insert(member.clone(), value.clone());
                    }
                }
            }
            Ok(operations)
        }
        _ => Ok(input.clone()),
    }
}

/// Relationship inputs nested under one operation of `node`, given as one
/// object or a list of objects.
///
/// Items of a repeated field are concatenated. Union fields stay keyed by
/// member (`{ Member: [..] }`) and concatenate per member, so the nested
/// operation can still tell the members apart.
pub(crate) fn nested_inputs<'n>(
    node: &'n Node,
    value: &Value,
) -> Result<Vec<(&'n RelationField, Value)>> {
    let mut merged: BTreeMap<&'n str, (&'n RelationField, Value)> = BTreeMap::new();
    for object in input_items(value) {
        for (key, items) in input_object(object, "nested operation")? {
            let field = node.relation_field(key).ok_or_else(|| Error::UnknownField {
                entity: node.name.clone(),
                field: key.clone(),
            })?;
            if items.is_null() {
                continue;
            }
            let (_, entry) = merged.entry(field.name.as_str()).or_insert_with(|| {
                let empty = match field.target {
                    RelationTarget::Union(_) => Value::Object(Map::new()),
                    _ => Value::Array(Vec::new()),
                };
                (field, empty)
            });
            match (&field.target, entry) {
                (RelationTarget::Union(members), Value::Object(by_member)) => {
                    for (member, member_items) in input_object(items, &field.name)? {
                        if !members.contains(member) {
                            return Err(Error::UnknownField {
                                entity: field.name.clone(),
                                field: member.clone(),
                            });
                        }
                        if let Value::Array(list) = by_member
                            .entry(member.clone())
                            .or_insert_with(|| Value::Array(Vec::new()))
                        {
                            list.extend(input_items(member_items).into_iter().cloned());
                        }
                    }
                }
                (_, Value::Array(list)) => list.extend(input_items(items).into_iter().cloned()),
                _ => {}
            }
        }
    }
    Ok(merged.into_values().collect())
}

/// Rejects operation keys outside `allowed`
pub(crate) fn ensure_operations(
    field: &RelationField,
    operations: &Map<String, Value>,
    allowed: &[NestedOperation],
) -> Result<()> {
    for key in operations.keys() {
        if !allowed.iter().any(|op| op.input_key() == key) {
            return Err(Error::invalid(format!(
                "{} is not a valid nested operation here for field {}",
                key, field.name
            )));
        }
    }
    Ok(())
}

/// Translates a single root field
pub async fn translate(
    tree: &ResolveTree,
    schema: &Schema,
    context: &Context,
) -> Result<CypherResult> {
    let mut translation = Translation::new(schema, context);
    let result = translate_root(tree, &mut translation)?;
    trace!(cypher = %result.cypher, "translated {}", tree.name);
    let Translation { callbacks, .. } = translation;
    callbacks.resolve(&context.callbacks, result).await
}

/// Builds the statement for a root field without resolving callbacks
pub fn translate_root(tree: &ResolveTree, translation: &mut Translation<'_>) -> Result<CypherResult> {
    let (operation, node) = translation
        .schema
        .root_field(&tree.name)
        .ok_or_else(|| Error::UnknownField {
            entity: "root".to_string(),
            field: tree.name.clone(),
        })?;
    debug!(field = %tree.name, node = %node.name, ?operation, "translating root field");
    match operation {
        RootOperation::Read => read::translate_read(tree, node, translation),
        RootOperation::Create => create::translate_create(tree, node, translation),
        RootOperation::Update => update::translate_update(tree, node, translation),
        RootOperation::Delete => delete::translate_delete(tree, node, translation),
    }
}

/// The statement translated for one root field of a document
#[derive(Debug, Clone, PartialEq)]
pub struct RootStatement {
    /// Response key of the root field (its alias, or its name)
    pub field: String,
    pub statement: CypherResult,
}

/// Parses (or fetches from `cache`) `query`, binds `variables` and translates
/// every root field in document order
pub async fn translate_document(
    query: &str,
    variables: &Map<String, Value>,
    schema: &Schema,
    context: &Context,
    cache: &OperationCache,
) -> Result<Vec<RootStatement>> {
    let operation = cache.get_or_parse(query, context.config.max_query_depth)?;
    if operation.kind == OperationKind::Subscription {
        return Err(parser::error::Error::UnsupportedOperation(
            "subscription operations".to_string(),
        )
        .into());
    }

    let mut statements = Vec::with_capacity(operation.selections.len());
    for tree in operation.bind(variables)? {
        if tree.name.starts_with("__") {
            continue;
        }
        let statement = translate(&tree, schema, context).await?;
        statements.push(RootStatement {
            field: tree.alias.clone(),
            statement,
        });
    }
    Ok(statements)
}
