//! Nested `connect`
//!
//! Each connect item becomes one subquery:
//!
//! ```text
//! WITH <scope>
//! CALL {
//!     WITH parent
//!     OPTIONAL MATCH (node:Label) WHERE <where.node>
//!     FOREACH (_ IN CASE WHEN parent IS NULL OR node IS NULL THEN [] ELSE [1] END |
//!         MERGE (parent)-[rel:TYPE]->(node)
//!     )
//!     RETURN count(*) AS connect_...
//! }
//! ```
//!
//! A `where` matching nothing leaves `node` null and the `FOREACH` empty, so
//! connecting to a missing node is a no-op rather than an error.

use serde_json::{Map, Value};

use super::auth::{create_auth_predicate, validation_clause, AuthKind};
use super::relationship_validation::create_relationship_validation;
use super::scope::Scope;
use super::set_properties::create_set_items;
use super::subscriptions::{flatten_collected, relationship_events_between, EventKind};
use super::where_clause::create_where;
use super::{
    ensure_allowed, input_items, input_object, members_of, nested_inputs, relationship_pattern,
    Parent, Translation,
};
use crate::cypher::{guarded, Clause, Expr, Imports, NodePattern, Pattern, Projection, Variable};
use crate::error::{Error, Result};
use crate::schema::{AuthOperation, NestedOperation, Node, RelationField, WriteOperation};

/// Clauses connecting `parent` through `field` to every node selected by `input`
pub fn create_connect_and_params(
    parent: Parent<'_>,
    field: &RelationField,
    input: &Value,
    scope: &Scope,
    translation: &mut Translation<'_>,
) -> Result<Vec<Clause>> {
    ensure_allowed(field, NestedOperation::Connect)?;
    let schema = translation.schema;
    let mut clauses = Vec::new();
    for (member, member_input) in members_of(field, input) {
        let target = schema.require_node(member)?;
        for (index, item) in input_items(member_input).into_iter().enumerate() {
            let item = input_object(item, "connect")?;
            let base = if field.target.is_abstract() {
                format!("{}_{}_{}_connect{}", parent.name, field.name, member, index)
            } else {
                format!("{}_{}_connect{}", parent.name, field.name, index)
            };
            let (body, result) = connect_item(parent, field, target, item, &base, translation)?;
            clauses.push(scope.project());
            clauses.push(Clause::call(
                Imports::Variables(vec![parent.variable.clone()]),
                body,
            ));
            if scope.has_meta() {
                clauses.push(scope.append_meta(result.expr()));
            }
        }
    }
    Ok(clauses)
}

fn connect_item(
    parent: Parent<'_>,
    field: &RelationField,
    target: &Node,
    item: &Map<String, Value>,
    base: &str,
    translation: &mut Translation<'_>,
) -> Result<(Clause, Variable)> {
    let schema = translation.schema;
    let node_name = format!("{}_node", base);
    let node = Variable::named(&node_name);
    let relationship_name = format!("{}_relationship", base);
    let relationship = Variable::named(&relationship_name);
    let operations = [AuthOperation::Connect];
    let mut body = Vec::new();

    let mut predicates = Vec::new();
    if let Some(filter) = item.get("where") {
        let filter = input_object(filter, "connect.where")?;
        if let Some(node_filter) = filter.get("node") {
            predicates.extend(create_where(target, &node, &node_name, node_filter, translation)?);
        }
    }
    predicates.extend(create_auth_predicate(
        target,
        &node,
        &node_name,
        &operations,
        AuthKind::Where,
        translation,
    )?);
    body.push(Clause::optional_match(
        Pattern::node(translation.node_pattern(Some(&node), target)?),
        Expr::and_all(predicates),
    ));

    let endpoints = [
        (parent.node, parent.variable, parent.name),
        (target, &node, node_name.as_str()),
    ];
    let allow = endpoint_predicates(&endpoints, &operations, AuthKind::Allow, translation)?;
    if let Some(allow) = allow {
        body.push(Clause::with_variables([parent.variable, &node]));
        body.push(validation_clause(allow));
    }

    let mut merge = vec![Clause::Merge {
        pattern: Pattern::node(NodePattern::new(parent.variable)).related(
            relationship_pattern(field, Some(&relationship)),
            NodePattern::new(&node),
        ),
        on_create: Vec::new(),
        on_match: Vec::new(),
    }];
    match schema.edge_entity(field)? {
        Some(edge) => {
            let empty = Map::new();
            let edge_input = match item.get("edge") {
                Some(edge_input) => input_object(edge_input, "connect.edge")?,
                None => &empty,
            };
            let items = create_set_items(
                edge,
                &relationship,
                &relationship_name,
                edge_input,
                WriteOperation::Create,
                translation,
            )?;
            if !items.is_empty() {
                merge.push(Clause::Set(items));
            }
        }
        None if item.contains_key("edge") => {
            return Err(Error::invalid(format!(
                "relationship {} has no properties",
                field.name
            )))
        }
        None => {}
    }
    body.push(guarded(&[parent.variable, &node], merge));

    let mut inner = Scope::new(parent.variable).with(&node);
    if translation.subscriptions_enabled() {
        let events = relationship_events_between(
            EventKind::Connect,
            field,
            parent.variable,
            &parent.node.name,
            &node,
            &target.name,
        );
        let (start, with_meta) = inner.start_meta(events);
        body.push(start);
        inner = with_meta;
    }

    if let Some(nested) = item.get("connect") {
        let child = Parent {
            node: target,
            variable: &node,
            name: &node_name,
        };
        for (child_field, values) in nested_inputs(target, nested)? {
            body.extend(create_connect_and_params(
                child,
                child_field,
                &values,
                &inner,
                translation,
            )?);
        }
    }

    let mut post = Vec::new();
    if let Some(bind) = endpoint_predicates(&endpoints, &operations, AuthKind::Bind, translation)? {
        post.push(validation_clause(bind));
    }
    post.extend(create_relationship_validation(target, &node, translation)?);
    if !post.is_empty() {
        body.push(inner.project());
        body.extend(post);
    }

    let (result, returned) = if inner.has_meta() {
        let result = Variable::named(format!("{}_meta", base));
        let meta = Variable::named(crate::constants::META_VARIABLE);
        (result.clone(), flatten_collected(meta.expr()))
    } else {
        (Variable::named(format!("connect_{}", base)), Expr::CountAll)
    };
    body.push(Clause::Return(Projection::default().aliased(returned, &result)));

    Ok((Clause::Sequence(body), result))
}

/// Auth predicates of several endpoints, `AND`ed
pub(crate) fn endpoint_predicates(
    endpoints: &[(&Node, &Variable, &str)],
    operations: &[AuthOperation],
    kind: AuthKind,
    translation: &Translation<'_>,
) -> Result<Option<Expr>> {
    let mut predicates = Vec::with_capacity(endpoints.len());
    for (node, variable, name) in endpoints {
        predicates.extend(create_auth_predicate(
            node,
            variable,
            name,
            operations,
            kind,
            translation,
        )?);
    }
    Ok(Expr::and_all(predicates))
}
