//! Delete root fields and nested `delete`
//!
//! Event metadata for deleted nodes and their relationships is built before
//! `DETACH DELETE` runs, while the properties can still be read.

use serde_json::{Map, Value};

use super::auth::{create_auth_predicate, create_auth_validation, validation_clause, AuthKind};
use super::connect::endpoint_predicates;
use super::scope::Scope;
use super::subscriptions::{
    flatten_collected, node_event, relationship_deletion_events, snapshot, EventKind,
};
use super::where_clause::{create_connection_where, create_where};
use super::{
    ensure_allowed, input_items, input_object, members_of, nested_inputs, relationship_pattern,
    Parent, Translation,
};
use crate::constants::META_VARIABLE;
use crate::cypher::{
    Clause, CypherResult, Expr, Imports, NodePattern, Pattern, Projection, Variable,
};
use crate::error::Result;
use crate::resolve_tree::ResolveTree;
use crate::schema::{AuthOperation, Entity, NestedOperation, Node, RelationField};

/// Translates `delete<Plural>(where, delete)`
pub fn translate_delete(
    tree: &ResolveTree,
    node: &Node,
    translation: &mut Translation<'_>,
) -> Result<CypherResult> {
    let this = Variable::named("this");
    let operations = [AuthOperation::Delete];
    let mut clauses = Vec::new();

    let mut predicates = Vec::new();
    if let Some(filter) = tree.arg("where") {
        predicates.extend(create_where(node, &this, "this", filter, translation)?);
    }
    predicates.extend(create_auth_predicate(
        node,
        &this,
        "this",
        &operations,
        AuthKind::Where,
        translation,
    )?);
    clauses.push(Clause::matching(
        Pattern::node(translation.node_pattern(Some(&this), node)?),
        Expr::and_all(predicates),
    ));

    if let Some(validation) =
        create_auth_validation(node, &this, "this", &operations, AuthKind::Allow, translation)?
    {
        clauses.push(Clause::with_variables([&this]));
        clauses.push(validation);
    }

    let mut scope = Scope::new(&this);
    if translation.subscriptions_enabled() {
        let (start, with_meta) = scope.start_meta(deletion_events(node, &this, translation)?);
        clauses.push(start);
        scope = with_meta;
    }

    if let Some(nested) = tree.arg("delete") {
        let parent = Parent {
            node,
            variable: &this,
            name: "this",
        };
        clauses.extend(nested_deletes(parent, nested, &scope, translation)?);
    }

    if scope.has_meta() {
        clauses.push(scope.project());
    }
    clauses.push(Clause::Delete {
        detach: true,
        targets: vec![this.expr()],
    });
    if scope.has_meta() {
        clauses.push(Clause::Return(Projection::default().aliased(
            flatten_collected(Variable::named(META_VARIABLE).expr()),
            &Variable::named(META_VARIABLE),
        )));
    }

    Clause::Sequence(clauses).build("")
}

/// `[delete event] + delete_relationship events` for `variable`
fn deletion_events(node: &Node, variable: &Variable, translation: &Translation<'_>) -> Result<Expr> {
    let event = Expr::List(vec![node_event(
        EventKind::Delete,
        variable,
        &node.name,
        Some(snapshot(variable)),
        None,
    )]);
    Ok(match relationship_deletion_events(node, variable, translation)? {
        Some(relationships) => event.plus(relationships),
        None => event,
    })
}

/// Nested deletes keyed by relationship field, given as one object or a list
fn nested_deletes(
    parent: Parent<'_>,
    input: &Value,
    scope: &Scope,
    translation: &mut Translation<'_>,
) -> Result<Vec<Clause>> {
    let mut clauses = Vec::new();
    for (field, items) in nested_inputs(parent.node, input)? {
        clauses.extend(create_delete_and_params(parent, field, &items, scope, translation)?);
    }
    Ok(clauses)
}

/// Clauses deleting the nodes related to `parent` through `field` selected by `input`
pub fn create_delete_and_params(
    parent: Parent<'_>,
    field: &RelationField,
    input: &Value,
    scope: &Scope,
    translation: &mut Translation<'_>,
) -> Result<Vec<Clause>> {
    ensure_allowed(field, NestedOperation::Delete)?;
    let schema = translation.schema;
    let mut clauses = Vec::new();
    for (member, member_input) in members_of(field, input) {
        let target = schema.require_node(member)?;
        for (index, item) in input_items(member_input).into_iter().enumerate() {
            let item = input_object(item, "delete")?;
            let base = if field.target.is_abstract() {
                format!("{}_{}_{}_delete{}", parent.name, field.name, member, index)
            } else {
                format!("{}_{}_delete{}", parent.name, field.name, index)
            };
            let (body, result) = delete_item(parent, field, target, item, &base, translation)?;
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

fn delete_item(
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
    let relationship = Variable::named(format!("{}_rel", base));
    let operations = [AuthOperation::Delete];
    let mut body = Vec::new();

    let mut predicates = Vec::new();
    if let Some(filter) = item.get("where") {
        let filter = input_object(filter, "delete.where")?;
        let edge = schema.edge_entity(field)?;
        predicates.extend(create_connection_where(
            target,
            &node,
            edge.map(|e| e as &dyn Entity),
            &relationship,
            base,
            filter,
            translation,
        )?);
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
        Pattern::node(NodePattern::new(parent.variable)).related(
            relationship_pattern(field, Some(&relationship)),
            translation.node_pattern(Some(&node), target)?,
        ),
        Expr::and_all(predicates),
    ));

    let mut inner = Scope::new(parent.variable).with(&node);
    let endpoints = [(target, &node, node_name.as_str())];
    if let Some(allow) = endpoint_predicates(&endpoints, &operations, AuthKind::Allow, translation)? {
        body.push(inner.project());
        body.push(validation_clause(allow));
    }

    if translation.subscriptions_enabled() {
        let events = Expr::case_when(
            node.expr().is_null(),
            Expr::List(vec![]),
            deletion_events(target, &node, translation)?,
        );
        let (start, with_meta) = inner.start_meta(events);
        body.push(start);
        inner = with_meta;
    }

    if let Some(nested) = item.get("delete") {
        let child = Parent {
            node: target,
            variable: &node,
            name: &node_name,
        };
        body.extend(nested_deletes(child, nested, &inner, translation)?);
    }

    body.push(inner.project());
    body.push(Clause::Delete {
        detach: true,
        targets: vec![node.expr()],
    });

    let (result, returned) = if inner.has_meta() {
        (
            Variable::named(format!("{}_meta", base)),
            flatten_collected(Variable::named(META_VARIABLE).expr()),
        )
    } else {
        (Variable::named(format!("delete_{}", base)), Expr::CountAll)
    };
    body.push(Clause::Return(Projection::default().aliased(returned, &result)));

    Ok((Clause::Sequence(body), result))
}
