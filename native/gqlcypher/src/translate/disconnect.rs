//! Nested `disconnect`
//!
//! The relationship to remove is matched into its own variable and deleted
//! under the same `FOREACH` guard connect uses. Nested disconnects of the
//! detached node run before the relationship is deleted, and event metadata
//! is captured while the relationship still exists.

use serde_json::{Map, Value};

use super::auth::{create_auth_predicate, validation_clause, AuthKind};
use super::connect::endpoint_predicates;
use super::scope::Scope;
use super::subscriptions::{flatten_collected, relationship_event, EventKind, RelationshipEndpoints};
use super::where_clause::create_connection_where;
use super::{
    ensure_allowed, input_items, input_object, members_of, nested_inputs, relationship_pattern,
    Parent, Translation,
};
use crate::constants::META_VARIABLE;
use crate::cypher::{
    guarded, Clause, Expr, Imports, NodePattern, Pattern, Projection, Variable,
};
use crate::error::Result;
use crate::schema::{AuthOperation, Entity, NestedOperation, Node, RelationField};

/// Clauses removing the relationships of `field` selected by `input`
pub fn create_disconnect_and_params(
    parent: Parent<'_>,
    field: &RelationField,
    input: &Value,
    scope: &Scope,
    translation: &mut Translation<'_>,
) -> Result<Vec<Clause>> {
    ensure_allowed(field, NestedOperation::Disconnect)?;
    let schema = translation.schema;
    let mut clauses = Vec::new();
    for (member, member_input) in members_of(field, input) {
        let target = schema.require_node(member)?;
        for (index, item) in input_items(member_input).into_iter().enumerate() {
            let item = input_object(item, "disconnect")?;
            let base = if field.target.is_abstract() {
                format!("{}_{}_{}_disconnect{}", parent.name, field.name, member, index)
            } else {
                format!("{}_{}_disconnect{}", parent.name, field.name, index)
            };
            let (body, result) = disconnect_item(parent, field, target, item, &base, translation)?;
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

fn disconnect_item(
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
    let operations = [AuthOperation::Disconnect];
    let edge = schema.edge_entity(field)?;
    let mut body = Vec::new();

    let mut predicates = Vec::new();
    if let Some(filter) = item.get("where") {
        let filter = input_object(filter, "disconnect.where")?;
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

    let endpoints = [
        (parent.node, parent.variable, parent.name),
        (target, &node, node_name.as_str()),
    ];
    let mut inner = Scope::new(parent.variable).with(&node).with(&relationship);
    if let Some(allow) = endpoint_predicates(&endpoints, &operations, AuthKind::Allow, translation)? {
        body.push(inner.project());
        body.push(validation_clause(allow));
    }

    if translation.subscriptions_enabled() {
        let endpoints =
            RelationshipEndpoints::new(field, parent.variable, &parent.node.name, &node, &target.name);
        let event = relationship_event(EventKind::Disconnect, field, &relationship, &endpoints);
        let (start, with_meta) = inner.start_meta(Expr::case_when(
            relationship.expr().is_null(),
            Expr::List(vec![]),
            Expr::List(vec![event]),
        ));
        body.push(start);
        inner = with_meta;
    }

    if let Some(nested) = item.get("disconnect") {
        let child = Parent {
            node: target,
            variable: &node,
            name: &node_name,
        };
        for (child_field, values) in nested_inputs(target, nested)? {
            body.extend(create_disconnect_and_params(
                child,
                child_field,
                &values,
                &inner,
                translation,
            )?);
        }
    }

    body.push(guarded(
        &[&relationship],
        vec![Clause::Delete {
            detach: false,
            targets: vec![relationship.expr()],
        }],
    ));

    let (result, returned) = if inner.has_meta() {
        (
            Variable::named(format!("{}_meta", base)),
            flatten_collected(Variable::named(META_VARIABLE).expr()),
        )
    } else {
        (Variable::named(format!("disconnect_{}", base)), Expr::CountAll)
    };
    body.push(Clause::Return(Projection::default().aliased(returned, &result)));

    Ok((Clause::Sequence(body), result))
}
