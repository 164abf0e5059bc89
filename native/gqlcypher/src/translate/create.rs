//! Create root fields
//!
//! Each input element is created inside its own `CALL { }` as `this{i}`.
//! Nested creates are inlined after their parent; connects and
//! connectOrCreates run as subqueries. When enabled, the unwind engine is
//! tried first and this classic translation is the fallback.

use serde_json::{Map, Value};
use tracing::debug;

use super::auth::{create_auth_validation, AuthKind};
use super::connect::create_connect_and_params;
use super::connect_or_create::create_connect_or_create_and_params;
use super::projection::create_projection;
use super::relationship_validation::create_relationship_validation;
use super::scope::Scope;
use super::set_properties::create_set_items;
use super::subscriptions::{
    node_event, relationship_event, snapshot, EventKind, RelationshipEndpoints,
};
use super::unwind_create::translate_unwind_create;
use super::{
    ensure_allowed, ensure_operations, input_items, input_object, members_of, operations_of,
    relationship_pattern, Parent, Translation,
};
use crate::cypher::{
    Clause, CypherResult, Expr, Imports, NodePattern, Pattern, Projection, Variable,
};
use crate::error::{Error, Result};
use crate::resolve_tree::ResolveTree;
use crate::schema::{
    AuthOperation, Entity, NestedOperation, Node, RelationField, RelationTarget, WriteOperation,
};

const CREATE_OPERATIONS: [NestedOperation; 3] = [
    NestedOperation::Create,
    NestedOperation::Connect,
    NestedOperation::ConnectOrCreate,
];

/// Translates `create<Plural>(input: [...])`
pub fn translate_create(
    tree: &ResolveTree,
    node: &Node,
    translation: &mut Translation<'_>,
) -> Result<CypherResult> {
    if translation.context.config.unwind_create {
        let registered = translation.callbacks.len();
        match translate_unwind_create(tree, node, translation) {
            Err(Error::UnsupportedUnwindOptimization(reason)) => {
                debug!(%reason, node = %node.name, "falling back to classic create");
                translation.callbacks.truncate(registered);
            }
            other => return other,
        }
    }
    translate_classic_create(tree, node, translation)
}

/// One `CALL { CREATE ... }` per input element
pub fn translate_classic_create(
    tree: &ResolveTree,
    node: &Node,
    translation: &mut Translation<'_>,
) -> Result<CypherResult> {
    let input = tree.arg("input").unwrap_or(&Value::Null);
    let selection = tree.field(&node.plural());
    let mut clauses = Vec::new();
    let mut data = Vec::new();
    let mut metas = Vec::new();

    for (index, item) in input_items(input).into_iter().enumerate() {
        let item = input_object(item, "input")?;
        let name = format!("this{}", index);
        let this = Variable::named(&name);
        let (body, meta) = create_root_node(node, &this, &name, item, translation)?;
        clauses.push(Clause::call(Imports::None, body));

        data.push(match selection {
            Some(selection) => create_projection(node, &this, &name, selection, translation)?,
            None => Expr::MapProjection {
                subject: this.clone(),
                items: Vec::new(),
            },
        });
        metas.extend(meta.map(|meta| meta.expr()));
    }

    let mut projection = Projection::default().aliased(Expr::List(data), &Variable::named("data"));
    if translation.subscriptions_enabled() {
        let meta = metas
            .into_iter()
            .reduce(Expr::plus)
            .unwrap_or_else(|| Expr::List(vec![]));
        projection = projection.aliased(meta, &Variable::named(crate::constants::META_VARIABLE));
    }
    clauses.push(Clause::Return(projection));

    Clause::Sequence(clauses).build("")
}

/// Body of the subquery creating `this{i}`, and the variable carrying its events
fn create_root_node(
    node: &Node,
    this: &Variable,
    name: &str,
    input: &Map<String, Value>,
    translation: &mut Translation<'_>,
) -> Result<(Clause, Option<Variable>)> {
    let mut body = vec![Clause::Create(Pattern::node(
        translation.node_pattern(Some(this), node)?,
    ))];
    body.push(Clause::Set(create_set_items(
        node,
        this,
        name,
        input,
        WriteOperation::Create,
        translation,
    )?));

    let mut scope = Scope::new(this);
    if translation.subscriptions_enabled() {
        let event = node_event(EventKind::Create, this, &node.name, None, Some(snapshot(this)));
        let (start, with_meta) = scope.start_meta(Expr::List(vec![event]));
        body.push(start);
        scope = with_meta;
    }

    let parent = Parent {
        node,
        variable: this,
        name,
    };
    body.extend(create_nested_operations(parent, input, &scope, translation)?);
    body.extend(created_node_validation(node, this, name, &scope, translation)?);

    let mut returned = Projection::variables([this]);
    let meta = if scope.has_meta() {
        let meta = Variable::named(format!("{}_meta", name));
        returned = returned.aliased(Variable::named(crate::constants::META_VARIABLE).expr(), &meta);
        Some(meta)
    } else {
        None
    };
    body.push(Clause::Return(returned));
    Ok((Clause::Sequence(body), meta))
}

/// Bind-auth and cardinality checks for a freshly created node
fn created_node_validation(
    node: &Node,
    variable: &Variable,
    name: &str,
    scope: &Scope,
    translation: &Translation<'_>,
) -> Result<Vec<Clause>> {
    let mut post = Vec::new();
    post.extend(create_auth_validation(
        node,
        variable,
        name,
        &[AuthOperation::Create],
        AuthKind::Bind,
        translation,
    )?);
    post.extend(create_relationship_validation(node, variable, translation)?);
    if !post.is_empty() {
        post.insert(0, scope.project());
    }
    Ok(post)
}

/// Nested `create`, `connect` and `connectOrCreate` inputs under a created node
pub(crate) fn create_nested_operations(
    parent: Parent<'_>,
    input: &Map<String, Value>,
    scope: &Scope,
    translation: &mut Translation<'_>,
) -> Result<Vec<Clause>> {
    let mut clauses = Vec::new();
    for (key, value) in input {
        let field = match parent.node.relation_field(key) {
            Some(field) => field,
            None => continue,
        };
        let operations = operations_of(field, value)?;
        ensure_operations(field, &operations, &CREATE_OPERATIONS)?;
        if let Some(create) = operations.get("create") {
            clauses.extend(create_nested_create(parent, field, create, scope, translation)?);
        }
        if let Some(connect) = operations.get("connect") {
            clauses.extend(create_connect_and_params(parent, field, connect, scope, translation)?);
        }
        if let Some(items) = operations.get("connectOrCreate") {
            clauses.extend(create_connect_or_create_and_params(
                parent,
                field,
                items,
                scope,
                translation,
            )?);
        }
    }
    Ok(clauses)
}

/// An item of a nested `create`: the concrete node type, its input and edge input
struct CreateItem<'a, 'v> {
    target: &'a Node,
    node: &'v Map<String, Value>,
    edge: Option<&'v Map<String, Value>>,
}

fn create_items<'a, 'v>(
    field: &'v RelationField,
    input: &'v Value,
    translation: &Translation<'a>,
) -> Result<Vec<CreateItem<'a, 'v>>> {
    let schema = translation.schema;
    let mut items = Vec::new();
    let mut push = |target: &'a Node, item: &'v Value, node: Option<&'v Value>| -> Result<()> {
        let item = input_object(item, "create")?;
        let node = node
            .or_else(|| item.get("node"))
            .ok_or_else(|| Error::invalid(format!("create on {} requires node", field.name)))?;
        items.push(CreateItem {
            target,
            node: input_object(node, "create.node")?,
            edge: item
                .get("edge")
                .map(|edge| input_object(edge, "create.edge"))
                .transpose()?,
        });
        Ok(())
    };

    match &field.target {
        RelationTarget::Interface {
            implementations, ..
        } => {
            for item in input_items(input) {
                let by_type = input_object(item, "create")?
                    .get("node")
                    .ok_or_else(|| Error::invalid(format!("create on {} requires node", field.name)))?;
                for (member, node) in input_object(by_type, "create.node")? {
                    if !implementations.contains(member) {
                        return Err(Error::UnknownField {
                            entity: field.name.clone(),
                            field: member.clone(),
                        });
                    }
                    push(schema.require_node(member)?, item, Some(node))?;
                }
            }
        }
        _ => {
            for (member, member_input) in members_of(field, input) {
                let target = schema.require_node(member)?;
                for item in input_items(member_input) {
                    push(target, item, None)?;
                }
            }
        }
    }
    Ok(items)
}

/// `CREATE` of related nodes, each linked to `parent` with a new relationship
pub(crate) fn create_nested_create(
    parent: Parent<'_>,
    field: &RelationField,
    input: &Value,
    scope: &Scope,
    translation: &mut Translation<'_>,
) -> Result<Vec<Clause>> {
    ensure_allowed(field, NestedOperation::Create)?;
    let schema = translation.schema;
    let mut clauses = Vec::new();

    for (index, item) in create_items(field, input, translation)?.into_iter().enumerate() {
        let base = format!("{}_{}{}", parent.name, field.name, index);
        let node_name = format!("{}_node", base);
        let node = Variable::named(&node_name);
        let relationship_name = format!("{}_relationship", base);
        let relationship = Variable::named(&relationship_name);
        let target = item.target;

        clauses.push(scope.project());
        clauses.push(Clause::Create(Pattern::node(
            translation.node_pattern(Some(&node), target)?,
        )));
        clauses.push(Clause::Set(create_set_items(
            target,
            &node,
            &node_name,
            item.node,
            WriteOperation::Create,
            translation,
        )?));
        clauses.push(Clause::Merge {
            pattern: Pattern::node(NodePattern::new(parent.variable)).related(
                relationship_pattern(field, Some(&relationship)),
                NodePattern::new(&node),
            ),
            on_create: Vec::new(),
            on_match: Vec::new(),
        });
        match schema.edge_entity(field)? {
            Some(edge) => {
                let empty = Map::new();
                clauses.push(Clause::Set(create_set_items(
                    edge,
                    &relationship,
                    &relationship_name,
                    item.edge.unwrap_or(&empty),
                    WriteOperation::Create,
                    translation,
                )?));
            }
            None if item.edge.is_some() => {
                return Err(Error::invalid(format!(
                    "relationship {} has no properties",
                    field.name
                )))
            }
            None => {}
        }

        let inner = scope.with(&node);
        if scope.has_meta() {
            let endpoints = RelationshipEndpoints::new(
                field,
                parent.variable,
                &parent.node.name,
                &node,
                &target.name,
            );
            clauses.push(inner.with(&relationship).append_meta(Expr::List(vec![
                node_event(EventKind::Create, &node, &target.name, None, Some(snapshot(&node))),
                relationship_event(EventKind::CreateRelationship, field, &relationship, &endpoints),
            ])));
        }

        let child = Parent {
            node: target,
            variable: &node,
            name: &node_name,
        };
        clauses.extend(create_nested_operations(child, item.node, &inner, translation)?);
        clauses.extend(created_node_validation(target, &node, &node_name, &inner, translation)?);
    }
    Ok(clauses)
}
