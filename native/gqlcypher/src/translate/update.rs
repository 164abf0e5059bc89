//! Update root fields
//!
//! ```text
//! MATCH (this:Label) WHERE <where AND auth where>
//! <allow validation>
//! SET this.x = $this_update_x
//! <nested update/disconnect/connect/create/delete/connectOrCreate per field>
//! <top-level disconnect/connect/create/delete/connectOrCreate arguments>
//! <bind validation, cardinality validation>
//! RETURN collect(DISTINCT this { ... }) AS data
//! ```

use serde_json::{Map, Value};

use super::auth::{create_auth_predicate, create_auth_validation, validation_clause, AuthKind};
use super::connect::{create_connect_and_params, endpoint_predicates};
use super::connect_or_create::create_connect_or_create_and_params;
use super::create::create_nested_create;
use super::delete::create_delete_and_params;
use super::disconnect::create_disconnect_and_params;
use super::projection::create_projection;
use super::relationship_validation::create_relationship_validation;
use super::scope::Scope;
use super::set_properties::create_set_items;
use super::subscriptions::{flatten_collected, node_event, snapshot, EventKind};
use super::where_clause::{create_connection_where, create_where};
use super::{
    ensure_allowed, input_items, input_object, members_of, relationship_pattern, Parent,
    Translation,
};
use crate::constants::META_VARIABLE;
use crate::cypher::{
    Clause, CypherResult, Expr, Imports, NodePattern, Pattern, Projection, Variable,
};
use crate::error::{Error, Result};
use crate::resolve_tree::ResolveTree;
use crate::schema::{
    AuthOperation, Entity, NestedOperation, Node, RelationField, RelationTarget, WriteOperation,
};

const UPDATE_ITEM_KEYS: [&str; 7] = [
    "where",
    "update",
    "disconnect",
    "connect",
    "create",
    "delete",
    "connectOrCreate",
];

/// Translates `update<Plural>(where, update, connect, disconnect, create, delete, connectOrCreate)`
pub fn translate_update(
    tree: &ResolveTree,
    node: &Node,
    translation: &mut Translation<'_>,
) -> Result<CypherResult> {
    let this = Variable::named("this");
    let operations = [AuthOperation::Update];
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

    let empty = Map::new();
    let update = match tree.arg("update") {
        Some(update) => input_object(update, "update")?,
        None => &empty,
    };
    let parent = Parent {
        node,
        variable: &this,
        name: "this",
    };
    let mut scope = Scope::new(&this);
    let (set, start) = update_properties(parent, "this_update", update, &scope, translation)?;
    clauses.extend(set);
    if let Some((start, with_meta)) = start {
        clauses.push(start);
        scope = with_meta;
    }

    clauses.extend(update_relations(parent, update, &scope, translation)?);

    for (argument, operation) in [
        ("disconnect", NestedOperation::Disconnect),
        ("connect", NestedOperation::Connect),
        ("create", NestedOperation::Create),
        ("delete", NestedOperation::Delete),
        ("connectOrCreate", NestedOperation::ConnectOrCreate),
    ] {
        if let Some(fields) = tree.arg(argument) {
            for (key, value) in input_object(fields, argument)? {
                let field = relation_field(node, key)?;
                clauses.extend(nested_operation(parent, field, operation, value, &scope, translation)?);
            }
        }
    }

    let mut post = Vec::new();
    post.extend(create_auth_validation(
        node,
        &this,
        "this",
        &operations,
        AuthKind::Bind,
        translation,
    )?);
    post.extend(create_relationship_validation(node, &this, translation)?);
    if !post.is_empty() {
        clauses.push(scope.project());
        clauses.extend(post);
    }

    let data = match tree.field(&node.plural()) {
        Some(selection) => create_projection(node, &this, "this", selection, translation)?,
        None => Expr::MapProjection {
            subject: this.clone(),
            items: Vec::new(),
        },
    };
    let mut returned = Projection::default().aliased(
        Expr::function("collect", vec![Expr::Distinct(Box::new(data))]),
        &Variable::named("data"),
    );
    if scope.has_meta() {
        returned = returned.aliased(
            flatten_collected(Variable::named(META_VARIABLE).expr()),
            &Variable::named(META_VARIABLE),
        );
    }
    clauses.push(Clause::Return(returned));

    Clause::Sequence(clauses).build("")
}

fn relation_field<'n>(node: &'n Node, key: &str) -> Result<&'n RelationField> {
    node.relation_field(key).ok_or_else(|| Error::UnknownField {
        entity: node.name.clone(),
        field: key.to_string(),
    })
}

type MetaStart = Option<(Clause, Scope)>;

/// `SET` of the scalar part of `input` on `parent`, with the `update` event.
///
/// With subscriptions enabled, also returns the clause starting the meta
/// accumulator and the scope carrying it.
fn update_properties(
    parent: Parent<'_>,
    path: &str,
    input: &Map<String, Value>,
    scope: &Scope,
    translation: &mut Translation<'_>,
) -> Result<(Vec<Clause>, MetaStart)> {
    let items = create_set_items(
        parent.node,
        parent.variable,
        path,
        input,
        WriteOperation::Update,
        translation,
    )?;
    let mut clauses = Vec::new();
    if !translation.subscriptions_enabled() {
        if !items.is_empty() {
            clauses.push(Clause::Set(items));
        }
        return Ok((clauses, None));
    }

    if items.is_empty() {
        return Ok((clauses, Some(scope.start_meta(Expr::List(vec![])))));
    }
    let old = Variable::named(format!("{}_old", parent.name));
    clauses.push(Clause::With(
        Projection::variables(scope.variables()).aliased(snapshot(parent.variable), &old),
    ));
    clauses.push(Clause::Set(items));
    let event = node_event(
        EventKind::Update,
        parent.variable,
        &parent.node.name,
        Some(old.expr()),
        Some(snapshot(parent.variable)),
    );
    let event = Expr::case_when(
        parent.variable.expr().is_null(),
        Expr::List(vec![]),
        Expr::List(vec![event]),
    );
    Ok((clauses, Some(scope.start_meta(event))))
}

/// Dispatches one nested operation on `field`
fn nested_operation(
    parent: Parent<'_>,
    field: &RelationField,
    operation: NestedOperation,
    value: &Value,
    scope: &Scope,
    translation: &mut Translation<'_>,
) -> Result<Vec<Clause>> {
    match operation {
        NestedOperation::Disconnect => {
            create_disconnect_and_params(parent, field, value, scope, translation)
        }
        NestedOperation::Connect => create_connect_and_params(parent, field, value, scope, translation),
        NestedOperation::Create => create_nested_create(parent, field, value, scope, translation),
        NestedOperation::Delete => create_delete_and_params(parent, field, value, scope, translation),
        NestedOperation::ConnectOrCreate => {
            create_connect_or_create_and_params(parent, field, value, scope, translation)
        }
        NestedOperation::Update => Err(Error::invalid(format!(
            "update of {} must be given inside the update argument",
            field.name
        ))),
    }
}

/// Relationship keys of an `update` input: one list of update items per field
fn update_relations(
    parent: Parent<'_>,
    input: &Map<String, Value>,
    scope: &Scope,
    translation: &mut Translation<'_>,
) -> Result<Vec<Clause>> {
    let schema = translation.schema;
    let mut clauses = Vec::new();
    for (key, value) in input {
        let field = match parent.node.relation_field(key) {
            Some(field) => field,
            None => continue,
        };
        for (member, member_input) in members_of(field, value) {
            let target = schema.require_node(member)?;
            // Each item addresses one concrete member
            let narrowed = match &field.target {
                RelationTarget::Node(_) => None,
                _ => Some(RelationField {
                    target: RelationTarget::Node(member.to_string()),
                    ..field.clone()
                }),
            };
            let item_field = narrowed.as_ref().unwrap_or(field);
            for (index, item) in input_items(member_input).into_iter().enumerate() {
                let base = if narrowed.is_some() {
                    format!("{}_{}_{}{}", parent.name, field.name, member, index)
                } else {
                    format!("{}_{}{}", parent.name, field.name, index)
                };
                let item = input_object(item, "update item")?;
                clauses.extend(update_item(
                    parent,
                    item_field,
                    target,
                    item,
                    &base,
                    scope,
                    translation,
                )?);
            }
        }
    }
    Ok(clauses)
}

/// One item of a nested update list
fn update_item(
    parent: Parent<'_>,
    field: &RelationField,
    target: &Node,
    item: &Map<String, Value>,
    base: &str,
    scope: &Scope,
    translation: &mut Translation<'_>,
) -> Result<Vec<Clause>> {
    if let Some(key) = item.keys().find(|key| !UPDATE_ITEM_KEYS.contains(&key.as_str())) {
        return Err(Error::UnknownField {
            entity: format!("{}UpdateFieldInput", field.name),
            field: key.clone(),
        });
    }
    // Operations inside the item derive their names from the item
    let item_parent = Parent {
        node: parent.node,
        variable: parent.variable,
        name: base,
    };
    let mut clauses = Vec::new();
    if let Some(value) = item.get("disconnect") {
        clauses.extend(create_disconnect_and_params(item_parent, field, value, scope, translation)?);
    }
    if let Some(update) = item.get("update") {
        ensure_allowed(field, NestedOperation::Update)?;
        let update = input_object(update, "update")?;
        let (body, result) =
            update_related(parent, field, target, item.get("where"), update, base, translation)?;
        clauses.push(scope.project());
        clauses.push(Clause::call(
            Imports::Variables(vec![parent.variable.clone()]),
            body,
        ));
        if scope.has_meta() {
            clauses.push(scope.append_meta(result.expr()));
        }
    }
    for (key, operation) in [
        ("connect", NestedOperation::Connect),
        ("create", NestedOperation::Create),
        ("delete", NestedOperation::Delete),
        ("connectOrCreate", NestedOperation::ConnectOrCreate),
    ] {
        if let Some(value) = item.get(key) {
            clauses.extend(nested_operation(item_parent, field, operation, value, scope, translation)?);
        }
    }
    Ok(clauses)
}

/// Subquery updating the nodes related through `field` that match `filter`
fn update_related(
    parent: Parent<'_>,
    field: &RelationField,
    target: &Node,
    filter: Option<&Value>,
    update: &Map<String, Value>,
    base: &str,
    translation: &mut Translation<'_>,
) -> Result<(Clause, Variable)> {
    let schema = translation.schema;
    let update_base = format!("{}_update", base);
    let node_name = format!("{}_node", update_base);
    let node = Variable::named(&node_name);
    let relationship_name = format!("{}_relationship", update_base);
    let relationship = Variable::named(&relationship_name);
    let operations = [AuthOperation::Update];
    let edge = schema.edge_entity(field)?;
    let mut body = Vec::new();

    let mut predicates = Vec::new();
    if let Some(filter) = filter.filter(|f| !f.is_null()) {
        predicates.extend(create_connection_where(
            target,
            &node,
            edge.map(|e| e as &dyn Entity),
            &relationship,
            &update_base,
            input_object(filter, "update.where")?,
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

    let scope = Scope::new(parent.variable).with(&node).with(&relationship);
    let endpoints = [(target, &node, node_name.as_str())];
    if let Some(allow) = endpoint_predicates(&endpoints, &operations, AuthKind::Allow, translation)? {
        body.push(scope.project());
        body.push(validation_clause(allow));
    }

    let empty = Map::new();
    let node_input = match update.get("node") {
        Some(node_input) => input_object(node_input, "update.node")?,
        None => &empty,
    };
    let child = Parent {
        node: target,
        variable: &node,
        name: &node_name,
    };
    let (set, start) = update_properties(child, &node_name, node_input, &scope, translation)?;
    body.extend(set);
    let mut inner = scope.clone();
    if let Some((start, with_meta)) = start {
        body.push(start);
        inner = with_meta;
    }

    match (edge, update.get("edge")) {
        (Some(edge), Some(edge_input)) => {
            let items = create_set_items(
                edge,
                &relationship,
                &relationship_name,
                input_object(edge_input, "update.edge")?,
                WriteOperation::Update,
                translation,
            )?;
            if !items.is_empty() {
                body.push(Clause::Set(items));
            }
        }
        (None, Some(_)) => {
            return Err(Error::invalid(format!(
                "relationship {} has no properties",
                field.name
            )))
        }
        _ => {}
    }

    body.extend(update_relations(child, node_input, &inner, translation)?);

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
        (
            Variable::named(format!("{}_meta", update_base)),
            flatten_collected(Variable::named(META_VARIABLE).expr()),
        )
    } else {
        (Variable::named(format!("update_{}", update_base)), Expr::CountAll)
    };
    body.push(Clause::Return(Projection::default().aliased(returned, &result)));

    Ok((Clause::Sequence(body), result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Context;
    use crate::schema::{PrimitiveField, RelationshipDirection, Schema};
    use serde_json::json;

    fn schema() -> Schema {
        let mut updated = PrimitiveField::new("updatedAt", "DateTime");
        updated.timestamps = vec![WriteOperation::Update];
        Schema::new(
            vec![
                Node::new("Movie")
                    .with_primitive(PrimitiveField::new("title", "String"))
                    .with_primitive(updated)
                    .with_relation(RelationField::new(
                        "actors",
                        "ACTED_IN",
                        RelationshipDirection::In,
                        RelationTarget::Node("Actor".into()),
                    )),
                Node::new("Actor").with_primitive(PrimitiveField::new("name", "String")),
            ],
            vec![],
        )
        .unwrap()
    }

    fn tree(args: Value) -> ResolveTree {
        ResolveTree::new("updateMovies")
            .with_args(args)
            .with_fields(vec![
                ResolveTree::new("movies").with_fields(vec![ResolveTree::new("title")])
            ])
    }

    #[test]
    fn update_with_nested_update() {
        let schema = schema();
        let context = Context::new(Config::default());
        let mut translation = Translation::new(&schema, &context);
        let result = translate_update(
            &tree(json!({
                "where": { "title": "Heat" },
                "update": {
                    "title": "Heat (1995)",
                    "actors": [{
                        "where": { "node": { "name": "Pacino" } },
                        "update": { "node": { "name": "Al Pacino" } }
                    }]
                }
            })),
            schema.node("Movie").unwrap(),
            &mut translation,
        )
        .unwrap();
        insta::assert_snapshot!(result.cypher, @r###"
        MATCH (this:Movie)
        WHERE this.title = $this_param0
        SET
            this.title = $this_update_title,
            this.updatedAt = datetime()
        WITH this
        CALL {
            WITH this
            OPTIONAL MATCH (this)<-[this_actors0_update_relationship:ACTED_IN]-(this_actors0_update_node:Actor)
            WHERE this_actors0_update_node.name = $this_actors0_update_node_param0
            SET this_actors0_update_node.name = $this_actors0_update_node_name
            RETURN count(*) AS update_this_actors0_update
        }
        RETURN collect(DISTINCT this { .title }) AS data
        "###);
        assert_eq!(result.params["this_update_title"], json!("Heat (1995)"));
        assert_eq!(result.params["this_actors0_update_node_name"], json!("Al Pacino"));
        assert_eq!(result.params["this_actors0_update_node_param0"], json!("Pacino"));
    }

    #[test]
    fn top_level_and_nested_connects_do_not_collide() {
        let schema = schema();
        let context = Context::new(Config::default());
        let mut translation = Translation::new(&schema, &context);
        let result = translate_update(
            &tree(json!({
                "update": {
                    "actors": [{ "connect": [{ "where": { "node": { "name": "A" } } }] }]
                },
                "connect": { "actors": [{ "where": { "node": { "name": "B" } } }] }
            })),
            schema.node("Movie").unwrap(),
            &mut translation,
        )
        .unwrap();
        assert_eq!(result.params["this_actors0_actors_connect0_node_param0"], json!("A"));
        assert_eq!(result.params["this_actors_connect0_node_param0"], json!("B"));
    }

    #[test]
    fn update_event_carries_old_and_new() {
        let schema = schema();
        let context = Context::new(Config {
            subscriptions_enabled: true,
            ..Config::default()
        });
        let mut translation = Translation::new(&schema, &context);
        let result = translate_update(
            &tree(json!({ "update": { "title": "Ronin" } })),
            schema.node("Movie").unwrap(),
            &mut translation,
        )
        .unwrap();
        let cypher = &result.cypher;
        assert!(cypher.contains("WITH this, this { .* } AS this_old"));
        assert!(cypher.contains("properties: { old: this_old, new: this { .* } }"));
        assert!(cypher.ends_with("AS meta"));
    }
}
