//! Nested `connectOrCreate`
//!
//! The target node is merged on its `where.node` key set; everything else in
//! `onCreate.node` (plus generated and callback fields) is only assigned when
//! the merge creates the node. The relationship is merged the same way, with
//! `onCreate.edge` as its creation-time properties.

use serde_json::{Map, Value};

use super::auth::{validation_clause, AuthKind};
use super::connect::endpoint_predicates;
use super::relationship_validation::create_relationship_validation;
use super::scope::Scope;
use super::set_properties::create_set_items_except;
use super::subscriptions::{flatten_collected, relationship_events_between, EventKind};
use super::{
    ensure_allowed, input_items, input_object, members_of, relationship_pattern, Parent,
    Translation,
};
use crate::constants::META_VARIABLE;
use crate::cypher::{Clause, Expr, Imports, NodePattern, Param, Pattern, Projection, Variable};
use crate::error::{Error, Result};
use crate::schema::{AuthOperation, Entity, NestedOperation, Node, RelationField, WriteOperation};

/// One `connectOrCreate` item, validated
struct Item<'v> {
    keys: &'v Map<String, Value>,
    node: Option<&'v Map<String, Value>>,
    edge: Option<&'v Map<String, Value>>,
}

/// Clauses merging every node described by `input` and connecting it to `parent`
pub fn create_connect_or_create_and_params(
    parent: Parent<'_>,
    field: &RelationField,
    input: &Value,
    scope: &Scope,
    translation: &mut Translation<'_>,
) -> Result<Vec<Clause>> {
    ensure_allowed(field, NestedOperation::ConnectOrCreate)?;
    let schema = translation.schema;

    // Validate everything before building anything
    let mut items = Vec::new();
    for (member, member_input) in members_of(field, input) {
        let target = schema.require_node(member)?;
        for (index, item) in input_items(member_input).into_iter().enumerate() {
            items.push((target, member, index, parse_item(target, item)?));
        }
    }

    let mut clauses = Vec::new();
    for (target, member, index, item) in items {
        let base = if field.target.is_abstract() {
            format!("{}_{}_{}_connectOrCreate{}", parent.name, field.name, member, index)
        } else {
            format!("{}_{}_connectOrCreate{}", parent.name, field.name, index)
        };
        let (body, result) = merge_item(parent, field, target, &item, &base, translation)?;
        clauses.push(scope.project());
        clauses.push(Clause::call(
            Imports::Variables(vec![parent.variable.clone()]),
            body,
        ));
        if scope.has_meta() {
            clauses.push(scope.append_meta(result.expr()));
        }
    }
    Ok(clauses)
}

fn parse_item<'v>(target: &Node, item: &'v Value) -> Result<Item<'v>> {
    let item = input_object(item, "connectOrCreate")?;
    let filter = item
        .get("where")
        .ok_or_else(|| Error::invalid("connectOrCreate requires where"))
        .and_then(|filter| input_object(filter, "connectOrCreate.where"))?;
    let keys = filter
        .get("node")
        .ok_or_else(|| Error::invalid("connectOrCreate requires where.node"))
        .and_then(|keys| input_object(keys, "connectOrCreate.where.node"))?;
    if keys.is_empty() {
        return Err(Error::invalid("connectOrCreate where.node must not be empty"));
    }
    for (key, value) in keys {
        if target.primitive_field(key).is_none() {
            return Err(Error::UnknownField {
                entity: target.name.clone(),
                field: key.clone(),
            });
        }
        if value.is_null() {
            return Err(Error::invalid(format!(
                "connectOrCreate where.node.{} must not be null",
                key
            )));
        }
    }

    let (node, edge) = match item.get("onCreate") {
        Some(on_create) => {
            let on_create = input_object(on_create, "connectOrCreate.onCreate")?;
            let node = on_create
                .get("node")
                .map(|node| input_object(node, "connectOrCreate.onCreate.node"))
                .transpose()?;
            let edge = on_create
                .get("edge")
                .map(|edge| input_object(edge, "connectOrCreate.onCreate.edge"))
                .transpose()?;
            (node, edge)
        }
        None => (None, None),
    };

    if let Some(node) = node {
        let clashes: Vec<String> = node
            .keys()
            .filter(|key| keys.contains_key(*key))
            .map(|key| format!("[[{}]]", key))
            .collect();
        if !clashes.is_empty() {
            return Err(Error::ConflictingModification {
                type_name: target.name.clone(),
                fields: clashes.join(", "),
            });
        }
    }

    Ok(Item { keys, node, edge })
}

fn merge_item(
    parent: Parent<'_>,
    field: &RelationField,
    target: &Node,
    item: &Item<'_>,
    base: &str,
    translation: &mut Translation<'_>,
) -> Result<(Clause, Variable)> {
    let schema = translation.schema;
    let node_name = format!("{}_node", base);
    let node = Variable::named(&node_name);
    let relationship_name = format!("{}_relationship", base);
    let relationship = Variable::named(&relationship_name);
    let mut body = Vec::new();

    let key_scope = format!("{}_", node_name);
    let mut key_properties = Vec::with_capacity(item.keys.len());
    let mut key_names = Vec::with_capacity(item.keys.len());
    for (key, value) in item.keys {
        if let Some(key_field) = target.primitive_field(key) {
            key_properties.push((
                key_field.db_name().to_string(),
                Param::scoped(key_scope.as_str(), value.clone()).expr(),
            ));
            key_names.push(key.as_str());
        }
    }

    let empty = Map::new();
    let on_create = create_set_items_except(
        target,
        &node,
        &node_name,
        item.node.unwrap_or(&empty),
        WriteOperation::Create,
        &key_names,
        translation,
    )?;
    body.push(Clause::Merge {
        pattern: Pattern::node(
            translation
                .node_pattern(Some(&node), target)?
                .properties(key_properties),
        ),
        on_create,
        on_match: Vec::new(),
    });

    let edge_items = match schema.edge_entity(field)? {
        Some(edge) => create_set_items_except(
            edge,
            &relationship,
            &relationship_name,
            item.edge.unwrap_or(&empty),
            WriteOperation::Create,
            &[],
            translation,
        )?,
        None if item.edge.is_some() => {
            return Err(Error::invalid(format!(
                "relationship {} has no properties",
                field.name
            )))
        }
        None => Vec::new(),
    };
    body.push(Clause::Merge {
        pattern: Pattern::node(NodePattern::new(parent.variable)).related(
            relationship_pattern(field, Some(&relationship)),
            NodePattern::new(&node),
        ),
        on_create: edge_items,
        on_match: Vec::new(),
    });

    let mut inner = Scope::new(parent.variable).with(&node);
    let endpoints = [
        (parent.node, parent.variable, parent.name),
        (target, &node, node_name.as_str()),
    ];
    let operations = [AuthOperation::Connect, AuthOperation::Create];
    if let Some(allow) = endpoint_predicates(&endpoints, &operations, AuthKind::Allow, translation)? {
        body.push(inner.project());
        body.push(validation_clause(allow));
    }

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

    let validation = create_relationship_validation(target, &node, translation)?;
    if !validation.is_empty() {
        body.push(inner.project());
        body.extend(validation);
    }

    let (result, returned) = if inner.has_meta() {
        (
            Variable::named(format!("{}_meta", base)),
            flatten_collected(Variable::named(META_VARIABLE).expr()),
        )
    } else {
        (Variable::named(format!("connectOrCreate_{}", base)), Expr::CountAll)
    };
    body.push(Clause::Return(Projection::default().aliased(returned, &result)));

    Ok((Clause::Sequence(body), result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Context;
    use crate::schema::{PrimitiveField, RelationTarget, RelationshipDirection, Schema};
    use serde_json::json;

    fn schema() -> Schema {
        let mut id = PrimitiveField::new("id", "ID");
        id.autogenerate = true;
        Schema::new(
            vec![
                Node::new("Movie")
                    .with_primitive(PrimitiveField::new("title", "String"))
                    .with_relation(RelationField::new(
                        "genres",
                        "IN_GENRE",
                        RelationshipDirection::Out,
                        RelationTarget::Node("Genre".into()),
                    )),
                Node::new("Genre")
                    .with_primitive(id)
                    .with_primitive(PrimitiveField::new("name", "String")),
            ],
            vec![],
        )
        .unwrap()
    }

    fn build(input: Value) -> Result<crate::cypher::CypherResult> {
        let schema = schema();
        let context = Context::new(Config::default());
        let mut translation = Translation::new(&schema, &context);
        let movie = schema.node("Movie").unwrap();
        let this = Variable::named("this0");
        let clauses = create_connect_or_create_and_params(
            Parent {
                node: movie,
                variable: &this,
                name: "this0",
            },
            movie.relation_field("genres").unwrap(),
            &input,
            &Scope::new(&this),
            &mut translation,
        )?;
        Clause::Sequence(clauses).build("")
    }

    #[test]
    fn merges_on_where_keys() {
        let result = build(json!([{
            "where": { "node": { "name": "Drama" } },
            "onCreate": { "node": {} }
        }]))
        .unwrap();
        insta::assert_snapshot!(result.cypher, @r###"
        WITH this0
        CALL {
            WITH this0
            MERGE (this0_genres_connectOrCreate0_node:Genre { name: $this0_genres_connectOrCreate0_node_param0 })
            ON CREATE SET this0_genres_connectOrCreate0_node.id = randomUUID()
            MERGE (this0)-[this0_genres_connectOrCreate0_relationship:IN_GENRE]->(this0_genres_connectOrCreate0_node)
            RETURN count(*) AS connectOrCreate_this0_genres_connectOrCreate0
        }
        "###);
        assert_eq!(
            result.params["this0_genres_connectOrCreate0_node_param0"],
            json!("Drama")
        );
    }

    #[test]
    fn key_fields_are_not_regenerated() {
        let result = build(json!([{ "where": { "node": { "id": "g1" } } }])).unwrap();
        assert!(!result.cypher.contains("randomUUID()"));
        assert!(!result.cypher.contains("ON CREATE SET"));
    }

    #[test]
    fn conflicting_on_create_is_rejected() {
        let result = build(json!([
            { "where": { "node": { "name": "Drama" } } },
            {
                "where": { "node": { "name": "Drama" } },
                "onCreate": { "node": { "name": "Comedy" } }
            }
        ]));
        match result {
            Err(Error::ConflictingModification { type_name, fields }) => {
                assert_eq!(type_name, "Genre");
                assert_eq!(fields, "[[name]]");
            }
            other => panic!("expected a conflict, got {:?}", other.map(|r| r.cypher)),
        }
    }
}
