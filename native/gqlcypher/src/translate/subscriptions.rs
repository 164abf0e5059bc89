//! Subscription event metadata
//!
//! Events are assembled inside the database, at the point of the write, as
//! Cypher map expressions and accumulated in a `meta` list. The statement
//! returns that list in a `meta` column, which the host decodes into
//! [`EventMeta`] values for publication. Event order within one request is
//! unspecified.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{relationship_pattern, Translation};
use crate::cypher::{Expr, MapProjectionItem, NodePattern, Pattern, Variable};
use crate::error::Result;
use crate::schema::{Node, RelationField, RelationshipDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Create,
    Update,
    Delete,
    CreateRelationship,
    DeleteRelationship,
    Connect,
    Disconnect,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::CreateRelationship => "create_relationship",
            EventKind::DeleteRelationship => "delete_relationship",
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeEventProperties {
    #[serde(default)]
    pub old: Option<Map<String, Value>>,
    #[serde(default)]
    pub new: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEvent {
    pub id: i64,
    pub typename: String,
    pub properties: NodeEventProperties,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelationshipEventProperties {
    #[serde(default)]
    pub from: Map<String, Value>,
    #[serde(default)]
    pub to: Map<String, Value>,
    #[serde(default)]
    pub relationship: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipEvent {
    #[serde(rename = "id_from")]
    pub id_from: i64,
    #[serde(rename = "id_to")]
    pub id_to: i64,
    pub id: i64,
    pub relationship_name: String,
    pub field_name: String,
    pub from_typename: String,
    pub to_typename: String,
    pub properties: RelationshipEventProperties,
    pub timestamp: i64,
}

/// One decoded event, as handed to the publisher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventMeta {
    Create(NodeEvent),
    Update(NodeEvent),
    Delete(NodeEvent),
    CreateRelationship(RelationshipEvent),
    DeleteRelationship(RelationshipEvent),
    Connect(RelationshipEvent),
    Disconnect(RelationshipEvent),
}

impl EventMeta {
    pub fn kind(&self) -> EventKind {
        match self {
            EventMeta::Create(_) => EventKind::Create,
            EventMeta::Update(_) => EventKind::Update,
            EventMeta::Delete(_) => EventKind::Delete,
            EventMeta::CreateRelationship(_) => EventKind::CreateRelationship,
            EventMeta::DeleteRelationship(_) => EventKind::DeleteRelationship,
            EventMeta::Connect(_) => EventKind::Connect,
            EventMeta::Disconnect(_) => EventKind::Disconnect,
        }
    }

    /// Decodes the `meta` column of a result record
    pub fn from_column(value: &Value) -> Result<Vec<EventMeta>> {
        match value {
            Value::Null => Ok(Vec::new()),
            other => Ok(serde_json::from_value(other.clone())?),
        }
    }
}

fn all_properties(variable: &Variable) -> Expr {
    Expr::MapProjection {
        subject: variable.clone(),
        items: vec![MapProjectionItem::AllProperties],
    }
}

fn id_of(variable: &Variable) -> Expr {
    Expr::function("id", vec![variable.expr()])
}

/// Snapshot of every property of `variable`, for `old`/`new` in node events
pub fn snapshot(variable: &Variable) -> Expr {
    all_properties(variable)
}

/// Event map for a node-level write
pub fn node_event(
    kind: EventKind,
    variable: &Variable,
    typename: &str,
    old: Option<Expr>,
    new: Option<Expr>,
) -> Expr {
    Expr::Map(vec![
        ("event".into(), Expr::string(kind.as_str())),
        ("id".into(), id_of(variable)),
        (
            "properties".into(),
            Expr::Map(vec![
                ("old".into(), old.unwrap_or_else(Expr::null)),
                ("new".into(), new.unwrap_or_else(Expr::null)),
            ]),
        ),
        ("timestamp".into(), Expr::function("timestamp", vec![])),
        ("typename".into(), Expr::string(typename)),
    ])
}

/// The endpoints of a relationship field write, oriented like the relationship
pub struct RelationshipEndpoints<'v> {
    pub from: &'v Variable,
    pub from_typename: &'v str,
    pub to: &'v Variable,
    pub to_typename: &'v str,
}

impl<'v> RelationshipEndpoints<'v> {
    /// Orders `parent` and `related` by the direction of `field`
    pub fn new(
        field: &RelationField,
        parent: &'v Variable,
        parent_typename: &'v str,
        related: &'v Variable,
        related_typename: &'v str,
    ) -> Self {
        match field.direction {
            RelationshipDirection::Out => RelationshipEndpoints {
                from: parent,
                from_typename: parent_typename,
                to: related,
                to_typename: related_typename,
            },
            RelationshipDirection::In => RelationshipEndpoints {
                from: related,
                from_typename: related_typename,
                to: parent,
                to_typename: parent_typename,
            },
        }
    }
}

/// Event map for a relationship-level write
pub fn relationship_event(
    kind: EventKind,
    field: &RelationField,
    relationship: &Variable,
    endpoints: &RelationshipEndpoints<'_>,
) -> Expr {
    Expr::Map(vec![
        ("event".into(), Expr::string(kind.as_str())),
        ("id_from".into(), id_of(endpoints.from)),
        ("id_to".into(), id_of(endpoints.to)),
        ("id".into(), id_of(relationship)),
        ("relationshipName".into(), Expr::string(field.rel_type.as_str())),
        ("fieldName".into(), Expr::string(field.name.as_str())),
        ("fromTypename".into(), Expr::string(endpoints.from_typename)),
        ("toTypename".into(), Expr::string(endpoints.to_typename)),
        (
            "properties".into(),
            Expr::Map(vec![
                ("from".into(), all_properties(endpoints.from)),
                ("to".into(), all_properties(endpoints.to)),
                ("relationship".into(), all_properties(relationship)),
            ]),
        ),
        ("timestamp".into(), Expr::function("timestamp", vec![])),
    ])
}

/// Events for the relationships of `field` between two bound nodes.
///
/// The relationship is re-read with a pattern comprehension, so this works
/// after a `MERGE` inside a `FOREACH`. Yields `[]` when either node is null.
pub fn relationship_events_between(
    kind: EventKind,
    field: &RelationField,
    parent: &Variable,
    parent_typename: &str,
    related: &Variable,
    related_typename: &str,
) -> Expr {
    let relationship = Variable::fresh("var");
    let pattern = Pattern::node(NodePattern::new(parent)).related(
        relationship_pattern(field, Some(&relationship)),
        NodePattern::new(related),
    );
    let endpoints =
        RelationshipEndpoints::new(field, parent, parent_typename, related, related_typename);
    let events = Expr::PatternComprehension {
        pattern: Box::new(pattern),
        predicate: None,
        projection: Box::new(relationship_event(kind, field, &relationship, &endpoints)),
    };
    Expr::case_when(
        Expr::Or(vec![parent.expr().is_null(), related.expr().is_null()]),
        Expr::List(vec![]),
        events,
    )
}

/// `delete_relationship` events for every relationship of `node` held in `variable`
pub fn relationship_deletion_events(
    node: &Node,
    variable: &Variable,
    translation: &Translation<'_>,
) -> Result<Option<Expr>> {
    let mut lists = Vec::new();
    for field in &node.relation_fields {
        for member in field.target.concrete_types() {
            let target = translation.schema.require_node(member)?;
            let relationship = Variable::fresh("var");
            let related = Variable::fresh("var");
            let pattern = Pattern::node(NodePattern::new(variable)).related(
                relationship_pattern(field, Some(&relationship)),
                translation.node_pattern(Some(&related), target)?,
            );
            let endpoints =
                RelationshipEndpoints::new(field, variable, &node.name, &related, &target.name);
            lists.push(Expr::PatternComprehension {
                pattern: Box::new(pattern),
                predicate: None,
                projection: Box::new(relationship_event(
                    EventKind::DeleteRelationship,
                    field,
                    &relationship,
                    &endpoints,
                )),
            });
        }
    }
    Ok(lists.into_iter().reduce(Expr::plus))
}

/// `reduce(acc = [], events IN collect(meta) | acc + events)`
pub fn flatten_collected(meta: Expr) -> Expr {
    let accumulator = Variable::fresh("var");
    let events = Variable::fresh("var");
    Expr::Reduce {
        accumulator: accumulator.clone(),
        init: Box::new(Expr::List(vec![])),
        variable: events.clone(),
        list: Box::new(Expr::function("collect", vec![meta])),
        body: Box::new(accumulator.expr().plus(events.expr())),
    }
}
