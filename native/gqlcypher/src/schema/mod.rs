//! Static schema model
//!
//! The schema is generated elsewhere and consumed here as a read-only set of
//! entity descriptors, shared freely across concurrent translations.

mod auth;
mod field;
mod node;

pub use auth::{Auth, AuthOperation, AuthRule};
pub use field::{
    CallbackField, NestedOperation, PrimitiveField, RelationField, RelationTarget,
    RelationshipDirection, WriteOperation,
};
pub use node::{Entity, Node, Relationship};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Kind of a GraphQL root field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootOperation {
    Read,
    Create,
    Update,
    Delete,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Schema {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Schema {
    /// Builds and validates a schema
    pub fn new(nodes: Vec<Node>, relationships: Vec<Relationship>) -> Result<Self> {
        let schema = Schema {
            nodes,
            relationships,
        };
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn require_node(&self, name: &str) -> Result<&Node> {
        self.node(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Relationship-properties entity of `field`, if it has one
    pub fn edge_entity(&self, field: &RelationField) -> Result<Option<&Relationship>> {
        match &field.properties {
            None => Ok(None),
            Some(name) => self
                .relationship(name)
                .map(Some)
                .ok_or_else(|| Error::UnknownEntity(name.clone())),
        }
    }

    /// Maps a root field name to its operation and node
    pub fn root_field(&self, field: &str) -> Option<(RootOperation, &Node)> {
        self.nodes.iter().find_map(|node| {
            let plural = node.plural();
            if field == plural {
                return Some((RootOperation::Read, node));
            }
            let pascal = pascal_case(&plural);
            let operation = match field.strip_suffix(pascal.as_str())? {
                "create" => RootOperation::Create,
                "update" => RootOperation::Update,
                "delete" => RootOperation::Delete,
                _ => return None,
            };
            Some((operation, node))
        })
    }

    fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            node.validate()?;
            for field in &node.relation_fields {
                for target in field.target.concrete_types() {
                    self.require_node(target)?;
                }
                self.edge_entity(field)?;
            }
        }
        for relationship in &self.relationships {
            relationship.validate()?;
        }
        Ok(())
    }
}

fn pascal_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::from_json(
            r#"{
                "nodes": [
                    {
                        "name": "Movie",
                        "primitiveFields": [{ "name": "title" }],
                        "relationFields": [{
                            "name": "actors",
                            "type": "ACTED_IN",
                            "direction": "IN",
                            "target": { "node": "Actor" },
                            "array": true,
                            "properties": "ActedIn"
                        }]
                    },
                    { "name": "Actor", "primitiveFields": [{ "name": "name" }] }
                ],
                "relationships": [
                    { "name": "ActedIn", "fields": [{ "name": "screenTime", "type": "Int" }] }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn maps_root_fields() {
        let schema = schema();
        let (op, node) = schema.root_field("movies").unwrap();
        assert_eq!((op, node.name.as_str()), (RootOperation::Read, "Movie"));
        let (op, _) = schema.root_field("createMovies").unwrap();
        assert_eq!(op, RootOperation::Create);
        let (op, node) = schema.root_field("deleteActors").unwrap();
        assert_eq!((op, node.name.as_str()), (RootOperation::Delete, "Actor"));
        assert!(schema.root_field("upsertMovies").is_none());
    }

    #[test]
    fn rejects_unknown_targets() {
        let result = Schema::from_json(
            r#"{ "nodes": [{
                "name": "Movie",
                "relationFields": [{
                    "name": "actors", "type": "ACTED_IN", "direction": "IN",
                    "target": { "node": "Missing" }
                }]
            }] }"#,
        );
        assert!(matches!(result, Err(Error::UnknownEntity(name)) if name == "Missing"));
    }
}
